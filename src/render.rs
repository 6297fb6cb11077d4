use std::sync::atomic::{AtomicU64, Ordering};

use crate::case::{Case, CaseId};
use crate::tea::{Mode, Notification};
use crate::variables::VariableRow;

/// One row of the case table.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseView {
    pub id: CaseId,
    pub name: String,
    pub status: String,
    pub create: String,
    pub create_error: Option<String>,
    pub run: String,
    pub run_error: Option<String>,
    pub created: String,
    pub res: String,
    pub compset: String,
    pub can_run: bool,
    pub can_download: bool,
    pub downloading: bool,
    /// Unsettled under an active site, so a poller keeps it fresh.
    pub watching: bool,
}

impl CaseView {
    pub fn from_case(case: &Case, downloading: bool, site_active: bool) -> Self {
        Self {
            id: case.id,
            name: case.display_name().to_string(),
            status: case.status.to_string(),
            create: case.create_task.label().to_string(),
            create_error: case.create_task.error.clone(),
            run: case.run_task.label().to_string(),
            run_error: case.run_task.error.clone(),
            created: case
                .date_created
                .map(|d| {
                    d.with_timezone(&chrono::Local)
                        .format("%Y-%m-%d %H:%M")
                        .to_string()
                })
                .unwrap_or_else(|| "-".to_string()),
            res: case.res.clone().unwrap_or_else(|| "-".to_string()),
            compset: case.compset.clone().unwrap_or_else(|| "-".to_string()),
            can_run: case.can_run(),
            can_download: case.can_download(),
            downloading,
            watching: site_active && case.is_unsettled(),
        }
    }
}

/// Contents of the variables dialog.
#[derive(Debug, Clone, PartialEq)]
pub struct VariablesView {
    pub case_id: CaseId,
    pub name: String,
    pub rows: Vec<VariableRow>,
}

static VERSION_COUNTER: AtomicU64 = AtomicU64::new(0);

pub fn next_version() -> u64 {
    VERSION_COUNTER.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone)]
pub struct RenderState {
    pub version: u64,
    pub cases: Vec<CaseView>,
    pub selected: usize,
    pub mode: Mode,
    pub site: Option<String>,
    /// A case list request for the current site is outstanding.
    pub loading: bool,
    pub input_buffer: String,
    pub notification: Option<Notification>,
    /// Whether the keymap legend is expanded (toggled by '?')
    pub show_keymap: bool,
    pub variables: Option<VariablesView>,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            version: 0,
            cases: Vec::new(),
            selected: 0,
            mode: Mode::List,
            site: None,
            loading: false,
            input_buffer: String::new(),
            notification: None,
            show_keymap: false,
            variables: None,
        }
    }
}
