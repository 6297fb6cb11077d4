//! Model for the TEA (The Elm Architecture) pattern.
//!
//! The Model is pure application state - no channels, no handles, no runtime
//! infrastructure. Download marks are the one shared piece: background
//! downloads clear them through a drop guard.

use crate::actions::DownloadFlags;
use crate::case::{Case, CaseId};
use crate::config::Config;
use crate::render::{next_version, CaseView, RenderState, VariablesView};
use crate::variables::variable_rows;

/// Level of a notification message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    /// Error notification - displayed in red with "Error:" prefix
    Error,
    /// Informational notification - displayed in green
    Info,
}

/// A notification message to display to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

/// Application UI mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    List,
    /// Variables dialog open for a case.
    Variables(CaseId),
    Input(InputKind),
}

/// Types of input prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Site,
    CaseName,
    Rename,
    Confirm,
}

impl InputKind {
    pub fn label(&self) -> &'static str {
        match self {
            InputKind::Site => "Site",
            InputKind::CaseName => "New case",
            InputKind::Rename => "Rename",
            InputKind::Confirm => "Delete?",
        }
    }
}

/// Pure application state - the single source of truth.
pub struct Model {
    // Core state
    pub cases: Vec<Case>,
    pub selected: usize,
    pub mode: Mode,
    pub active_site: Option<String>,
    pub loading: bool,

    // Input state
    pub input_buffer: String,
    pub notification: Option<Notification>,
    pub pending_delete: Option<CaseId>,
    pub pending_edit: Option<CaseId>,

    /// Whether the keymap legend is expanded (toggled by '?')
    pub show_keymap: bool,

    pub downloads: DownloadFlags,

    // Dirty flag - set when state changes and render is needed
    pub dirty: bool,

    // Config (immutable after init)
    pub config: Config,
}

impl Model {
    pub fn new(config: Config) -> Self {
        Self {
            cases: Vec::new(),
            selected: 0,
            mode: Mode::default(),
            active_site: config.site.clone(),
            loading: false,
            input_buffer: String::new(),
            notification: None,
            pending_delete: None,
            pending_edit: None,
            show_keymap: false,
            downloads: DownloadFlags::new(),
            dirty: true,
            config,
        }
    }

    pub fn selected_case(&self) -> Option<&Case> {
        self.cases.get(self.selected)
    }

    pub fn case(&self, id: CaseId) -> Option<&Case> {
        self.cases.iter().find(|c| c.id == id)
    }

    /// Keep the selection inside the list after it shrinks.
    pub fn clamp_selection(&mut self) {
        if self.selected >= self.cases.len() {
            self.selected = self.cases.len().saturating_sub(1);
        }
    }

    /// Create an immutable snapshot for the render thread.
    pub fn snapshot(&self) -> RenderState {
        let site_active = self.active_site.is_some();
        let cases = self
            .cases
            .iter()
            .map(|c| CaseView::from_case(c, self.downloads.is_downloading(c.id), site_active))
            .collect();

        let variables = match self.mode {
            Mode::Variables(id) => self.case(id).map(|c| VariablesView {
                case_id: c.id,
                name: c.display_name().to_string(),
                rows: variable_rows(&self.config.variables, &c.variables),
            }),
            _ => None,
        };

        RenderState {
            version: next_version(),
            cases,
            selected: self.selected,
            mode: self.mode,
            site: self.active_site.clone(),
            loading: self.loading,
            input_buffer: self.input_buffer.clone(),
            notification: self.notification.clone(),
            show_keymap: self.show_keymap,
            variables,
        }
    }
}
