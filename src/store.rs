//! Shared view store.
//!
//! The store owns the list of cases for the active site. Background code
//! (pollers, action triggers) never mutates cases directly: it reads through
//! [`CaseStore`] and proposes replacements with [`CaseStore::dispatch`].

use std::sync::{PoisonError, RwLock};

use tokio::sync::mpsc;

use crate::case::{Case, CaseId};
use crate::tea::Message;
use crate::cwlog_warn;

/// Events accepted by the store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// Replace the snapshot of a case of the selected site.
    UpdateSelectedSiteCase { case: Case },
    /// Append a newly created case to the selected site.
    AddSelectedSiteCase { case: Case },
    /// Drop a deleted case from the selected site.
    RemoveSelectedSiteCase { id: CaseId },
}

impl StoreEvent {
    pub fn case_id(&self) -> CaseId {
        match self {
            StoreEvent::UpdateSelectedSiteCase { case } | StoreEvent::AddSelectedSiteCase { case } => {
                case.id
            }
            StoreEvent::RemoveSelectedSiteCase { id } => *id,
        }
    }

    /// Apply the event to a case list.
    pub fn apply(self, cases: &mut Vec<Case>) {
        match self {
            StoreEvent::UpdateSelectedSiteCase { case } => {
                if let Some(slot) = cases.iter_mut().find(|c| c.id == case.id) {
                    *slot = case;
                }
            }
            StoreEvent::AddSelectedSiteCase { case } => {
                if !cases.iter().any(|c| c.id == case.id) {
                    cases.push(case);
                }
            }
            StoreEvent::RemoveSelectedSiteCase { id } => cases.retain(|c| c.id != id),
        }
    }
}

/// Read access plus an event sink, injected into everything that needs the store.
pub trait CaseStore: Send + Sync {
    /// The currently selected site, if any. Polling only happens while one is set.
    fn active_site(&self) -> Option<String>;

    /// Last known local snapshot of a case.
    fn case(&self, id: CaseId) -> Option<Case>;

    fn dispatch(&self, event: StoreEvent);
}

#[derive(Debug, Clone, Default)]
struct StoreView {
    active_site: Option<String>,
    cases: Vec<Case>,
}

/// Store backed by the TUI model.
///
/// Reads see the snapshot last published by the logic loop; dispatched
/// events are forwarded to the loop as messages and applied by `update`.
pub struct SharedStore {
    view: RwLock<StoreView>,
    msg_tx: mpsc::UnboundedSender<Message>,
}

impl SharedStore {
    pub fn new(msg_tx: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            view: RwLock::new(StoreView::default()),
            msg_tx,
        }
    }

    /// Publish the model's current site and cases for background readers.
    pub fn publish(&self, active_site: Option<String>, cases: Vec<Case>) {
        let mut view = self.view.write().unwrap_or_else(PoisonError::into_inner);
        view.active_site = active_site;
        view.cases = cases;
    }
}

impl CaseStore for SharedStore {
    fn active_site(&self) -> Option<String> {
        self.view
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .active_site
            .clone()
    }

    fn case(&self, id: CaseId) -> Option<Case> {
        self.view
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .cases
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    fn dispatch(&self, event: StoreEvent) {
        if self.msg_tx.send(Message::Store(event)).is_err() {
            cwlog_warn!("SharedStore: message channel closed, event dropped");
        }
    }
}

/// Self-contained store that applies events immediately.
///
/// Used by the headless commands; every applied event is also echoed on a
/// channel so callers can observe reconciliations.
pub struct MemoryStore {
    view: RwLock<StoreView>,
    events_tx: mpsc::UnboundedSender<StoreEvent>,
}

impl MemoryStore {
    pub fn new(
        active_site: Option<String>,
        cases: Vec<Case>,
    ) -> (Self, mpsc::UnboundedReceiver<StoreEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let store = Self {
            view: RwLock::new(StoreView { active_site, cases }),
            events_tx,
        };
        (store, events_rx)
    }

    pub fn set_active_site(&self, site: Option<String>) {
        self.view
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .active_site = site;
    }

    pub fn cases(&self) -> Vec<Case> {
        self.view
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .cases
            .clone()
    }
}

impl CaseStore for MemoryStore {
    fn active_site(&self) -> Option<String> {
        self.view
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .active_site
            .clone()
    }

    fn case(&self, id: CaseId) -> Option<Case> {
        self.view
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .cases
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    fn dispatch(&self, event: StoreEvent) {
        {
            let mut view = self.view.write().unwrap_or_else(PoisonError::into_inner);
            event.clone().apply(&mut view.cases);
        }
        let _ = self.events_tx.send(event);
    }
}
