//! Messages for the TEA (The Elm Architecture) pattern.
//!
//! Messages are inputs to the update function - they come from the keyboard,
//! from the status pollers (through the store), or from command completions.

use std::path::PathBuf;

use crossterm::event::KeyEvent;

use crate::case::{Case, CaseId};
use crate::store::StoreEvent;

/// Input messages to the update function.
#[derive(Debug)]
pub enum Message {
    // Keyboard/terminal events
    Key(KeyEvent),
    Resize(u16, u16),

    /// Dispatched through the shared store (pollers and actions).
    Store(StoreEvent),

    // Command completion callbacks
    CasesLoaded { site: String, cases: Vec<Case> },
    CasesLoadFailed { site: String, error: String },
    RunFailed(CaseId, String),
    CreateFailed(String, String),
    DeleteFailed(CaseId, String),
    EditFailed(CaseId, String),
    /// Sent after the in-flight mark of a download has been cleared.
    DownloadFinished(CaseId, Result<PathBuf, String>),
}
