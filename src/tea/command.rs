//! Commands for the TEA (The Elm Architecture) pattern.
//!
//! Commands are outputs from the update function - they represent side effects
//! to be executed by the runtime.

use crate::case::CaseId;

/// Output commands from the update function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    // Service calls (spawn async tasks)
    LoadCases { site: String },
    RunCase { id: CaseId },
    DownloadCase { id: CaseId },
    CreateCase { site: String, name: String },
    DeleteCase { id: CaseId },
    RenameCase { id: CaseId, name: String },

    // Publish the case list to the store and re-evaluate every poller
    SyncPollers,

    // App lifecycle
    Quit,
}
