//! Background pollers.
//!
//! Each polling case owns an independent tokio task that re-fetches the case
//! on a fixed interval and reports changes to the store. The logic loop
//! never waits on them.

pub mod poller;
pub mod supervisor;

use tokio_util::sync::CancellationToken;

pub use poller::{PollOutcome, PollerState, StatusPoller, POLL_INTERVAL};
pub use supervisor::PollSupervisor;

/// Handle to a running poll task.
///
/// The task stops when the handle is shut down or dropped, so a poller can
/// never outlive its owner.
#[derive(Debug)]
pub struct ActorHandle {
    cancel: CancellationToken,
}

impl ActorHandle {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// Signal the task to shut down.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Cancelled either by the owner or by the task itself.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for ActorHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
