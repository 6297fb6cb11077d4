//! One status poller per listed case.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::case::{Case, CaseId};
use crate::client::CaseService;
use crate::cwlog_debug;
use crate::store::CaseStore;

use super::poller::{PollerState, StatusPoller, POLL_INTERVAL};

/// Owns the pollers for the cases of the selected site.
///
/// Call [`PollSupervisor::sync`] after every change to the case list or the
/// active site. Pollers of cases that disappear are dropped, which stops them.
pub struct PollSupervisor {
    service: Arc<dyn CaseService>,
    store: Arc<dyn CaseStore>,
    interval: Duration,
    pollers: HashMap<CaseId, StatusPoller>,
}

impl PollSupervisor {
    pub fn new(service: Arc<dyn CaseService>, store: Arc<dyn CaseStore>) -> Self {
        Self {
            service,
            store,
            interval: POLL_INTERVAL,
            pollers: HashMap::new(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn sync(&mut self, cases: &[Case]) {
        let before = self.polling().len();

        self.pollers
            .retain(|id, _| cases.iter().any(|case| case.id == *id));

        for case in cases {
            let poller = self.pollers.entry(case.id).or_insert_with(|| {
                StatusPoller::new(case.clone(), self.service.clone(), self.store.clone())
                    .with_interval(self.interval)
            });
            poller.evaluate(case);
        }

        let after = self.polling().len();
        if before != after {
            cwlog_debug!("PollSupervisor: {} -> {} cases polling", before, after);
        }
    }

    pub fn is_polling(&self, id: CaseId) -> bool {
        self.pollers
            .get(&id)
            .is_some_and(|p| p.state() == PollerState::Polling)
    }

    /// Ids of the cases currently polling, ascending.
    pub fn polling(&self) -> Vec<CaseId> {
        let mut ids: Vec<CaseId> = self
            .pollers
            .values()
            .filter(|p| p.state() == PollerState::Polling)
            .map(StatusPoller::case_id)
            .collect();
        ids.sort();
        ids
    }

    pub fn shutdown(&mut self) {
        cwlog_debug!("PollSupervisor: shutting down {} pollers", self.pollers.len());
        for poller in self.pollers.values_mut() {
            poller.stop();
        }
        self.pollers.clear();
    }
}

impl Drop for PollSupervisor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
