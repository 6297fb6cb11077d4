//! Status poller for a single case.
//!
//! While a case is unsettled and a site is active, a timer re-fetches the
//! case every [`POLL_INTERVAL`]. A fresh snapshot is dispatched to the store
//! only when one of the watched fields differs from the local copy.
//!
//! Fetches are fire-and-forget relative to the timer, so two may overlap.
//! Each fetch takes a sequence number when issued and is applied only if no
//! newer fetch was issued meanwhile; an older response can never roll the
//! case back.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::case::{Case, CaseId};
use crate::client::CaseService;
use crate::store::{CaseStore, StoreEvent};
use crate::{cwlog_debug, cwlog_error, cwlog_trace, cwlog_warn, Result};

use super::ActorHandle;

pub const POLL_INTERVAL: Duration = Duration::from_millis(10_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    /// No timer.
    Idle,
    /// Timer active.
    Polling,
}

/// Result of a single fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Watched fields changed; the fresh snapshot was dispatched.
    Reconciled(Case),
    /// Nothing changed, nothing dispatched.
    Unchanged,
    /// A newer fetch was issued while this one was in flight.
    Superseded,
    /// The poller was stopped or dropped while this fetch was in flight.
    Discarded,
}

struct PollContext {
    case_id: CaseId,
    service: Arc<dyn CaseService>,
    store: Arc<dyn CaseStore>,
    issued: AtomicU64,
    last: Mutex<Case>,
}

impl PollContext {
    /// Last known local snapshot: the store's copy, else the poller's own.
    fn current(&self) -> Case {
        self.store
            .case(self.case_id)
            .unwrap_or_else(|| self.last.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn should_poll(&self) -> bool {
        self.store.active_site().is_some() && self.current().is_unsettled()
    }

    async fn poll(&self, cancel: &CancellationToken) -> Result<PollOutcome> {
        let seq = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        cwlog_trace!("StatusPoller {}: fetch #{}", self.case_id, seq);

        let fresh = self.service.get_case(self.case_id).await?;

        if cancel.is_cancelled() {
            return Ok(PollOutcome::Discarded);
        }
        if self.issued.load(Ordering::SeqCst) != seq {
            cwlog_debug!(
                "StatusPoller {}: dropping fetch #{} (newer fetch issued)",
                self.case_id,
                seq
            );
            return Ok(PollOutcome::Superseded);
        }

        if self.current().watched() == fresh.watched() {
            return Ok(PollOutcome::Unchanged);
        }

        cwlog_debug!(
            "StatusPoller {}: status={} create={} run={}",
            self.case_id,
            fresh.status,
            fresh.create_task.label(),
            fresh.run_task.label()
        );
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = fresh.clone();
        self.store.dispatch(StoreEvent::UpdateSelectedSiteCase {
            case: fresh.clone(),
        });
        Ok(PollOutcome::Reconciled(fresh))
    }
}

/// Keeps one case in sync with the service while it has work in progress.
///
/// Dropping the poller stops its timer and discards any fetch still in
/// flight. Starting requires a tokio runtime.
pub struct StatusPoller {
    ctx: Arc<PollContext>,
    interval: Duration,
    disposed: CancellationToken,
    timer: Option<ActorHandle>,
}

impl StatusPoller {
    pub fn new(case: Case, service: Arc<dyn CaseService>, store: Arc<dyn CaseStore>) -> Self {
        Self {
            ctx: Arc::new(PollContext {
                case_id: case.id,
                service,
                store,
                issued: AtomicU64::new(0),
                last: Mutex::new(case),
            }),
            interval: POLL_INTERVAL,
            disposed: CancellationToken::new(),
            timer: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn case_id(&self) -> CaseId {
        self.ctx.case_id
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn state(&self) -> PollerState {
        match &self.timer {
            Some(handle) if !handle.is_cancelled() => PollerState::Polling,
            _ => PollerState::Idle,
        }
    }

    /// Re-evaluate the activation predicate against a new local snapshot.
    pub fn evaluate(&mut self, case: &Case) -> PollerState {
        *self.ctx.last.lock().unwrap_or_else(PoisonError::into_inner) = case.clone();

        if case.is_unsettled() && self.ctx.store.active_site().is_some() {
            self.launch()
        } else {
            self.stop();
            PollerState::Idle
        }
    }

    /// Start the timer if the case is unsettled and a site is active.
    pub fn start(&mut self) -> PollerState {
        if self.ctx.should_poll() {
            self.launch()
        } else {
            self.state()
        }
    }

    /// Cancel the timer. Safe to call at any time.
    pub fn stop(&mut self) {
        if let Some(handle) = self.timer.take() {
            if !handle.is_cancelled() {
                cwlog_debug!("StatusPoller {}: stopped", self.ctx.case_id);
            }
            handle.shutdown();
        }
    }

    /// Fetch the case once, outside the timer.
    pub async fn poll(&self) -> Result<PollOutcome> {
        self.ctx.poll(&self.disposed).await
    }

    fn launch(&mut self) -> PollerState {
        if self.state() == PollerState::Polling {
            return PollerState::Polling;
        }

        let cancel = self.disposed.child_token();
        spawn_timer(self.ctx.clone(), self.interval, cancel.clone());
        self.timer = Some(ActorHandle::new(cancel));
        cwlog_debug!(
            "StatusPoller {}: polling every {:?}",
            self.ctx.case_id,
            self.interval
        );
        PollerState::Polling
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        self.disposed.cancel();
    }
}

fn spawn_timer(ctx: Arc<PollContext>, interval: Duration, cancel: CancellationToken) {
    tokio::spawn(async move {
        // First fetch happens one full interval after start
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    cwlog_trace!("StatusPoller {}: timer cancelled", ctx.case_id);
                    break;
                }
                _ = ticker.tick() => {
                    if !ctx.should_poll() {
                        cwlog_debug!(
                            "StatusPoller {}: settled or no active site, stopping",
                            ctx.case_id
                        );
                        cancel.cancel();
                        break;
                    }

                    let ctx = ctx.clone();
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        match ctx.poll(&cancel).await {
                            Err(e) if e.is_transient() => {
                                cwlog_warn!("StatusPoller {}: poll failed: {}", ctx.case_id, e);
                            }
                            Err(e) => {
                                cwlog_error!("StatusPoller {}: poll failed: {}", ctx.case_id, e);
                            }
                            Ok(_) => {}
                        }
                    });
                }
            }
        }
    });
}
