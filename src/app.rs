use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;
use crossterm::event::{self, Event, KeyCode};
use tokio::runtime::Runtime;
use tokio::sync::mpsc;

use crate::actions;
use crate::actors::PollSupervisor;
use crate::case::{CaseUpdate, NewCase};
use crate::client::{CaseService, HttpCaseService};
use crate::config::Config;
use crate::render::RenderState;
use crate::store::SharedStore;
use crate::tea::{update, Command, Message, Model};
use crate::{cwlog, cwlog_debug, cwlog_warn, Result};

const MAX_BG_MESSAGES: usize = 50;

/// Long-lived pieces the command executor needs besides the model.
struct Services {
    service: Arc<dyn CaseService>,
    store: Arc<SharedStore>,
    supervisor: PollSupervisor,
    msg_tx: mpsc::UnboundedSender<Message>,
}

pub struct LogicThread;

impl LogicThread {
    pub fn run(config: Config, state_tx: Sender<RenderState>, shutdown: Arc<AtomicBool>) -> Result<()> {
        Runtime::new()?.block_on(Self::run_async(config, state_tx, shutdown))
    }

    async fn run_async(
        config: Config,
        state_tx: Sender<RenderState>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<()> {
        cwlog_debug!(
            "LogicThread::run_async api_url={} site={:?}",
            config.api_url(),
            config.site
        );
        let service: Arc<dyn CaseService> = Arc::new(HttpCaseService::from_config(&config)?);
        let (msg_tx, mut msg_rx) = mpsc::unbounded_channel::<Message>();
        let store = Arc::new(SharedStore::new(msg_tx.clone()));
        let supervisor = PollSupervisor::new(service.clone(), store.clone())
            .with_interval(config.poll_interval());

        let mut model = Model::new(config);
        let mut services = Services {
            service,
            store,
            supervisor,
            msg_tx,
        };

        if let Some(site) = model.active_site.clone() {
            model.loading = true;
            execute_command(&mut model, Command::LoadCases { site }, &mut services);
        }

        send_state(&state_tx, &model);
        let mut esc_filter = EscapeSequenceFilter::new();

        loop {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }

            // Keyboard input (priority)
            while event::poll(Duration::ZERO)? {
                let msg = match event::read()? {
                    Event::Key(key) => {
                        if esc_filter.filter(key.code) {
                            continue;
                        }
                        Message::Key(key)
                    }
                    Event::Resize(w, h) => Message::Resize(w, h),
                    _ => continue,
                };

                if dispatch(&mut model, msg, &mut services) {
                    shutdown.store(true, Ordering::Relaxed);
                    services.supervisor.shutdown();
                    return Ok(());
                }

                if model.dirty {
                    send_state(&state_tx, &model);
                    model.dirty = false;
                }
            }

            // Background messages (bounded)
            for _ in 0..MAX_BG_MESSAGES {
                let Ok(msg) = msg_rx.try_recv() else { break };
                if dispatch(&mut model, msg, &mut services) {
                    shutdown.store(true, Ordering::Relaxed);
                    services.supervisor.shutdown();
                    return Ok(());
                }
            }

            if model.dirty {
                send_state(&state_tx, &model);
                model.dirty = false;
            }

            tokio::time::sleep(Duration::from_micros(500)).await;
        }

        services.supervisor.shutdown();
        Ok(())
    }
}

/// Run one message through `update` and execute its commands.
/// Returns true when the app should quit.
fn dispatch(model: &mut Model, msg: Message, services: &mut Services) -> bool {
    for cmd in update(model, msg) {
        if execute_command(model, cmd, services) {
            return true;
        }
    }
    false
}

fn execute_command(model: &mut Model, cmd: Command, services: &mut Services) -> bool {
    match cmd {
        Command::LoadCases { site } => {
            cwlog_debug!("Command::LoadCases site={}", site);
            let service = services.service.clone();
            let tx = services.msg_tx.clone();
            tokio::spawn(async move {
                match service.list_cases(&site).await {
                    Ok(cases) => {
                        let _ = tx.send(Message::CasesLoaded { site, cases });
                    }
                    Err(e) => {
                        cwlog_warn!("Loading cases for site {} failed: {}", site, e);
                        let _ = tx.send(Message::CasesLoadFailed {
                            site,
                            error: e.to_string(),
                        });
                    }
                }
            });
        }

        Command::RunCase { id } => {
            cwlog_debug!("Command::RunCase id={}", id);
            let service = services.service.clone();
            let store = services.store.clone();
            let tx = services.msg_tx.clone();
            tokio::spawn(async move {
                if let Err(e) = actions::run_case(service.as_ref(), store.as_ref(), id).await {
                    let _ = tx.send(Message::RunFailed(id, e.to_string()));
                }
            });
        }

        Command::DownloadCase { id } => {
            cwlog_debug!("Command::DownloadCase id={}", id);
            let dir = match model.config.download_dir() {
                Ok(dir) => dir,
                Err(e) => {
                    let _ = services.msg_tx.send(Message::DownloadFinished(id, Err(e.to_string())));
                    return false;
                }
            };
            let guard = model.downloads.begin(id);
            let service = services.service.clone();
            let tx = services.msg_tx.clone();
            tokio::spawn(async move {
                let result = actions::download_case(service.as_ref(), id, &dir).await;
                drop(guard);
                let _ = tx.send(Message::DownloadFinished(id, result.map_err(|e| e.to_string())));
            });
            // Show the busy marker right away
            model.dirty = true;
        }

        Command::CreateCase { site, name } => {
            cwlog_debug!("Command::CreateCase site={} name={}", site, name);
            let service = services.service.clone();
            let store = services.store.clone();
            let tx = services.msg_tx.clone();
            tokio::spawn(async move {
                let request = NewCase {
                    site,
                    name,
                    variables: serde_json::Map::new(),
                };
                if let Err(e) = actions::create_case(service.as_ref(), store.as_ref(), &request).await {
                    let _ = tx.send(Message::CreateFailed(request.name, e.to_string()));
                }
            });
        }

        Command::RenameCase { id, name } => {
            cwlog_debug!("Command::RenameCase id={} name={}", id, name);
            let service = services.service.clone();
            let store = services.store.clone();
            let tx = services.msg_tx.clone();
            tokio::spawn(async move {
                let update = CaseUpdate {
                    name: Some(name),
                    variables: None,
                };
                if let Err(e) = actions::update_case(service.as_ref(), store.as_ref(), id, &update).await {
                    let _ = tx.send(Message::EditFailed(id, e.to_string()));
                }
            });
        }

        Command::DeleteCase { id } => {
            cwlog_debug!("Command::DeleteCase id={}", id);
            let service = services.service.clone();
            let store = services.store.clone();
            let tx = services.msg_tx.clone();
            tokio::spawn(async move {
                if let Err(e) = actions::delete_case(service.as_ref(), store.as_ref(), id).await {
                    let _ = tx.send(Message::DeleteFailed(id, e.to_string()));
                }
            });
        }

        Command::SyncPollers => {
            services.store
                .publish(model.active_site.clone(), model.cases.clone());
            services.supervisor.sync(&model.cases);
        }

        Command::Quit => {
            cwlog!("Command::Quit");
            return true;
        }
    }

    false
}

fn send_state(state_tx: &Sender<RenderState>, model: &Model) {
    let _ = state_tx.try_send(model.snapshot());
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterState {
    Idle,
    /// Just saw Esc; a following `[` or `O` opens a sequence.
    Introducer,
    InSequence,
}

/// Drops the tails of escape sequences that reach the loop as plain
/// characters (`[A`, `OB`, `[15~`) after a split Esc. Characters typed into
/// a site or case name, `[` and `O` included, pass through untouched.
struct EscapeSequenceFilter {
    state: FilterState,
    len: u8,
}

impl EscapeSequenceFilter {
    const MAX_SEQUENCE_LEN: u8 = 10;

    fn new() -> Self {
        Self {
            state: FilterState::Idle,
            len: 0,
        }
    }

    /// Returns true when the key belongs to an escape sequence and must be dropped.
    fn filter(&mut self, code: KeyCode) -> bool {
        match (self.state, code) {
            (_, KeyCode::Char('\x1b')) => {
                self.state = FilterState::Introducer;
                true
            }
            // A real Esc key still reaches update (it closes dialogs)
            (_, KeyCode::Esc) => {
                self.state = FilterState::Introducer;
                false
            }
            (FilterState::Introducer, KeyCode::Char('[' | 'O')) => {
                self.state = FilterState::InSequence;
                self.len = 1;
                true
            }
            (FilterState::InSequence, KeyCode::Char(c)) => {
                self.len += 1;
                if c.is_ascii_alphabetic() || c == '~' || self.len > Self::MAX_SEQUENCE_LEN {
                    self.state = FilterState::Idle;
                }
                true
            }
            _ => {
                self.state = FilterState::Idle;
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn feed(filter: &mut EscapeSequenceFilter, keys: &[KeyCode]) -> Vec<bool> {
        keys.iter().map(|k| filter.filter(*k)).collect()
    }

    fn chars(text: &str) -> Vec<KeyCode> {
        text.chars().map(KeyCode::Char).collect()
    }

    #[test]
    fn test_escape_filter_passes_list_keys() {
        let mut filter = EscapeSequenceFilter::new();
        let dropped = feed(&mut filter, &chars("jkrDdvnsgq?e"));
        assert!(dropped.iter().all(|d| !d));
    }

    #[test]
    fn test_escape_filter_keeps_typed_names() {
        let mut filter = EscapeSequenceFilter::new();
        let dropped = feed(&mut filter, &chars("Ocean [O2] lab#2"));
        assert!(dropped.iter().all(|d| !d), "typed text must survive: {:?}", dropped);
    }

    #[test]
    fn test_escape_filter_drops_split_arrow_sequence() {
        let mut filter = EscapeSequenceFilter::new();
        assert!(!filter.filter(KeyCode::Esc));
        assert!(filter.filter(KeyCode::Char('[')));
        assert!(filter.filter(KeyCode::Char('A')));
        assert!(!filter.filter(KeyCode::Char('r')));
    }

    #[test]
    fn test_escape_filter_drops_raw_ss3_and_tilde_sequences() {
        let mut filter = EscapeSequenceFilter::new();
        let mut keys = vec![KeyCode::Char('\x1b')];
        keys.extend(chars("OB"));
        keys.push(KeyCode::Char('\x1b'));
        keys.extend(chars("[15~"));
        assert!(feed(&mut filter, &keys).iter().all(|d| *d));
        assert!(!filter.filter(KeyCode::Char('D')));
    }

    #[test]
    fn test_escape_filter_bounds_runaway_sequence() {
        let mut filter = EscapeSequenceFilter::new();
        filter.filter(KeyCode::Esc);
        let dropped = feed(&mut filter, &chars("[1234567890"));
        assert!(dropped.iter().all(|d| *d));
        assert!(!filter.filter(KeyCode::Char('5')));
    }

    #[test]
    fn test_escape_filter_resets_on_other_keys() {
        let mut filter = EscapeSequenceFilter::new();
        filter.filter(KeyCode::Esc);
        assert!(!filter.filter(KeyCode::Enter));
        assert!(!filter.filter(KeyCode::Char('[')));
    }

    /// The state channel (bounded(1) with try_send) must never block the logic loop.
    #[test]
    fn test_state_channel_never_blocks() {
        let (tx, _rx) = crossbeam_channel::bounded::<RenderState>(1);
        let _ = tx.try_send(RenderState::default());

        let start = Instant::now();
        let result = tx.try_send(RenderState::default());
        let elapsed = start.elapsed();

        assert!(
            elapsed.as_millis() < 1,
            "try_send blocked for {:?}",
            elapsed
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_latest_wins_pattern() {
        let (tx, rx) = crossbeam_channel::bounded::<RenderState>(1);

        for i in 0..5 {
            let state = RenderState {
                selected: i,
                ..Default::default()
            };
            let _ = rx.try_recv();
            let _ = tx.try_send(state);
        }

        let received = rx.try_recv().unwrap();
        assert_eq!(received.selected, 4, "Should receive the latest state");
    }
}
