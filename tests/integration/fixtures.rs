//! Test fixtures for integration tests.
//!
//! Provides an in-memory case service with scripted `get_case` responses,
//! case builders, and a helper that stands in for the logic loop.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use casewatch::actors::PollSupervisor;
use casewatch::case::{Case, CaseId, CaseStatus, CaseUpdate, NewCase, Task, TaskStatus};
use casewatch::client::{CaseArchive, CaseService};
use casewatch::store::{MemoryStore, StoreEvent};
use casewatch::{Error, Result};

pub const SITE: &str = "niwot";

/// Build a case from wire-level status strings.
pub fn case(id: u64, status: &str, create: Option<&str>, run: Option<&str>) -> Case {
    let mut case = Case::new(CaseId(id), CaseStatus::from(status.to_string()));
    case.name = Some(format!("case-{}", id));
    case.create_task = create
        .map(|s| Task::with_status(TaskStatus::from(s.to_string())))
        .unwrap_or_default();
    case.run_task = run
        .map(|s| Task::with_status(TaskStatus::from(s.to_string())))
        .unwrap_or_default();
    case
}

/// In-memory stand-in for the remote case service.
///
/// `get_case` first replays the scripted responses for that id (each one
/// becomes the stored copy), then keeps answering with the stored copy.
#[derive(Default)]
pub struct FakeService {
    cases: Mutex<BTreeMap<CaseId, Case>>,
    scripts: Mutex<HashMap<CaseId, VecDeque<Option<Case>>>>,
    run_responses: Mutex<HashMap<CaseId, Case>>,
    archive: Mutex<CaseArchive>,
    next_id: AtomicU64,
    get_calls: AtomicUsize,
}

impl FakeService {
    pub fn new(cases: Vec<Case>) -> Self {
        let next_id = cases.iter().map(|c| c.id.0).max().unwrap_or(0) + 1;
        Self {
            cases: Mutex::new(cases.into_iter().map(|c| (c.id, c)).collect()),
            next_id: AtomicU64::new(next_id),
            ..Default::default()
        }
    }

    /// Queue a `get_case` response. `None` fails that request.
    pub fn script(&self, id: CaseId, response: Option<Case>) -> &Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(id)
            .or_default()
            .push_back(response);
        self
    }

    pub fn on_run(&self, snapshot: Case) -> &Self {
        self.run_responses.lock().unwrap().insert(snapshot.id, snapshot);
        self
    }

    pub fn with_archive(&self, content_disposition: Option<&str>, bytes: &[u8]) -> &Self {
        *self.archive.lock().unwrap() = CaseArchive {
            content_disposition: content_disposition.map(str::to_string),
            bytes: bytes.to_vec(),
        };
        self
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn contains(&self, id: CaseId) -> bool {
        self.cases.lock().unwrap().contains_key(&id)
    }

    fn not_found(id: CaseId) -> Error {
        Error::CaseNotFound(id)
    }
}

#[async_trait]
impl CaseService for FakeService {
    async fn list_cases(&self, _site: &str) -> Result<Vec<Case>> {
        Ok(self.cases.lock().unwrap().values().cloned().collect())
    }

    async fn get_case(&self, id: CaseId) -> Result<Case> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&id)
            .and_then(VecDeque::pop_front);

        let mut cases = self.cases.lock().unwrap();
        match scripted {
            Some(Some(snapshot)) => {
                cases.insert(id, snapshot.clone());
                Ok(snapshot)
            }
            Some(None) => Err(Error::Api {
                status: reqwest::StatusCode::BAD_GATEWAY,
                body: "upstream unavailable".to_string(),
            }),
            None => cases.get(&id).cloned().ok_or_else(|| Self::not_found(id)),
        }
    }

    async fn create_case(&self, request: &NewCase) -> Result<Case> {
        let id = CaseId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut created = Case::new(id, CaseStatus::Configured);
        created.name = Some(request.name.clone());
        created.create_task = Task::with_status(TaskStatus::Pending);
        created.variables = request.variables.clone();
        self.cases.lock().unwrap().insert(id, created.clone());
        Ok(created)
    }

    async fn update_case(&self, id: CaseId, update: &CaseUpdate) -> Result<Case> {
        let mut cases = self.cases.lock().unwrap();
        let case = cases.get_mut(&id).ok_or_else(|| Self::not_found(id))?;
        if let Some(name) = &update.name {
            case.name = Some(name.clone());
        }
        if let Some(variables) = &update.variables {
            case.variables = variables.clone();
        }
        Ok(case.clone())
    }

    async fn run_case(&self, id: CaseId) -> Result<Case> {
        let snapshot = self
            .run_responses
            .lock()
            .unwrap()
            .remove(&id)
            .ok_or_else(|| Error::Api {
                status: reqwest::StatusCode::CONFLICT,
                body: "case cannot be run".to_string(),
            })?;
        self.cases.lock().unwrap().insert(id, snapshot.clone());
        Ok(snapshot)
    }

    async fn download_case(&self, id: CaseId) -> Result<CaseArchive> {
        if !self.contains(id) {
            return Err(Self::not_found(id));
        }
        Ok(self.archive.lock().unwrap().clone())
    }

    async fn delete_case(&self, id: CaseId) -> Result<()> {
        self.cases
            .lock()
            .unwrap()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| Self::not_found(id))
    }
}

/// Service, store and supervisor wired together the way the TUI does it.
pub struct Harness {
    pub service: Arc<FakeService>,
    pub store: Arc<MemoryStore>,
    pub events: mpsc::UnboundedReceiver<StoreEvent>,
    pub supervisor: PollSupervisor,
}

impl Harness {
    pub fn new(cases: Vec<Case>) -> Self {
        let service = Arc::new(FakeService::new(cases.clone()));
        let (store, events) = MemoryStore::new(Some(SITE.to_string()), cases);
        let store = Arc::new(store);
        let supervisor = PollSupervisor::new(service.clone(), store.clone());
        let mut harness = Self {
            service,
            store,
            events,
            supervisor,
        };
        harness.sync();
        harness
    }

    /// Re-evaluate every poller against the store, as the logic loop does
    /// after each store event.
    pub fn sync(&mut self) {
        self.supervisor.sync(&self.store.cases());
    }

    /// Take every event dispatched so far.
    pub fn drain(&mut self) -> Vec<StoreEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}
