//! End-to-end polling scenarios.
//!
//! A fake service, a memory store and the poll supervisor run together on
//! paused tokio time, the way the logic loop drives them.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_test::{assert_err, assert_ok};

use casewatch::actions;
use casewatch::actors::PollSupervisor;
use casewatch::case::{CaseId, CaseUpdate, NewCase};
use casewatch::config::Config;
use casewatch::store::{CaseStore, SharedStore, StoreEvent};
use casewatch::tea::{update, Command, Message, Model};
use casewatch::Error;

use crate::fixtures::{case, FakeService, Harness, SITE};

/// Test: Case 42 scenario
/// Given a BUILDING case whose run task is STARTED
/// When the service reports it BUILT on the third poll
/// Then exactly one reconciliation is dispatched and polling stops
#[tokio::test(start_paused = true)]
async fn test_case_42_reconciles_once_then_stops() {
    let building = case(42, "BUILDING", Some("SUCCESS"), Some("STARTED"));
    let built = case(42, "BUILT", Some("SUCCESS"), Some("SUCCESS"));
    let mut h = Harness::new(vec![building.clone()]);
    h.service
        .script(CaseId(42), Some(building.clone()))
        .script(CaseId(42), Some(building))
        .script(CaseId(42), Some(built.clone()));

    assert!(h.supervisor.is_polling(CaseId(42)));

    sleep(Duration::from_millis(20_100)).await;
    assert_eq!(h.service.get_calls(), 2);
    assert!(h.drain().is_empty(), "unchanged snapshots dispatch nothing");

    sleep(Duration::from_secs(10)).await;
    assert_eq!(h.service.get_calls(), 3);
    assert_eq!(
        h.drain(),
        vec![StoreEvent::UpdateSelectedSiteCase {
            case: built.clone()
        }]
    );
    assert_eq!(h.store.case(CaseId(42)), Some(built));

    h.sync();
    assert!(!h.supervisor.is_polling(CaseId(42)));

    sleep(Duration::from_secs(60)).await;
    assert_eq!(h.service.get_calls(), 3, "settled case is never fetched again");
}

/// Test: Active site cleared
/// Given a polling case
/// When the active site goes away
/// Then polling stops, and resumes once a site is selected again
#[tokio::test(start_paused = true)]
async fn test_site_loss_stops_and_reselect_resumes() {
    let building = case(42, "BUILDING", Some("SUCCESS"), Some("STARTED"));
    let mut h = Harness::new(vec![building]);

    sleep(Duration::from_millis(10_100)).await;
    assert_eq!(h.service.get_calls(), 1);

    h.store.set_active_site(None);
    h.sync();
    assert!(h.supervisor.polling().is_empty());

    sleep(Duration::from_secs(60)).await;
    assert_eq!(h.service.get_calls(), 1);

    h.store.set_active_site(Some(SITE.to_string()));
    h.sync();
    assert_eq!(h.supervisor.polling(), vec![CaseId(42)]);

    sleep(Duration::from_millis(10_100)).await;
    assert_eq!(h.service.get_calls(), 2);
}

/// Test: Site cleared without anyone re-evaluating
/// Then the timer notices on its next tick and fetches nothing
#[tokio::test(start_paused = true)]
async fn test_site_loss_is_noticed_by_timer() {
    let building = case(42, "BUILDING", Some("SUCCESS"), Some("STARTED"));
    let h = Harness::new(vec![building]);

    h.store.set_active_site(None);
    sleep(Duration::from_secs(45)).await;

    assert_eq!(h.service.get_calls(), 0);
    assert!(!h.supervisor.is_polling(CaseId(42)));
}

/// Test: Failed poll
/// Given the service fails one request
/// Then nothing is dispatched and the next tick still reconciles
#[tokio::test(start_paused = true)]
async fn test_poll_failure_keeps_polling() {
    let building = case(42, "BUILDING", Some("SUCCESS"), Some("STARTED"));
    let built = case(42, "BUILT", Some("SUCCESS"), Some("FAILURE"));
    let mut h = Harness::new(vec![building]);
    h.service
        .script(CaseId(42), None)
        .script(CaseId(42), Some(built.clone()));

    sleep(Duration::from_millis(10_100)).await;
    assert!(h.drain().is_empty());
    assert!(h.supervisor.is_polling(CaseId(42)));

    sleep(Duration::from_secs(10)).await;
    assert_eq!(
        h.drain(),
        vec![StoreEvent::UpdateSelectedSiteCase { case: built }]
    );
}

/// Test: Run trigger
/// Given a settled CONFIGURED case
/// When a run is triggered
/// Then the returned snapshot is stored and polling resumes until it settles
#[tokio::test(start_paused = true)]
async fn test_run_resumes_polling() {
    let configured = case(7, "CONFIGURED", Some("SUCCESS"), None);
    let running = case(7, "BUILDING", Some("SUCCESS"), Some("PENDING"));
    let built = case(7, "BUILT", Some("SUCCESS"), Some("SUCCESS"));
    let mut h = Harness::new(vec![configured]);
    h.service
        .on_run(running.clone())
        .script(CaseId(7), Some(built.clone()));

    assert!(h.supervisor.polling().is_empty());

    let returned = assert_ok!(
        actions::run_case(h.service.as_ref(), h.store.as_ref(), CaseId(7)).await
    );
    assert_eq!(returned, running);
    assert_eq!(
        h.drain(),
        vec![StoreEvent::UpdateSelectedSiteCase { case: running }]
    );

    h.sync();
    assert_eq!(h.supervisor.polling(), vec![CaseId(7)]);

    sleep(Duration::from_millis(10_100)).await;
    assert_eq!(
        h.drain(),
        vec![StoreEvent::UpdateSelectedSiteCase { case: built }]
    );
    h.sync();
    assert!(h.supervisor.polling().is_empty());
}

/// Test: Rejected run
/// Then the error is returned and the store is left alone
#[tokio::test]
async fn test_failed_run_changes_nothing() {
    let configured = case(7, "CONFIGURED", Some("SUCCESS"), None);
    let mut h = Harness::new(vec![configured.clone()]);

    let err = assert_err!(
        actions::run_case(h.service.as_ref(), h.store.as_ref(), CaseId(7)).await
    );
    assert!(matches!(err, Error::Api { .. }));
    assert!(h.drain().is_empty());
    assert_eq!(h.store.case(CaseId(7)), Some(configured));
}

/// Test: Delete
/// Given two polling cases
/// When one is deleted
/// Then it leaves the store and its poller stops
#[tokio::test(start_paused = true)]
async fn test_delete_removes_case_and_poller() {
    let mut h = Harness::new(vec![
        case(42, "BUILDING", Some("SUCCESS"), Some("STARTED")),
        case(43, "BUILDING", Some("SUCCESS"), Some("PENDING")),
    ]);
    assert_eq!(h.supervisor.polling(), vec![CaseId(42), CaseId(43)]);

    assert_ok!(actions::delete_case(h.service.as_ref(), h.store.as_ref(), CaseId(42)).await);
    assert_eq!(
        h.drain(),
        vec![StoreEvent::RemoveSelectedSiteCase { id: CaseId(42) }]
    );
    assert!(!h.service.contains(CaseId(42)));

    h.sync();
    assert_eq!(h.supervisor.polling(), vec![CaseId(43)]);

    sleep(Duration::from_millis(10_100)).await;
    assert_eq!(h.service.get_calls(), 1, "only case 43 is fetched");
}

/// Test: Create
/// Then the new case is appended and polled until its create task ends
#[tokio::test(start_paused = true)]
async fn test_create_adds_polled_case() {
    let mut h = Harness::new(Vec::new());
    let request = NewCase {
        site: SITE.to_string(),
        name: "spinup".to_string(),
        variables: serde_json::Map::new(),
    };

    let created = assert_ok!(
        actions::create_case(h.service.as_ref(), h.store.as_ref(), &request).await
    );
    assert_eq!(created.id, CaseId(1));
    assert_eq!(h.store.cases().len(), 1);

    h.sync();
    assert_eq!(h.supervisor.polling(), vec![CaseId(1)]);

    let mut ready = created.clone();
    ready.create_task.status = Some(casewatch::TaskStatus::Success);
    h.service.script(CaseId(1), Some(ready.clone()));

    sleep(Duration::from_millis(10_100)).await;
    let events = h.drain();
    assert_eq!(
        events.last(),
        Some(&StoreEvent::UpdateSelectedSiteCase { case: ready })
    );
    h.sync();
    assert!(h.supervisor.polling().is_empty());
}

#[tokio::test]
async fn test_create_rejects_blank_name() {
    let mut h = Harness::new(Vec::new());
    let request = NewCase {
        site: SITE.to_string(),
        name: "   ".to_string(),
        variables: serde_json::Map::new(),
    };

    let err = assert_err!(actions::create_case(h.service.as_ref(), h.store.as_ref(), &request).await);
    assert!(matches!(err, Error::Validation(_)));
    assert!(h.drain().is_empty());
}

/// Test: Edit
/// Given a settled case
/// When it is renamed and given a new variable
/// Then the returned snapshot replaces the stored one and no poller starts
#[tokio::test(start_paused = true)]
async fn test_edit_replaces_stored_snapshot() {
    let configured = case(7, "CONFIGURED", Some("SUCCESS"), None);
    let mut h = Harness::new(vec![configured]);
    let mut variables = serde_json::Map::new();
    variables.insert("STOP_N".to_string(), serde_json::Value::from(10));
    let update = CaseUpdate {
        name: Some("ctrl".to_string()),
        variables: Some(variables.clone()),
    };

    let edited = assert_ok!(
        actions::update_case(h.service.as_ref(), h.store.as_ref(), CaseId(7), &update).await
    );
    assert_eq!(edited.name.as_deref(), Some("ctrl"));
    assert_eq!(edited.variables, variables);
    assert_eq!(
        h.drain(),
        vec![StoreEvent::UpdateSelectedSiteCase { case: edited.clone() }]
    );
    assert_eq!(h.store.case(CaseId(7)), Some(edited));

    h.sync();
    assert!(h.supervisor.polling().is_empty());
}

#[tokio::test]
async fn test_edit_rejects_blank_or_empty_update() {
    let mut h = Harness::new(vec![case(7, "CONFIGURED", Some("SUCCESS"), None)]);

    let blank = CaseUpdate {
        name: Some("  ".to_string()),
        ..Default::default()
    };
    let err = assert_err!(
        actions::update_case(h.service.as_ref(), h.store.as_ref(), CaseId(7), &blank).await
    );
    assert!(matches!(err, Error::Validation(_)));

    let err = assert_err!(
        actions::update_case(h.service.as_ref(), h.store.as_ref(), CaseId(7), &CaseUpdate::default())
            .await
    );
    assert!(matches!(err, Error::Validation(_)));
    assert!(h.drain().is_empty());
}

#[tokio::test]
async fn test_edit_of_missing_case_fails() {
    let mut h = Harness::new(Vec::new());
    let update = CaseUpdate {
        name: Some("ctrl".to_string()),
        ..Default::default()
    };
    let err = assert_err!(
        actions::update_case(h.service.as_ref(), h.store.as_ref(), CaseId(99), &update).await
    );
    assert!(matches!(err, Error::CaseNotFound(CaseId(99))));
    assert!(h.drain().is_empty());
}

/// Test: TUI pipeline
/// Given the shared store feeding the update function
/// When a poll reconciles
/// Then update applies it and asks for a poller resync, which stops polling
#[tokio::test(start_paused = true)]
async fn test_reconciliation_flows_through_update() {
    let building = case(42, "BUILDING", Some("SUCCESS"), Some("STARTED"));
    let built = case(42, "BUILT", Some("SUCCESS"), Some("SUCCESS"));
    let service = Arc::new(FakeService::new(vec![building.clone()]));
    service.script(CaseId(42), Some(built.clone()));

    let (msg_tx, mut msg_rx) = mpsc::unbounded_channel();
    let store = Arc::new(SharedStore::new(msg_tx));
    let mut supervisor = PollSupervisor::new(service.clone(), store.clone());
    let mut model = Model::new(Config {
        site: Some(SITE.to_string()),
        ..Default::default()
    });

    let cmds = update(
        &mut model,
        Message::CasesLoaded {
            site: SITE.to_string(),
            cases: vec![building],
        },
    );
    assert_eq!(cmds, vec![Command::SyncPollers]);
    store.publish(model.active_site.clone(), model.cases.clone());
    supervisor.sync(&model.cases);
    assert!(supervisor.is_polling(CaseId(42)));

    sleep(Duration::from_millis(10_100)).await;
    let msg = msg_rx.try_recv().unwrap();
    assert!(matches!(msg, Message::Store(StoreEvent::UpdateSelectedSiteCase { .. })));

    let cmds = update(&mut model, msg);
    assert_eq!(cmds, vec![Command::SyncPollers]);
    assert_eq!(model.cases, vec![built]);

    store.publish(model.active_site.clone(), model.cases.clone());
    supervisor.sync(&model.cases);
    assert!(!supervisor.is_polling(CaseId(42)));
}
