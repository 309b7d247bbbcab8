//! Long-running operation polling.

mod support;

use std::sync::Arc;
use std::time::Duration;

use fabdeploy_core::operation::{OperationPoller, OperationStatus, PollConfig, PollOutcome};
use serde_json::json;
use support::{RecordingSleeper, ScriptedTransport, client};

fn poller(
    transport: &Arc<ScriptedTransport>,
    max_attempts: u32,
) -> (OperationPoller, Arc<RecordingSleeper>) {
    let sleeper = RecordingSleeper::new();
    let poller = OperationPoller::new(client(transport.clone(), sleeper.clone())).with_config(
        PollConfig {
            max_attempts,
            default_interval: Duration::from_secs(5),
        },
    );
    (poller, sleeper)
}

#[test]
fn polls_until_succeeded() {
    let transport = ScriptedTransport::new();
    transport
        .ok(json!({ "status": "Running" }))
        .ok(json!({ "status": "Running" }))
        .ok(json!({ "status": "Succeeded" }));
    let (poller, sleeper) = poller(&transport, 60);

    let outcome = poller.poll("op-1", Some(Duration::from_secs(2))).unwrap();

    assert!(outcome.is_success());
    assert_eq!(outcome.polls(), 3);
    assert_eq!(transport.request_count(), 3);
    assert!(transport.paths().iter().all(|p| p == "operations/op-1"));
    assert_eq!(sleeper.slept(), vec![Duration::from_secs(2); 2]);
}

#[test]
fn budget_exhaustion_is_a_timeout_not_a_failure() {
    let transport = ScriptedTransport::new();
    for _ in 0..4 {
        transport.ok(json!({ "status": "Running" }));
    }
    let (poller, sleeper) = poller(&transport, 4);

    let outcome = poller.poll("op-2", None).unwrap();

    assert!(outcome.is_timeout());
    assert!(!outcome.is_success());
    assert_eq!(outcome.status(), OperationStatus::Running);
    assert_eq!(outcome.polls(), 4);
    assert_eq!(transport.request_count(), 4);
    // no wait after the last attempt
    assert_eq!(sleeper.slept().len(), 3);
}

#[test]
fn failed_status_is_terminal_and_not_retried() {
    let transport = ScriptedTransport::new();
    transport
        .ok(json!({ "status": "NotStarted" }))
        .ok(json!({ "status": "Failed", "error": { "message": "stage is locked" } }))
        .ok(json!({ "status": "Succeeded" }));
    let (poller, _) = poller(&transport, 10);

    let outcome = poller.poll("op-3", None).unwrap();

    assert_eq!(transport.request_count(), 2);
    match outcome {
        PollOutcome::Completed { operation, polls } => {
            assert_eq!(polls, 2);
            assert_eq!(operation.status, OperationStatus::Failed);
            assert_eq!(operation.error_message().as_deref(), Some("stage is locked"));
        }
        other => panic!("expected completion, got {other:?}"),
    }
}

#[test]
fn default_interval_is_used_without_hint() {
    let transport = ScriptedTransport::new();
    transport
        .ok(json!({ "status": "Running" }))
        .ok(json!({ "status": "Cancelled" }));
    let (poller, sleeper) = poller(&transport, 10);

    let outcome = poller.poll("op-4", None).unwrap();

    assert_eq!(outcome.status(), OperationStatus::Cancelled);
    assert_eq!(sleeper.slept(), vec![Duration::from_secs(5)]);
}

#[test]
fn immediate_success_does_not_wait() {
    let transport = ScriptedTransport::new();
    transport.ok(json!({ "status": "Succeeded" }));
    let (poller, sleeper) = poller(&transport, 10);

    let outcome = poller.poll("op-7", Some(Duration::from_secs(3))).unwrap();

    assert!(outcome.is_success());
    assert_eq!(outcome.polls(), 1);
    assert!(sleeper.slept().is_empty());
}

#[test]
fn unrecognised_status_keeps_polling() {
    let transport = ScriptedTransport::new();
    transport
        .ok(json!({ "status": "Paused" }))
        .ok(json!({}))
        .ok(json!({ "status": "Succeeded" }));
    let (poller, _) = poller(&transport, 10);

    assert!(poller.poll("op-5", None).unwrap().is_success());
    assert_eq!(transport.request_count(), 3);
}

#[test]
fn transport_errors_surviving_retries_propagate() {
    let transport = ScriptedTransport::new();
    transport.status(404);
    let (poller, _) = poller(&transport, 10);

    let err = poller.poll("op-6", None).unwrap_err();
    assert!(err.is_status(404));
}
