//! Integration tests for the review exchange, driven through the in-memory
//! transport.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;

use modreview_core::{
    ExchangeConfig, ExchangeController, ExchangeError, ExchangeState, MemoryTokenStore,
    ReviewResult, ReviewSubmission, Session, ValidationError, WaitPhase,
};
use modreview_transport::fakes::MemoryConnector;
use modreview_transport::{Connector, TransportError};

const ENDPOINT: &str = "ws://moderation.test/ws/reviewer/";

fn reviewer_session() -> Session {
    Session::new(Arc::new(MemoryTokenStore::with_access_token("reviewer-token")))
}

fn spawn_with(connector: &Arc<MemoryConnector>, config: ExchangeConfig) -> ExchangeController {
    let connector: Arc<dyn Connector> = connector.clone();
    ExchangeController::spawn(config, reviewer_session(), connector)
}

fn spawn(connector: &Arc<MemoryConnector>) -> ExchangeController {
    spawn_with(connector, ExchangeConfig::new(ENDPOINT))
}

fn slurs_submission() -> ReviewSubmission {
    ReviewSubmission::new("42", "Highly Offensive", "contains slurs")
}

fn result_frame() -> serde_json::Value {
    json!({
        "action": "review_response",
        "text": "the reviewed post",
        "original_classification": "Highly Offensive",
        "corrected_classification": "Mildly Offensive",
        "updated_confidence": 0.8,
        "learning_summary": "...",
        "similar_examples": ["a", "b"],
    })
}

fn expected_result() -> ReviewResult {
    ReviewResult {
        text: "the reviewed post".into(),
        original_classification: "Highly Offensive".into(),
        corrected_classification: "Mildly Offensive".into(),
        updated_confidence: 0.8,
        learning_summary: "...".into(),
        similar_examples: vec!["a".into(), "b".into()],
    }
}

async fn next_state(states: &mut UnboundedReceiver<ExchangeState>) -> ExchangeState {
    tokio::time::timeout(Duration::from_secs(120), states.recv())
        .await
        .expect("no transition within timeout")
        .expect("exchange task stopped")
}

async fn expect_states(states: &mut UnboundedReceiver<ExchangeState>, names: &[&str]) {
    for name in names {
        let state = next_state(states).await;
        assert_eq!(state.name(), *name, "unexpected transition to {state}");
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}

// ── Validation gate ──

#[tokio::test]
async fn test_invalid_submission_never_touches_channel() {
    let connector = Arc::new(MemoryConnector::new());
    let controller = spawn(&connector);

    let blank = ReviewSubmission::new("42", "safe", "   \n\t");
    let err = controller.submit(blank).await.unwrap_err();
    assert_eq!(
        err,
        ExchangeError::Validation(ValidationError::EmptyJustification)
    );

    let unknown = ReviewSubmission::new("42", "Spicy", "looks fine");
    let err = controller.submit(unknown).await.unwrap_err();
    assert!(matches!(
        err,
        ExchangeError::Validation(ValidationError::UnknownClassification { .. })
    ));

    assert!(connector.attempts().is_empty());
    assert_eq!(connector.peak_channels(), 0);
    assert_eq!(controller.state(), ExchangeState::Idle);
}

#[tokio::test]
async fn test_invalid_submission_keeps_composing() {
    let connector = Arc::new(MemoryConnector::new());
    let controller = spawn(&connector);

    controller.compose().await.unwrap();
    let err = controller
        .submit(ReviewSubmission::new("42", "safe", ""))
        .await
        .unwrap_err();
    assert!(matches!(err, ExchangeError::Validation(_)));
    assert_eq!(controller.state(), ExchangeState::Composing);
    assert!(connector.attempts().is_empty());
}

// ── End-to-end ──

#[tokio::test]
async fn test_end_to_end_task_42() {
    let connector = Arc::new(MemoryConnector::new());
    let controller = spawn(&connector);
    let mut states = controller.subscribe().await.unwrap();

    controller.submit(slurs_submission()).await.unwrap();
    expect_states(
        &mut states,
        &["composing", "connecting", "awaiting_acknowledgement"],
    )
    .await;

    let attempts = connector.attempts();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].endpoint, ENDPOINT);
    assert_eq!(attempts[0].credential, "reviewer-token");

    let probe = connector.next_channel().await;
    assert_eq!(
        probe.sent(),
        vec![json!({
            "action": "submit_review",
            "task_id": "42",
            "classification": "Highly Offensive",
            "justification": "contains slurs",
            "confidence_score": 1.0,
        })]
    );

    probe.deliver_json(json!({"celery_worker_id": "w1"}));
    expect_states(&mut states, &["awaiting_result"]).await;

    probe.deliver_json(result_frame());
    let state = next_state(&mut states).await;
    assert_eq!(state, ExchangeState::Resolved(expected_result()));

    assert_eq!(probe.close_calls(), 1);
    assert!(probe.is_closed());
    assert_eq!(connector.live_channels(), 0);
    assert_eq!(
        controller.last_result().await.unwrap(),
        Some(expected_result())
    );
}

// ── Ordering ──

#[tokio::test]
async fn test_result_without_acknowledgement_resolves() {
    let connector = Arc::new(MemoryConnector::new());
    let controller = spawn(&connector);
    let mut states = controller.subscribe().await.unwrap();

    controller.submit(slurs_submission()).await.unwrap();
    expect_states(
        &mut states,
        &["composing", "connecting", "awaiting_acknowledgement"],
    )
    .await;

    let probe = connector.next_channel().await;
    probe.deliver_json(result_frame());
    expect_states(&mut states, &["resolved"]).await;
    assert_eq!(probe.close_calls(), 1);
}

#[tokio::test]
async fn test_late_acknowledgement_after_result_is_ignored() {
    let connector = Arc::new(MemoryConnector::new());
    let controller = spawn(&connector);
    let mut states = controller.subscribe().await.unwrap();

    controller.submit(slurs_submission()).await.unwrap();
    expect_states(
        &mut states,
        &["composing", "connecting", "awaiting_acknowledgement"],
    )
    .await;

    let probe = connector.next_channel().await;
    probe.deliver_json(result_frame());
    probe.deliver_json(json!({"celery_worker_id": "w1"}));
    expect_states(&mut states, &["resolved"]).await;

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(states.try_recv().is_err());
    assert!(matches!(controller.state(), ExchangeState::Resolved(_)));
}

#[tokio::test]
async fn test_on_state_change_does_not_replay_current_state() {
    let connector = Arc::new(MemoryConnector::new());
    let controller = spawn(&connector);
    controller.compose().await.unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    controller
        .on_state_change(move |state| sink.lock().unwrap().push(state.name()))
        .await
        .unwrap();

    controller.cancel().await.unwrap();
    assert_eq!(*seen.lock().unwrap(), vec!["idle"]);
}

// ── Protocol anomalies ──

#[tokio::test]
async fn test_unrecognized_frames_keep_waiting() {
    let connector = Arc::new(MemoryConnector::new());
    let controller = spawn_with(
        &connector,
        ExchangeConfig::new(ENDPOINT).with_protocol_warn_threshold(2),
    );
    let mut states = controller.subscribe().await.unwrap();

    controller.submit(slurs_submission()).await.unwrap();
    expect_states(
        &mut states,
        &["composing", "connecting", "awaiting_acknowledgement"],
    )
    .await;

    let probe = connector.next_channel().await;
    probe.deliver("not json at all");
    probe.deliver_json(json!(["an", "array"]));
    probe.deliver_json(json!({"type": "heartbeat"}));
    probe.deliver_json(json!({"action": "review_response", "updated_confidence": "high"}));
    probe.deliver_json(json!({"celery_worker_id": "w7"}));

    // Nothing in between: the garbage frames caused no transition.
    expect_states(&mut states, &["awaiting_result"]).await;
    assert!(!probe.is_closed());

    probe.deliver_json(result_frame());
    expect_states(&mut states, &["resolved"]).await;
}

// ── Channel failures ──

#[tokio::test]
async fn test_open_failure_fails_with_connection_error() {
    let connector = Arc::new(MemoryConnector::new());
    connector.fail_next(TransportError::Rejected { status: 403 });
    let controller = spawn(&connector);
    let mut states = controller.subscribe().await.unwrap();

    controller.submit(slurs_submission()).await.unwrap();
    expect_states(&mut states, &["composing", "connecting"]).await;
    match next_state(&mut states).await {
        ExchangeState::Failed(ExchangeError::Connection(reason)) => {
            assert!(reason.contains("403"), "reason: {reason}");
        }
        other => panic!("expected connection failure, got {other}"),
    }
    assert_eq!(connector.live_channels(), 0);
}

#[tokio::test]
async fn test_channel_error_while_awaiting_result() {
    let connector = Arc::new(MemoryConnector::new());
    let controller = spawn(&connector);
    let mut states = controller.subscribe().await.unwrap();

    controller.submit(slurs_submission()).await.unwrap();
    expect_states(
        &mut states,
        &["composing", "connecting", "awaiting_acknowledgement"],
    )
    .await;
    let probe = connector.next_channel().await;
    probe.deliver_json(json!({"celery_worker_id": "w1"}));
    expect_states(&mut states, &["awaiting_result"]).await;

    probe.fail("connection reset by peer");
    assert_eq!(
        next_state(&mut states).await,
        ExchangeState::Failed(ExchangeError::Connection(
            "connection reset by peer".into()
        ))
    );
    assert_eq!(probe.close_calls(), 1);
}

#[tokio::test]
async fn test_remote_close_while_awaiting_acknowledgement() {
    let connector = Arc::new(MemoryConnector::new());
    let controller = spawn(&connector);
    let mut states = controller.subscribe().await.unwrap();

    controller.submit(slurs_submission()).await.unwrap();
    expect_states(
        &mut states,
        &["composing", "connecting", "awaiting_acknowledgement"],
    )
    .await;
    let probe = connector.next_channel().await;
    probe.close_remote();

    let state = next_state(&mut states).await;
    assert!(
        matches!(state, ExchangeState::Failed(ExchangeError::Connection(_))),
        "got {state}"
    );
    assert_eq!(probe.close_calls(), 1);
    assert_eq!(connector.live_channels(), 0);
}

#[tokio::test]
async fn test_missing_access_token_fails_without_opening() {
    let connector = Arc::new(MemoryConnector::new());
    let connector_dyn: Arc<dyn Connector> = connector.clone();
    let controller = ExchangeController::spawn(
        ExchangeConfig::new(ENDPOINT),
        Session::in_memory(),
        connector_dyn,
    );
    let mut states = controller.subscribe().await.unwrap();

    controller.submit(slurs_submission()).await.unwrap();
    expect_states(&mut states, &["composing", "connecting"]).await;
    let state = next_state(&mut states).await;
    assert!(
        matches!(state, ExchangeState::Failed(ExchangeError::Connection(_))),
        "got {state}"
    );
    assert!(connector.attempts().is_empty());
}

// ── Timeouts ──

#[tokio::test(start_paused = true)]
async fn test_acknowledgement_timeout() {
    let connector = Arc::new(MemoryConnector::new());
    let controller = spawn_with(
        &connector,
        ExchangeConfig::new(ENDPOINT).with_response_timeout(Some(Duration::from_secs(30))),
    );
    let mut states = controller.subscribe().await.unwrap();

    controller.submit(slurs_submission()).await.unwrap();
    expect_states(
        &mut states,
        &["composing", "connecting", "awaiting_acknowledgement"],
    )
    .await;
    let probe = connector.next_channel().await;

    assert_eq!(
        next_state(&mut states).await,
        ExchangeState::Failed(ExchangeError::Timeout {
            phase: WaitPhase::Acknowledgement,
            after: Duration::from_secs(30),
        })
    );
    assert_eq!(probe.close_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_result_timeout_restarts_after_acknowledgement() {
    let connector = Arc::new(MemoryConnector::new());
    let controller = spawn_with(
        &connector,
        ExchangeConfig::new(ENDPOINT).with_response_timeout(Some(Duration::from_secs(30))),
    );
    let mut states = controller.subscribe().await.unwrap();

    controller.submit(slurs_submission()).await.unwrap();
    expect_states(
        &mut states,
        &["composing", "connecting", "awaiting_acknowledgement"],
    )
    .await;
    let probe = connector.next_channel().await;

    tokio::time::advance(Duration::from_secs(20)).await;
    probe.deliver_json(json!({"celery_worker_id": "w1"}));
    expect_states(&mut states, &["awaiting_result"]).await;

    let acked_at = tokio::time::Instant::now();
    assert_eq!(
        next_state(&mut states).await,
        ExchangeState::Failed(ExchangeError::Timeout {
            phase: WaitPhase::Result,
            after: Duration::from_secs(30),
        })
    );
    assert!(acked_at.elapsed() >= Duration::from_secs(30));
    assert!(probe.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_no_timeout_when_disabled() {
    let connector = Arc::new(MemoryConnector::new());
    let controller = spawn_with(
        &connector,
        ExchangeConfig::new(ENDPOINT).with_response_timeout(None),
    );
    let mut states = controller.subscribe().await.unwrap();

    controller.submit(slurs_submission()).await.unwrap();
    expect_states(
        &mut states,
        &["composing", "connecting", "awaiting_acknowledgement"],
    )
    .await;
    let probe = connector.next_channel().await;

    tokio::time::advance(Duration::from_secs(3600)).await;
    assert_eq!(controller.state(), ExchangeState::AwaitingAcknowledgement);
    assert!(!probe.is_closed());
}

#[tokio::test]
async fn test_unrepresentable_timeout_waits_without_deadline() {
    let connector = Arc::new(MemoryConnector::new());
    let controller = spawn_with(
        &connector,
        ExchangeConfig::new(ENDPOINT).with_response_timeout(Some(Duration::from_secs(u64::MAX))),
    );
    let mut states = controller.subscribe().await.unwrap();

    controller.submit(slurs_submission()).await.unwrap();
    expect_states(
        &mut states,
        &["composing", "connecting", "awaiting_acknowledgement"],
    )
    .await;
    let probe = connector.next_channel().await;

    probe.deliver_json(json!({"celery_worker_id": "w1"}));
    expect_states(&mut states, &["awaiting_result"]).await;
    probe.deliver_json(result_frame());
    assert_eq!(
        next_state(&mut states).await,
        ExchangeState::Resolved(expected_result())
    );
    assert_eq!(probe.close_calls(), 1);
    assert!(controller.snapshot().await.is_ok());
}

// ── Cancellation ──

#[tokio::test]
async fn test_cancel_while_connecting_closes_late_channel() {
    let connector = Arc::new(MemoryConnector::new());
    let gate = connector.hold_next();
    let controller = spawn(&connector);

    controller.submit(slurs_submission()).await.unwrap();
    assert_eq!(controller.state(), ExchangeState::Connecting);

    controller.cancel().await.unwrap();
    assert_eq!(controller.state(), ExchangeState::Idle);
    assert_eq!(controller.pending_submission().await.unwrap(), None);

    gate.release();
    let probe = connector.next_channel().await;
    wait_until(|| probe.is_closed()).await;

    assert!(probe.sent().is_empty());
    assert_eq!(probe.close_calls(), 1);
    assert_eq!(controller.state(), ExchangeState::Idle);
}

#[tokio::test]
async fn test_cancel_while_awaiting_closes_channel() {
    let connector = Arc::new(MemoryConnector::new());
    let controller = spawn(&connector);
    let mut states = controller.subscribe().await.unwrap();

    controller.submit(slurs_submission()).await.unwrap();
    expect_states(
        &mut states,
        &["composing", "connecting", "awaiting_acknowledgement"],
    )
    .await;
    let probe = connector.next_channel().await;

    controller.cancel().await.unwrap();
    expect_states(&mut states, &["idle"]).await;
    assert_eq!(probe.close_calls(), 1);

    // A result arriving afterwards has nowhere to go.
    probe.deliver_json(result_frame());
    assert_eq!(controller.state(), ExchangeState::Idle);
    assert_eq!(controller.last_result().await.unwrap(), None);
}

#[tokio::test]
async fn test_cancel_in_terminal_state_is_noop() {
    let connector = Arc::new(MemoryConnector::new());
    connector.fail_next(TransportError::Connection("refused".into()));
    let controller = spawn(&connector);
    let mut states = controller.subscribe().await.unwrap();

    controller.submit(slurs_submission()).await.unwrap();
    expect_states(&mut states, &["composing", "connecting", "failed"]).await;

    controller.cancel().await.unwrap();
    assert!(matches!(controller.state(), ExchangeState::Failed(_)));
}

// ── Single flight ──

#[tokio::test]
async fn test_submit_refused_while_in_flight() {
    let connector = Arc::new(MemoryConnector::new());
    let controller = spawn(&connector);
    let mut states = controller.subscribe().await.unwrap();

    controller.submit(slurs_submission()).await.unwrap();
    expect_states(
        &mut states,
        &["composing", "connecting", "awaiting_acknowledgement"],
    )
    .await;

    let err = controller
        .submit(ReviewSubmission::new("43", "safe", "benign"))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ExchangeError::InvalidTransition {
            action: "submit",
            state: "awaiting_acknowledgement",
        }
    );
    assert_eq!(connector.attempts().len(), 1);
    assert_eq!(
        controller
            .pending_submission()
            .await
            .unwrap()
            .map(|s| s.task_id().to_string()),
        Some("42".to_string())
    );
}

#[tokio::test]
async fn test_resubmit_after_cancel_waits_for_abandoned_connect() {
    let connector = Arc::new(MemoryConnector::new());
    let gate = connector.hold_next();
    let controller = spawn(&connector);
    let mut states = controller.subscribe().await.unwrap();

    controller.submit(slurs_submission()).await.unwrap();
    wait_until(|| connector.attempts().len() == 1).await;
    controller.cancel().await.unwrap();
    controller
        .submit(ReviewSubmission::new("43", "safe", "benign"))
        .await
        .unwrap();
    expect_states(&mut states, &["composing", "connecting", "idle", "composing", "connecting"])
        .await;

    // The second open waits for the first to settle.
    assert_eq!(connector.attempts().len(), 1);

    gate.release();
    let abandoned = connector.next_channel().await;
    let live = connector.next_channel().await;
    expect_states(&mut states, &["awaiting_acknowledgement"]).await;

    assert!(abandoned.is_closed());
    assert!(abandoned.sent().is_empty());
    assert_eq!(live.sent().len(), 1);
    assert_eq!(live.sent()[0]["task_id"], "43");
    assert_eq!(connector.peak_channels(), 1);

    live.deliver_json(result_frame());
    expect_states(&mut states, &["resolved"]).await;
    assert_eq!(connector.live_channels(), 0);
}

// ── Retry / reclassify ──

#[tokio::test]
async fn test_retry_preserves_draft() {
    let connector = Arc::new(MemoryConnector::new());
    connector.fail_next(TransportError::Connection("network unreachable".into()));
    let controller = spawn(&connector);
    let mut states = controller.subscribe().await.unwrap();

    controller.submit(slurs_submission()).await.unwrap();
    expect_states(&mut states, &["composing", "connecting", "failed"]).await;

    controller.retry().await.unwrap();
    expect_states(&mut states, &["composing"]).await;

    let draft = controller.pending_submission().await.unwrap().unwrap();
    assert_eq!(draft.classification(), "Highly Offensive");
    assert_eq!(draft.justification(), "contains slurs");

    controller.submit(draft).await.unwrap();
    expect_states(&mut states, &["connecting", "awaiting_acknowledgement"]).await;
    let probe = connector.next_channel().await;
    assert_eq!(probe.sent()[0]["justification"], "contains slurs");
}

#[tokio::test]
async fn test_retry_after_resolution_discards_result() {
    let connector = Arc::new(MemoryConnector::new());
    let controller = spawn(&connector);
    let mut states = controller.subscribe().await.unwrap();

    controller.submit(slurs_submission()).await.unwrap();
    expect_states(
        &mut states,
        &["composing", "connecting", "awaiting_acknowledgement"],
    )
    .await;
    connector.next_channel().await.deliver_json(result_frame());
    expect_states(&mut states, &["resolved"]).await;

    controller.retry().await.unwrap();
    let snapshot = controller.snapshot().await.unwrap();
    assert_eq!(snapshot.state, ExchangeState::Composing);
    assert_eq!(snapshot.last_result, None);
    let draft = snapshot.pending_submission.unwrap();
    assert_eq!(draft.task_id(), "42");
    assert_eq!(draft.justification(), "contains slurs");
}

#[tokio::test]
async fn test_reclassify_clears_draft_and_result() {
    let connector = Arc::new(MemoryConnector::new());
    let controller = spawn(&connector);
    let mut states = controller.subscribe().await.unwrap();

    controller.submit(slurs_submission()).await.unwrap();
    expect_states(
        &mut states,
        &["composing", "connecting", "awaiting_acknowledgement"],
    )
    .await;
    connector.next_channel().await.deliver_json(result_frame());
    expect_states(&mut states, &["resolved"]).await;

    controller.reclassify().await.unwrap();
    let snapshot = controller.snapshot().await.unwrap();
    assert_eq!(snapshot.state, ExchangeState::Composing);
    assert_eq!(snapshot.pending_submission, None);
    assert_eq!(snapshot.last_result, None);
}

#[tokio::test]
async fn test_retry_and_reclassify_refused_outside_terminal_states() {
    let connector = Arc::new(MemoryConnector::new());
    let controller = spawn(&connector);

    assert!(matches!(
        controller.retry().await,
        Err(ExchangeError::InvalidTransition { action: "retry", .. })
    ));

    connector.fail_next(TransportError::Connection("refused".into()));
    let mut states = controller.subscribe().await.unwrap();
    controller.submit(slurs_submission()).await.unwrap();
    expect_states(&mut states, &["composing", "connecting", "failed"]).await;

    assert!(matches!(
        controller.reclassify().await,
        Err(ExchangeError::InvalidTransition {
            action: "reclassify",
            state: "failed",
        })
    ));
}

// ── Lifecycle ──

#[tokio::test]
async fn test_dropping_controller_closes_channel() {
    let connector = Arc::new(MemoryConnector::new());
    let controller = spawn(&connector);
    let mut states = controller.subscribe().await.unwrap();

    controller.submit(slurs_submission()).await.unwrap();
    expect_states(
        &mut states,
        &["composing", "connecting", "awaiting_acknowledgement"],
    )
    .await;
    let probe = connector.next_channel().await;

    drop(controller);
    wait_until(|| probe.is_closed()).await;
    assert_eq!(connector.live_channels(), 0);
}
