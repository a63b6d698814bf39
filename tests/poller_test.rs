//! 轮询流程的集成测试（虚拟时钟）

mod common;

use std::time::Duration;

use agri_tracker::models::{OperationResult, StatusResponse};
use agri_tracker::{ErrorKind, Operation, OperationState};
use common::*;
use futures::StreamExt;

async fn collect(tracker: &agri_tracker::OperationTracker, op: Operation) -> Vec<Operation> {
    tracker.poll(op).collect().await
}

fn assert_valid_edges(first: &Operation, snapshots: &[Operation]) {
    let mut prev = first.state();
    for snapshot in snapshots {
        let next = snapshot.state();
        assert!(
            prev.can_transition_to(next),
            "非法的快照序列: {} -> {}",
            prev,
            next
        );
        prev = next;
    }
    assert!(prev.is_terminal(), "最后一份快照必须是终态");
}

fn assert_result_xor_error(op: &Operation) {
    match op.state() {
        OperationState::Succeeded => assert!(op.result().is_some() && op.error().is_none()),
        _ => assert!(op.result().is_none() && op.error().is_some()),
    }
}

#[tokio::test(start_paused = true)]
async fn test_diagnosis_succeeds_on_last_allowed_attempt() {
    let mut replies = vec![in_progress(); 29];
    replies.push(diagnosis_done());
    let transport = ScriptedTransport::new("17", replies, Reply::Hang);
    let tracker = tracker(&transport);

    let op = tracker.submit(leaf_image()).await;
    assert_eq!(op.state(), OperationState::Submitted);
    assert_eq!(op.id().map(|id| id.as_str()), Some("17"));

    let snapshots = collect(&tracker, op.clone()).await;
    assert_valid_edges(&op, &snapshots);
    assert_eq!(snapshots.len(), 31);
    assert_eq!(snapshots[0].state(), OperationState::Polling);
    assert_eq!(snapshots[0].attempts(), 0);

    let last = snapshots.last().unwrap();
    assert_eq!(last.state(), OperationState::Succeeded);
    assert_eq!(last.attempts(), 30);
    assert_result_xor_error(last);
    match last.result() {
        Some(OperationResult::Diagnosis(result)) => {
            assert_eq!(result.predicted_label, "Maize Leaf Rust");
            assert_eq!(result.recommendations.treatment.len(), 2);
        }
        other => panic!("期望诊断结果，实际 {:?}", other),
    }
    assert_eq!(transport.queries(), 30);
}

#[tokio::test(start_paused = true)]
async fn test_diagnosis_times_out_after_max_attempts() {
    let transport = ScriptedTransport::new("17", vec![], in_progress());
    let tracker = tracker(&transport);

    let op = tracker.submit(leaf_image()).await;
    let started = tokio::time::Instant::now();
    let snapshots = collect(&tracker, op.clone()).await;

    let last = snapshots.last().unwrap();
    assert_eq!(last.state(), OperationState::TimedOut);
    assert_eq!(last.attempts(), 30);
    assert_eq!(last.error().map(|e| e.kind), Some(ErrorKind::Timeout));
    assert_result_xor_error(last);
    assert_eq!(last.user_message(), "仍在处理中，请稍后再查看");
    assert_eq!(transport.queries(), 30);
    // 首次查询立即发出，之后 29 个间隔
    assert_eq!(started.elapsed(), Duration::from_secs(58));
}

#[tokio::test(start_paused = true)]
async fn test_unrecognized_status_fails_immediately() {
    let transport = ScriptedTransport::new(
        "17",
        vec![Reply::Status(StatusResponse::new("weird"))],
        in_progress(),
    );
    let tracker = tracker(&transport);

    let op = tracker.submit(leaf_image()).await;
    let last = tracker.poll(op).fold(None, |_, s| async move { Some(s) }).await.unwrap();

    assert_eq!(last.state(), OperationState::Failed);
    assert_eq!(last.attempts(), 1);
    let error = last.error().unwrap();
    assert_eq!(error.kind, ErrorKind::UnrecognizedStatus);
    assert!(error.message.contains("weird"));
    assert_eq!(transport.queries(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_server_failure_is_processing_failed() {
    let transport = ScriptedTransport::new(
        "17",
        vec![
            in_progress(),
            Reply::Status(
                StatusResponse::new("failed").with_error("Model inference error"),
            ),
        ],
        in_progress(),
    );
    let tracker = tracker(&transport);

    let op = tracker.submit(leaf_image()).await;
    let snapshots = collect(&tracker, op.clone()).await;
    assert_valid_edges(&op, &snapshots);

    let last = snapshots.last().unwrap();
    assert_eq!(last.state(), OperationState::Failed);
    assert_eq!(last.attempts(), 2);
    let error = last.error().unwrap();
    assert_eq!(error.kind, ErrorKind::ProcessingFailed);
    assert_eq!(error.message, "Model inference error");
    assert!(last.user_message().contains("可以重新提交"));
}

#[tokio::test(start_paused = true)]
async fn test_malformed_success_payload() {
    let payload = serde_json::json!({
        "predicted_label": "",
        "confidence": 0.5,
        "recommendations": { "issue": "x", "severity": "Low", "treatment": [] }
    });
    let transport = ScriptedTransport::new(
        "17",
        vec![Reply::Status(
            StatusResponse::new("processed").with_result(payload),
        )],
        in_progress(),
    );
    let tracker = tracker(&transport);

    let op = tracker.submit(leaf_image()).await;
    let last = tracker.wait(op).await;

    assert_eq!(last.state(), OperationState::Failed);
    assert_eq!(last.error().map(|e| e.kind), Some(ErrorKind::MalformedResult));
    assert!(last.result().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_transport_error_fails_without_retry() {
    let transport =
        ScriptedTransport::new("17", vec![in_progress(), Reply::BadGateway], in_progress());
    let tracker = tracker(&transport);

    let op = tracker.submit(leaf_image()).await;
    let snapshots = collect(&tracker, op.clone()).await;

    let last = snapshots.last().unwrap();
    assert_eq!(last.state(), OperationState::Failed);
    assert_eq!(last.attempts(), 2);
    assert_eq!(last.error().map(|e| e.kind), Some(ErrorKind::TransportError));
    assert_eq!(transport.queries(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_request_timeout_on_last_attempt_is_timed_out() {
    let mut replies = vec![in_progress(); 29];
    replies.push(Reply::TimedOut);
    let transport = ScriptedTransport::new("17", replies, diagnosis_done());
    let tracker = tracker(&transport);

    let op = tracker.submit(leaf_image()).await;
    let last = tracker.wait(op).await;

    assert_eq!(last.state(), OperationState::TimedOut);
    assert_eq!(last.attempts(), 30);
    assert_eq!(last.error().map(|e| e.kind), Some(ErrorKind::Timeout));
    assert_eq!(transport.queries(), 30);
}

#[tokio::test(start_paused = true)]
async fn test_request_timeout_before_last_attempt_is_transport_error() {
    let transport = ScriptedTransport::new(
        "17",
        vec![in_progress(), in_progress(), Reply::TimedOut],
        diagnosis_done(),
    );
    let tracker = tracker(&transport);

    let op = tracker.submit(leaf_image()).await;
    let last = tracker.wait(op).await;

    assert_eq!(last.state(), OperationState::Failed);
    assert_eq!(last.attempts(), 3);
    assert_eq!(last.error().map(|e| e.kind), Some(ErrorKind::TransportError));
    assert_eq!(transport.queries(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_unparseable_status_body_is_unrecognized() {
    let transport = ScriptedTransport::new("17", vec![Reply::Garbled], in_progress());
    let tracker = tracker(&transport);

    let op = tracker.submit(leaf_image()).await;
    let last = tracker.wait(op).await;

    assert_eq!(last.state(), OperationState::Failed);
    assert_eq!(last.attempts(), 1);
    assert_eq!(last.error().map(|e| e.kind), Some(ErrorKind::UnrecognizedStatus));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_in_flight_query() {
    let mut replies = vec![in_progress(); 5];
    replies.push(Reply::Hang);
    let transport = ScriptedTransport::new("17", replies, diagnosis_done());
    let tracker = tracker(&transport);

    let op = tracker.submit(leaf_image()).await;
    let handle = op.cancel_handle();
    let stream = tracker.poll(op.clone());
    let collector = tokio::spawn(stream.collect::<Vec<_>>());

    transport.wait_for_query(6).await;
    tracker.cancel(&handle);

    let snapshots = collector.await.unwrap();
    assert_valid_edges(&op, &snapshots);
    let last = snapshots.last().unwrap();
    assert_eq!(last.state(), OperationState::Cancelled);
    assert_eq!(last.attempts(), 6);
    assert!(last.result().is_none());
    assert_eq!(last.error().map(|e| e.kind), Some(ErrorKind::Cancelled));

    // 取消后不再发出任何查询
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.queries(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_late_success_after_cancel_is_discarded() {
    let mut replies = vec![in_progress(); 5];
    replies.push(Reply::Delayed(
        Duration::from_secs(1),
        Box::new(diagnosis_done()),
    ));
    let transport = ScriptedTransport::new("17", replies, diagnosis_done());
    let tracker = tracker(&transport);

    let op = tracker.submit(leaf_image()).await;
    let handle = op.cancel_handle();
    let collector = tokio::spawn(tracker.poll(op.clone()).collect::<Vec<_>>());

    transport.wait_for_query(6).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    tracker.cancel(&handle);

    // 越过第 6 次查询本应返回成功的时刻
    tokio::time::sleep(Duration::from_secs(2)).await;
    let snapshots = collector.await.unwrap();

    assert_valid_edges(&op, &snapshots);
    let last = snapshots.last().unwrap();
    assert_eq!(last.state(), OperationState::Cancelled);
    assert_eq!(last.attempts(), 6);
    assert!(last.result().is_none());
    assert!(snapshots.iter().all(|s| s.state() != OperationState::Succeeded));
    assert_eq!(transport.queries(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_success_arriving_with_cancel_is_discarded() {
    let transport = ScriptedTransport::new("17", vec![], Reply::Hang);
    let tracker = tracker(&transport);

    let op = tracker.submit(leaf_image()).await;
    transport.push(in_progress());
    transport.push(Reply::CancelFirst(
        op.cancel_handle(),
        Box::new(diagnosis_done()),
    ));

    let snapshots = collect(&tracker, op.clone()).await;

    assert_valid_edges(&op, &snapshots);
    let last = snapshots.last().unwrap();
    assert_eq!(last.state(), OperationState::Cancelled);
    assert_eq!(last.attempts(), 2);
    assert!(last.result().is_none());
    assert_eq!(last.error().map(|e| e.kind), Some(ErrorKind::Cancelled));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_before_polling() {
    let transport = ScriptedTransport::new("17", vec![], diagnosis_done());
    let tracker = tracker(&transport);

    let op = tracker.submit(leaf_image()).await;
    tracker.cancel(&op.cancel_handle());
    let snapshots = collect(&tracker, op).await;

    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].state(), OperationState::Cancelled);
    assert_eq!(snapshots[0].attempts(), 0);
    assert_eq!(transport.queries(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_submission_failure_never_polls() {
    let transport = ScriptedTransport::rejecting();
    let tracker = tracker(&transport);

    let op = tracker.submit(payment_request()).await;
    assert_eq!(op.state(), OperationState::Failed);
    assert!(op.id().is_none());
    assert_eq!(op.error().map(|e| e.kind), Some(ErrorKind::SubmissionError));
    assert!(op.user_message().contains("重复扣费"));

    let snapshots = collect(&tracker, op).await;
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].state(), OperationState::Failed);
    assert_eq!(transport.creates(), 1);
    assert_eq!(transport.queries(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_identical_scripts_give_identical_runs() {
    async fn run() -> (OperationState, u32, usize) {
        let mut replies = vec![in_progress(); 3];
        replies.push(diagnosis_done());
        let transport = ScriptedTransport::new("17", replies, Reply::Hang);
        let tracker = tracker(&transport);
        let op = tracker.submit(leaf_image()).await;
        let snapshots = collect(&tracker, op).await;
        let last = snapshots.last().unwrap();
        (last.state(), last.attempts(), snapshots.len())
    }

    let first = run().await;
    let second = run().await;
    assert_eq!(first, second);
    assert_eq!(first, (OperationState::Succeeded, 4, 5));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_operations_do_not_share_counters() {
    let slow = ScriptedTransport::new("a", vec![in_progress(); 4], diagnosis_done());
    let fast = ScriptedTransport::new("b", vec![], diagnosis_done());
    let slow_tracker = tracker(&slow);
    let fast_tracker = tracker(&fast);

    let slow_op = slow_tracker.submit(leaf_image()).await;
    let fast_op = fast_tracker.submit(leaf_image()).await;

    let (slow_last, fast_last) = tokio::join!(
        slow_tracker.wait(slow_op),
        fast_tracker.wait(fast_op)
    );
    assert_eq!(slow_last.attempts(), 5);
    assert_eq!(fast_last.attempts(), 1);
    assert_eq!(slow_last.state(), OperationState::Succeeded);
    assert_eq!(fast_last.state(), OperationState::Succeeded);
}
