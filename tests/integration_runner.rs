mod common;

use chrono_tz::Asia::Kolkata;
use common::{harness, RecordingSender, COURSE_NAME};
use duesync::monitor::RunMonitor;
use duesync::notify::{Notifier, FAILURE_SUBJECT, RECOVERY_SUBJECT};
use duesync::utils::RetryPolicy;
use duesync::{RunOutcome, RunStatus, Runner, SyncEngine};
use std::sync::Arc;
use std::time::Duration;

fn runner_for(h: &common::Harness, sender: Arc<RecordingSender>) -> Runner {
    let engine = SyncEngine::new(h.db.clone(), h.source.clone(), h.calendar.clone(), common::settings());
    Runner::new(
        h.db.clone(),
        engine,
        RunMonitor::new(h.db.clone(), 2),
        Notifier::new(sender, Kolkata),
        None,
        RetryPolicy::once_after(Duration::from_millis(10)),
    )
}

#[tokio::test]
async fn test_failure_streak_worked_example() {
    let h = harness().await;
    let sender = Arc::new(RecordingSender::default());
    let runner = runner_for(&h, sender.clone());

    // Run 1 and its retry both fail.
    h.source.fail_course_listings(2);
    let outcome = runner.run_with_retry().await;
    assert!(matches!(outcome, RunOutcome::Failed(_)));
    assert_eq!(outcome.exit_code(), 1);

    let state = h.db.get_failure_state().await.unwrap();
    assert_eq!(state.consecutive_failures, 2);
    assert!(state.alert_sent);
    assert_eq!(sender.subjects(), vec![FAILURE_SUBJECT.to_string()]);
    let (_, html) = sender.sent.lock().unwrap()[0].clone();
    assert!(html.contains("invalid_grant"));

    // Run 3 succeeds.
    let outcome = runner.run_with_retry().await;
    assert!(matches!(outcome, RunOutcome::Succeeded(_)));

    let state = h.db.get_failure_state().await.unwrap();
    assert_eq!(state.consecutive_failures, 0);
    assert!(!state.alert_sent);
    assert!(state.last_success.is_some());
    assert_eq!(
        sender.subjects(),
        vec![FAILURE_SUBJECT.to_string(), RECOVERY_SUBJECT.to_string()]
    );

    let statuses: Vec<RunStatus> = h
        .db
        .recent_run_logs(10)
        .await
        .unwrap()
        .into_iter()
        .map(|log| log.status)
        .collect();
    assert_eq!(statuses, vec![RunStatus::Success, RunStatus::Failed, RunStatus::Failed]);
}

#[tokio::test]
async fn test_long_streak_alerts_only_once() {
    let h = harness().await;
    let sender = Arc::new(RecordingSender::default());
    let runner = runner_for(&h, sender.clone());

    h.source.fail_course_listings(6);
    for _ in 0..3 {
        runner.run_with_retry().await;
    }

    assert_eq!(h.db.get_failure_state().await.unwrap().consecutive_failures, 6);
    assert_eq!(sender.subjects(), vec![FAILURE_SUBJECT.to_string()]);
}

#[tokio::test]
async fn test_successful_run_records_stats() {
    let h = harness().await;
    h.source.put_coursework(
        "cw-1",
        "Lab 3",
        Some("t-labs"),
        Some(chrono::Utc::now() + chrono::Duration::days(3)),
    );
    let sender = Arc::new(RecordingSender::default());
    let runner = runner_for(&h, sender.clone());

    let stats = runner.run_once().await.unwrap();
    assert_eq!(stats.created, 1);
    assert!(sender.subjects().is_empty());
    assert!(!h.calendar.events(COURSE_NAME).is_empty());

    let logs = h.db.recent_run_logs(1).await.unwrap();
    assert_eq!(logs[0].status, RunStatus::Success);
    assert_eq!(logs[0].reminders_created, 1);
    assert_eq!(logs[0].assignments_processed, 1);
}
