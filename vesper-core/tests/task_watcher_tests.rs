//! Integration tests for the task watcher against the mock endpoint.

use std::sync::Arc;
use std::time::Duration;

use vesper_core::config::{EndpointConfig, WatcherConfig};
use vesper_core::task_watcher::{TaskOutcome, TaskWatcher};
use vesper_core::vim::mock::{MockVimConnector, MockVimSession};
use vesper_core::vim::types::{
    ManagedObjectRef, TaskKey, TaskResult, TaskState, TaskUpdate,
};
use vesper_core::VesperError;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("vesper_core=debug")
        .with_test_writer()
        .try_init();
}

fn test_config(task_timeout: Duration) -> WatcherConfig {
    WatcherConfig {
        task_timeout,
        max_wait: Duration::from_millis(50),
        retry_delay: Duration::from_millis(20),
    }
}

fn watcher_on(session: Arc<MockVimSession>, task_timeout: Duration) -> TaskWatcher {
    let connector = Arc::new(MockVimConnector::new(session));
    TaskWatcher::new(connector, EndpointConfig::default(), test_config(task_timeout))
}

fn success(task: &str, vm: &str) -> TaskUpdate {
    TaskUpdate {
        task: TaskKey::new(task),
        state: TaskState::Success,
        result: Some(TaskResult::Object(ManagedObjectRef::virtual_machine(vm))),
        error_message: None,
    }
}

fn running(task: &str) -> TaskUpdate {
    TaskUpdate {
        task: TaskKey::new(task),
        state: TaskState::Running,
        result: None,
        error_message: None,
    }
}

fn failure(task: &str, message: &str) -> TaskUpdate {
    TaskUpdate {
        task: TaskKey::new(task),
        state: TaskState::Error,
        result: None,
        error_message: Some(message.to_string()),
    }
}

#[tokio::test]
async fn terminal_update_resolves_the_waiter_and_releases_the_filter() {
    init_tracing();
    let session = Arc::new(MockVimSession::new());
    let watcher = watcher_on(session.clone(), Duration::from_secs(5));

    let handle = watcher.submit(TaskKey::new("task-A")).await.unwrap();
    session.push_update(success("task-A", "vm-9"));

    match watcher.wait(handle).await.unwrap() {
        TaskOutcome::Success { result } => {
            let moref = result.unwrap();
            assert_eq!(moref.as_object().unwrap().id, "vm-9");
        }
        other => panic!("expected success, got {:?}", other),
    }

    assert_eq!(watcher.tracked_count(), 0);
    assert_eq!(session.destroyed_filters().len(), 1);
}

#[tokio::test]
async fn remote_failure_carries_the_message_verbatim() {
    let session = Arc::new(MockVimSession::new());
    let watcher = watcher_on(session.clone(), Duration::from_secs(5));

    let handle = watcher.submit(TaskKey::new("task-A")).await.unwrap();
    session.push_update(failure("task-A", "Insufficient disk space on datastore"));

    match watcher.wait(handle).await.unwrap() {
        TaskOutcome::Error { message } => {
            assert_eq!(message, "Insufficient disk space on datastore");
        }
        other => panic!("expected error, got {:?}", other),
    }
}

#[tokio::test]
async fn updates_for_untracked_tasks_are_dropped_silently() {
    let session = Arc::new(MockVimSession::new());
    let watcher = watcher_on(session.clone(), Duration::from_secs(5));

    let handle = watcher.submit(TaskKey::new("task-A")).await.unwrap();
    // A terminal update for a task nobody tracks must not wake our waiter.
    session.push_update(success("task-B", "vm-1"));

    let outcome = watcher
        .wait_with_timeout(handle, Duration::from_millis(200))
        .await
        .unwrap();
    assert!(matches!(outcome, TaskOutcome::TimedOut));
    assert_eq!(watcher.tracked_count(), 0);
}

#[tokio::test]
async fn intermediate_states_do_not_wake_the_waiter() {
    let session = Arc::new(MockVimSession::new());
    let watcher = watcher_on(session.clone(), Duration::from_secs(5));

    let handle = watcher.submit(TaskKey::new("task-A")).await.unwrap();
    session.push_update(running("task-A"));

    let outcome = watcher
        .wait_with_timeout(handle, Duration::from_millis(200))
        .await
        .unwrap();
    assert!(matches!(outcome, TaskOutcome::TimedOut));
}

#[tokio::test]
async fn duplicate_submission_is_rejected() {
    let session = Arc::new(MockVimSession::new());
    let watcher = watcher_on(session.clone(), Duration::from_secs(5));

    let _handle = watcher.submit(TaskKey::new("task-A")).await.unwrap();
    let err = watcher.submit(TaskKey::new("task-A")).await.unwrap_err();
    assert!(matches!(err, VesperError::AlreadyTracked { .. }));

    // The filter created for the rejected registration must not leak.
    assert_eq!(session.destroyed_filters().len(), 1);
    assert_eq!(watcher.tracked_count(), 1);
}

#[tokio::test]
async fn last_update_in_a_batch_wins() {
    let session = Arc::new(MockVimSession::new());
    let watcher = watcher_on(session.clone(), Duration::from_secs(5));

    let handle = watcher.submit(TaskKey::new("task-A")).await.unwrap();
    session.push_raw_batch(vec![
        failure("task-A", "transient"),
        success("task-A", "vm-9"),
    ]);

    match watcher.wait(handle).await.unwrap() {
        TaskOutcome::Success { .. } => {}
        other => panic!("expected the batch's last update to win, got {:?}", other),
    }
}

#[tokio::test]
async fn timeout_removes_the_task_and_later_updates_are_ignored() {
    let session = Arc::new(MockVimSession::new());
    let watcher = watcher_on(session.clone(), Duration::from_millis(100));

    let handle = watcher.submit(TaskKey::new("task-A")).await.unwrap();
    let outcome = watcher.wait(handle).await.unwrap();
    assert!(matches!(outcome, TaskOutcome::TimedOut));
    assert_eq!(watcher.tracked_count(), 0);
    assert_eq!(session.destroyed_filters().len(), 1);

    // A terminal update arriving after expiry finds no waiter and changes
    // nothing.
    session.push_update(success("task-A", "vm-9"));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(watcher.tracked_count(), 0);
    assert_eq!(session.destroyed_filters().len(), 1);
}

#[tokio::test]
async fn independent_waits_proceed_in_parallel() {
    let session = Arc::new(MockVimSession::new());
    let watcher = watcher_on(session.clone(), Duration::from_secs(5));

    let a = watcher.submit(TaskKey::new("task-A")).await.unwrap();
    let b = watcher.submit(TaskKey::new("task-B")).await.unwrap();

    session.push_update(success("task-B", "vm-2"));
    session.push_update(success("task-A", "vm-1"));

    let (a, b) = tokio::join!(watcher.wait(a), watcher.wait(b));
    assert!(matches!(a.unwrap(), TaskOutcome::Success { .. }));
    assert!(matches!(b.unwrap(), TaskOutcome::Success { .. }));
}

#[tokio::test]
async fn broken_stream_is_reestablished_and_pending_tasks_survive() {
    init_tracing();
    let session = Arc::new(MockVimSession::new());
    let connector = Arc::new(MockVimConnector::new(session.clone()));
    let watcher = TaskWatcher::new(
        connector.clone(),
        EndpointConfig::default(),
        test_config(Duration::from_secs(5)),
    );

    session.fail_next_wait();
    let handle = watcher.submit(TaskKey::new("task-A")).await.unwrap();

    // Give the loop time to hit the transport error and reconnect.
    tokio::time::sleep(Duration::from_millis(100)).await;
    session.push_update(success("task-A", "vm-9"));

    match watcher.wait(handle).await.unwrap() {
        TaskOutcome::Success { .. } => {}
        other => panic!("expected recovery then success, got {:?}", other),
    }
    assert!(connector.connect_count() >= 2, "expected a reconnect");
}

#[tokio::test]
async fn shutdown_releases_filters_and_fails_pending_waiters() {
    let session = Arc::new(MockVimSession::new());
    let watcher = watcher_on(session.clone(), Duration::from_secs(5));

    let handle = watcher.submit(TaskKey::new("task-A")).await.unwrap();
    watcher.shutdown().await;

    let err = watcher.wait(handle).await.unwrap_err();
    assert!(matches!(err, VesperError::WatcherStopped));
    assert_eq!(session.active_filter_count(), 0);
    assert!(session.logout_count() >= 1);

    // New submissions are refused once stopped.
    let err = watcher.submit(TaskKey::new("task-B")).await.unwrap_err();
    assert!(matches!(err, VesperError::WatcherStopped));
}
