//! Notification-driven completion tracking for server-side tasks.
//!
//! One watcher instance is shared by every orchestrator in the process. It
//! owns a single subscription loop against the endpoint's update stream:
//! callers register a task key with [`TaskWatcher::submit`], then block their
//! own logical task in [`TaskWatcher::wait`] until the loop observes a
//! terminal state or the deadline passes. There is no polling interval
//! anywhere; the loop sits in the endpoint's bounded wait-for-updates call.
//!
//! The watcher holds its own session, established lazily on the first submit
//! and released on shutdown. A broken stream is re-established with a fresh
//! session and re-created filters; tasks tracked across the break stay
//! pending until a new notification resolves them or their deadline fires.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use crate::config::{EndpointConfig, WatcherConfig};
use crate::error::{Result, VesperError};
use crate::vim::session::{VimConnector, VimSession};
use crate::vim::types::{FilterKey, TaskKey, TaskResult, TaskState, UpdateBatch};

/// Terminal observation for one tracked task.
#[derive(Debug)]
pub enum TaskOutcome {
    Success { result: Option<TaskResult> },
    Error { message: String },
    TimedOut,
}

impl TaskOutcome {
    /// Collapse into the error taxonomy, naming the operation for context.
    pub fn into_result(
        self,
        operation: &str,
        deadline: Duration,
    ) -> Result<Option<TaskResult>> {
        match self {
            TaskOutcome::Success { result } => Ok(result),
            TaskOutcome::Error { message } => Err(VesperError::RemoteTask {
                operation: operation.to_string(),
                message,
            }),
            TaskOutcome::TimedOut => Err(VesperError::Timeout {
                operation: operation.to_string(),
                duration: deadline,
            }),
        }
    }
}

/// Receipt for one tracked task, consumed by `wait`.
#[derive(Debug)]
pub struct TaskHandle {
    task: TaskKey,
    rx: oneshot::Receiver<TaskOutcome>,
}

impl TaskHandle {
    pub fn task(&self) -> &TaskKey {
        &self.task
    }
}

struct Waiter {
    tx: oneshot::Sender<TaskOutcome>,
    filter: FilterKey,
}

struct WatcherShared {
    connector: Arc<dyn VimConnector>,
    endpoint: EndpointConfig,
    config: WatcherConfig,
    waiters: Mutex<HashMap<TaskKey, Waiter>>,
    session: tokio::sync::Mutex<Option<Arc<dyn VimSession>>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl WatcherShared {
    async fn ensure_session(&self) -> Result<Arc<dyn VimSession>> {
        let mut slot = self.session.lock().await;
        if let Some(session) = slot.as_ref() {
            return Ok(session.clone());
        }
        info!(
            "task watcher connecting to {}",
            self.endpoint.display_name()
        );
        let session = self.connector.connect(&self.endpoint).await?;
        *slot = Some(session.clone());
        Ok(session)
    }

    async fn invalidate_session(&self) {
        let old = self.session.lock().await.take();
        if let Some(session) = old {
            // The stream already failed; logout is best-effort.
            if let Err(e) = session.logout().await {
                debug!("logout of broken watcher session failed: {}", e);
            }
        }
    }

    /// After a reconnect, re-create filters for every still-tracked task so
    /// the fresh stream covers them again.
    async fn reestablish_filters(&self) -> Result<()> {
        let session = self.ensure_session().await?;
        let tracked: Vec<TaskKey> = self.waiters.lock().unwrap().keys().cloned().collect();
        for task in tracked {
            match session.create_task_filter(&task).await {
                Ok(filter) => {
                    let stale = {
                        let mut waiters = self.waiters.lock().unwrap();
                        match waiters.get_mut(&task) {
                            Some(waiter) => {
                                waiter.filter = filter.clone();
                                false
                            }
                            // Resolved or timed out while we were reconnecting.
                            None => true,
                        }
                    };
                    if stale {
                        let _ = session.destroy_filter(&filter).await;
                    }
                }
                Err(e) => warn!("failed to re-create filter for task {}: {}", task, e),
            }
        }
        Ok(())
    }
}

pub struct TaskWatcher {
    shared: Arc<WatcherShared>,
    shutdown_tx: watch::Sender<bool>,
    loop_started: AtomicBool,
}

impl TaskWatcher {
    pub fn new(
        connector: Arc<dyn VimConnector>,
        endpoint: EndpointConfig,
        config: WatcherConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            shared: Arc::new(WatcherShared {
                connector,
                endpoint,
                config,
                waiters: Mutex::new(HashMap::new()),
                session: tokio::sync::Mutex::new(None),
                shutdown_rx,
            }),
            shutdown_tx,
            loop_started: AtomicBool::new(false),
        }
    }

    /// Register a task for tracking. Creates the server-side filter before
    /// the task becomes visible to the dispatch loop.
    pub async fn submit(&self, task: TaskKey) -> Result<TaskHandle> {
        if *self.shared.shutdown_rx.borrow() {
            return Err(VesperError::WatcherStopped);
        }
        let session = self.shared.ensure_session().await?;
        let filter = session.create_task_filter(&task).await?;

        let (tx, rx) = oneshot::channel();
        let duplicate = {
            let mut waiters = self.shared.waiters.lock().unwrap();
            if waiters.contains_key(&task) {
                true
            } else {
                waiters.insert(
                    task.clone(),
                    Waiter {
                        tx,
                        filter: filter.clone(),
                    },
                );
                false
            }
        };
        if duplicate {
            let _ = session.destroy_filter(&filter).await;
            return Err(VesperError::AlreadyTracked {
                task: task.to_string(),
            });
        }

        self.ensure_loop();
        debug!("tracking task {}", task);
        Ok(TaskHandle { task, rx })
    }

    /// Wait with the configured default deadline.
    pub async fn wait(&self, handle: TaskHandle) -> Result<TaskOutcome> {
        let deadline = self.shared.config.task_timeout;
        self.wait_with_timeout(handle, deadline).await
    }

    /// Block until the task reaches a terminal state or `deadline` elapses.
    /// On expiry the task is dropped from the tracking table and its filter
    /// released; the remote operation itself is left running.
    pub async fn wait_with_timeout(
        &self,
        mut handle: TaskHandle,
        deadline: Duration,
    ) -> Result<TaskOutcome> {
        match tokio::time::timeout(deadline, &mut handle.rx).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(_)) => Err(VesperError::WatcherStopped),
            Err(_) => {
                let removed = self.shared.waiters.lock().unwrap().remove(&handle.task);
                match removed {
                    Some(waiter) => {
                        warn!(
                            "task {} still pending after {:?}; abandoning watch",
                            handle.task, deadline
                        );
                        if let Some(session) = self.shared.session.lock().await.clone() {
                            if let Err(e) = session.destroy_filter(&waiter.filter).await {
                                debug!("failed to release filter for timed-out task: {}", e);
                            }
                        }
                        Ok(TaskOutcome::TimedOut)
                    }
                    // The dispatch loop resolved the task in the same instant
                    // the timer fired; the outcome is already buffered.
                    None => handle
                        .rx
                        .try_recv()
                        .map_err(|_| VesperError::WatcherStopped),
                }
            }
        }
    }

    /// Default wall-clock budget applied by `wait`.
    pub fn task_timeout(&self) -> Duration {
        self.shared.config.task_timeout
    }

    /// Number of tasks currently tracked.
    pub fn tracked_count(&self) -> usize {
        self.shared.waiters.lock().unwrap().len()
    }

    /// Stop the subscription loop, release all server-side filters and log
    /// the watcher session out. Pending waiters observe `WatcherStopped`.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let session = self.shared.session.lock().await.take();
        let drained: Vec<Waiter> = {
            let mut waiters = self.shared.waiters.lock().unwrap();
            waiters.drain().map(|(_, waiter)| waiter).collect()
        };
        if let Some(session) = session {
            let _ = session.cancel_wait().await;
            futures::future::join_all(
                drained
                    .iter()
                    .map(|waiter| session.destroy_filter(&waiter.filter)),
            )
            .await;
            if let Err(e) = session.logout().await {
                warn!("watcher logout failed: {}", e);
            }
        }
        info!("task watcher stopped");
        // Dropping the drained waiters closes their channels, waking any
        // remaining wait() callers with WatcherStopped.
    }

    fn ensure_loop(&self) {
        if !self.loop_started.swap(true, Ordering::SeqCst) {
            let shared = self.shared.clone();
            let shutdown = self.shared.shutdown_rx.clone();
            tokio::spawn(run_loop(shared, shutdown));
        }
    }
}

async fn run_loop(shared: Arc<WatcherShared>, mut shutdown: watch::Receiver<bool>) {
    let mut version = String::new();
    debug!("task watcher subscription loop started");
    loop {
        if *shutdown.borrow() {
            break;
        }
        let session = match shared.ensure_session().await {
            Ok(session) => session,
            Err(e) => {
                warn!("watcher session unavailable: {}", e);
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(shared.config.retry_delay) => continue,
                }
            }
        };

        let waited = tokio::select! {
            _ = shutdown.changed() => None,
            result = session.wait_for_updates(&version, shared.config.max_wait) => Some(result),
        };
        let Some(result) = waited else { break };

        match result {
            Ok(Some(batch)) => {
                version = batch.version.clone();
                dispatch(&shared, &session, batch).await;
            }
            // Truncated wait: nothing changed within max_wait.
            Ok(None) => {}
            Err(e) => {
                warn!("update stream broken: {}; re-establishing", e);
                shared.invalidate_session().await;
                version.clear();
                let interrupted = tokio::select! {
                    _ = shutdown.changed() => true,
                    _ = tokio::time::sleep(shared.config.retry_delay) => false,
                };
                if interrupted {
                    break;
                }
                if let Err(e) = shared.reestablish_filters().await {
                    warn!("failed to re-establish task filters: {}", e);
                }
            }
        }
    }
    debug!("task watcher subscription loop stopped");
}

async fn dispatch(shared: &Arc<WatcherShared>, session: &Arc<dyn VimSession>, batch: UpdateBatch) {
    // Within one batch the last update for a task wins; the stream is
    // per-task ordered.
    let mut latest = HashMap::new();
    for update in batch.updates {
        latest.insert(update.task.clone(), update);
    }

    for (task, update) in latest {
        let outcome = match update.state {
            TaskState::Success => TaskOutcome::Success {
                result: update.result,
            },
            TaskState::Error => TaskOutcome::Error {
                message: update
                    .error_message
                    .unwrap_or_else(|| "task failed without an error message".to_string()),
            },
            // Intermediate states never wake a waiter.
            TaskState::Queued | TaskState::Running => continue,
        };
        let waiter = shared.waiters.lock().unwrap().remove(&task);
        let Some(waiter) = waiter else {
            debug!("discarding update for untracked task {}", task);
            continue;
        };
        if let Err(e) = session.destroy_filter(&waiter.filter).await {
            warn!("failed to release filter for task {}: {}", task, e);
        }
        debug!("task {} resolved", task);
        if waiter.tx.send(outcome).is_err() {
            debug!("waiter for task {} went away before delivery", task);
        }
    }
}
