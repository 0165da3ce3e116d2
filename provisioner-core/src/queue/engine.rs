//! In-process task dispatch engine

use super::{QueueError, TaskHandler, TaskQueue};
use crate::models::{Task, INSTANCE_ID_ARG};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Notify, Semaphore};
use tokio_util::sync::CancellationToken;

/// Counts queued plus executing tasks and wakes waiters when it reaches zero
#[derive(Debug, Default)]
struct Pending {
    count: AtomicUsize,
    idle: Notify,
}

impl Pending {
    fn increment(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Releases one pending slot when dropped, including while unwinding from a handler panic
struct PendingGuard(Arc<Pending>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

/// Cloneable handle submitting tasks into an [`AsyncEngine`]
#[derive(Clone)]
pub struct TaskSubmitter {
    sender: mpsc::UnboundedSender<Task>,
    pending: Arc<Pending>,
}

#[async_trait]
impl TaskQueue for TaskSubmitter {
    async fn submit(&self, task: Task) -> Result<(), QueueError> {
        self.pending.increment();
        if self.sender.send(task).is_err() {
            self.pending.decrement();
            return Err(QueueError::Closed);
        }
        Ok(())
    }
}

/// Dispatches queued tasks to the handler registered for their type
pub struct AsyncEngine {
    submitter: TaskSubmitter,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Task>>>,
    handlers: Arc<DashMap<String, Arc<dyn TaskHandler>>>,
}

impl Default for AsyncEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AsyncEngine {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            submitter: TaskSubmitter {
                sender,
                pending: Arc::new(Pending::default()),
            },
            receiver: Mutex::new(Some(receiver)),
            handlers: Arc::new(DashMap::new()),
        }
    }

    /// Handle for submitting tasks
    pub fn submitter(&self) -> TaskSubmitter {
        self.submitter.clone()
    }

    /// Register the handler for a task type
    pub fn register_handler(&self, task_type: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(task_type.into(), handler);
    }

    /// Number of tasks queued or executing
    pub fn pending_count(&self) -> usize {
        self.submitter.pending.count.load(Ordering::SeqCst)
    }

    /// Wait until no task is queued or executing
    pub async fn wait_idle(&self) {
        let pending = &self.submitter.pending;
        loop {
            let idle = pending.idle.notified();
            if pending.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            idle.await;
        }
    }

    /// Dispatch tasks until `shutdown` fires, running at most `worker_count` at once.
    ///
    /// Tasks still executing when shutdown fires see their scope cancelled.
    pub async fn run(&self, worker_count: usize, shutdown: CancellationToken) -> Result<(), QueueError> {
        let mut receiver = self
            .receiver
            .lock()
            .await
            .take()
            .ok_or(QueueError::AlreadyRunning)?;

        let permits = Arc::new(Semaphore::new(worker_count.max(1)));
        tracing::info!(worker_count, "task engine started");

        loop {
            let task = tokio::select! {
                _ = shutdown.cancelled() => break,
                task = receiver.recv() => match task {
                    Some(task) => task,
                    None => break,
                },
            };

            let permit = tokio::select! {
                _ = shutdown.cancelled() => {
                    self.abandon(&task);
                    break;
                }
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        self.abandon(&task);
                        break;
                    }
                },
            };

            let handlers = self.handlers.clone();
            let pending = PendingGuard(self.submitter.pending.clone());
            let scope = shutdown.child_token();

            tokio::spawn(async move {
                let _pending = pending;
                let _permit = permit;
                dispatch(&handlers, &scope, task).await;
            });
        }

        // Later submits fail with Closed; whatever is already queued is dropped here
        receiver.close();
        while let Ok(task) = receiver.try_recv() {
            self.abandon(&task);
        }

        tracing::info!("task engine stopped");
        Ok(())
    }

    fn abandon(&self, task: &Task) {
        tracing::warn!(
            task_type = %task.task_type,
            instance_id = task.arg(INSTANCE_ID_ARG).unwrap_or_default(),
            "dropping queued task on shutdown"
        );
        self.submitter.pending.decrement();
    }
}

async fn dispatch(
    handlers: &DashMap<String, Arc<dyn TaskHandler>>,
    scope: &CancellationToken,
    task: Task,
) {
    let handler = handlers
        .get(&task.task_type)
        .map(|entry| entry.value().clone());

    let Some(handler) = handler else {
        tracing::warn!(task_type = %task.task_type, "no handler registered for task type");
        return;
    };

    if let Err(e) = handler.handle(scope, &task.args).await {
        tracing::error!(
            task_type = %task.task_type,
            error = %e,
            "task failed"
        );
    }
}
