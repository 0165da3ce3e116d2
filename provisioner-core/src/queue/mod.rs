//! Asynchronous task queue

pub mod engine;

pub use engine::{AsyncEngine, TaskSubmitter};

use crate::models::Task;
use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors raised by a task queue
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("task queue is closed")]
    Closed,

    #[error("task queue is already running")]
    AlreadyRunning,

    #[error("{0}")]
    Backend(String),
}

/// Accepts tasks for asynchronous, at-least-once execution
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn submit(&self, task: Task) -> Result<(), QueueError>;
}

/// Executes tasks of one type
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(
        &self,
        scope: &CancellationToken,
        args: &HashMap<String, String>,
    ) -> anyhow::Result<()>;
}
