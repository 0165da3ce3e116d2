//! Durable instance storage

pub mod file;
pub mod memory;

pub use file::JsonFileInstanceStore;
pub use memory::MemoryInstanceStore;

use crate::models::Instance;
use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by an instance store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store lock poisoned")]
    Poisoned,

    #[error("{0}")]
    Backend(String),
}

/// Key-value store of instances keyed by instance ID.
///
/// Implementations must give read-your-writes consistency for a single
/// instance within one process.
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Load an instance; `Ok(None)` when it does not exist
    async fn get(&self, instance_id: &str) -> Result<Option<Instance>, StoreError>;

    /// Insert or replace an instance
    async fn write(&self, instance: &Instance) -> Result<(), StoreError>;
}
