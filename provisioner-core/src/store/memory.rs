//! In-memory instance store

use super::{InstanceStore, StoreError};
use crate::models::Instance;
use async_trait::async_trait;
use dashmap::DashMap;

/// Instance store backed by a concurrent map
#[derive(Debug, Default)]
pub struct MemoryInstanceStore {
    instances: DashMap<String, Instance>,
}

impl MemoryInstanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

#[async_trait]
impl InstanceStore for MemoryInstanceStore {
    async fn get(&self, instance_id: &str) -> Result<Option<Instance>, StoreError> {
        Ok(self
            .instances
            .get(instance_id)
            .map(|entry| entry.value().clone()))
    }

    async fn write(&self, instance: &Instance) -> Result<(), StoreError> {
        self.instances
            .insert(instance.instance_id.clone(), instance.clone());
        Ok(())
    }
}
