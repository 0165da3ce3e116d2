//! Instance persistence using JSON file storage

use super::{InstanceStore, StoreError};
use crate::models::Instance;
use async_trait::async_trait;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Root JSON document holding every instance
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct JsonStore {
    /// Instances keyed by instance ID
    pub instances: BTreeMap<String, Instance>,
}

/// Write-through instance store persisted to a single JSON file
pub struct JsonFileInstanceStore {
    /// Path to JSON store file
    store_path: PathBuf,
    /// In-memory copy of the file contents
    store: Mutex<JsonStore>,
}

impl JsonFileInstanceStore {
    /// Open a store, loading existing contents when the file exists
    pub fn new<P: AsRef<Path>>(store_path: P) -> Result<Self, StoreError> {
        let store_path = store_path.as_ref().to_path_buf();

        if let Some(parent) = store_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let store = if store_path.exists() {
            Self::load_store(&store_path)?
        } else {
            JsonStore::default()
        };

        Ok(Self {
            store_path,
            store: Mutex::new(store),
        })
    }

    pub fn path(&self) -> &Path {
        &self.store_path
    }

    /// Load JSON store from file with file locking
    fn load_store(path: &Path) -> Result<JsonStore, StoreError> {
        let file = File::open(path)?;

        // Shared lock for reading, released when the reader is dropped
        file.lock_shared()?;

        let mut contents = String::new();
        let mut reader = std::io::BufReader::new(file);
        reader.read_to_string(&mut contents)?;
        drop(reader);

        if contents.is_empty() {
            return Ok(JsonStore::default());
        }

        Ok(serde_json::from_str(&contents)?)
    }

    /// Save JSON store to file with file locking
    fn save_store(&self, store: &JsonStore) -> Result<(), StoreError> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.store_path)?;

        // Truncate only under the lock so readers never observe an empty file
        file.lock_exclusive()?;
        file.set_len(0)?;

        let json = serde_json::to_string_pretty(store)?;

        let mut writer = std::io::BufWriter::new(file);
        writer.write_all(json.as_bytes())?;
        writer.flush()?;

        Ok(())
    }
}

#[async_trait]
impl InstanceStore for JsonFileInstanceStore {
    async fn get(&self, instance_id: &str) -> Result<Option<Instance>, StoreError> {
        let store = self.store.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(store.instances.get(instance_id).cloned())
    }

    async fn write(&self, instance: &Instance) -> Result<(), StoreError> {
        let mut store = self.store.lock().map_err(|_| StoreError::Poisoned)?;
        let previous = store
            .instances
            .insert(instance.instance_id.clone(), instance.clone());

        if let Err(e) = self.save_store(&store) {
            // Keep memory in step with the file when the write did not land
            match previous {
                Some(previous) => store.instances.insert(instance.instance_id.clone(), previous),
                None => store.instances.remove(&instance.instance_id),
            };
            return Err(e);
        }

        Ok(())
    }
}
