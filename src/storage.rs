//! Configuration Store
//!
//! Namespaced key-value persistence backed by a shared JSON document. Each
//! generator gets a namespace inside the document; every mutation re-reads
//! the whole document, replaces only the caller's namespace, and writes the
//! document back, so namespaces owned by other consumers survive. Writes are
//! routed through the staging store and reach disk with the next commit.
//!
//! There is no cross-process locking: an external modification landing
//! between the read and the write of one mutation is lost.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::warn;

use crate::error::EngineError;
use crate::staging::StagingStore;

/// Handle on one namespace of a JSON storage document.
#[derive(Clone)]
pub struct Storage {
    namespace: String,
    staging: Arc<StagingStore>,
    path: PathBuf,
    existed: bool,
}

impl Storage {
    /// Bind a namespace inside the document at `path`.
    pub fn new(namespace: impl Into<String>, staging: Arc<StagingStore>, path: PathBuf) -> Self {
        let namespace = namespace.into();
        let existed = !Self::load_namespace(&staging, &path, &namespace).is_empty();
        Self {
            namespace,
            staging,
            path,
            existed,
        }
    }

    /// Whether the namespace held any values when this handle was created.
    pub fn existed(&self) -> bool {
        self.existed
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn load_namespace(staging: &StagingStore, path: &PathBuf, namespace: &str) -> Map<String, Value> {
        let document = match staging.read_json(path, Value::Object(Map::new())) {
            Ok(value) => value,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Unreadable storage document, treating as empty");
                Value::Object(Map::new())
            }
        };
        document
            .get(namespace)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default()
    }

    fn store(&self) -> Map<String, Value> {
        Self::load_namespace(&self.staging, &self.path, &self.namespace)
    }

    /// Write the namespace back, preserving co-resident namespaces.
    fn persist(&self, values: Map<String, Value>) -> Result<(), EngineError> {
        let mut document = self
            .staging
            .read_json(&self.path, Value::Object(Map::new()))?;
        match document.as_object_mut() {
            Some(map) => {
                map.insert(self.namespace.clone(), Value::Object(values));
            }
            None => {
                return Err(EngineError::Storage(format!(
                    "storage document at {} is not a JSON object",
                    self.path.display()
                )));
            }
        }
        self.staging.write_json(&self.path, &document)
    }

    /// Get a stored value.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.store().get(key).cloned()
    }

    /// All values in this namespace.
    pub fn get_all(&self) -> Map<String, Value> {
        self.store()
    }

    /// Assign a key and persist.
    pub fn set(&self, key: &str, value: Value) -> Result<(), EngineError> {
        let mut store = self.store();
        store.insert(key.to_string(), value);
        self.persist(store)
    }

    /// Merge a map of values into the namespace and persist.
    pub fn set_many(&self, values: Map<String, Value>) -> Result<(), EngineError> {
        let mut store = self.store();
        store.extend(values);
        self.persist(store)
    }

    /// Remove a key and persist.
    pub fn delete(&self, key: &str) -> Result<(), EngineError> {
        let mut store = self.store();
        store.remove(key);
        self.persist(store)
    }

    /// Fill in defaults for missing keys; existing keys win. Returns the
    /// merged namespace.
    pub fn defaults(&self, defaults: Map<String, Value>) -> Result<Map<String, Value>, EngineError> {
        let mut store = self.store();
        for (key, value) in defaults {
            store.entry(key).or_insert(value);
        }
        self.persist(store.clone())?;
        Ok(store)
    }
}
