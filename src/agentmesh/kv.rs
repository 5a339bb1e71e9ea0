//! Shared key/value store contract.
//!
//! When a [`Registry`](crate::Registry) is configured with a shared store,
//! agent metadata, context traces, participants, and per-chat state are kept
//! in the store as UTF-8 JSON serializations so that every process handed
//! the same store observes the same state. Durability is whatever the store
//! provides; the framework adds none of its own.
//!
//! The contract is deliberately narrow: append-only lists, insertion-ordered
//! sets, and plain values, all addressed by string keys. The bundled
//! [`InMemoryKeyValueStore`] implements it for tests and single-host
//! deployments; a networked store client implements the same trait to span
//! processes.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Mutex;

use async_trait::async_trait;

/// A failure inside a key/value store backend.
#[derive(Debug)]
pub struct StoreError(pub String);

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key/value store error: {}", self.0)
    }
}

impl Error for StoreError {}

/// Narrow contract for a shared key/value store.
///
/// All values are raw bytes; callers decode with the message or chat
/// serializers. Keys are namespaced by the callers (`ctx:<name>:trace`,
/// `agents:<name>`, ...).
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Append a value to the list at `key`, creating the list if absent.
    async fn list_push(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;

    /// All values of the list at `key`, oldest first. Missing key yields an
    /// empty list.
    async fn list_range(&self, key: &str) -> Result<Vec<Vec<u8>>, StoreError>;

    /// Add a member to the insertion-ordered set at `key`. Returns `true`
    /// when the member was newly added.
    async fn set_add(&self, key: &str, member: Vec<u8>) -> Result<bool, StoreError>;

    /// Remove a member from the set at `key`. Missing members are ignored.
    async fn set_remove(&self, key: &str, member: &[u8]) -> Result<(), StoreError>;

    /// Members of the set at `key`, in insertion order.
    async fn set_members(&self, key: &str) -> Result<Vec<Vec<u8>>, StoreError>;

    /// Store a plain value at `key`, replacing any previous value.
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;

    /// The plain value at `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Remove every list, set, and value whose key starts with `prefix`.
    async fn delete_prefix(&self, prefix: &str) -> Result<(), StoreError>;
}

/// An in-process [`KeyValueStore`].
///
/// Cheap and always available; share one instance (behind an `Arc`) between
/// registries to emulate a cross-process store in tests.
#[derive(Default)]
pub struct InMemoryKeyValueStore {
    lists: Mutex<HashMap<String, Vec<Vec<u8>>>>,
    sets: Mutex<HashMap<String, Vec<Vec<u8>>>>,
    values: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn list_push(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        let mut lists = self.lists.lock().expect("kv lists poisoned");
        lists.entry(key.to_string()).or_default().push(value);
        Ok(())
    }

    async fn list_range(&self, key: &str) -> Result<Vec<Vec<u8>>, StoreError> {
        let lists = self.lists.lock().expect("kv lists poisoned");
        Ok(lists.get(key).cloned().unwrap_or_default())
    }

    async fn set_add(&self, key: &str, member: Vec<u8>) -> Result<bool, StoreError> {
        let mut sets = self.sets.lock().expect("kv sets poisoned");
        let set = sets.entry(key.to_string()).or_default();
        if set.iter().any(|m| *m == member) {
            Ok(false)
        } else {
            set.push(member);
            Ok(true)
        }
    }

    async fn set_remove(&self, key: &str, member: &[u8]) -> Result<(), StoreError> {
        let mut sets = self.sets.lock().expect("kv sets poisoned");
        if let Some(set) = sets.get_mut(key) {
            set.retain(|m| m != member);
        }
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<Vec<u8>>, StoreError> {
        let sets = self.sets.lock().expect("kv sets poisoned");
        Ok(sets.get(key).cloned().unwrap_or_default())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        let mut values = self.values.lock().expect("kv values poisoned");
        values.insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let values = self.values.lock().expect("kv values poisoned");
        Ok(values.get(key).cloned())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<(), StoreError> {
        self.lists
            .lock()
            .expect("kv lists poisoned")
            .retain(|k, _| !k.starts_with(prefix));
        self.sets
            .lock()
            .expect("kv sets poisoned")
            .retain(|k, _| !k.starts_with(prefix));
        self.values
            .lock()
            .expect("kv values poisoned")
            .retain(|k, _| !k.starts_with(prefix));
        Ok(())
    }
}
