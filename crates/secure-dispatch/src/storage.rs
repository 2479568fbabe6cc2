use crate::Result;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Key/value persistence behind the outgoing message queue.
///
/// Values are JSON documents; keys are `/`-separated and listed by prefix.
pub trait StorageAdapter: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn put(&self, key: &str, value: String) -> Result<()>;
    fn del(&self, key: &str) -> Result<()>;
    /// Keys starting with `prefix`, in the form `get` accepts.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Process-local storage. Clones share the same map.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    entries: Arc<Mutex<BTreeMap<String, String>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StorageAdapter for InMemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    fn put(&self, key: &str, value: String) -> Result<()> {
        self.entries.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }

    fn del(&self, key: &str) -> Result<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let entries = self.entries.lock().unwrap();
        Ok(entries
            .range(prefix.to_string()..)
            .map(|(key, _)| key)
            .take_while(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}
