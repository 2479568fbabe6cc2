use crate::{Message, Result, StorageAdapter};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub id: String,
    pub target_key: String,
    pub message: Message,
    pub created_at: u64,
    /// Orders entries queued within the same millisecond.
    #[serde(default)]
    pub seq: u64,
}

static NEXT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Messages left queued by a dispatch attempt, waiting for a caller retry.
#[derive(Clone)]
pub struct MessageQueue {
    storage: Arc<dyn StorageAdapter>,
    prefix: String,
}

impl MessageQueue {
    pub fn new(storage: Arc<dyn StorageAdapter>, prefix: impl Into<String>) -> Self {
        Self {
            storage,
            prefix: prefix.into(),
        }
    }

    fn key(&self, id: &str) -> String {
        format!("{}{}", self.prefix, id)
    }

    pub fn entry_id(target_key: &str, message_id: &str) -> String {
        format!("{}/{}", message_id, target_key)
    }

    /// Stores `message` for `target_key`, replacing an earlier entry for the
    /// same message.
    pub fn add(&self, target_key: &str, message: &Message) -> Result<String> {
        let id = Self::entry_id(target_key, &message.id);
        let (created_at, seq) = match self.get(&id)? {
            Some(existing) => (existing.created_at, existing.seq),
            None => (
                SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_millis() as u64,
                NEXT_SEQ.fetch_add(1, Ordering::Relaxed),
            ),
        };
        let entry = QueueEntry {
            id: id.clone(),
            target_key: target_key.to_string(),
            message: message.clone(),
            created_at,
            seq,
        };
        self.storage
            .put(&self.key(&id), serde_json::to_string(&entry)?)?;
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Result<Option<QueueEntry>> {
        let Some(raw) = self.storage.get(&self.key(id))? else {
            return Ok(None);
        };
        Ok(serde_json::from_str(&raw).ok())
    }

    fn entries(&self) -> Result<Vec<QueueEntry>> {
        let keys = self.storage.list(&self.prefix)?;
        let mut out = Vec::new();
        for key in keys {
            let Some(raw) = self.storage.get(&key)? else {
                continue;
            };
            let Ok(entry) = serde_json::from_str::<QueueEntry>(&raw) else {
                continue;
            };
            out.push(entry);
        }
        out.sort_by_key(|entry| (entry.created_at, entry.seq));
        Ok(out)
    }

    /// All queued entries, oldest first.
    pub fn all(&self) -> Result<Vec<QueueEntry>> {
        self.entries()
    }

    /// Entries for one conversation, oldest first.
    pub fn get_for_target(&self, target_key: &str) -> Result<Vec<QueueEntry>> {
        let mut entries = self.entries()?;
        entries.retain(|entry| entry.target_key == target_key);
        Ok(entries)
    }

    pub fn remove_for_target(&self, target_key: &str) -> Result<()> {
        for entry in self.get_for_target(target_key)? {
            self.remove(&entry.id)?;
        }
        Ok(())
    }

    pub fn remove(&self, id: &str) -> Result<()> {
        self.storage.del(&self.key(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FileStorageAdapter, InMemoryStorage};

    fn message(body: &str) -> Message {
        Message::new("alice@example.org/laptop".parse().unwrap(), body)
    }

    #[test]
    fn get_for_target_returns_oldest_first() {
        let storage: Arc<dyn StorageAdapter> = Arc::new(InMemoryStorage::new());
        let queue = MessageQueue::new(storage.clone(), "v1/test-queue/");
        let late = message("late");
        let early = message("early");

        for (msg, created_at) in [(&late, 200), (&early, 100)] {
            let id = MessageQueue::entry_id("bob@example.org", &msg.id);
            let entry = QueueEntry {
                id: id.clone(),
                target_key: "bob@example.org".to_string(),
                message: msg.clone(),
                created_at,
                seq: 0,
            };
            storage
                .put(
                    &format!("v1/test-queue/{}", id),
                    serde_json::to_string(&entry).unwrap(),
                )
                .unwrap();
        }

        let entries = queue.get_for_target("bob@example.org").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message.body, "early");
        assert_eq!(entries[1].message.body, "late");
    }

    #[test]
    fn same_millisecond_entries_keep_insertion_order() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let storage: Arc<dyn StorageAdapter> =
            Arc::new(FileStorageAdapter::new(temp_dir.path().to_path_buf()).unwrap());
        let queue = MessageQueue::new(storage.clone(), "v1/queue/");

        let bodies = ["first", "second", "third", "fourth"];
        for body in bodies {
            queue.add("bob@example.org", &message(body)).unwrap();
        }
        // Pin every entry to one timestamp so only the sequence can order them.
        for entry in queue.all().unwrap() {
            let pinned = QueueEntry {
                created_at: 1_000,
                ..entry
            };
            storage
                .put(
                    &format!("v1/queue/{}", pinned.id),
                    serde_json::to_string(&pinned).unwrap(),
                )
                .unwrap();
        }

        let order: Vec<_> = queue
            .get_for_target("bob@example.org")
            .unwrap()
            .into_iter()
            .map(|entry| entry.message.body)
            .collect();
        assert_eq!(order, bodies);
    }

    #[test]
    fn remove_for_target_reports_storage_errors() {
        struct ReadOnly(InMemoryStorage);

        impl StorageAdapter for ReadOnly {
            fn get(&self, key: &str) -> Result<Option<String>> {
                self.0.get(key)
            }
            fn put(&self, key: &str, value: String) -> Result<()> {
                self.0.put(key, value)
            }
            fn del(&self, _key: &str) -> Result<()> {
                Err(crate::Error::Storage("read-only".to_string()))
            }
            fn list(&self, prefix: &str) -> Result<Vec<String>> {
                self.0.list(prefix)
            }
        }

        let storage: Arc<dyn StorageAdapter> = Arc::new(ReadOnly(InMemoryStorage::new()));
        let queue = MessageQueue::new(storage, "v1/queue/");
        queue.add("bob@example.org", &message("stuck")).unwrap();

        assert!(queue.remove_for_target("bob@example.org").is_err());
        assert_eq!(queue.get_for_target("bob@example.org").unwrap().len(), 1);
    }

    #[test]
    fn re_adding_keeps_one_entry_per_message() {
        let storage: Arc<dyn StorageAdapter> = Arc::new(InMemoryStorage::new());
        let queue = MessageQueue::new(storage, "v1/queue/");
        let msg = message("hello");

        let first = queue.add("bob@example.org", &msg).unwrap();
        let second = queue.add("bob@example.org", &msg).unwrap();

        assert_eq!(first, second);
        assert_eq!(queue.get_for_target("bob@example.org").unwrap().len(), 1);
    }

    #[test]
    fn remove_for_target_leaves_other_conversations() {
        let storage: Arc<dyn StorageAdapter> = Arc::new(InMemoryStorage::new());
        let queue = MessageQueue::new(storage, "v1/queue/");
        let msg = message("hello");

        queue.add("bob@example.org", &msg).unwrap();
        queue.add("carol@example.org", &msg).unwrap();
        queue.remove_for_target("bob@example.org").unwrap();

        assert!(queue.get_for_target("bob@example.org").unwrap().is_empty());
        assert_eq!(queue.get_for_target("carol@example.org").unwrap().len(), 1);
    }

    #[test]
    fn works_over_file_storage() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let storage: Arc<dyn StorageAdapter> =
            Arc::new(FileStorageAdapter::new(temp_dir.path().to_path_buf()).unwrap());
        let queue = MessageQueue::new(storage, "v1/queue/");
        let msg = message("persisted");

        let id = queue.add("bob@example.org", &msg).unwrap();
        assert_eq!(queue.all().unwrap().len(), 1);

        queue.remove(&id).unwrap();
        assert!(queue.all().unwrap().is_empty());
    }
}
