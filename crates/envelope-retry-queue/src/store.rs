//! Queue persistence.

use crate::{PersistedQueue, QueueResult};
use parking_lot::Mutex;
use plainflow_storage::{KeyValueStorage, StorageKeys};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Reads and writes one queue's sequence in a [`KeyValueStorage`].
///
/// Every operation re-reads the stored value, so several handles over the
/// same storage observe each other's writes. Writes from separate processes
/// are last-write-wins.
pub struct QueueStore {
    storage: Arc<dyn KeyValueStorage>,
    key: String,
    lock: Mutex<()>,
}

impl QueueStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>, name: &str) -> Self {
        Self {
            storage,
            key: StorageKeys::queue(name),
            lock: Mutex::new(()),
        }
    }

    /// Storage key holding the sequence.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Key an undecodable sequence is moved to.
    pub fn corrupt_key(&self) -> String {
        format!("{}.corrupt", self.key)
    }

    /// Current persisted sequence.
    pub fn load(&self) -> QueueResult<PersistedQueue> {
        let _guard = self.lock.lock();
        self.read()
    }

    /// Apply `f` to the persisted sequence and write it back.
    pub fn update<R>(&self, f: impl FnOnce(&mut PersistedQueue) -> R) -> QueueResult<R> {
        let _guard = self.lock.lock();
        let mut queue = self.read()?;
        let result = f(&mut queue);
        self.write(&queue)?;
        Ok(result)
    }

    fn read(&self) -> QueueResult<PersistedQueue> {
        let Some(raw) = self.storage.get(&self.key)? else {
            return Ok(PersistedQueue::default());
        };
        let mut queue: PersistedQueue = match serde_json::from_str(&raw) {
            Ok(queue) => queue,
            Err(err) => {
                self.quarantine(&raw, &err);
                return Ok(PersistedQueue::default());
            }
        };
        if queue.repair() {
            debug!(key = %self.key, "Repaired persisted queue order");
        }
        Ok(queue)
    }

    /// Move an undecodable sequence aside so the queue starts over empty.
    fn quarantine(&self, raw: &str, err: &serde_json::Error) {
        let corrupt_key = self.corrupt_key();
        error!(
            key = %self.key,
            moved_to = %corrupt_key,
            error = %err,
            "Persisted queue is unreadable, starting empty"
        );
        if let Err(err) = self.storage.set(&corrupt_key, raw) {
            warn!(key = %corrupt_key, error = %err, "Failed to keep unreadable queue");
        }
        if let Err(err) = self.storage.remove(&self.key) {
            warn!(key = %self.key, error = %err, "Failed to clear unreadable queue");
        }
    }

    fn write(&self, queue: &PersistedQueue) -> QueueResult<()> {
        let raw = serde_json::to_string(queue)?;
        self.storage.set(&self.key, &raw)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use payload_normalizer::{CallPath, Envelope};
    use plainflow_storage::CookieStorage;

    #[test]
    fn test_empty_store_loads_default() {
        let store = QueueStore::new(Arc::new(CookieStorage::new()), "default");
        assert_eq!(store.key(), "pf.queue.default");
        assert_eq!(store.load().unwrap(), PersistedQueue::default());
    }

    #[test]
    fn test_handles_share_state() {
        let storage: Arc<dyn KeyValueStorage> = Arc::new(CookieStorage::new());
        let first = QueueStore::new(storage.clone(), "default");
        let second = QueueStore::new(storage.clone(), "default");
        let other = QueueStore::new(storage, "other");

        first
            .update(|q| q.push(CallPath::Track, Envelope::new()))
            .unwrap();
        let sequence = second
            .update(|q| q.push(CallPath::Page, Envelope::new()))
            .unwrap();

        assert_eq!(sequence, 1);
        assert_eq!(first.load().unwrap().entries.len(), 2);
        assert!(other.load().unwrap().entries.is_empty());
    }

    #[test]
    fn test_corrupt_value_is_moved_aside() {
        let storage: Arc<dyn KeyValueStorage> = Arc::new(CookieStorage::new());
        storage.set("pf.queue.default", "{truncated").unwrap();
        let store = QueueStore::new(storage.clone(), "default");

        assert_eq!(store.load().unwrap(), PersistedQueue::default());
        assert!(!storage.has("pf.queue.default").unwrap());
        assert_eq!(
            storage.get("pf.queue.default.corrupt").unwrap().as_deref(),
            Some("{truncated")
        );
    }

    #[test]
    fn test_update_recovers_from_corrupt_value() {
        let storage: Arc<dyn KeyValueStorage> = Arc::new(CookieStorage::new());
        storage.set("pf.queue.default", "not json").unwrap();
        let store = QueueStore::new(storage, "default");

        let sequence = store
            .update(|q| q.push(CallPath::Track, Envelope::new()))
            .unwrap();
        assert_eq!(sequence, 0);
        assert_eq!(store.load().unwrap().entries.len(), 1);
    }
}
