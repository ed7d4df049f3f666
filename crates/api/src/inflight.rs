use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-key mutual exclusion; entries live only while someone holds or waits on them
#[derive(Clone, Default)]
pub struct InFlight {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other request holds `key`
    pub async fn acquire(&self, key: &str) -> InFlightGuard {
        let lock = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();

        // Owns the map entry while waiting, so a cancelled waiter still cleans up
        let entry = EntryHandle {
            key: key.to_string(),
            locks: self.locks.clone(),
            lock,
        };
        let guard = entry.lock.clone().lock_owned().await;

        InFlightGuard {
            _guard: guard,
            _entry: entry,
        }
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Held for the duration of one request on a key
pub struct InFlightGuard {
    // Field order matters: the lock is released before the entry cleanup runs
    _guard: OwnedMutexGuard<()>,
    _entry: EntryHandle,
}

struct EntryHandle {
    key: String,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    lock: Arc<Mutex<()>>,
}

impl Drop for EntryHandle {
    fn drop(&mut self) {
        // Map entry plus this handle: no holder or waiter is left
        self.locks.remove_if(self.key.as_str(), |_, lock| {
            Arc::ptr_eq(lock, &self.lock) && Arc::strong_count(lock) == 2
        });
    }
}
