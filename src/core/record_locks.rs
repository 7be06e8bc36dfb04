use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Per-record async locks that serialize operations on the same attachment id.
///
/// Entries are created on demand and removed once no holder or waiter remains, so the table
/// only contains ids with an operation in flight.
#[derive(Clone, Debug, Default)]
pub(crate) struct RecordLocks {
    locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl RecordLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn acquire(&self, id: Uuid) -> RecordGuard {
        // Cloned under the shard lock, so a concurrent release cannot drop the entry in between.
        let lock = Arc::clone(self.locks.entry(id).or_default().value());
        // Armed before waiting: a cancelled acquire still prunes the entry.
        let release = Release { id, locks: Arc::clone(&self.locks) };
        let guard = lock.lock_owned().await;
        RecordGuard { _guard: guard, _release: release }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.len()
    }
}

/// Holds the lock for one id. Fields drop in order, so the mutex is released before the
/// table entry is pruned.
#[derive(Debug)]
pub(crate) struct RecordGuard {
    _guard: OwnedMutexGuard<()>,
    _release: Release,
}

#[derive(Debug)]
struct Release {
    id: Uuid,
    locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl Drop for Release {
    fn drop(&mut self) {
        // Only the table's own reference left: nobody holds or waits on this id.
        self.locks.remove_if(&self.id, |_, lock| Arc::strong_count(lock) == 1);
    }
}
