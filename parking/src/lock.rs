use std::sync::Arc;

use abi::Id;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per parking lot. Slot selection, the slot status write
/// and the counter update of a lot never interleave within this process.
#[derive(Debug, Default)]
pub(crate) struct LotLocks {
    locks: DashMap<Id, Arc<Mutex<()>>>,
}

impl LotLocks {
    pub(crate) async fn acquire(&self, lot_id: Id) -> OwnedMutexGuard<()> {
        // clone the Arc out so the shard lock is released before awaiting
        let lock = self.locks.entry(lot_id).or_default().value().clone();
        lock.lock_owned().await
    }

    /// Forget the mutex of a deleted lot.
    pub(crate) fn remove(&self, lot_id: Id) {
        self.locks.remove(&lot_id);
    }
}
