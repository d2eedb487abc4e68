use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tokio::sync::OwnedMutexGuard;

use crate::types::ItemKind;

type Key = (ItemKind, i64);

/// One async lock per pending item, made on demand.
///
/// Deciding on the same item is serialized, deciding on different items is
/// not. Entries are dropped as soon as nobody holds or waits on them.
#[derive(Debug, Default)]
pub struct DecisionLocks {
    map: Mutex<HashMap<Key, Arc<tokio::sync::Mutex<()>>>>,
}

/// Held while deciding on an item. Unlocks on drop.
pub struct DecisionGuard<'a> {
    locks: &'a DecisionLocks,
    key: Key,
    _guard: OwnedMutexGuard<()>,
}

impl DecisionLocks {
    fn map(&self) -> MutexGuard<'_, HashMap<Key, Arc<tokio::sync::Mutex<()>>>> {
        self.map.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait until nobody else is deciding on this item, then take the lock.
    pub async fn lock(&self, kind: ItemKind, id: i64) -> DecisionGuard<'_> {
        let key = (kind, id);
        let mutex = {
            let mut map = self.map();
            map.entry(key).or_default().clone()
        };

        DecisionGuard {
            locks: self,
            key,
            _guard: mutex.lock_owned().await,
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.map().len()
    }
}

impl Drop for DecisionGuard<'_> {
    fn drop(&mut self) {
        let mut map = self.locks.map();
        // One reference in the map, one in our guard. Anyone waiting holds another.
        if map
            .get(&self.key)
            .is_some_and(|mutex| Arc::strong_count(mutex) <= 2)
        {
            map.remove(&self.key);
        }
    }
}
