//! Keyed turns
//!
//! One async lock per key, created on first use and forgotten once nobody
//! holds or waits on it. The gateway takes a turn per chat around
//! append-and-broadcast and per user around presence transitions.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

type Slot = Arc<tokio::sync::Mutex<()>>;

pub struct KeyedTurns<K> {
    slots: Mutex<HashMap<K, Slot>>,
}

impl<K> Default for KeyedTurns<K> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

/// Exclusive turn on one key; released on drop
pub struct Turn<'a, K: Hash + Eq + Copy> {
    table: &'a KeyedTurns<K>,
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Hash + Eq + Copy> KeyedTurns<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the turn on `key`. Cancelling the wait leaves no slot behind.
    pub async fn acquire(&self, key: K) -> Turn<'_, K> {
        let mut turn = Turn {
            table: self,
            key,
            guard: None,
        };
        let wait = self.slot(key).lock_owned();
        turn.guard = Some(wait.await);
        turn
    }

    /// Number of keys with a holder or waiter
    pub fn active(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn clear(&self) {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    fn slot(&self, key: K) -> Slot {
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(key)
            .or_default()
            .clone()
    }

    fn release(&self, key: K) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if slots
            .get(&key)
            .is_some_and(|slot| Arc::strong_count(slot) == 1)
        {
            slots.remove(&key);
        }
    }
}

impl<K: Hash + Eq + Copy> Drop for Turn<'_, K> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.table.release(self.key);
    }
}
