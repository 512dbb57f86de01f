//! Expiring value
//!
//! Holds a temporary value (e.g. a banner) with an expiry instant and at most
//! one pending clear timer. Setting a new value always aborts the previous
//! timer first, and dropping the holder cancels any pending timer.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

struct Slot<T> {
    value: Option<T>,
    expires_at: Option<Instant>,
    /// Bumped on every set/clear so a stale timer never clears a newer value
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

pub struct ExpiringValue<T> {
    slot: Arc<Mutex<Slot<T>>>,
}

fn lock<T>(slot: &Mutex<Slot<T>>) -> MutexGuard<'_, Slot<T>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<T: Clone + Send + 'static> ExpiringValue<T> {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot {
                value: None,
                expires_at: None,
                generation: 0,
                timer: None,
            })),
        }
    }

    /// Replace the value; it is cleared after `ttl`
    ///
    /// Must be called from within a tokio runtime.
    pub fn set(&self, value: T, ttl: Duration) {
        let mut slot = lock(&self.slot);
        if let Some(previous) = slot.timer.take() {
            previous.abort();
        }
        slot.generation += 1;
        slot.value = Some(value);
        slot.expires_at = Some(Instant::now() + ttl);

        let generation = slot.generation;
        let weak = Arc::downgrade(&self.slot);
        slot.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Some(shared) = weak.upgrade() {
                let mut slot = lock(&shared);
                if slot.generation == generation {
                    slot.value = None;
                    slot.expires_at = None;
                    slot.timer = None;
                }
            }
        }));
    }

    /// Current value, or `None` once expired
    pub fn get(&self) -> Option<T> {
        let slot = lock(&self.slot);
        match slot.expires_at {
            Some(at) if Instant::now() >= at => None,
            _ => slot.value.clone(),
        }
    }

    pub fn clear(&self) {
        let mut slot = lock(&self.slot);
        if let Some(timer) = slot.timer.take() {
            timer.abort();
        }
        slot.generation += 1;
        slot.value = None;
        slot.expires_at = None;
    }

    pub fn has_pending_timer(&self) -> bool {
        lock(&self.slot)
            .timer
            .as_ref()
            .map_or(false, |timer| !timer.is_finished())
    }
}

impl<T: Clone + Send + 'static> Default for ExpiringValue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for ExpiringValue<T> {
    fn drop(&mut self) {
        if let Some(timer) = lock(&self.slot).timer.take() {
            timer.abort();
        }
    }
}
