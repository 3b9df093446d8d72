//! Per-key cancellable delayed callbacks.
//!
//! Each key owns at most one waiting timer. Scheduling again for the same key
//! aborts the waiting timer and starts a fresh one, so only the last callback
//! in a burst runs. Once a timer fires, its callback runs on a separate task and
//! is no longer affected by `cancel`.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug)]
pub struct Debouncer<K> {
    delay: Duration,
    timers: Mutex<HashMap<K, JoinHandle<()>>>,
}

impl<K> Debouncer<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            timers: Mutex::new(HashMap::new()),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `callback` after the quiet period unless `key` is scheduled or
    /// cancelled again first. Must be called from within a tokio runtime.
    pub fn schedule<F>(&self, key: K, callback: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay;
        let mut timers = self.timers();
        if let Some(previous) = timers.remove(&key) {
            previous.abort();
        }
        timers.retain(|_, handle| !handle.is_finished());
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tokio::spawn(callback);
        });
        timers.insert(key, handle);
    }

    /// Cancel the waiting timer for `key`. Returns whether one was waiting.
    pub fn cancel(&self, key: &K) -> bool {
        match self.timers().remove(key) {
            Some(handle) => {
                let waiting = !handle.is_finished();
                handle.abort();
                waiting
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        for (_, handle) in self.timers().drain() {
            handle.abort();
        }
    }

    pub fn is_scheduled(&self, key: &K) -> bool {
        self.timers()
            .get(key)
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    fn timers(&self) -> MutexGuard<'_, HashMap<K, JoinHandle<()>>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.timers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<K> Drop for Debouncer<K> {
    fn drop(&mut self) {
        let timers = match self.timers.get_mut() {
            Ok(timers) => timers,
            Err(poisoned) => poisoned.into_inner(),
        };
        for (_, handle) in timers.drain() {
            handle.abort();
        }
    }
}
