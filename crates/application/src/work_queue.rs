//! Keyed work queue with per-key exclusivity and delayed re-adds.
//!
//! A key is handed to at most one worker at a time. Adding a key that is
//! being processed marks it dirty, and it is handed out again once the
//! current run calls [`WorkQueue::done`]. A key waiting in the delay set
//! keeps its earliest deadline.

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

struct QueueState<K> {
    ready: VecDeque<K>,
    queued: HashSet<K>,
    processing: HashSet<K>,
    dirty: HashSet<K>,
    delayed: HashMap<K, Instant>,
    shut_down: bool,
}

impl<K> Default for QueueState<K> {
    fn default() -> Self {
        Self {
            ready: VecDeque::new(),
            queued: HashSet::new(),
            processing: HashSet::new(),
            dirty: HashSet::new(),
            delayed: HashMap::new(),
            shut_down: false,
        }
    }
}

impl<K> QueueState<K>
where
    K: Clone + Eq + Hash,
{
    fn push(&mut self, key: K) -> bool {
        if self.processing.contains(&key) {
            self.dirty.insert(key);
            return false;
        }
        if !self.queued.insert(key.clone()) {
            return false;
        }
        self.ready.push_back(key);
        true
    }

    fn promote_due(&mut self, now: Instant) -> bool {
        let due = self
            .delayed
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(key, _)| key.clone())
            .collect::<Vec<_>>();

        let mut pushed = false;
        for key in due {
            self.delayed.remove(&key);
            pushed |= self.push(key);
        }
        pushed
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.delayed.values().min().copied()
    }
}

/// Work queue handing out keys to concurrent workers.
pub struct WorkQueue<K> {
    state: Mutex<QueueState<K>>,
    notify: Notify,
}

impl<K> Default for WorkQueue<K> {
    fn default() -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
        }
    }
}

impl<K> WorkQueue<K>
where
    K: Clone + Eq + Hash,
{
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `key` for immediate processing.
    pub fn add(&self, key: K) {
        let mut state = self.lock();
        if state.shut_down {
            return;
        }
        state.delayed.remove(&key);
        if state.push(key) {
            self.notify.notify_waiters();
        }
    }

    /// Queues `key` once `delay` has passed. An earlier pending deadline wins.
    pub fn add_after(&self, key: K, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }

        let deadline = Instant::now() + delay;
        let mut state = self.lock();
        if state.shut_down || state.queued.contains(&key) {
            return;
        }
        let earliest = state
            .delayed
            .get(&key)
            .map_or(deadline, |current| (*current).min(deadline));
        state.delayed.insert(key, earliest);
        drop(state);
        self.notify.notify_waiters();
    }

    /// Waits for the next key. Returns `None` once the queue is shut down.
    pub async fn next(&self) -> Option<K> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next_deadline = {
                let mut state = self.lock();
                if state.shut_down {
                    return None;
                }
                state.promote_due(Instant::now());
                if let Some(key) = state.ready.pop_front() {
                    state.queued.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
                state.next_deadline()
            };

            match next_deadline {
                Some(deadline) => {
                    tokio::select! {
                        () = &mut notified => {}
                        () = tokio::time::sleep_until(deadline) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Marks the run of `key` finished, re-queueing it when it was re-added
    /// meanwhile.
    pub fn done(&self, key: &K) {
        let mut state = self.lock();
        state.processing.remove(key);
        if state.dirty.remove(key) && !state.shut_down && state.push(key.clone()) {
            drop(state);
            self.notify.notify_waiters();
        }
    }

    /// Stops handing out keys and wakes every waiting worker. Runs already
    /// in flight still finish and call [`WorkQueue::done`].
    pub fn shutdown(&self) {
        let mut state = self.lock();
        state.shut_down = true;
        state.ready.clear();
        state.queued.clear();
        state.delayed.clear();
        state.dirty.clear();
        drop(state);
        self.notify.notify_waiters();
    }

    /// Returns the number of ready and delayed keys.
    #[must_use]
    pub fn len(&self) -> usize {
        let state = self.lock();
        state.ready.len() + state.delayed.len()
    }

    /// Returns whether no key is ready or delayed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<K>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
