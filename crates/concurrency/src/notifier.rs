//! Result Notifier
//!
//! A PREPARE returns before the transaction commits, so the final result of
//! a planned execution is delivered asynchronously. Shards publish results
//! here; clients block on `wait` until the result for their key arrives.
//!
//! Each key owns its own slot (mutex + condvar) in a `DashMap`, so waiters
//! for distinct transactions never block each other. A result published
//! before anyone waits is buffered in its slot until claimed.
//!
//! ## Slot lifetime
//!
//! A slot is removed as soon as it holds no result and no waiter, whether
//! the last waiter got its result or timed out. Results nobody claims (for
//! example STALE answers for abandoned transactions) are evicted once they
//! have been buffered for longer than the retention period; the sweep runs
//! from `publish` at most once per retention period.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use stepshard_core::{ShardId, TxId, WriteResult};

/// How long an unclaimed result stays buffered by default
pub const DEFAULT_RESULT_RETENTION: Duration = Duration::from_secs(60);

/// Identifies one awaited result: the shard that produces it and the
/// transaction it belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResultKey {
    /// Producing shard
    pub origin: ShardId,
    /// Transaction
    pub tx_id: TxId,
}

impl ResultKey {
    /// Key for `tx_id` on `origin`
    pub fn new(origin: ShardId, tx_id: TxId) -> Self {
        ResultKey { origin, tx_id }
    }

    /// Key a result will be published under
    pub fn of(result: &WriteResult) -> Self {
        ResultKey::new(result.origin, result.tx_id)
    }
}

#[derive(Debug, Default)]
struct SlotState {
    result: Option<(WriteResult, Instant)>,
    waiters: usize,
}

impl SlotState {
    fn take(&mut self) -> Option<WriteResult> {
        self.result.take().map(|(result, _)| result)
    }

    fn is_idle(&self) -> bool {
        self.result.is_none() && self.waiters == 0
    }

    fn is_stale(&self, now: Instant, retention: Duration) -> bool {
        self.waiters == 0
            && matches!(&self.result, Some((_, at)) if now.saturating_duration_since(*at) >= retention)
    }
}

#[derive(Debug, Default)]
struct Slot {
    state: Mutex<SlotState>,
    ready: Condvar,
}

/// Buffers asynchronous results until a client claims them
#[derive(Debug)]
pub struct ResultNotifier {
    slots: DashMap<ResultKey, Arc<Slot>>,
    retention: Duration,
    last_sweep: Mutex<Instant>,
}

impl Default for ResultNotifier {
    fn default() -> Self {
        Self::with_retention(DEFAULT_RESULT_RETENTION)
    }
}

impl ResultNotifier {
    /// Empty notifier with the default retention
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty notifier evicting unclaimed results after `retention`
    pub fn with_retention(retention: Duration) -> Self {
        ResultNotifier {
            slots: DashMap::new(),
            retention,
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    /// Deliver a result, waking any waiter on its key
    ///
    /// A later publish for the same key replaces an unclaimed earlier one.
    pub fn publish(&self, result: WriteResult) {
        self.sweep_if_due();

        let key = ResultKey::of(&result);
        trace!(target: "stepshard::notify", origin = %key.origin, tx_id = %key.tx_id, status = %result.status, "Result published");
        // The slot is filled while the map entry is held so a concurrent
        // release cannot remove it in between.
        let entry = self.slots.entry(key).or_default();
        let slot = entry.value();
        slot.state.lock().result = Some((result, Instant::now()));
        slot.ready.notify_all();
    }

    /// Block until the result for `key` is available or `timeout` elapses
    ///
    /// Returns `None` on timeout. A result arriving after the timeout is
    /// still buffered for a later `wait` or `try_take`.
    pub fn wait(&self, key: ResultKey, timeout: Duration) -> Option<WriteResult> {
        let deadline = Instant::now() + timeout;
        let slot = self.register_waiter(key);
        let taken = {
            let mut state = slot.state.lock();
            let taken = loop {
                if let Some(result) = state.take() {
                    break Some(result);
                }
                if slot.ready.wait_until(&mut state, deadline).timed_out() {
                    break state.take();
                }
            };
            state.waiters -= 1;
            taken
        };
        self.release(key, &slot);
        if taken.is_none() {
            debug!(target: "stepshard::notify", origin = %key.origin, tx_id = %key.tx_id, ?timeout, "Wait timed out");
        }
        taken
    }

    /// Claim a buffered result without blocking
    pub fn try_take(&self, key: ResultKey) -> Option<WriteResult> {
        let slot = self.slots.get(&key).map(|s| Arc::clone(s.value()))?;
        let taken = slot.state.lock().take();
        if taken.is_some() {
            self.release(key, &slot);
        }
        taken
    }

    /// Number of keys with a slot (buffered results or registered waiters)
    pub fn buffered_count(&self) -> usize {
        self.slots.len()
    }

    /// Evict unclaimed results buffered for longer than the retention
    /// period; returns how many were dropped
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        *self.last_sweep.lock() = now;
        let retention = self.retention;
        let before = self.slots.len();
        self.slots
            .retain(|_, slot| !slot.state.lock().is_stale(now, retention));
        let evicted = before.saturating_sub(self.slots.len());
        if evicted > 0 {
            debug!(target: "stepshard::notify", evicted, ?retention, "Unclaimed results evicted");
        }
        evicted
    }

    fn sweep_if_due(&self) {
        let due = self.last_sweep.lock().elapsed() >= self.retention;
        if due {
            self.sweep();
        }
    }

    // The waiter is counted while the map entry is held, so the slot cannot
    // be released between lookup and registration.
    fn register_waiter(&self, key: ResultKey) -> Arc<Slot> {
        let entry = self.slots.entry(key).or_default();
        entry.value().state.lock().waiters += 1;
        Arc::clone(entry.value())
    }

    /// Drop the slot once it holds neither a result nor a waiter, unless it
    /// was replaced
    fn release(&self, key: ResultKey, slot: &Arc<Slot>) {
        self.slots.remove_if(&key, |_, current| {
            Arc::ptr_eq(current, slot) && current.state.lock().is_idle()
        });
    }
}
