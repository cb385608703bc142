//! Exactly-once guard for mutating commands.
//!
//! A command is keyed by `(agent, room, transaction)`. The first successful
//! execution stores its result; retries with the same payload replay that
//! result instead of executing again, and a different payload under the same
//! key is a conflict.

use crate::clock::SharedClock;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

mod hash;
#[cfg(test)]
mod tests;

pub use hash::payload_hash;

/// Default entry lifetime: 10 minutes
pub const DEFAULT_TTL_MS: i64 = 600_000;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey {
    pub agent_id: String,
    pub room_id: String,
    pub tx_id: String,
}

impl IdempotencyKey {
    pub fn new(agent_id: &str, room_id: &str, tx_id: &str) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            room_id: room_id.to_string(),
            tx_id: tx_id.to_string(),
        }
    }
}

/// Outcome of looking up a transaction before executing it
#[derive(Debug, Clone, PartialEq)]
pub enum IdempotencyCheck<T> {
    /// Not seen (or expired): safe to execute
    New,
    /// Already executed with this payload: return the stored result
    Replay(T),
    /// Transaction id reused with a different payload
    Conflict(IdempotencyConflict),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IdempotencyConflict {
    pub tx_id: String,
}

impl fmt::Display for IdempotencyConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "transaction '{}' was already used with a different payload",
            self.tx_id
        )
    }
}

impl std::error::Error for IdempotencyConflict {}

struct IdempotencyEntry<T> {
    payload_hash: String,
    result: T,
    expires_at_ms: i64,
}

/// TTL-bounded store of executed transactions.
///
/// Cheap to clone; clones share the same entries.
pub struct IdempotencyStore<T> {
    entries: Arc<Mutex<HashMap<IdempotencyKey, IdempotencyEntry<T>>>>,
    ttl_ms: i64,
    clock: SharedClock,
}

impl<T> Clone for IdempotencyStore<T> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            ttl_ms: self.ttl_ms,
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<T: Clone> IdempotencyStore<T> {
    pub fn new(ttl_ms: i64, clock: SharedClock) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl_ms,
            clock,
        }
    }

    pub fn with_default_ttl(clock: SharedClock) -> Self {
        Self::new(DEFAULT_TTL_MS, clock)
    }

    /// Look up a transaction. Expired entries are removed and reported as new.
    pub fn check(
        &self,
        agent_id: &str,
        room_id: &str,
        tx_id: &str,
        payload: &Value,
    ) -> IdempotencyCheck<T> {
        let key = IdempotencyKey::new(agent_id, room_id, tx_id);
        let now = self.clock.now_ms();
        let mut entries = self.lock();

        let expired = match entries.get(&key) {
            None => return IdempotencyCheck::New,
            Some(entry) => now >= entry.expires_at_ms,
        };
        if expired {
            entries.remove(&key);
            return IdempotencyCheck::New;
        }

        let hash = payload_hash(payload);
        match entries.get(&key) {
            Some(entry) if entry.payload_hash == hash => IdempotencyCheck::Replay(entry.result.clone()),
            Some(_) => IdempotencyCheck::Conflict(IdempotencyConflict {
                tx_id: tx_id.to_string(),
            }),
            None => IdempotencyCheck::New,
        }
    }

    /// Record the result of an executed transaction, replacing any prior entry
    pub fn save(&self, agent_id: &str, room_id: &str, tx_id: &str, payload: &Value, result: T) {
        let entry = IdempotencyEntry {
            payload_hash: payload_hash(payload),
            result,
            expires_at_ms: self.clock.now_ms() + self.ttl_ms,
        };

        self.lock()
            .insert(IdempotencyKey::new(agent_id, room_id, tx_id), entry);
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| now < entry.expires_at_ms);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn ttl_ms(&self) -> i64 {
        self.ttl_ms
    }

    // Entries stay consistent across a panic elsewhere: every mutation is a single insert/remove
    fn lock(&self) -> MutexGuard<'_, HashMap<IdempotencyKey, IdempotencyEntry<T>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Background task to periodically remove expired entries
pub async fn run_idempotency_sweep<T: Clone>(store: IdempotencyStore<T>, interval_seconds: u64) {
    let mut ticker = interval(Duration::from_secs(interval_seconds.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let removed = store.sweep_expired();
        debug!(
            removed = removed,
            remaining = store.len(),
            "Idempotency sweep complete"
        );
    }
}

/// Owns the sweep task; stopping or dropping the handle stops the timer.
pub struct SweepHandle {
    task: JoinHandle<()>,
}

impl SweepHandle {
    pub fn stop(self) {
        // Drop does the abort
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawn the sweep task on the current tokio runtime
pub fn spawn_sweep<T>(store: IdempotencyStore<T>, interval_seconds: u64) -> SweepHandle
where
    T: Clone + Send + 'static,
{
    SweepHandle {
        task: tokio::spawn(run_idempotency_sweep(store, interval_seconds)),
    }
}
