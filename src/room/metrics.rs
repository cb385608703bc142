use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters for one room. Clones share the same counters, so the registry
/// can read them without taking the room lock.
#[derive(Clone, Default)]
pub struct RoomMetrics {
    ticks: Arc<AtomicU64>,
    commands: Arc<AtomicU64>,

    /// Mirrors the event log's append counter
    events_appended: Arc<AtomicU64>,

    replays: Arc<AtomicU64>,
    conflicts: Arc<AtomicU64>,
    last_tick_us: Arc<AtomicU64>,
}

impl RoomMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_tick(&self, duration_us: u64) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.last_tick_us.store(duration_us, Ordering::Relaxed);
    }

    /// Count a mutating command that reached the room
    pub fn record_command(&self) {
        self.commands.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_events_appended(&self, total: u64) {
        self.events_appended.store(total, Ordering::Relaxed);
    }

    /// Idempotent command answered from the store
    pub fn record_replay(&self) {
        self.replays.fetch_add(1, Ordering::Relaxed);
    }

    /// Transaction id reused with a different payload
    pub fn record_conflict(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_tick_count(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn get_snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            commands: self.commands.load(Ordering::Relaxed),
            events_appended: self.events_appended.load(Ordering::Relaxed),
            replays: self.replays.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            last_tick_us: self.last_tick_us.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of room metrics at a point in time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub ticks: u64,
    pub commands: u64,
    #[serde(rename = "eventsAppended")]
    pub events_appended: u64,
    pub replays: u64,
    pub conflicts: u64,
    #[serde(rename = "lastTickUs")]
    pub last_tick_us: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = RoomMetrics::new();
        metrics.record_tick(120);
        metrics.record_tick(80);
        metrics.record_command();
        metrics.record_replay();
        metrics.record_conflict();
        metrics.set_events_appended(7);

        let snapshot = metrics.get_snapshot();
        assert_eq!(snapshot.ticks, 2);
        assert_eq!(snapshot.last_tick_us, 80);
        assert_eq!(snapshot.commands, 1);
        assert_eq!(snapshot.replays, 1);
        assert_eq!(snapshot.conflicts, 1);
        assert_eq!(snapshot.events_appended, 7);
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = RoomMetrics::new();
        let reader = metrics.clone();
        metrics.record_command();
        metrics.record_command();
        assert_eq!(reader.get_snapshot().commands, 2);
    }
}
