use crate::clock::SharedClock;
use crate::event::cursor::{decode_cursor, encode_cursor, CursorParts};
use crate::event::{EventType, RoomEvent};
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Broadcast capacity for live subscribers
const BROADCAST_CAPACITY: usize = 1000;

/// Result of a cursor read
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EventBatch {
    pub events: Vec<RoomEvent>,
    #[serde(rename = "nextCursor")]
    pub next_cursor: String,
    /// The requested cursor fell out of the retained window; resync with `next_cursor`
    #[serde(rename = "cursorExpired")]
    pub cursor_expired: bool,
}

struct LogEntry {
    sequence: u64,
    event: RoomEvent,
}

/// Append-only, bounded history of room events.
///
/// Capacity overflow evicts the oldest tenth in one go; `cleanup` drops
/// everything older than the retention window. Both record the highest
/// evicted sequence so reads can tell an evicted cursor from a fresh one.
pub struct EventLog {
    entries: VecDeque<LogEntry>,

    /// Wall-clock anchor that cursor times are relative to
    epoch_ms: i64,

    /// Last assigned sequence number (0 = none yet)
    sequence: u64,

    /// Relative time of the last generated cursor, never decreases
    last_relative_ms: u64,

    /// Highest sequence number removed from the buffer (0 = nothing evicted)
    evicted_through: u64,

    retention_ms: i64,
    max_size: usize,
    clock: SharedClock,
    tx: broadcast::Sender<RoomEvent>,
}

impl EventLog {
    pub fn new(retention_ms: i64, max_size: usize, clock: SharedClock) -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let epoch_ms = clock.now_ms();

        Self {
            entries: VecDeque::with_capacity(max_size.clamp(1, 4096)),
            epoch_ms,
            sequence: 0,
            last_relative_ms: 0,
            evicted_through: 0,
            retention_ms,
            max_size: max_size.max(1),
            clock,
            tx,
        }
    }

    /// Append an event and return its cursor
    pub fn append(&mut self, event_type: EventType, room_id: &str, payload: Value) -> String {
        if self.entries.len() >= self.max_size {
            let count = (self.max_size / 10).max(1);
            self.evict_oldest(count);
        }

        let timestamp_ms = self.clock.now_ms();
        self.sequence += 1;
        let cursor = encode_cursor(CursorParts {
            relative_ms: self.relative_now(timestamp_ms),
            sequence: self.sequence,
        });

        let event = RoomEvent {
            cursor: cursor.clone(),
            event_type,
            room_id: room_id.to_string(),
            timestamp_ms,
            payload,
        };

        // No subscribers is fine
        let _ = self.tx.send(event.clone());

        self.entries.push_back(LogEntry {
            sequence: self.sequence,
            event,
        });

        cursor
    }

    /// Read up to `limit` events after `cursor`.
    ///
    /// An empty cursor reads from the oldest retained event. A cursor that
    /// cannot be placed in the retained window is reported as expired, with
    /// `next_cursor` set to the current cursor so one more call recovers.
    pub fn get_since(&self, cursor: &str, limit: usize) -> EventBatch {
        if cursor.is_empty() {
            return self.batch_from(0, limit, None);
        }

        if let Ok(idx) = self
            .entries
            .binary_search_by(|entry| entry.event.cursor.as_str().cmp(cursor))
        {
            return self.batch_from(idx + 1, limit, Some(cursor));
        }

        let newest = match self.entries.back() {
            Some(entry) => entry.sequence,
            // Nothing to compare against: a bootstrap cursor, caught up by definition
            None => return self.caught_up(cursor),
        };

        let parts = match decode_cursor(cursor) {
            Ok(parts) => parts,
            Err(e) => {
                warn!(cursor = %cursor, error = %e, "Undecodable cursor, reporting as expired");
                return self.expired();
            }
        };

        if parts.sequence >= newest {
            // Cursor is from a point with no newer events yet
            return self.caught_up(cursor);
        }

        if parts.sequence >= self.evicted_through {
            // Nothing after this cursor has been evicted, so the history is intact
            let idx = self
                .entries
                .partition_point(|entry| entry.sequence <= parts.sequence);
            return self.batch_from(idx, limit, Some(cursor));
        }

        debug!(
            cursor = %cursor,
            sequence = parts.sequence,
            evicted_through = self.evicted_through,
            "Cursor points into evicted history"
        );
        self.expired()
    }

    /// Cursor of the newest event, or a synthetic cursor at the current
    /// sequence when the log is empty. Never consumes a sequence number.
    pub fn get_current_cursor(&self) -> String {
        match self.entries.back() {
            Some(entry) => entry.event.cursor.clone(),
            None => encode_cursor(CursorParts {
                relative_ms: self.peek_relative(self.clock.now_ms()),
                sequence: self.sequence,
            }),
        }
    }

    /// Drop events older than the retention window. Returns how many were removed.
    pub fn cleanup(&mut self) -> usize {
        let cutoff = self.clock.now_ms() - self.retention_ms;
        let mut removed = 0;

        // Oldest first, so the first retained event ends the scan
        while let Some(front) = self.entries.front() {
            if front.event.timestamp_ms >= cutoff {
                break;
            }
            if let Some(entry) = self.entries.pop_front() {
                self.evicted_through = self.evicted_through.max(entry.sequence);
                removed += 1;
            }
        }

        if removed > 0 {
            debug!(removed = removed, remaining = self.entries.len(), "Event log cleanup");
        }

        removed
    }

    /// Subscribe to events as they are appended
    pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.tx.subscribe()
    }

    pub fn get_size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get_oldest_cursor(&self) -> Option<String> {
        self.entries.front().map(|entry| entry.event.cursor.clone())
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Total events ever appended, including evicted ones
    pub fn total_appended(&self) -> u64 {
        self.sequence
    }

    fn evict_oldest(&mut self, count: usize) {
        let count = count.min(self.entries.len());
        if let Some(last) = self.entries.drain(..count).last() {
            self.evicted_through = self.evicted_through.max(last.sequence);
        }
        debug!(evicted = count, "Event log at capacity, evicted oldest events");
    }

    fn batch_from(&self, start: usize, limit: usize, cursor: Option<&str>) -> EventBatch {
        let events: Vec<RoomEvent> = self
            .entries
            .iter()
            .skip(start)
            .take(limit)
            .map(|entry| entry.event.clone())
            .collect();

        let next_cursor = match (events.last(), cursor) {
            (Some(last), _) => last.cursor.clone(),
            (None, Some(cursor)) => cursor.to_string(),
            (None, None) => self.get_current_cursor(),
        };

        EventBatch {
            events,
            next_cursor,
            cursor_expired: false,
        }
    }

    fn caught_up(&self, cursor: &str) -> EventBatch {
        EventBatch {
            events: Vec::new(),
            next_cursor: cursor.to_string(),
            cursor_expired: false,
        }
    }

    fn expired(&self) -> EventBatch {
        EventBatch {
            events: Vec::new(),
            next_cursor: self.get_current_cursor(),
            cursor_expired: true,
        }
    }

    fn relative_now(&mut self, now_ms: i64) -> u64 {
        let relative = self.peek_relative(now_ms);
        self.last_relative_ms = relative;
        relative
    }

    fn peek_relative(&self, now_ms: i64) -> u64 {
        let elapsed = (now_ms - self.epoch_ms).max(0) as u64;
        elapsed.max(self.last_relative_ms)
    }
}
