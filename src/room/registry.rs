use crate::clock::SharedClock;
use crate::config::AppConfig;
use crate::room::{MetricsSnapshot, RoomError, RoomMetrics, RoomState};
use crate::spatial::MapData;
use dashmap::DashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// One room behind its single-writer lock
pub type SharedRoom = Arc<Mutex<RoomState>>;

/// A registered room plus the background tasks driving it.
/// Dropping the handle stops the tasks.
pub struct RoomHandle {
    state: SharedRoom,
    metrics: RoomMetrics,
    tasks: Vec<JoinHandle<()>>,
}

impl RoomHandle {
    fn new(room: RoomState) -> Self {
        let metrics = room.metrics().clone();
        Self {
            state: Arc::new(Mutex::new(room)),
            metrics,
            tasks: Vec::new(),
        }
    }

    pub fn state(&self) -> SharedRoom {
        Arc::clone(&self.state)
    }

    pub fn task_count(&self) -> usize {
        self.tasks.iter().filter(|t| !t.is_finished()).count()
    }
}

impl Drop for RoomHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// All rooms hosted by this process
pub struct RoomRegistry {
    rooms: DashMap<String, RoomHandle>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    /// Build a room from a map and register it
    pub fn create_room(
        &self,
        room_id: &str,
        map: MapData,
        config: &AppConfig,
        clock: SharedClock,
    ) -> Result<SharedRoom, RoomError> {
        if self.rooms.contains_key(room_id) {
            return Err(RoomError::RoomAlreadyExists(room_id.to_string()));
        }
        let room = RoomState::new(room_id, map, config, clock)?;
        self.insert(room)
    }

    pub fn insert(&self, room: RoomState) -> Result<SharedRoom, RoomError> {
        let room_id = room.room_id().to_string();
        match self.rooms.entry(room_id) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                Err(RoomError::RoomAlreadyExists(entry.key().clone()))
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let handle = RoomHandle::new(room);
                let state = handle.state();
                entry.insert(handle);
                Ok(state)
            }
        }
    }

    pub fn get(&self, room_id: &str) -> Option<SharedRoom> {
        self.rooms.get(room_id).map(|handle| handle.state())
    }

    /// Run `f` with exclusive access to a room
    pub fn with_room<R, F>(&self, room_id: &str, f: F) -> Result<R, RoomError>
    where
        F: FnOnce(&mut RoomState) -> R,
    {
        // Clone the Arc so the map shard is not held while the room is locked
        let room = self
            .get(room_id)
            .ok_or_else(|| RoomError::RoomNotFound(room_id.to_string()))?;
        let mut guard = lock_room(&room);
        Ok(f(&mut guard))
    }

    /// Read metrics without taking the room lock
    pub fn metrics(&self, room_id: &str) -> Option<MetricsSnapshot> {
        self.rooms
            .get(room_id)
            .map(|handle| handle.metrics.get_snapshot())
    }

    /// Spawn the tick loop and the event-log cleanup loop for a room
    pub fn start_room_tasks(
        &self,
        room_id: &str,
        tick_interval_ms: u64,
        cleanup_interval_seconds: u64,
    ) -> Result<(), RoomError> {
        let mut handle = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| RoomError::RoomNotFound(room_id.to_string()))?;

        let tick = tokio::spawn(run_tick_loop(handle.state(), tick_interval_ms));
        let cleanup = tokio::spawn(run_event_cleanup(handle.state(), cleanup_interval_seconds));
        handle.tasks.push(tick);
        handle.tasks.push(cleanup);

        info!(
            room_id = %room_id,
            tick_interval_ms = tick_interval_ms,
            cleanup_interval_seconds = cleanup_interval_seconds,
            "Room tasks started"
        );
        Ok(())
    }

    /// Unregister a room and stop its tasks
    pub fn remove_room(&self, room_id: &str) -> bool {
        let removed = self.rooms.remove(room_id).is_some();
        if removed {
            info!(room_id = %room_id, "Room removed");
        }
        removed
    }

    /// Sorted
    pub fn room_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.rooms.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Lock a room, recovering from a panic in an earlier holder.
pub fn lock_room(room: &SharedRoom) -> MutexGuard<'_, RoomState> {
    room.lock().unwrap_or_else(|poisoned| {
        warn!("Room lock poisoned by an earlier panic, recovering");
        poisoned.into_inner()
    })
}

/// Background task advancing the simulation at a fixed rate
pub async fn run_tick_loop(room: SharedRoom, interval_ms: u64) {
    let mut ticker = interval(Duration::from_millis(interval_ms.max(1)));

    // Skip missed ticks to prevent backlog under load
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        lock_room(&room).tick();
    }
}

/// Background task enforcing the event log's retention window
pub async fn run_event_cleanup(room: SharedRoom, interval_seconds: u64) {
    let mut ticker = interval(Duration::from_secs(interval_seconds.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let mut guard = lock_room(&room);
        let removed = guard.cleanup_events();
        if removed > 0 {
            debug!(
                room_id = %guard.room_id(),
                removed = removed,
                remaining = guard.event_log().get_size(),
                "Event log retention cleanup"
            );
        }
    }
}
