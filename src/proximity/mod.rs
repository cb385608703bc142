//! Pairwise proximity tracking with debounced enter/exit events.

use crate::clock::SharedClock;
use crate::event::EventType;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;


/// Debounce table size that triggers pruning
pub const DEBOUNCE_PRUNE_THRESHOLD: usize = 1000;

/// Debounce records older than this many windows are pruned
const DEBOUNCE_STALE_WINDOWS: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Position) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProximityKind {
    Enter,
    Exit,
}

impl ProximityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProximityKind::Enter => "enter",
            ProximityKind::Exit => "exit",
        }
    }

    pub fn event_type(&self) -> EventType {
        match self {
            ProximityKind::Enter => EventType::ProximityEnter,
            ProximityKind::Exit => EventType::ProximityExit,
        }
    }
}

/// One side of a proximity transition. Every fired transition produces two
/// of these, one from each entity's point of view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProximityEvent {
    pub kind: ProximityKind,
    #[serde(rename = "subjectId")]
    pub subject_id: String,
    #[serde(rename = "otherId")]
    pub other_id: String,
    pub distance: f64,
    #[serde(rename = "timestampMs")]
    pub timestamp_ms: i64,
}

/// Tracks which entity pairs are within `radius` of each other.
///
/// Adjacency is rebuilt from the full position snapshot on every `update`, so
/// it is always symmetric and entities missing from the snapshot drop out.
pub struct ProximitySystem {
    radius: f64,
    debounce_ms: i64,

    /// entity_id -> ids currently near it
    near: HashMap<String, HashSet<String>>,

    /// debounce key -> last time that transition fired
    last_fired: HashMap<String, i64>,

    clock: SharedClock,
}

impl ProximitySystem {
    pub fn new(radius: f64, debounce_ms: i64, clock: SharedClock) -> Self {
        Self {
            radius,
            debounce_ms,
            near: HashMap::new(),
            last_fired: HashMap::new(),
            clock,
        }
    }

    /// Recompute adjacency from a snapshot of every tracked entity.
    ///
    /// A pair crossing the radius fires an enter/exit pair unless the same
    /// transition fired for that pair within the debounce window. Suppressed
    /// transitions still update adjacency.
    pub fn update(&mut self, positions: &HashMap<String, Position>) -> Vec<ProximityEvent> {
        let now = self.clock.now_ms();
        let mut ids: Vec<&String> = positions.keys().collect();
        ids.sort();

        let mut next_near: HashMap<String, HashSet<String>> = HashMap::new();
        let mut events = Vec::new();

        for (i, &a) in ids.iter().enumerate() {
            for &b in &ids[i + 1..] {
                let distance = positions[a].distance_to(&positions[b]);
                let is_near = distance <= self.radius;
                let was_near = self.is_near(a, b);

                if is_near {
                    next_near.entry(a.clone()).or_default().insert(b.clone());
                    next_near.entry(b.clone()).or_default().insert(a.clone());
                }

                let kind = match (was_near, is_near) {
                    (false, true) => ProximityKind::Enter,
                    (true, false) => ProximityKind::Exit,
                    _ => continue,
                };

                if !self.should_fire(a, b, kind, now) {
                    debug!(a = %a, b = %b, kind = kind.as_str(), "Proximity transition debounced");
                    continue;
                }

                events.push(ProximityEvent {
                    kind,
                    subject_id: a.clone(),
                    other_id: b.clone(),
                    distance,
                    timestamp_ms: now,
                });
                events.push(ProximityEvent {
                    kind,
                    subject_id: b.clone(),
                    other_id: a.clone(),
                    distance,
                    timestamp_ms: now,
                });
            }
        }

        self.near = next_near;

        if self.last_fired.len() > DEBOUNCE_PRUNE_THRESHOLD {
            self.prune_debounce(now);
        }

        events
    }

    pub fn is_near(&self, a: &str, b: &str) -> bool {
        self.near.get(a).map_or(false, |set| set.contains(b))
    }

    /// Ids currently near `entity_id`, sorted
    pub fn near(&self, entity_id: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .near
            .get(entity_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Drop an entity from both sides of every pair it is in. Like an entity
    /// missing from an `update` snapshot, this fires no exit events.
    pub fn remove_entity(&mut self, entity_id: &str) {
        let Some(others) = self.near.remove(entity_id) else {
            return;
        };
        for other in others {
            if let Some(set) = self.near.get_mut(&other) {
                set.remove(entity_id);
                if set.is_empty() {
                    self.near.remove(&other);
                }
            }
        }
    }

    /// Number of unordered near pairs
    pub fn pair_count(&self) -> usize {
        self.near.values().map(HashSet::len).sum::<usize>() / 2
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn debounce_ms(&self) -> i64 {
        self.debounce_ms
    }

    pub fn debounce_len(&self) -> usize {
        self.last_fired.len()
    }

    fn should_fire(&mut self, a: &str, b: &str, kind: ProximityKind, now: i64) -> bool {
        let key = debounce_key(a, b, kind);
        if let Some(&last) = self.last_fired.get(&key) {
            if now - last < self.debounce_ms {
                return false;
            }
        }
        self.last_fired.insert(key, now);
        true
    }

    fn prune_debounce(&mut self, now: i64) {
        let max_age = self.debounce_ms * DEBOUNCE_STALE_WINDOWS;
        let before = self.last_fired.len();
        self.last_fired.retain(|_, &mut fired| now - fired <= max_age);
        debug!(
            pruned = before - self.last_fired.len(),
            remaining = self.last_fired.len(),
            "Pruned proximity debounce records"
        );
    }
}

/// Same key for (a, b) and (b, a)
fn debounce_key(a: &str, b: &str, kind: ProximityKind) -> String {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    format!("{}\u{1f}{}\u{1f}{}", first, second, kind.as_str())
}
