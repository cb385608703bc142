// Injected time source
pub mod clock;

// Room event log and cursors
pub mod event;

// Exactly-once command guard
pub mod idempotency;

// Collision grid and map loading
pub mod spatial;

// Zone detection and tracking
pub mod zone;

// Pairwise proximity tracking
pub mod proximity;

// Room state, registry and scheduling
pub mod room;

// Agent command HTTP adapter
pub mod api;

// Configuration
pub mod config;
