pub mod runtime;
pub use runtime::EnvOverrides;

use serde::Deserialize;
use std::path::PathBuf;

/// Complete room host configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub tick: TickConfig,
    #[serde(default)]
    pub event_log: EventLogConfig,
    #[serde(default)]
    pub idempotency: IdempotencyConfig,
    #[serde(default)]
    pub proximity: ProximityConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_map_path")]
    pub map_path: PathBuf,
    /// Room created at startup
    #[serde(default = "default_room_id")]
    pub default_room_id: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:2567".to_string()
}

fn default_map_path() -> PathBuf {
    PathBuf::from("maps/village.json")
}

fn default_room_id() -> String {
    "default".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            map_path: default_map_path(),
            default_room_id: default_room_id(),
        }
    }
}

/// Simulation tick configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TickConfig {
    #[serde(default = "default_tick_interval")]
    pub interval_ms: u64,
}

fn default_tick_interval() -> u64 {
    100
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_tick_interval(),
        }
    }
}

/// Event log retention
#[derive(Debug, Clone, Deserialize)]
pub struct EventLogConfig {
    #[serde(default = "default_retention_ms")]
    pub retention_ms: i64,
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
}

fn default_retention_ms() -> i64 {
    300_000
}

fn default_max_size() -> usize {
    10_000
}

fn default_cleanup_interval() -> u64 {
    10
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            retention_ms: default_retention_ms(),
            max_size: default_max_size(),
            cleanup_interval_seconds: default_cleanup_interval(),
        }
    }
}

/// Idempotency store lifetime
#[derive(Debug, Clone, Deserialize)]
pub struct IdempotencyConfig {
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: i64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

fn default_ttl_seconds() -> i64 {
    600
}

fn default_sweep_interval() -> u64 {
    60
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl_seconds(),
            sweep_interval_seconds: default_sweep_interval(),
        }
    }
}

/// Proximity detection
#[derive(Debug, Clone, Deserialize)]
pub struct ProximityConfig {
    /// World pixels
    #[serde(default = "default_radius")]
    pub radius: f64,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: i64,
}

fn default_radius() -> f64 {
    100.0
}

fn default_debounce_ms() -> i64 {
    500
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            radius: default_radius(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

/// Chat limits
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,
    /// Messages kept per room
    #[serde(default = "default_history_size")]
    pub history_size: usize,
}

fn default_max_message_length() -> usize {
    500
}

fn default_history_size() -> usize {
    100
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_message_length: default_max_message_length(),
            history_size: default_history_size(),
        }
    }
}

/// Command API limits
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_poll_limit")]
    pub default_poll_limit: usize,
    #[serde(default = "default_max_poll_limit")]
    pub max_poll_limit: usize,
    #[serde(default = "default_observe_radius")]
    pub default_observe_radius: f64,
    #[serde(default = "default_max_observe_radius")]
    pub max_observe_radius: f64,
}

fn default_poll_limit() -> usize {
    50
}

fn default_max_poll_limit() -> usize {
    200
}

fn default_observe_radius() -> f64 {
    200.0
}

fn default_max_observe_radius() -> f64 {
    1000.0
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            default_poll_limit: default_poll_limit(),
            max_poll_limit: default_max_poll_limit(),
            default_observe_radius: default_observe_radius(),
            max_observe_radius: default_max_observe_radius(),
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&contents)?;
    Ok(config)
}
