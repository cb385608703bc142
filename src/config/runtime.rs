use crate::config::AppConfig;
use std::path::PathBuf;

/// Config file used when AGENTROOM_CONFIG is not set
pub const DEFAULT_CONFIG_PATH: &str = "agentroom.toml";

/// Environment overrides applied on top of the TOML config.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvOverrides {
    pub config_path: Option<String>,
    pub bind_addr: Option<String>,
    pub map_path: Option<PathBuf>,
    pub tick_interval_ms: Option<u64>,
}

impl EnvOverrides {
    /// Read AGENTROOM_* env vars. Unparseable values are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            config_path: lookup("AGENTROOM_CONFIG"),
            bind_addr: lookup("AGENTROOM_BIND_ADDR"),
            map_path: lookup("AGENTROOM_MAP_PATH").map(PathBuf::from),
            tick_interval_ms: lookup("AGENTROOM_TICK_INTERVAL_MS").and_then(|v| v.parse().ok()),
        }
    }

    pub fn config_path(&self) -> &str {
        self.config_path.as_deref().unwrap_or(DEFAULT_CONFIG_PATH)
    }

    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(addr) = &self.bind_addr {
            config.server.bind_addr = addr.clone();
        }
        if let Some(path) = &self.map_path {
            config.server.map_path = path.clone();
        }
        if let Some(ms) = self.tick_interval_ms {
            config.tick.interval_ms = ms;
        }
    }
}
