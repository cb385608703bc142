use agentroom::api::{create_router, AppState};
use agentroom::clock::system_clock;
use agentroom::config::{load_config, AppConfig, EnvOverrides};
use agentroom::idempotency::{spawn_sweep, IdempotencyStore};
use agentroom::room::RoomRegistry;
use agentroom::spatial::MapData;
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agentroom=info".into()),
        )
        .init();

    info!("Agentroom starting...");

    let overrides = EnvOverrides::from_env();
    let config_path = overrides.config_path().to_string();
    let mut config = if Path::new(&config_path).exists() {
        load_config(&config_path)
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("Failed to load config from {}", config_path))?
    } else {
        warn!(path = %config_path, "Config file not found, using defaults");
        AppConfig::default()
    };
    overrides.apply(&mut config);

    info!(
        bind_addr = %config.server.bind_addr,
        map_path = %config.server.map_path.display(),
        room_id = %config.server.default_room_id,
        tick_interval_ms = config.tick.interval_ms,
        "Configuration loaded"
    );

    let map = MapData::load(&config.server.map_path)
        .with_context(|| format!("Failed to load map {}", config.server.map_path.display()))?;
    info!(
        map_id = %map.map_id,
        width = map.grid.width(),
        height = map.grid.height(),
        zones = map.zones.len(),
        "Map loaded"
    );

    let clock = system_clock();

    // Rooms and their tick/cleanup tasks
    let registry = Arc::new(RoomRegistry::new());
    registry
        .create_room(&config.server.default_room_id, map, &config, clock.clone())
        .context("Failed to create default room")?;
    registry
        .start_room_tasks(
            &config.server.default_room_id,
            config.tick.interval_ms,
            config.event_log.cleanup_interval_seconds,
        )
        .context("Failed to start room tasks")?;

    // Idempotency store shared by every room
    let idempotency = IdempotencyStore::new(config.idempotency.ttl_seconds * 1000, clock);
    let sweep = spawn_sweep(idempotency.clone(), config.idempotency.sweep_interval_seconds);

    let router = create_router(AppState {
        registry: Arc::clone(&registry),
        idempotency,
        api: config.api.clone(),
    });

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;
    info!(addr = %config.server.bind_addr, "Command API listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for ctrl_c signal");
            }
            info!("Shutdown signal received");
        })
        .await
        .context("Command API server error")?;

    // Stop background timers before the rooms go away
    sweep.stop();
    for room_id in registry.room_ids() {
        registry.remove_room(&room_id);
    }
    info!("Agentroom stopped");

    Ok(())
}
