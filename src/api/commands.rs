use crate::api::response::{ok, parse_body, AppError, Envelope};
use crate::config::ApiConfig;
use crate::event::EventBatch;
use crate::idempotency::{IdempotencyCheck, IdempotencyStore};
use crate::room::{
    ChatChannel, EntityKind, MetricsSnapshot, NewEntity, Observation, RoomRegistry, RoomState,
};
use crate::spatial::TileCoord;
use axum::{
    body::Bytes,
    extract::{Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RoomRegistry>,
    /// Stored results are the `data` of the original response
    pub idempotency: IdempotencyStore<Value>,
    pub api: ApiConfig,
}

#[derive(Deserialize)]
struct RegisterRequest {
    #[serde(rename = "roomId")]
    room_id: String,
    name: String,
    #[serde(default)]
    kind: EntityKind,
    /// Reconnecting clients may ask for their previous id
    #[serde(rename = "agentId")]
    agent_id: Option<String>,
    #[serde(rename = "spawnZone")]
    spawn_zone: Option<String>,
}

#[derive(Serialize)]
struct RegisterResponse {
    #[serde(rename = "agentId")]
    agent_id: String,
    #[serde(rename = "roomId")]
    room_id: String,
    /// Poll from here to see everything after the join
    cursor: String,
    x: f64,
    y: f64,
    zone: Option<String>,
}

#[derive(Deserialize)]
struct AgentRequest {
    #[serde(rename = "agentId")]
    agent_id: String,
    #[serde(rename = "roomId")]
    room_id: String,
}

#[derive(Deserialize)]
struct MoveToRequest {
    #[serde(rename = "agentId")]
    agent_id: String,
    #[serde(rename = "roomId")]
    room_id: String,
    #[serde(rename = "txId")]
    tx_id: String,
    dest: TileCoord,
}

#[derive(Deserialize)]
struct ChatSendRequest {
    #[serde(rename = "agentId")]
    agent_id: String,
    #[serde(rename = "roomId")]
    room_id: String,
    #[serde(rename = "txId")]
    tx_id: String,
    #[serde(default)]
    channel: ChatChannel,
    message: String,
}

#[derive(Deserialize)]
struct ObserveRequest {
    #[serde(rename = "agentId")]
    agent_id: String,
    #[serde(rename = "roomId")]
    room_id: String,
    radius: Option<f64>,
}

#[derive(Deserialize)]
struct PollEventsRequest {
    #[serde(rename = "agentId")]
    agent_id: String,
    #[serde(rename = "roomId")]
    room_id: String,
    #[serde(rename = "sinceCursor", default)]
    since_cursor: String,
    limit: Option<usize>,
}

/// Create API router with agent command endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/aic/v0.1/register", post(register))
        .route("/aic/v0.1/unregister", post(unregister))
        .route("/aic/v0.1/moveTo", post(move_to))
        .route("/aic/v0.1/chatSend", post(chat_send))
        .route("/aic/v0.1/observe", post(observe))
        .route("/aic/v0.1/pollEvents", post(poll_events))
        .route("/aic/v0.1/rooms/:room_id/metrics", get(room_metrics))
        .route("/health", get(health))
        .with_state(Arc::new(state))
        .layer(CorsLayer::permissive())
}

/// POST /aic/v0.1/register - Join a room
async fn register(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Envelope<RegisterResponse>>, AppError> {
    let request: RegisterRequest = parse_body(&body)?;

    let response = state.registry.with_room(&request.room_id, |room| {
        let entity = room.add_entity(NewEntity {
            id: request.agent_id.clone(),
            name: request.name.clone(),
            kind: request.kind,
            spawn_zone: request.spawn_zone.clone(),
        })?;
        Ok::<_, AppError>(RegisterResponse {
            agent_id: entity.id,
            room_id: request.room_id.clone(),
            cursor: room.event_log().get_current_cursor(),
            x: entity.x,
            y: entity.y,
            zone: entity.current_zone,
        })
    })??;

    info!(
        room_id = %response.room_id,
        agent_id = %response.agent_id,
        "Agent registered"
    );
    Ok(ok(response))
}

/// POST /aic/v0.1/unregister - Leave a room
async fn unregister(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Envelope<Value>>, AppError> {
    let request: AgentRequest = parse_body(&body)?;

    state
        .registry
        .with_room(&request.room_id, |room| room.remove_entity(&request.agent_id))??;

    Ok(ok(json!({ "agentId": request.agent_id, "removed": true })))
}

/// POST /aic/v0.1/moveTo - Move to a tile (idempotent)
async fn move_to(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Envelope<Value>>, AppError> {
    let request: MoveToRequest = parse_body(&body)?;
    let payload = json!({ "action": "moveTo", "dest": request.dest });

    let data = state.registry.with_room(&request.room_id, |room| {
        run_idempotent(
            &state.idempotency,
            room,
            &request.agent_id,
            &request.tx_id,
            &payload,
            |room| Ok(serde_json::to_value(room.move_to_tile(&request.agent_id, request.dest)?)?),
        )
    })??;

    Ok(ok(data))
}

/// POST /aic/v0.1/chatSend - Send a chat message (idempotent)
async fn chat_send(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Envelope<Value>>, AppError> {
    let request: ChatSendRequest = parse_body(&body)?;
    let payload = json!({
        "action": "chatSend",
        "channel": request.channel,
        "message": request.message,
    });

    let data = state.registry.with_room(&request.room_id, |room| {
        run_idempotent(
            &state.idempotency,
            room,
            &request.agent_id,
            &request.tx_id,
            &payload,
            |room| {
                let chat = room.send_chat(&request.agent_id, request.channel, &request.message)?;
                Ok(serde_json::to_value(chat)?)
            },
        )
    })??;

    Ok(ok(data))
}

/// POST /aic/v0.1/observe - What the agent can see
async fn observe(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Envelope<Observation>>, AppError> {
    let request: ObserveRequest = parse_body(&body)?;
    let radius = request
        .radius
        .unwrap_or(state.api.default_observe_radius)
        .min(state.api.max_observe_radius);

    let observation = state
        .registry
        .with_room(&request.room_id, |room| room.observe(&request.agent_id, radius))??;

    Ok(ok(observation))
}

/// POST /aic/v0.1/pollEvents - Read events after a cursor
async fn poll_events(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Envelope<EventBatch>>, AppError> {
    let request: PollEventsRequest = parse_body(&body)?;
    let limit = request
        .limit
        .unwrap_or(state.api.default_poll_limit)
        .clamp(1, state.api.max_poll_limit.max(1));

    let batch = state.registry.with_room(&request.room_id, |room| {
        if room.entity(&request.agent_id).is_none() {
            return Err(AppError::NotFound(format!(
                "agent '{}' is not registered in room '{}'",
                request.agent_id, request.room_id
            )));
        }
        Ok(room.poll_events(&request.since_cursor, limit))
    })??;

    Ok(ok(batch))
}

/// GET /aic/v0.1/rooms/:room_id/metrics
async fn room_metrics(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Result<Json<Envelope<MetricsSnapshot>>, AppError> {
    let snapshot = state
        .registry
        .metrics(&room_id)
        .ok_or_else(|| AppError::NotFound(format!("room '{}' not found", room_id)))?;
    Ok(ok(snapshot))
}

/// GET /health
async fn health(State(state): State<Arc<AppState>>) -> Json<Envelope<Value>> {
    ok(json!({ "rooms": state.registry.len() }))
}

/// Check, execute and save under one room lock, so concurrent retries of a
/// transaction cannot both execute. Failed executions are not stored.
fn run_idempotent<F>(
    store: &IdempotencyStore<Value>,
    room: &mut RoomState,
    agent_id: &str,
    tx_id: &str,
    payload: &Value,
    execute: F,
) -> Result<Value, AppError>
where
    F: FnOnce(&mut RoomState) -> Result<Value, AppError>,
{
    if tx_id.trim().is_empty() {
        return Err(AppError::InvalidInput("txId must not be empty".to_string()));
    }

    let room_id = room.room_id().to_string();
    match store.check(agent_id, &room_id, tx_id, payload) {
        IdempotencyCheck::Replay(result) => {
            debug!(room_id = %room_id, agent_id = %agent_id, tx_id = %tx_id, "Replaying stored result");
            room.metrics().record_replay();
            Ok(result)
        }
        IdempotencyCheck::Conflict(conflict) => {
            warn!(room_id = %room_id, agent_id = %agent_id, tx_id = %tx_id, "Idempotency conflict");
            room.metrics().record_conflict();
            Err(conflict.into())
        }
        IdempotencyCheck::New => {
            let result = execute(room)?;
            store.save(agent_id, &room_id, tx_id, payload, result.clone());
            Ok(result)
        }
    }
}
