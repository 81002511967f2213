//! HTTP read API and WebSocket push stream.

use std::sync::atomic::Ordering;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::api::domain::{
    AppState, CommandAcceptedResponse, CommandRequestBody, HealthResponse, MemoryUsage, TopologyDevice,
    TopologyModule,
};
use crate::error::IngestError;
use crate::model::domain::CommandRequest;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/config", get(config))
        .route("/api/live/topology", get(topology))
        .route("/api/live/devices/:device_id/modules/:module_index", get(module_telemetry))
        .route("/api/meta/:device_id", get(device_metadata))
        .route("/api/commands", post(submit_command))
        .route("/api/history/:table", get(history))
        .route("/ws/events", get(push_stream))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let uptime_secs = state.started_at.elapsed().as_secs();
    Json(HealthResponse {
        status: "ok",
        uptime_secs,
        memory: MemoryUsage { rss_bytes: read_rss_bytes() },
        db: if state.db_healthy.load(Ordering::Relaxed) { "up" } else { "down" },
        broker: if state.broker_healthy.load(Ordering::Relaxed) { "up" } else { "down" },
    })
}

fn read_rss_bytes() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    status
        .lines()
        .find_map(|line| line.strip_prefix("VmRSS:"))
        .and_then(|rest| rest.trim().trim_end_matches(" kB").parse::<u64>().ok())
        .map(|kb| kb * 1024)
}

/// Serializes the loaded configuration with every secret-bearing field
/// replaced by a literal redaction marker rather than echoed back.
async fn config(State(state): State<AppState>) -> impl IntoResponse {
    const REDACTED: &str = "***REDACTED***";
    Json(json!({
        "environment": state.config.environment,
        "broker": {
            "url": REDACTED,
            "clientId": state.config.broker.client_id,
            "familyBTopicRoot": state.config.broker.family_b_topic_root,
            "familyJTopicRoot": state.config.broker.family_j_topic_root,
        },
        "databaseUrl": REDACTED,
        "dbPoolSize": state.config.db_pool_size,
        "storage": {
            "enabled": state.config.storage.enabled,
            "batchSize": state.config.storage.batch_size,
            "flushIntervalMs": state.config.storage.flush_interval.as_millis(),
        },
        "normalizer": {
            "smartHeartbeatEnabled": state.config.normalizer.smart_heartbeat.enabled,
            "staggerDelayMs": state.config.normalizer.smart_heartbeat.stagger_delay.as_millis(),
            "heartbeatTimeoutSecs": state.config.normalizer.heartbeat_timeout.as_secs(),
            "checkIntervalSecs": state.config.normalizer.check_interval.as_secs(),
        },
        "apiServer": {
            "port": state.config.api_server.port,
            "features": {
                "management": state.config.api_server.features.management,
                "history": state.config.api_server.features.history,
            },
        },
        "pushStream": { "port": state.config.push_stream.port },
    }))
}

async fn topology(State(state): State<AppState>) -> impl IntoResponse {
    let devices: Vec<TopologyDevice> = state
        .shadow
        .all_metadata()
        .into_iter()
        .map(|meta| {
            let active_modules = meta
                .active_modules
                .iter()
                .map(|module| {
                    let telemetry = state.shadow.telemetry_get(&meta.device_id, module.module_index);
                    TopologyModule {
                        module_index: module.module_index,
                        module_id: module.module_id.clone(),
                        fw_ver: module.fw_ver.clone(),
                        u_total: module.u_total,
                        is_online: telemetry.as_ref().map(|t| t.is_online).unwrap_or(false),
                        last_seen_heartbeat: telemetry.and_then(|t| t.last_seen_heartbeat),
                    }
                })
                .collect();

            TopologyDevice {
                device_id: meta.device_id,
                device_family: meta.device_family,
                ip: meta.ip,
                mac: meta.mac,
                fw_ver: meta.fw_ver,
                active_modules,
            }
        })
        .collect();

    Json(devices)
}

async fn module_telemetry(
    State(state): State<AppState>,
    Path((device_id, module_index)): Path<(String, u32)>,
) -> Result<impl IntoResponse, IngestError> {
    state.shadow.telemetry_get(&device_id, module_index).map(Json).ok_or(IngestError::NotFound)
}

async fn device_metadata(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<impl IntoResponse, IngestError> {
    state.shadow.metadata_get(&device_id).map(Json).ok_or(IngestError::NotFound)
}

async fn submit_command(
    State(state): State<AppState>,
    Json(body): Json<CommandRequestBody>,
) -> Result<impl IntoResponse, IngestError> {
    if body.device_id.is_empty() {
        return Err(IngestError::Validation("deviceId is required".to_string()));
    }

    let payload = body.payload.unwrap_or_default();
    let command = CommandRequest {
        device_id: body.device_id,
        device_family: body.device_family,
        kind: body.kind,
        module_index: payload.module_index,
        module_id: payload.module_id,
        sensor_index: payload.sensor_index,
        color_code: payload.color_code,
        color_items: payload.color_items,
    };

    // Validate shape eagerly so the caller gets a 400 rather than a
    // silently-dropped command; the command builder re-validates anyway
    // once it actually dequeues this request.
    crate::command::logic::build(&command)?;

    state.bus.publish_command(command).await;

    Ok((
        axum::http::StatusCode::ACCEPTED,
        Json(CommandAcceptedResponse { status: "sent", command_id: Uuid::new_v4().to_string() }),
    ))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    device_id: String,
    #[serde(default = "default_history_limit")]
    limit: i64,
}

fn default_history_limit() -> i64 {
    100
}

async fn history(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, IngestError> {
    if !state.config.api_server.features.history {
        return Err(IngestError::HistoryDisabled);
    }

    match table.as_str() {
        "heartbeat" => {
            let Some(repo) = state.repository.as_ref() else {
                return Err(IngestError::HistoryDisabled);
            };
            let rows = repo
                .recent_heartbeats(&query.device_id, query.limit)
                .await
                .map_err(IngestError::Persistence)?;
            Ok(Json(rows).into_response())
        }
        "rfid_event" => {
            let Some(repo) = state.repository.as_ref() else {
                return Err(IngestError::HistoryDisabled);
            };
            let rows = repo
                .recent_rfid_events(&query.device_id, query.limit)
                .await
                .map_err(IngestError::Persistence)?;
            Ok(Json(rows).into_response())
        }
        "temp_hum" => {
            let Some(repo) = state.repository.as_ref() else {
                return Err(IngestError::HistoryDisabled);
            };
            let rows = repo
                .recent_temp_hum(&query.device_id, query.limit)
                .await
                .map_err(IngestError::Persistence)?;
            Ok(Json(rows).into_response())
        }
        "door_event" => {
            let Some(repo) = state.repository.as_ref() else {
                return Err(IngestError::HistoryDisabled);
            };
            let rows = repo
                .recent_door_events(&query.device_id, query.limit)
                .await
                .map_err(IngestError::Persistence)?;
            Ok(Json(rows).into_response())
        }
        _ => Err(IngestError::NotFound),
    }
}

async fn push_stream(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| push_stream_loop(socket, state))
}

/// Broadcasts every normalized event to the client as JSON immediately on
/// emission. A single malformed event (serialization failure) is skipped
/// rather than closing the connection.
async fn push_stream_loop(mut socket: WebSocket, state: AppState) {
    let mut rx = state.bus.subscribe_normalized();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(event) => match serde_json::to_string(&event) {
                        Ok(text) => {
                            if socket.send(Message::Text(text)).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => warn!(error = %e, "skipping malformed normalized event on push stream"),
                    },
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "push stream lagged behind normalized event stream");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => return,
                    Some(Err(_)) => return,
                    _ => {}
                }
            }
        }
    }
}
