//! Request handlers for the API endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use tracing::{debug, warn};

use super::AppState;
use super::types::{
    AnalyticsQuery, AnalyticsResponse, ApiError, ControlRequest, DEFAULT_COMMAND_LIMIT,
    DEFAULT_RATE_PER_KWH, DEFAULT_TELEMETRY_LIMIT, HistoryQuery, LimitQuery, ServiceHealth,
};
use crate::analytics::{
    self, HealthInput, HealthReport, HealthSummary, TelemetryStatistics, analyze_health,
};
use crate::control::CommandOutcome;
use crate::devices::{Configuration, Device};
use crate::hub::Subscription;
use crate::sim::CommandHistory;
use crate::sim::types::{SimTime, TelemetrySnapshot};

type ApiResult<T> = Result<Json<T>, ApiError>;

/// `GET /health` → 200 + service liveness.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<ServiceHealth> {
    Json(ServiceHealth {
        status: "healthy",
        devices: state.engine.list_devices().len(),
        tick: state.engine.current_tick(),
        sim_time: state.engine.now(),
    })
}

/// `GET /api/devices` → 200 + devices ordered by id.
pub async fn list_devices(State(state): State<Arc<AppState>>) -> Json<Vec<Device>> {
    Json(state.engine.list_devices())
}

/// `GET /api/devices/{id}` → 200 + device, 404 if unknown.
pub async fn get_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Device> {
    Ok(Json(state.engine.get_device(&id)?))
}

/// `PUT /api/devices/{id}/config` → 200 + command outcome, 400 on an
/// out-of-range field.
pub async fn update_config(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(configuration): Json<Configuration>,
) -> ApiResult<CommandOutcome> {
    Ok(Json(state.engine.update_configuration(&id, configuration)?))
}

/// `POST /api/control/{id}` → 200 + command outcome.
///
/// 400 for unknown commands or bad parameters, 409 when the device status
/// forbids the command.
pub async fn control(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ControlRequest>,
) -> ApiResult<CommandOutcome> {
    Ok(Json(state.engine.apply(&id, &req.command, &req.parameters)?))
}

/// `GET /api/control/{id}/history?limit=N` → most recent command records.
pub async fn control_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<CommandHistory> {
    let limit = query.limit.unwrap_or(DEFAULT_COMMAND_LIMIT);
    Ok(Json(state.engine.command_history(&id, limit)?))
}

/// `GET /api/telemetry/{id}` → latest snapshot.
pub async fn latest_telemetry(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<TelemetrySnapshot> {
    Ok(Json(state.engine.latest_snapshot(&id)?))
}

/// `GET /api/telemetry/{id}/history?start=S&end=E&limit=N` → snapshots in
/// range, ascending. 400 when `start > end`.
pub async fn telemetry_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Vec<TelemetrySnapshot>> {
    let snapshots = state.engine.query(
        &id,
        query.start.map(SimTime),
        query.end.map(SimTime),
        Some(query.limit.unwrap_or(DEFAULT_TELEMETRY_LIMIT)),
    )?;
    Ok(Json(snapshots))
}

/// `GET /api/telemetry/{id}/analytics?limit=N&rate=R` → statistics,
/// anomalies, and savings over the most recent snapshots.
pub async fn telemetry_analytics(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<AnalyticsQuery>,
) -> ApiResult<AnalyticsResponse> {
    let device = state.engine.get_device(&id)?;
    let limit = query.limit.unwrap_or(DEFAULT_TELEMETRY_LIMIT);
    let snapshots = state.engine.query(&id, None, None, Some(limit))?;
    Ok(Json(AnalyticsResponse {
        device_id: id,
        data_points: snapshots.len(),
        statistics: TelemetryStatistics::from_snapshots(&snapshots, device.battery_capacity_kwh),
        anomalies: analytics::detect_anomalies(&snapshots),
        energy_savings: analytics::energy_savings(
            &snapshots,
            query.rate.unwrap_or(DEFAULT_RATE_PER_KWH),
        ),
    }))
}

/// `GET /api/health/{id}/summary` → status, charge, cycles, and alerts.
pub async fn health_summary(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<HealthSummary> {
    let device = state.engine.get_device(&id)?;
    let latest = state.engine.latest_snapshot(&id)?;
    let recent = state
        .engine
        .query(&id, None, None, Some(DEFAULT_TELEMETRY_LIMIT))?;
    Ok(Json(HealthSummary::new(&device, &latest, &recent)))
}

/// `POST /api/health/{id}/analyze` → health report from the configured
/// text generator, or the unavailable fallback.
pub async fn analyze(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<HealthReport> {
    let device = state.engine.get_device(&id)?;
    let latest = state.engine.latest_snapshot(&id)?;
    let recent = state
        .engine
        .query(&id, None, None, Some(DEFAULT_TELEMETRY_LIMIT))?;
    let input = HealthInput::new(device, latest, &recent);
    Ok(Json(analyze_health(&input, state.generator.as_deref())))
}

/// `GET /ws/telemetry/{id}` → upgrades and streams one JSON snapshot per
/// text frame. 404 before upgrading if the device is unknown.
pub async fn ws_telemetry(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let subscription = state.engine.subscribe(&id)?;
    Ok(ws
        .on_upgrade(move |socket| stream_snapshots(socket, subscription))
        .into_response())
}

async fn stream_snapshots(mut socket: WebSocket, mut subscription: Subscription) {
    debug!(device_id = subscription.device_id(), "websocket client connected");
    loop {
        tokio::select! {
            snapshot = subscription.recv() => {
                let Some(snapshot) = snapshot else {
                    break;
                };
                let Ok(text) = serde_json::to_string(&*snapshot) else {
                    warn!(device_id = subscription.device_id(), "failed to serialise snapshot");
                    continue;
                };
                if socket.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            message = socket.recv() => {
                match message {
                    Some(Ok(Message::Ping(payload))) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
    debug!(
        device_id = subscription.device_id(),
        dropped = subscription.dropped(),
        "websocket client disconnected"
    );
    subscription.unsubscribe();
}
