//! API request, response, and query types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::analytics::{Anomaly, EnergySavings, TelemetryStatistics};
use crate::error::{EngineError, ErrorKind};
use crate::sim::types::SimTime;

/// Default number of command records returned by the history endpoint.
pub const DEFAULT_COMMAND_LIMIT: usize = 50;
/// Default number of snapshots returned by the telemetry history endpoint.
pub const DEFAULT_TELEMETRY_LIMIT: usize = 100;
/// Default tariff used for savings estimates ($/kWh).
pub const DEFAULT_RATE_PER_KWH: f32 = 0.12;

/// Body of `POST /api/control/{id}`.
#[derive(Debug, Deserialize)]
pub struct ControlRequest {
    /// Command name, kebab-case or snake_case.
    pub command: String,
    /// Command parameters object.
    #[serde(default)]
    pub parameters: Value,
}

/// `limit` query for the command history endpoint.
#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

/// Range query for the telemetry history endpoint, in simulated seconds.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Start timestamp (inclusive).
    pub start: Option<u64>,
    /// End timestamp (inclusive).
    pub end: Option<u64>,
    pub limit: Option<usize>,
}

/// Window and tariff for the analytics endpoint.
#[derive(Debug, Deserialize)]
pub struct AnalyticsQuery {
    /// Snapshots to analyse, most recent first (default 100).
    pub limit: Option<usize>,
    /// Grid tariff ($/kWh, default 0.12).
    pub rate: Option<f32>,
}

/// Response of `GET /api/telemetry/{id}/analytics`.
#[derive(Debug, Serialize)]
pub struct AnalyticsResponse {
    pub device_id: String,
    pub data_points: usize,
    pub statistics: Option<TelemetryStatistics>,
    pub anomalies: Vec<Anomaly>,
    pub energy_savings: EnergySavings,
}

/// Response of `GET /health`.
#[derive(Debug, Serialize)]
pub struct ServiceHealth {
    pub status: &'static str,
    pub devices: usize,
    pub tick: u64,
    pub sim_time: SimTime,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error category.
    pub kind: ErrorKind,
    /// Human-readable error message.
    pub error: String,
}

/// Engine error rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

impl ApiError {
    /// HTTP status for the wrapped error.
    pub fn status(&self) -> StatusCode {
        match self.0.kind() {
            ErrorKind::UnknownDevice => StatusCode::NOT_FOUND,
            ErrorKind::InvalidCommand | ErrorKind::ValidationError => StatusCode::BAD_REQUEST,
            ErrorKind::InvalidState | ErrorKind::DeviceExists => StatusCode::CONFLICT,
            ErrorKind::SimulationInvariantViolation => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorResponse {
            kind: self.0.kind(),
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_map_to_status() {
        let cases = [
            (EngineError::UnknownDevice("x".into()), StatusCode::NOT_FOUND),
            (EngineError::InvalidCommand("x".into()), StatusCode::BAD_REQUEST),
            (EngineError::validation("percent", "bad"), StatusCode::BAD_REQUEST),
            (EngineError::InvalidState("x".into()), StatusCode::CONFLICT),
            (
                EngineError::SimulationInvariantViolation {
                    device_id: "x".into(),
                    message: "m".into(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).status(), status);
        }
    }

    #[test]
    fn control_request_parameters_optional() {
        let req: ControlRequest = serde_json::from_str(r#"{"command":"reboot"}"#).unwrap();
        assert_eq!(req.command, "reboot");
        assert!(req.parameters.is_null());
    }
}
