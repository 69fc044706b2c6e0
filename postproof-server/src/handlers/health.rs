//! Health check handlers
//!
//! Provides health and readiness endpoints for monitoring and orchestration.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

/// Health check response
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// Service status: "healthy" or "degraded"
    #[schema(example = "healthy")]
    pub status: &'static str,
    /// Server version from Cargo.toml
    #[schema(example = "0.1.0")]
    pub version: &'static str,
    /// Service name
    #[schema(example = "postproof-server")]
    pub service: &'static str,
    /// Registered timestamp backends
    #[schema(example = json!(["calendar-bitcoin"]))]
    pub backends: Vec<String>,
    /// Record store in use: "postgres" or "memory"
    #[schema(example = "postgres")]
    pub store: &'static str,
}

/// Service health
///
/// Returns JSON with service status, version and registered backends.
/// A server with no backends registered reports "degraded".
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses((status = 200, description = "Service health", body = HealthResponse))
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let backends: Vec<String> = state
        .lifecycle
        .registry()
        .backends()
        .iter()
        .map(|b| b.to_string())
        .collect();

    Json(HealthResponse {
        status: if backends.is_empty() {
            "degraded"
        } else {
            "healthy"
        },
        version: env!("CARGO_PKG_VERSION"),
        service: "postproof-server",
        backends,
        store: if state.database.is_some() {
            "postgres"
        } else {
            "memory"
        },
    })
}

/// Readiness response for Kubernetes
#[derive(Serialize, ToSchema)]
pub struct ReadyResponse {
    /// Whether the service is ready to accept traffic
    pub ready: bool,
    /// Optional message explaining status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

/// Readiness check
///
/// Returns 200 when the record store answers, 503 otherwise.
#[utoipa::path(
    get,
    path = "/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Ready", body = ReadyResponse),
        (status = 503, description = "Database unreachable", body = ReadyResponse)
    )
)]
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    match &state.database {
        Some(db) if !db.ping().await => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyResponse {
                ready: false,
                message: Some("database unreachable"),
            }),
        ),
        _ => (
            StatusCode::OK,
            Json(ReadyResponse {
                ready: true,
                message: None,
            }),
        ),
    }
}
