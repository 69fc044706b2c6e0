//! Maturation sweep trigger
//!
//! Called by an external scheduler (cron) with `Authorization: Bearer <CRON_SECRET>`.

use axum::{extract::State, http::HeaderMap, Json};
use postproof_core::SweepReport;
use serde::Serialize;
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::state::AppState;

/// Sweep counters
#[derive(Debug, Serialize, ToSchema)]
pub struct SweepResponse {
    /// Pending records attempted
    pub checked: usize,
    /// Records that reached `confirmed`
    pub upgraded: usize,
    /// Records that reached `failed`
    pub failed: usize,
    /// Attempts that errored; those records stay pending
    pub errors: usize,
    /// Records held by a concurrent attempt
    pub skipped: usize,
}

impl From<SweepReport> for SweepResponse {
    fn from(report: SweepReport) -> Self {
        Self {
            checked: report.checked,
            upgraded: report.upgraded,
            failed: report.failed,
            errors: report.errors,
            skipped: report.skipped,
        }
    }
}

/// Compare digests so the check does not leak how much of the secret matched.
fn secret_matches(provided: &str, expected: &str) -> bool {
    Sha256::digest(provided.as_bytes()) == Sha256::digest(expected.as_bytes())
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

/// Run one maturation sweep
///
/// Attempts every pending record of an asynchronous backend. Records held by
/// a concurrent sweep are skipped, so overlapping triggers are harmless.
#[utoipa::path(
    post,
    path = "/internal/maturation-sweep",
    tag = "Maturation",
    security(("cron_secret" = [])),
    responses(
        (status = 200, description = "Sweep finished", body = SweepResponse),
        (status = 401, description = "Missing or wrong secret"),
        (status = 503, description = "Trigger disabled (no CRON_SECRET configured)")
    )
)]
pub async fn maturation_sweep_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SweepResponse>, ApiError> {
    let expected = state
        .cron_secret
        .as_deref()
        .ok_or_else(|| ApiError::service_unavailable("Maturation trigger is not configured"))?;

    match bearer_token(&headers) {
        Some(token) if secret_matches(token, expected) => {}
        _ => return Err(ApiError::unauthorized("Invalid or missing bearer token")),
    }

    let report = state.scheduler.run_sweep().await?;
    tracing::info!(
        checked = report.checked,
        upgraded = report.upgraded,
        failed = report.failed,
        errors = report.errors,
        skipped = report.skipped,
        "Maturation sweep triggered"
    );
    Ok(Json(report.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer s3cret"),
        );
        assert_eq!(bearer_token(&headers), Some("s3cret"));

        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Basic s3cret"),
        );
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_secret_comparison() {
        assert!(secret_matches("abc", "abc"));
        assert!(!secret_matches("abc", "abd"));
        assert!(!secret_matches("", "abc"));
    }
}
