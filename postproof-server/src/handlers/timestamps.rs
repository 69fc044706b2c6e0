//! Timestamp handlers
//!
//! Submit a post for timestamping, read a record, download its proof.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use postproof_core::{Backend, FetchOutcome, PostSnapshot, SubmissionRequest, TimestampRecord};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

const OTS_MEDIA_TYPE: &str = "application/vnd.opentimestamps.v1";
const MAX_FIELD_LEN: usize = 512;

/// Request body for timestamp submission
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTimestampRequest {
    /// Owner of the record, opaque to the server
    #[schema(example = "user_2a9f")]
    pub subject_id: String,
    /// Platform reference the post can be re-fetched by
    #[schema(example = "x:1790000000000000000")]
    pub content_ref: String,
    /// Timestamp backend
    #[schema(value_type = String, example = "calendar-bitcoin")]
    pub backend: Backend,
    /// Captured post; fetched through the post-fetch service when omitted
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub snapshot: Option<PostSnapshot>,
}

/// A timestamp record
#[derive(Debug, Serialize, ToSchema)]
pub struct TimestampResponse {
    #[schema(value_type = String, example = "550e8400-e29b-41d4-a716-446655440000")]
    pub id: Uuid,
    pub subject_id: String,
    pub content_ref: String,
    #[schema(example = "calendar-bitcoin")]
    pub backend: String,
    #[schema(example = "sha256")]
    pub hash_algorithm: String,
    /// Fingerprint of the canonicalized post, hex-encoded
    pub content_hash: String,
    /// "pending", "confirmed" or "failed"
    #[schema(example = "pending")]
    pub status: String,
    /// Whether the timestamp has matured
    pub is_stamped: bool,
    /// Proof size in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof_size: Option<usize>,
    /// Where to download the proof
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>, example = "2025-06-15T14:20:00Z")]
    pub confirmed_at: Option<DateTime<Utc>>,
    /// Bitcoin block height or Solana slot
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_height: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Post as captured
    #[schema(value_type = Object)]
    pub snapshot: PostSnapshot,
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String)]
    pub updated_at: DateTime<Utc>,
}

impl From<TimestampRecord> for TimestampResponse {
    fn from(record: TimestampRecord) -> Self {
        let is_stamped = record.is_confirmed();
        let proof_size = record.proof_blob.as_ref().map(Vec::len);
        let (block_height, block_hash) = match record.block_ref {
            Some(b) => (Some(b.height), b.hash),
            None => (None, None),
        };
        Self {
            proof_url: proof_size.map(|_| format!("/api/v1/timestamps/{}/proof", record.id)),
            id: record.id,
            subject_id: record.subject_id,
            content_ref: record.content_ref,
            backend: record.backend.to_string(),
            hash_algorithm: record.content_hash.algorithm.to_string(),
            content_hash: record.content_hash.hash_hex,
            status: record.status.to_string(),
            is_stamped,
            proof_size,
            confirmed_at: record.confirmed_at,
            block_height,
            block_hash,
            failure_reason: record.failure_reason,
            snapshot: record.snapshot,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

fn require_field(name: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::bad_request(format!("'{name}' must not be empty")));
    }
    if value.len() > MAX_FIELD_LEN {
        return Err(ApiError::bad_request(format!(
            "'{name}' exceeds {MAX_FIELD_LEN} bytes"
        )));
    }
    Ok(())
}

/// Timestamp a post
///
/// Fingerprints the post's attested fields (author, text, media, publication
/// time; never engagement counters) and submits the fingerprint to the
/// requested backend.
///
/// - Calendar records start `pending` and mature in later sweeps.
/// - A backend that refuses the fingerprint for good yields a `failed` record.
/// - If every backend is unreachable no record is created (503); retry later.
#[utoipa::path(
    post,
    path = "/api/v1/timestamps",
    tag = "Timestamps",
    request_body = CreateTimestampRequest,
    responses(
        (status = 201, description = "Record created", body = TimestampResponse),
        (status = 400, description = "Invalid request or unsupported backend"),
        (status = 404, description = "Post no longer exists"),
        (status = 502, description = "Post fetch service failed"),
        (status = 503, description = "No backend reachable"),
        (status = 504, description = "Submission deadline exceeded")
    )
)]
pub async fn create_timestamp_handler(
    State(state): State<AppState>,
    payload: Result<Json<CreateTimestampRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TimestampResponse>), ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    require_field("subject_id", &request.subject_id)?;
    require_field("content_ref", &request.content_ref)?;

    let snapshot = match request.snapshot {
        Some(snapshot) => snapshot,
        None => match state.fetcher.fetch_content_by_id(&request.content_ref).await? {
            FetchOutcome::Found(snapshot) => snapshot,
            FetchOutcome::Missing => {
                return Err(ApiError::not_found(format!(
                    "Post {} no longer exists",
                    request.content_ref
                )))
            }
        },
    };

    let record = state
        .lifecycle
        .submit_timestamp(SubmissionRequest {
            subject_id: request.subject_id,
            content_ref: request.content_ref,
            snapshot,
            backend: request.backend,
        })
        .await?;

    tracing::info!(
        record_id = %record.id,
        backend = %record.backend,
        status = %record.status,
        "Timestamp record created"
    );

    Ok((StatusCode::CREATED, Json(record.into())))
}

/// Get a timestamp record
#[utoipa::path(
    get,
    path = "/api/v1/timestamps/{id}",
    tag = "Timestamps",
    params(("id" = String, Path, description = "Record id")),
    responses(
        (status = 200, description = "Record", body = TimestampResponse),
        (status = 404, description = "No such record")
    )
)]
pub async fn get_timestamp_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TimestampResponse>, ApiError> {
    let record = state.lifecycle.get_status(id).await?;
    Ok(Json(record.into()))
}

/// Download a record's proof
///
/// Calendar proofs are OpenTimestamps files (`.ots`) verifiable with any
/// OpenTimestamps client. Ledger proofs are the transaction signature.
#[utoipa::path(
    get,
    path = "/api/v1/timestamps/{id}/proof",
    tag = "Timestamps",
    params(("id" = String, Path, description = "Record id")),
    responses(
        (status = 200, description = "Proof bytes", content_type = "application/octet-stream"),
        (status = 404, description = "No such record, or the record has no proof")
    )
)]
pub async fn get_proof_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let record = state.lifecycle.get_status(id).await?;
    let proof = record
        .proof_blob
        .ok_or_else(|| ApiError::not_found(format!("Record {id} has no proof")))?;

    let response = if record.backend.is_ledger() {
        ([(header::CONTENT_TYPE, "application/octet-stream".to_string())], proof).into_response()
    } else {
        (
            [
                (header::CONTENT_TYPE, OTS_MEDIA_TYPE.to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{id}.ots\""),
                ),
            ],
            proof,
        )
            .into_response()
    };
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use postproof_core::{Engagement, PostContent};

    fn record() -> TimestampRecord {
        let snapshot = PostSnapshot::new(
            PostContent {
                post_id: "42".into(),
                author: "alice".into(),
                text: "first post".into(),
                posted_at: None,
                media: vec![],
            },
            Engagement {
                likes: 7,
                ..Default::default()
            },
        );
        let fingerprint = snapshot.content.fingerprint().unwrap();
        TimestampRecord::submitted(
            "user-1",
            "post:42",
            snapshot,
            Backend::CalendarBitcoin,
            fingerprint,
            vec![1, 2, 3],
            None,
        )
    }

    #[test]
    fn test_response_carries_snapshot_as_captured() {
        let record = record();
        let expected = serde_json::to_value(&record.snapshot).unwrap();

        let body = serde_json::to_value(TimestampResponse::from(record)).unwrap();
        assert_eq!(body["snapshot"], expected);
        assert_eq!(body["snapshot"]["content"]["author"], "alice");
        assert_eq!(body["snapshot"]["engagement"]["likes"], 7);
        assert_eq!(body["status"], "pending");
        assert_eq!(body["proof_size"], 3);
        assert!(body.get("block_height").is_none());
    }
}
