//! Verification handlers
//!
//! Drift checks against the live post, plus independent proof checks.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use postproof_core::{
    AttestationReport, Backend, ContentFingerprint, DriftStatus, HashAlgorithm,
    VerificationOutcome, VerificationResult, MAX_PROOF_SIZE,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Response for drift verification
#[derive(Debug, Serialize, ToSchema)]
pub struct VerifyResponse {
    /// "checked", or "not_stamped" when no record exists for the reference
    #[schema(example = "checked")]
    pub outcome: &'static str,
    pub content_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub record_id: Option<Uuid>,
    /// The timestamp has matured
    pub is_stamped: bool,
    /// Record status: "pending", "confirmed" or "failed"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stamp_status: Option<String>,
    /// "verified", "modified" or "deleted"
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "modified")]
    pub status: Option<&'static str>,
    /// 0-100 text similarity, modified posts only
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = 87)]
    pub similarity_score: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub original: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub current: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub confirmed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_height: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub checked_at: Option<DateTime<Utc>>,
}

fn drift_str(status: DriftStatus) -> &'static str {
    match status {
        DriftStatus::Verified => "verified",
        DriftStatus::Modified => "modified",
        DriftStatus::Deleted => "deleted",
    }
}

impl From<VerificationResult> for VerifyResponse {
    fn from(result: VerificationResult) -> Self {
        Self {
            outcome: "checked",
            content_ref: result.content_ref,
            record_id: Some(result.record_id),
            is_stamped: result.is_stamped,
            stamp_status: Some(result.stamp_status.to_string()),
            status: Some(drift_str(result.status)),
            similarity_score: result.similarity_score,
            original_hash: Some(result.original_hash),
            current_hash: result.current_hash,
            original: serde_json::to_value(&result.original).ok(),
            current: result.current.and_then(|c| serde_json::to_value(&c).ok()),
            confirmed_at: result.confirmed_at,
            block_height: result.block_ref.map(|b| b.height),
            checked_at: Some(result.checked_at),
        }
    }
}

impl From<VerificationOutcome> for VerifyResponse {
    fn from(outcome: VerificationOutcome) -> Self {
        match outcome {
            VerificationOutcome::Checked(result) => (*result).into(),
            VerificationOutcome::NotStamped { content_ref } => Self {
                outcome: "not_stamped",
                content_ref,
                record_id: None,
                is_stamped: false,
                stamp_status: None,
                status: None,
                similarity_score: None,
                original_hash: None,
                current_hash: None,
                original: None,
                current: None,
                confirmed_at: None,
                block_height: None,
                checked_at: None,
            },
        }
    }
}

/// Request body for verification by content reference
#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyContentRequest {
    #[schema(example = "x:1790000000000000000")]
    pub content_ref: String,
}

/// Independent proof check result
#[derive(Debug, Serialize, ToSchema)]
pub struct AttestationResponse {
    /// The proof parses and commits to the fingerprint
    pub is_valid: bool,
    /// At least one attestation checked out against the chain
    pub is_confirmed: bool,
    /// Earliest proven time
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub earliest: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub earliest_block_height: Option<u64>,
    /// Every proven time, ascending
    #[schema(value_type = Vec<String>)]
    pub attested_times: Vec<DateTime<Utc>>,
    /// Attestations that contradicted the chain
    pub rejected_attestations: usize,
}

impl From<AttestationReport> for AttestationResponse {
    fn from(report: AttestationReport) -> Self {
        Self {
            is_valid: report.is_valid,
            is_confirmed: report.is_confirmed(),
            earliest: report.earliest(),
            earliest_block_height: report.earliest_block.map(|b| b.height),
            attested_times: report.attested_timestamps.into_iter().collect(),
            rejected_attestations: report.rejected_attestations,
        }
    }
}

/// Request body for checking an uploaded proof
#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyProofRequest {
    #[schema(value_type = String, example = "calendar-bitcoin")]
    pub backend: Backend,
    /// Fingerprint the proof should commit to, hex-encoded
    pub content_hash: String,
    #[serde(default)]
    #[schema(value_type = Option<String>, example = "sha256")]
    pub hash_algorithm: Option<HashAlgorithm>,
    /// Base64-encoded proof, as downloaded from the proof endpoint
    pub proof_base64: String,
}

/// Check a record's post for drift
///
/// Re-fetches the post and compares it to the stamped snapshot.
/// Engagement changes never count as drift.
#[utoipa::path(
    get,
    path = "/api/v1/timestamps/{id}/verify",
    tag = "Verification",
    params(("id" = String, Path, description = "Record id")),
    responses(
        (status = 200, description = "Drift classification", body = VerifyResponse),
        (status = 404, description = "No such record"),
        (status = 502, description = "Post fetch service failed")
    )
)]
pub async fn verify_record_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let result = state.verifier.verify(id).await?;
    Ok(Json(result.into()))
}

/// Check the latest record for a content reference
///
/// An unknown reference yields `outcome = "not_stamped"`, never an error.
#[utoipa::path(
    post,
    path = "/api/v1/verify",
    tag = "Verification",
    request_body = VerifyContentRequest,
    responses(
        (status = 200, description = "Drift classification or not stamped", body = VerifyResponse),
        (status = 400, description = "Invalid request"),
        (status = 502, description = "Post fetch service failed")
    )
)]
pub async fn verify_content_handler(
    State(state): State<AppState>,
    payload: Result<Json<VerifyContentRequest>, JsonRejection>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    if request.content_ref.trim().is_empty() {
        return Err(ApiError::bad_request("'content_ref' must not be empty"));
    }
    let outcome = state.verifier.verify_content_ref(&request.content_ref).await?;
    Ok(Json(outcome.into()))
}

/// Check a record's proof against its backend
///
/// Trusts no stored status: the proof is re-parsed and every attestation is
/// checked against the chain.
#[utoipa::path(
    get,
    path = "/api/v1/timestamps/{id}/attestation",
    tag = "Verification",
    params(("id" = String, Path, description = "Record id")),
    responses(
        (status = 200, description = "Attestation report", body = AttestationResponse),
        (status = 404, description = "No such record"),
        (status = 422, description = "Stored proof is corrupt or does not match")
    )
)]
pub async fn record_attestation_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AttestationResponse>, ApiError> {
    let report = state.lifecycle.verify_proof(id).await?;
    Ok(Json(report.into()))
}

/// Check an uploaded proof
///
/// Accepts a base64-encoded proof and the fingerprint it should commit to.
#[utoipa::path(
    post,
    path = "/api/v1/proofs/verify",
    tag = "Verification",
    request_body = VerifyProofRequest,
    responses(
        (status = 200, description = "Attestation report", body = AttestationResponse),
        (status = 400, description = "Invalid request or unsupported backend"),
        (status = 422, description = "Proof is corrupt or does not match")
    )
)]
pub async fn verify_proof_handler(
    State(state): State<AppState>,
    payload: Result<Json<VerifyProofRequest>, JsonRejection>,
) -> Result<Json<AttestationResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let proof = BASE64
        .decode(request.proof_base64.trim())
        .map_err(|e| ApiError::bad_request(format!("Invalid base64 in proof_base64: {e}")))?;
    if proof.is_empty() || proof.len() > MAX_PROOF_SIZE {
        return Err(ApiError::bad_request(format!(
            "Proof must be 1-{MAX_PROOF_SIZE} bytes, got {}",
            proof.len()
        )));
    }

    let fingerprint = ContentFingerprint::from_hex(
        request.hash_algorithm.unwrap_or_default(),
        request.content_hash.trim(),
    )?;

    let adapter = state.lifecycle.registry().get(request.backend)?;
    let report = adapter.verify_attestation(&proof, &fingerprint).await?;
    Ok(Json(report.into()))
}
