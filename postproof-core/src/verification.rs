//! Drift verification: does the live post still match what was stamped?

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::chain::BlockRef;
use crate::content::{ContentFetcher, FetchOutcome, PostSnapshot};
use crate::error::{ProofError, Result};
use crate::fingerprint::{self, Content};
use crate::record::{TimestampRecord, TimestampStatus};
use crate::store::RecordStore;

/// How the live post compares to the stamped snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriftStatus {
    /// Live content hashes to the stamped fingerprint.
    Verified,
    /// The post exists but its content changed.
    Modified,
    /// The platform no longer has the post.
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub record_id: Uuid,
    pub content_ref: String,
    /// The stamp reached `confirmed`
    pub is_stamped: bool,
    pub stamp_status: TimestampStatus,
    pub status: DriftStatus,
    pub original: PostSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<PostSnapshot>,
    pub original_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_hash: Option<String>,
    /// 0-100, present only for modified posts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_score: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_ref: Option<BlockRef>,
    pub checked_at: DateTime<Utc>,
}

/// Result of verifying by content reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VerificationOutcome {
    /// No record exists for the reference.
    NotStamped { content_ref: String },
    Checked(Box<VerificationResult>),
}

/// Compare a record against freshly fetched content.
pub fn classify(record: &TimestampRecord, live: FetchOutcome) -> Result<VerificationResult> {
    let (status, current, current_hash, similarity_score) = match live {
        FetchOutcome::Missing => (DriftStatus::Deleted, None, None, None),
        FetchOutcome::Found(snapshot) => {
            let bytes = fingerprint::canonicalize(&Content::structured(&snapshot.content)?)?;
            let live_hash = fingerprint::hash(&bytes, record.content_hash.algorithm);
            if live_hash == record.content_hash {
                (DriftStatus::Verified, Some(snapshot), Some(live_hash.hash_hex), None)
            } else {
                let score =
                    fingerprint::similarity(&record.snapshot.content.text, &snapshot.content.text);
                (
                    DriftStatus::Modified,
                    Some(snapshot),
                    Some(live_hash.hash_hex),
                    Some(score),
                )
            }
        }
    };

    Ok(VerificationResult {
        record_id: record.id,
        content_ref: record.content_ref.clone(),
        is_stamped: record.is_confirmed(),
        stamp_status: record.status,
        status,
        original: record.snapshot.clone(),
        current,
        original_hash: record.content_hash.hash_hex.clone(),
        current_hash,
        similarity_score,
        confirmed_at: record.confirmed_at,
        block_ref: record.block_ref.clone(),
        checked_at: Utc::now(),
    })
}

pub struct VerificationEngine {
    store: Arc<dyn RecordStore>,
    fetcher: Arc<dyn ContentFetcher>,
}

impl VerificationEngine {
    pub fn new(store: Arc<dyn RecordStore>, fetcher: Arc<dyn ContentFetcher>) -> Self {
        Self { store, fetcher }
    }

    /// Re-fetch a record's post and classify drift.
    ///
    /// Collaborator failures surface as [`ProofError::Fetch`]; they are
    /// never reported as a deleted post.
    #[instrument(skip(self))]
    pub async fn verify(&self, record_id: Uuid) -> Result<VerificationResult> {
        let record = self
            .store
            .get(record_id)
            .await?
            .ok_or_else(|| ProofError::NotFound(record_id.to_string()))?;
        self.verify_record(&record).await
    }

    /// Verify the latest record for a content reference.
    #[instrument(skip(self))]
    pub async fn verify_content_ref(&self, content_ref: &str) -> Result<VerificationOutcome> {
        match self.store.latest_for_content_ref(content_ref).await? {
            Some(record) => Ok(VerificationOutcome::Checked(Box::new(
                self.verify_record(&record).await?,
            ))),
            None => Ok(VerificationOutcome::NotStamped {
                content_ref: content_ref.to_string(),
            }),
        }
    }

    async fn verify_record(&self, record: &TimestampRecord) -> Result<VerificationResult> {
        let live = self
            .fetcher
            .fetch_content_by_id(&record.content_ref)
            .await
            .map_err(|e| match e {
                ProofError::Fetch(_) => e,
                other => ProofError::Fetch(other.to_string()),
            })?;
        let result = classify(record, live)?;
        info!(
            record_id = %record.id,
            status = ?result.status,
            similarity = ?result.similarity_score,
            "Drift check complete"
        );
        Ok(result)
    }
}
