//! Timestamp lifecycle: submit, mature, verify.
//!
//! The manager resolves the adapter for a record's backend, calls it under
//! an overall deadline, and persists the result through the store. Every
//! maturation attempt runs under a per-record lease so at most one attempt
//! per record is ever in flight.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::chain::{AdapterRegistry, AttestationReport, Backend, MaturationOutcome};
use crate::content::PostSnapshot;
use crate::error::{ProofError, Result};
use crate::record::{RecordUpdate, TimestampRecord};
use crate::store::RecordStore;

#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Overall deadline for a submission, across all calendars or RPC calls
    pub submission_deadline: Duration,
    /// Overall deadline for one maturation attempt
    pub maturation_deadline: Duration,
    /// How long a maturation lease is honored; must exceed the deadline
    pub lease_ttl: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            submission_deadline: Duration::from_secs(60),
            maturation_deadline: Duration::from_secs(120),
            lease_ttl: Duration::from_secs(300),
        }
    }
}

/// A request to timestamp a captured post.
#[derive(Debug, Clone)]
pub struct SubmissionRequest {
    pub subject_id: String,
    pub content_ref: String,
    pub snapshot: PostSnapshot,
    pub backend: Backend,
}

/// Why a maturation attempt did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Another attempt holds the lease.
    Leased,
    /// The record is already confirmed or failed.
    Terminal,
    /// The lease expired and another holder wrote first.
    LeaseLost,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MaturationResult {
    Confirmed(TimestampRecord),
    /// Still pending; `proof_extended` tells whether the stored proof grew.
    StillPending { proof_extended: bool },
    /// The backend rejected the proof for good.
    Failed(TimestampRecord),
    Skipped(SkipReason),
}

pub struct LifecycleManager {
    registry: Arc<AdapterRegistry>,
    store: Arc<dyn RecordStore>,
    config: LifecycleConfig,
}

impl LifecycleManager {
    pub fn new(
        registry: Arc<AdapterRegistry>,
        store: Arc<dyn RecordStore>,
        config: LifecycleConfig,
    ) -> Self {
        if config.lease_ttl <= config.maturation_deadline {
            warn!(
                lease_ttl_secs = config.lease_ttl.as_secs(),
                deadline_secs = config.maturation_deadline.as_secs(),
                "Lease TTL does not exceed the maturation deadline"
            );
        }
        Self {
            registry,
            store,
            config,
        }
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Fingerprint the snapshot and submit it to the requested backend.
    ///
    /// Transient failures (every backend unreachable, deadline exceeded)
    /// return an error and persist nothing, so the caller may simply retry.
    /// A permanent refusal is persisted as a `failed` record.
    #[instrument(skip(self, request), fields(content_ref = %request.content_ref, backend = %request.backend))]
    pub async fn submit_timestamp(&self, request: SubmissionRequest) -> Result<TimestampRecord> {
        if request.subject_id.trim().is_empty() {
            return Err(ProofError::InvalidInput("subject_id must not be empty".into()));
        }
        if request.content_ref.trim().is_empty() {
            return Err(ProofError::InvalidInput("content_ref must not be empty".into()));
        }

        let fingerprint = request.snapshot.content.fingerprint()?;
        let SubmissionRequest {
            subject_id,
            content_ref,
            snapshot,
            backend,
        } = request;

        let submitted = match self.registry.get(backend) {
            Ok(adapter) => {
                tokio::time::timeout(
                    self.config.submission_deadline,
                    adapter.submit(&fingerprint),
                )
                .await
                .map_err(|_| ProofError::Timeout(self.config.submission_deadline))
                .and_then(|r| r)
            }
            Err(e) => Err(e),
        };

        let record = match submitted {
            Ok(outcome) => TimestampRecord::submitted(
                subject_id,
                content_ref,
                snapshot,
                backend,
                fingerprint,
                outcome.proof_blob,
                outcome.confirmation,
            ),
            Err(e) if e.is_transient() => {
                warn!(error = %e, "Submission failed, nothing persisted");
                return Err(e);
            }
            Err(e) => {
                warn!(error = %e, "Submission refused, recording failure");
                TimestampRecord::failed(
                    subject_id,
                    content_ref,
                    snapshot,
                    backend,
                    fingerprint,
                    e.to_string(),
                )
            }
        };

        self.store.insert(&record).await?;
        info!(record_id = %record.id, status = %record.status, "Timestamp record created");
        Ok(record)
    }

    pub async fn get_status(&self, id: Uuid) -> Result<TimestampRecord> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| ProofError::NotFound(id.to_string()))
    }

    /// Pending records the sweep should visit, on every registered backend.
    /// Ledger records submitted under instant finality stay pending until the
    /// cluster shows them, so they mature through the same sweep.
    pub async fn pending_ids(&self) -> Result<Vec<Uuid>> {
        let backends = self.registry.backends();
        self.store.list_pending(&backends).await
    }

    /// Try to mature one record under its lease.
    #[instrument(skip(self))]
    pub async fn mature(&self, id: Uuid) -> Result<MaturationResult> {
        let holder = Uuid::new_v4();
        if !self
            .store
            .try_acquire_lease(id, holder, self.config.lease_ttl)
            .await?
        {
            debug!("Record leased by another attempt");
            return Ok(MaturationResult::Skipped(SkipReason::Leased));
        }

        let result = self.mature_leased(id, holder).await;
        match &result {
            // Landed updates released the lease atomically.
            Ok(MaturationResult::Confirmed(_))
            | Ok(MaturationResult::Failed(_))
            | Ok(MaturationResult::StillPending {
                proof_extended: true,
            })
            | Ok(MaturationResult::Skipped(SkipReason::LeaseLost)) => {}
            _ => self.store.release_lease(id, holder).await?,
        }
        result
    }

    async fn mature_leased(&self, id: Uuid, holder: Uuid) -> Result<MaturationResult> {
        let record = self.get_status(id).await?;
        if record.status.is_terminal() {
            return Ok(MaturationResult::Skipped(SkipReason::Terminal));
        }
        let proof_blob = record.proof_blob.as_deref().ok_or_else(|| {
            ProofError::CorruptProof(format!("pending record {id} has no proof"))
        })?;

        let adapter = self.registry.get(record.backend)?;
        let attempt = tokio::time::timeout(
            self.config.maturation_deadline,
            adapter.attempt_maturation(proof_blob, &record.content_hash),
        )
        .await
        .map_err(|_| ProofError::Timeout(self.config.maturation_deadline))
        .and_then(|r| r);

        let (update, result_for) = match attempt {
            Ok(MaturationOutcome {
                confirmation: Some(confirmation),
                proof_blob,
                ..
            }) => (
                RecordUpdate::Confirmed {
                    proof_blob,
                    confirmation,
                },
                Outcome::Confirmed,
            ),
            Ok(MaturationOutcome {
                proof_blob: Some(proof_blob),
                attempt_errors,
                ..
            }) => {
                debug!(attempt_errors, "Proof extended");
                (
                    RecordUpdate::ProofExtended { proof_blob },
                    Outcome::Extended,
                )
            }
            Ok(MaturationOutcome { attempt_errors, .. }) => {
                debug!(attempt_errors, "Proof not yet mature");
                return Ok(MaturationResult::StillPending {
                    proof_extended: false,
                });
            }
            Err(ProofError::Rejected(reason)) => {
                (RecordUpdate::Failed { reason }, Outcome::Failed)
            }
            Err(e) => {
                if e.is_integrity_failure() {
                    warn!(error = %e, "Stored proof failed integrity checks");
                }
                return Err(e);
            }
        };

        if !self.store.apply_update(id, holder, &update).await? {
            warn!("Lease lost before update could be applied");
            return Ok(MaturationResult::Skipped(SkipReason::LeaseLost));
        }

        match result_for {
            Outcome::Extended => Ok(MaturationResult::StillPending {
                proof_extended: true,
            }),
            Outcome::Confirmed => {
                let record = self.get_status(id).await?;
                info!(
                    confirmed_at = ?record.confirmed_at,
                    "Timestamp confirmed"
                );
                Ok(MaturationResult::Confirmed(record))
            }
            Outcome::Failed => {
                let record = self.get_status(id).await?;
                warn!(reason = ?record.failure_reason, "Timestamp failed");
                Ok(MaturationResult::Failed(record))
            }
        }
    }

    /// Independently check a record's proof against its backend.
    #[instrument(skip(self))]
    pub async fn verify_proof(&self, id: Uuid) -> Result<AttestationReport> {
        let record = self.get_status(id).await?;
        let proof_blob = record.proof_blob.as_deref().ok_or_else(|| {
            ProofError::InvalidInput(format!("record {id} has no proof to verify"))
        })?;
        let adapter = self.registry.get(record.backend)?;
        adapter
            .verify_attestation(proof_blob, &record.content_hash)
            .await
    }
}

enum Outcome {
    Extended,
    Confirmed,
    Failed,
}
