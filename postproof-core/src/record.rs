//! Persisted timestamp records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chain::{Backend, BlockRef, Confirmation};
use crate::content::PostSnapshot;
use crate::error::{ProofError, Result};
use crate::fingerprint::ContentFingerprint;

/// Lifecycle state of a record.
///
/// `pending -> confirmed` and `pending -> failed` are the only transitions.
/// Confirmed and failed are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampStatus {
    Pending,
    Confirmed,
    Failed,
}

impl TimestampStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Whether the state machine permits moving to `next`.
    ///
    /// Pending to pending is allowed: a proof may grow without maturing.
    pub fn can_transition_to(&self, next: TimestampStatus) -> bool {
        matches!((self, next), (Self::Pending, _))
    }
}

impl std::fmt::Display for TimestampStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TimestampStatus {
    type Err = ProofError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "failed" => Ok(Self::Failed),
            other => Err(ProofError::Serialization(format!(
                "unknown timestamp status: {other}"
            ))),
        }
    }
}

/// A content fingerprint and its proof on one backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampRecord {
    pub id: Uuid,
    /// Owning subject, opaque to this crate
    pub subject_id: String,
    /// Platform reference used to re-fetch the post
    pub content_ref: String,
    /// Post as captured at submission
    pub snapshot: PostSnapshot,
    pub backend: Backend,
    pub content_hash: ContentFingerprint,
    pub status: TimestampStatus,
    /// Backend proof; absent only for records that failed at submission
    #[serde(default, with = "hex_bytes", skip_serializing_if = "Option::is_none")]
    pub proof_blob: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_ref: Option<BlockRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TimestampRecord {
    /// A record whose proof has been accepted by the backend.
    pub fn submitted(
        subject_id: impl Into<String>,
        content_ref: impl Into<String>,
        snapshot: PostSnapshot,
        backend: Backend,
        content_hash: ContentFingerprint,
        proof_blob: Vec<u8>,
        confirmation: Option<Confirmation>,
    ) -> Self {
        let now = Utc::now();
        let (status, confirmed_at, block_ref) = match confirmation {
            Some(c) => (TimestampStatus::Confirmed, Some(c.confirmed_at), Some(c.block_ref)),
            None => (TimestampStatus::Pending, None, None),
        };
        Self {
            id: Uuid::new_v4(),
            subject_id: subject_id.into(),
            content_ref: content_ref.into(),
            snapshot,
            backend,
            content_hash,
            status,
            proof_blob: Some(proof_blob),
            confirmed_at,
            block_ref,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A record the backend refused outright.
    pub fn failed(
        subject_id: impl Into<String>,
        content_ref: impl Into<String>,
        snapshot: PostSnapshot,
        backend: Backend,
        content_hash: ContentFingerprint,
        reason: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            subject_id: subject_id.into(),
            content_ref: content_ref.into(),
            snapshot,
            backend,
            content_hash,
            status: TimestampStatus::Failed,
            proof_blob: None,
            confirmed_at: None,
            block_ref: None,
            failure_reason: Some(reason.into()),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == TimestampStatus::Confirmed
    }

    /// Check the cross-field rules every stored record must satisfy.
    pub fn check_invariants(&self) -> Result<()> {
        let violation = match self.status {
            TimestampStatus::Confirmed
                if self.confirmed_at.is_none()
                    || self.block_ref.is_none()
                    || self.proof_blob.is_none() =>
            {
                Some("lacks proof, confirmation time or block reference")
            }
            TimestampStatus::Pending if self.proof_blob.is_none() => Some("has no proof"),
            TimestampStatus::Pending | TimestampStatus::Failed if self.confirmed_at.is_some() => {
                Some("carries a confirmation time")
            }
            TimestampStatus::Pending | TimestampStatus::Failed if self.block_ref.is_some() => {
                Some("carries a block reference")
            }
            _ => None,
        };
        match violation {
            Some(what) => Err(ProofError::InvariantViolation(format!(
                "{} record {} {what}",
                self.status, self.id
            ))),
            None => Ok(()),
        }
    }

    /// Apply an update in memory, enforcing the state machine.
    pub fn apply(&mut self, update: &RecordUpdate) -> Result<()> {
        let next = update.next_status();
        if !self.status.can_transition_to(next) {
            return Err(ProofError::InvalidInput(format!(
                "illegal transition {} -> {next} for record {}",
                self.status, self.id
            )));
        }

        match update {
            RecordUpdate::ProofExtended { proof_blob } => {
                self.proof_blob = Some(proof_blob.clone());
            }
            RecordUpdate::Confirmed {
                proof_blob,
                confirmation,
            } => {
                if let Some(blob) = proof_blob {
                    self.proof_blob = Some(blob.clone());
                }
                self.confirmed_at = Some(confirmation.confirmed_at);
                self.block_ref = Some(confirmation.block_ref.clone());
            }
            RecordUpdate::Failed { reason } => {
                self.failure_reason = Some(reason.clone());
            }
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Serialize to CBOR.
    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::into_writer(self, &mut bytes)
            .map_err(|e| ProofError::Serialization(e.to_string()))?;
        Ok(bytes)
    }

    /// Deserialize from CBOR.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| ProofError::Serialization(e.to_string()))
    }
}

/// A change applied atomically by the lifecycle manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordUpdate {
    /// The proof grew but has not matured.
    ProofExtended { proof_blob: Vec<u8> },
    Confirmed {
        proof_blob: Option<Vec<u8>>,
        confirmation: Confirmation,
    },
    Failed { reason: String },
}

impl RecordUpdate {
    pub fn next_status(&self) -> TimestampStatus {
        match self {
            Self::ProofExtended { .. } => TimestampStatus::Pending,
            Self::Confirmed { .. } => TimestampStatus::Confirmed,
            Self::Failed { .. } => TimestampStatus::Failed,
        }
    }
}

/// Hex encoding for optional byte fields.
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => serializer.serialize_some(&hex::encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|s| hex::decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{Engagement, PostContent};

    fn snapshot() -> PostSnapshot {
        PostSnapshot::new(
            PostContent {
                post_id: "1".into(),
                author: "alice".into(),
                text: "hello".into(),
                posted_at: None,
                media: vec![],
            },
            Engagement::default(),
        )
    }

    fn pending_record() -> TimestampRecord {
        let snap = snapshot();
        let fp = snap.content.fingerprint().unwrap();
        TimestampRecord::submitted(
            "subject-1",
            "post:1",
            snap,
            Backend::CalendarBitcoin,
            fp,
            vec![1, 2, 3],
            None,
        )
    }

    fn confirmation() -> Confirmation {
        Confirmation {
            block_ref: BlockRef {
                height: 900_000,
                hash: None,
            },
            confirmed_at: Utc::now(),
        }
    }

    #[test]
    fn test_new_record_is_pending_and_valid() {
        let record = pending_record();
        assert_eq!(record.status, TimestampStatus::Pending);
        record.check_invariants().unwrap();
    }

    #[test]
    fn test_confirm_then_no_further_transitions() {
        let mut record = pending_record();
        record
            .apply(&RecordUpdate::Confirmed {
                proof_blob: Some(vec![4, 5, 6]),
                confirmation: confirmation(),
            })
            .unwrap();
        assert!(record.is_confirmed());
        assert_eq!(record.proof_blob, Some(vec![4, 5, 6]));
        record.check_invariants().unwrap();

        let err = record
            .apply(&RecordUpdate::Failed {
                reason: "late".into(),
            })
            .unwrap_err();
        assert!(matches!(err, ProofError::InvalidInput(_)));
        assert!(record.is_confirmed());
    }

    #[test]
    fn test_proof_extension_stays_pending() {
        let mut record = pending_record();
        record
            .apply(&RecordUpdate::ProofExtended {
                proof_blob: vec![9; 10],
            })
            .unwrap();
        assert_eq!(record.status, TimestampStatus::Pending);
        assert_eq!(record.proof_blob.as_deref(), Some(&[9u8; 10][..]));
    }

    #[test]
    fn test_failed_record_has_no_proof() {
        let snap = snapshot();
        let fp = snap.content.fingerprint().unwrap();
        let record = TimestampRecord::failed(
            "subject-1",
            "post:1",
            snap,
            Backend::SolanaDevnet,
            fp,
            "unsupported backend",
        );
        record.check_invariants().unwrap();
        assert!(record.status.is_terminal());
    }

    #[test]
    fn test_invariants_catch_confirmed_without_block() {
        let mut record = pending_record();
        record.status = TimestampStatus::Confirmed;
        let err = record.check_invariants().unwrap_err();
        assert!(matches!(err, ProofError::InvariantViolation(_)));
    }

    #[test]
    fn test_invariants_catch_block_ref_on_unconfirmed_records() {
        let mut pending = pending_record();
        pending.block_ref = Some(confirmation().block_ref);
        let err = pending.check_invariants().unwrap_err();
        assert!(matches!(err, ProofError::InvariantViolation(_)));
        assert!(err.to_string().contains("block reference"));

        let snap = snapshot();
        let fp = snap.content.fingerprint().unwrap();
        let mut failed = TimestampRecord::failed(
            "subject-1",
            "post:1",
            snap,
            Backend::SolanaDevnet,
            fp,
            "rejected",
        );
        failed.block_ref = Some(confirmation().block_ref);
        assert!(matches!(
            failed.check_invariants(),
            Err(ProofError::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_invariants_catch_confirmation_time_on_pending() {
        let mut record = pending_record();
        record.confirmed_at = Some(Utc::now());
        assert!(matches!(
            record.check_invariants(),
            Err(ProofError::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_cbor_and_json_roundtrip() {
        let record = pending_record();
        let restored = TimestampRecord::from_cbor(&record.to_cbor().unwrap()).unwrap();
        assert_eq!(restored, record);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["proof_blob"], "010203");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["backend"], "calendar-bitcoin");
    }
}
