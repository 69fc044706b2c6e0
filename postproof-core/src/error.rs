use thiserror::Error;

/// Magic bytes at the start of every detached calendar proof.
pub const PROOF_HEADER_MAGIC: &[u8] =
    b"\x00OpenTimestamps\x00\x00Proof\x00\xbf\x89\xe2\xe8\x84\xe8\x92\x94";

/// Only proof container version this crate reads and writes.
pub const CURRENT_PROOF_VERSION: u64 = 1;

/// Upper bound on a stored proof blob. Calendar proofs are a few KiB at most.
pub const MAX_PROOF_SIZE: usize = 256 * 1024;

#[derive(Error, Debug)]
pub enum ProofError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Every backend rejected or was unreachable at submission time.
    #[error("Submission failed: {0}")]
    Submission(String),

    /// The backend refused the request in a way retrying will not fix.
    #[error("Rejected by backend: {0}")]
    Rejected(String),

    #[error("Corrupt proof: {0}")]
    CorruptProof(String),

    /// Stored proof does not commit to the claimed fingerprint.
    #[error("Fingerprint mismatch: expected {expected}, found {found}")]
    Mismatch { expected: String, found: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Deadline of {0:?} exceeded")]
    Timeout(std::time::Duration),

    #[error("No adapter registered for backend {0}")]
    UnsupportedBackend(String),

    #[error("Record store error: {0}")]
    Store(String),

    #[error("Content fetch failed: {0}")]
    Fetch(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    /// A record's fields contradict its status.
    #[error("Record invariant violated: {0}")]
    InvariantViolation(String),

    #[cfg(feature = "network")]
    #[error("HTTP request error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl ProofError {
    /// Whether the failure may clear up on a later attempt.
    ///
    /// Transient errors never move a record to `failed`.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::Submission(_) | Self::Store(_) => true,
            #[cfg(feature = "network")]
            Self::HttpError(_) => true,
            _ => false,
        }
    }

    /// Whether the error signals loss of proof integrity.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(self, Self::CorruptProof(_) | Self::Mismatch { .. })
    }
}

pub type Result<T> = std::result::Result<T, ProofError>;
