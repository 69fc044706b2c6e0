//! PostProof Core - proof-of-existence for social media posts
//!
//! This crate fingerprints captured posts, timestamps the fingerprints on a
//! public chain, matures pending proofs in the background, and later checks
//! whether the live post still matches what was stamped.
//!
//! # Features
//!
//! - Deterministic content canonicalization and SHA-256 fingerprints
//! - Bitcoin timestamps through OpenTimestamps-compatible calendar servers
//! - Direct Solana memo timestamps
//! - Lease-guarded maturation with a concurrent sweep
//! - Drift verification with a similarity score for edited posts
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use postproof_core::{
//!     AdapterRegistry, Backend, Engagement, LifecycleConfig, LifecycleManager,
//!     MemoryRecordStore, PostContent, PostSnapshot, RegistryConfig, SubmissionRequest,
//! };
//!
//! # async fn example() -> postproof_core::Result<()> {
//! let registry = AdapterRegistry::from_config(RegistryConfig {
//!     mock: true,
//!     ..Default::default()
//! })?;
//! let manager = LifecycleManager::new(
//!     Arc::new(registry),
//!     Arc::new(MemoryRecordStore::new()),
//!     LifecycleConfig::default(),
//! );
//!
//! let snapshot = PostSnapshot::new(
//!     PostContent {
//!         post_id: "1".into(),
//!         author: "alice".into(),
//!         text: "hello world".into(),
//!         posted_at: None,
//!         media: vec![],
//!     },
//!     Engagement::default(),
//! );
//! let record = manager
//!     .submit_timestamp(SubmissionRequest {
//!         subject_id: "user-1".into(),
//!         content_ref: "post:1".into(),
//!         snapshot,
//!         backend: Backend::CalendarBitcoin,
//!     })
//!     .await?;
//! println!("record {} is {}", record.id, record.status);
//! # Ok(())
//! # }
//! ```

pub mod chain;
pub mod content;
pub mod error;
pub mod fingerprint;
pub mod lifecycle;
pub mod ots;
pub mod record;
pub mod scheduler;
pub mod store;
pub mod verification;

// Re-export main types for convenience
pub use chain::{
    AdapterRegistry, AttestationReport, Backend, BlockRef, ChainAdapter, Confirmation,
    MaturationOutcome, Maturity, RegistryConfig, SubmissionOutcome,
};
pub use content::{ContentFetcher, Engagement, FetchOutcome, PostContent, PostSnapshot};
pub use error::{ProofError, Result, CURRENT_PROOF_VERSION, MAX_PROOF_SIZE};
pub use fingerprint::{
    canonicalize, fingerprint, hash, similarity, Content, ContentFingerprint, HashAlgorithm,
};
pub use lifecycle::{
    LifecycleConfig, LifecycleManager, MaturationResult, SkipReason, SubmissionRequest,
};
pub use record::{RecordUpdate, TimestampRecord, TimestampStatus};
pub use scheduler::{MaturationScheduler, SweepReport};
pub use store::{MemoryRecordStore, RecordStore};
pub use verification::{
    classify, DriftStatus, VerificationEngine, VerificationOutcome, VerificationResult,
};
