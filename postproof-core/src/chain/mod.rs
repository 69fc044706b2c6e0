//! Timestamping backends.
//!
//! Every backend implements [`ChainAdapter`]:
//!
//! - **Calendar** - Bitcoin-anchored proofs aggregated by calendar servers
//! - **Ledger** - direct memo transactions on a Solana cluster
//! - **Mock** - in-process calendar network and ledger (testing only)
//!
//! ## Quick Start
//!
//! ```no_run
//! use postproof_core::chain::{AdapterRegistry, Backend, RegistryConfig};
//! use postproof_core::fingerprint::{fingerprint, Content};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = AdapterRegistry::from_config(RegistryConfig::default())?;
//! let adapter = registry.get(Backend::CalendarBitcoin)?;
//! let fp = fingerprint(&Content::Text("gm".into()))?;
//! let outcome = adapter.submit(&fp).await?;
//! println!("proof is {} bytes", outcome.proof_blob.len());
//! # Ok(())
//! # }
//! ```

pub mod calendar;
#[cfg(feature = "network")]
mod http;
pub mod ledger;
pub mod mock;

pub use calendar::{BlockHeader, BlockHeaderSource, CalendarConfig, CalendarProofAdapter, CalendarTransport};
#[cfg(feature = "network")]
pub use http::{EsploraHeaderSource, HttpCalendarClient};
pub use ledger::{LedgerAdapter, LedgerConfig, LedgerRpc, TxStatus};

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ProofError, Result};
use crate::fingerprint::ContentFingerprint;

/// Which backend a record is timestamped on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    /// Bitcoin via OpenTimestamps-style calendar servers
    CalendarBitcoin,
    /// Solana mainnet-beta memo transaction
    SolanaMainnet,
    /// Solana devnet memo transaction
    SolanaDevnet,
}

impl Backend {
    pub const ALL: [Backend; 3] = [
        Backend::CalendarBitcoin,
        Backend::SolanaMainnet,
        Backend::SolanaDevnet,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CalendarBitcoin => "calendar-bitcoin",
            Self::SolanaMainnet => "solana-mainnet",
            Self::SolanaDevnet => "solana-devnet",
        }
    }

    pub fn is_ledger(&self) -> bool {
        matches!(self, Self::SolanaMainnet | Self::SolanaDevnet)
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Backend {
    type Err = ProofError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|b| b.as_str() == s)
            .ok_or_else(|| ProofError::UnsupportedBackend(s.to_string()))
    }
}

/// Block reference recorded on confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
    /// Bitcoin block height, or Solana slot
    pub height: u64,
    /// Block hash or transaction signature, when the backend provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

/// Proof that a fingerprint was committed no later than `confirmed_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    pub block_ref: BlockRef,
    pub confirmed_at: DateTime<Utc>,
}

/// Maturity as reported by an adapter. Adapters never report failure
/// through a status; they return an error instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Maturity {
    Pending,
    Confirmed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionOutcome {
    pub proof_blob: Vec<u8>,
    pub confirmation: Option<Confirmation>,
}

impl SubmissionOutcome {
    pub fn status(&self) -> Maturity {
        if self.confirmation.is_some() {
            Maturity::Confirmed
        } else {
            Maturity::Pending
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaturationOutcome {
    pub status: Maturity,
    /// Replacement blob, present only when the proof grew.
    pub proof_blob: Option<Vec<u8>>,
    pub confirmation: Option<Confirmation>,
    /// Individual network calls that failed during this attempt.
    pub attempt_errors: usize,
}

impl MaturationOutcome {
    pub fn pending(proof_blob: Option<Vec<u8>>, attempt_errors: usize) -> Self {
        Self {
            status: Maturity::Pending,
            proof_blob,
            confirmation: None,
            attempt_errors,
        }
    }

    pub fn confirmed(proof_blob: Option<Vec<u8>>, confirmation: Confirmation) -> Self {
        Self {
            status: Maturity::Confirmed,
            proof_blob,
            confirmation: Some(confirmation),
            attempt_errors: 0,
        }
    }
}

/// Independent check of a stored proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationReport {
    /// The proof parses and is rooted at the fingerprint.
    pub is_valid: bool,
    /// Times proven by attestations that checked out against the chain.
    pub attested_timestamps: BTreeSet<DateTime<Utc>>,
    /// Block behind the earliest attested time.
    pub earliest_block: Option<BlockRef>,
    /// Attestations that contradicted the chain.
    pub rejected_attestations: usize,
}

impl AttestationReport {
    pub fn is_confirmed(&self) -> bool {
        !self.attested_timestamps.is_empty()
    }

    pub fn earliest(&self) -> Option<DateTime<Utc>> {
        self.attested_timestamps.iter().next().copied()
    }
}

/// A timestamping backend.
///
/// Implementations must be thread-safe (`Send + Sync`); one instance serves
/// every record on its backend.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn backend(&self) -> Backend;

    /// Commit a fingerprint. Called once per record.
    async fn submit(&self, fingerprint: &ContentFingerprint) -> Result<SubmissionOutcome>;

    /// Try to move a pending proof forward.
    ///
    /// Idempotent: an already mature proof reports `Confirmed` again without
    /// growing. A proof that cannot mature yet reports `Pending`.
    async fn attempt_maturation(
        &self,
        proof_blob: &[u8],
        fingerprint: &ContentFingerprint,
    ) -> Result<MaturationOutcome>;

    /// Validate that the proof commits to `fingerprint`, trusting no local state.
    async fn verify_attestation(
        &self,
        proof_blob: &[u8],
        fingerprint: &ContentFingerprint,
    ) -> Result<AttestationReport>;
}

/// Configuration for building the adapter registry.
#[derive(Debug, Clone, Default)]
pub struct RegistryConfig {
    /// Calendar backend; `None` leaves it unregistered
    pub calendar: Option<CalendarConfig>,
    /// Ledger backends, one per cluster
    pub ledgers: Vec<LedgerConfig>,
    /// Register in-process mock backends for every backend not configured
    pub mock: bool,
}

/// Adapters keyed by backend, resolved once at startup.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<Backend, Arc<dyn ChainAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn ChainAdapter>) -> &mut Self {
        let backend = adapter.backend();
        if self.adapters.insert(backend, adapter).is_some() {
            tracing::warn!(backend = %backend, "Replaced previously registered adapter");
        }
        self
    }

    pub fn with(mut self, adapter: Arc<dyn ChainAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn get(&self, backend: Backend) -> Result<Arc<dyn ChainAdapter>> {
        self.adapters
            .get(&backend)
            .cloned()
            .ok_or_else(|| ProofError::UnsupportedBackend(backend.to_string()))
    }

    pub fn backends(&self) -> Vec<Backend> {
        let mut backends: Vec<_> = self.adapters.keys().copied().collect();
        backends.sort();
        backends
    }

    /// Build the registry from configuration.
    pub fn from_config(config: RegistryConfig) -> Result<Self> {
        let mut registry = Self::new();

        #[cfg(feature = "network")]
        if let Some(calendar) = config.calendar {
            tracing::info!(
                calendars = calendar.calendar_urls.len(),
                "Registered calendar backend"
            );
            registry.register(Arc::new(CalendarProofAdapter::from_config(calendar)?));
        }

        #[cfg(feature = "solana")]
        for ledger in config.ledgers {
            if ledger.keypair_path.is_none() {
                return Err(ProofError::InvalidInput(format!(
                    "{} requires a fee payer keypair path",
                    ledger.backend
                )));
            }
            tracing::info!(backend = %ledger.backend, "Registered ledger backend");
            registry.register(Arc::new(LedgerAdapter::solana(ledger)?));
        }

        #[cfg(not(feature = "network"))]
        if config.calendar.is_some() {
            return Err(ProofError::UnsupportedBackend(
                "calendar backend requires the `network` feature".into(),
            ));
        }

        #[cfg(not(feature = "solana"))]
        if !config.ledgers.is_empty() {
            return Err(ProofError::UnsupportedBackend(
                "ledger backends require the `solana` feature".into(),
            ));
        }

        if config.mock {
            tracing::warn!("Registering mock backends (NOT for production)");
            let network = mock::MockCalendarNetwork::new();
            network.set_auto_anchor(true);
            for backend in Backend::ALL {
                if registry.adapters.contains_key(&backend) {
                    continue;
                }
                let adapter: Arc<dyn ChainAdapter> = if backend.is_ledger() {
                    let ledger = mock::MockLedger::new();
                    ledger.set_auto_confirm(ledger::DEFAULT_REQUIRED_CONFIRMATIONS);
                    Arc::new(LedgerAdapter::new(
                        backend,
                        Arc::new(ledger),
                        LedgerConfig::for_backend(backend),
                    ))
                } else {
                    Arc::new(network.adapter()?)
                };
                registry.register(adapter);
            }
        }

        Ok(registry)
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("backends", &self.backends())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_string_roundtrip() {
        for backend in Backend::ALL {
            assert_eq!(backend.as_str().parse::<Backend>().unwrap(), backend);
        }
        assert!(matches!(
            "evm-chain-1".parse::<Backend>(),
            Err(ProofError::UnsupportedBackend(_))
        ));
    }

    #[test]
    fn test_backend_serde_uses_kebab_case() {
        let json = serde_json::to_string(&Backend::CalendarBitcoin).unwrap();
        assert_eq!(json, "\"calendar-bitcoin\"");
    }

    #[test]
    fn test_empty_registry_reports_unsupported() {
        let registry = AdapterRegistry::new();
        assert!(matches!(
            registry.get(Backend::SolanaDevnet),
            Err(ProofError::UnsupportedBackend(_))
        ));
    }

    #[test]
    fn test_mock_registry_covers_all_backends() {
        let registry = AdapterRegistry::from_config(RegistryConfig {
            mock: true,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(registry.backends(), Backend::ALL.to_vec());
    }

    #[test]
    fn test_report_earliest() {
        let mut report = AttestationReport {
            is_valid: true,
            attested_timestamps: BTreeSet::new(),
            earliest_block: None,
            rejected_attestations: 0,
        };
        assert!(!report.is_confirmed());
        let late = DateTime::from_timestamp(2_000, 0).unwrap();
        let early = DateTime::from_timestamp(1_000, 0).unwrap();
        report.attested_timestamps.insert(late);
        report.attested_timestamps.insert(early);
        assert_eq!(report.earliest(), Some(early));
    }
}
