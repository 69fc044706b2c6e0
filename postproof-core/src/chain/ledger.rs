//! Direct ledger timestamping with Solana memo transactions.
//!
//! The fingerprint is published as a memo `POSTPROOF:<hex digest>`. The proof
//! blob is the transaction signature; the ledger itself holds the evidence.
//! A transaction counts as confirmed once it has the configured number of
//! confirmations, or has been finalized by the cluster.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use super::{
    AttestationReport, Backend, BlockRef, ChainAdapter, Confirmation, MaturationOutcome,
    SubmissionOutcome,
};
use crate::error::{ProofError, Result};
use crate::fingerprint::ContentFingerprint;

/// Memo prefix identifying our transactions on chain.
pub const MEMO_PREFIX: &str = "POSTPROOF:";

/// Confirmations after which Solana reports a transaction as rooted.
pub const DEFAULT_REQUIRED_CONFIRMATIONS: u64 = 32;

pub const MAINNET_RPC_URL: &str = "https://api.mainnet-beta.solana.com";
pub const DEVNET_RPC_URL: &str = "https://api.devnet.solana.com";

/// Ledger backend settings.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub backend: Backend,
    pub rpc_url: String,
    /// Fee payer keypair (Solana CLI JSON format)
    pub keypair_path: Option<PathBuf>,
    pub required_confirmations: u64,
    /// Report submissions as confirmed immediately. Test and dev clusters only.
    pub instant_finality: bool,
    pub request_timeout: std::time::Duration,
}

impl LedgerConfig {
    pub fn for_backend(backend: Backend) -> Self {
        let rpc_url = match backend {
            Backend::SolanaMainnet => MAINNET_RPC_URL,
            _ => DEVNET_RPC_URL,
        };
        Self {
            backend,
            rpc_url: rpc_url.to_string(),
            keypair_path: None,
            required_confirmations: DEFAULT_REQUIRED_CONFIRMATIONS,
            instant_finality: false,
            request_timeout: std::time::Duration::from_secs(30),
        }
    }
}

/// Status of a published transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxStatus {
    pub slot: u64,
    /// `None` once the cluster has finalized the transaction
    pub confirmations: Option<u64>,
    /// Landed on chain but failed to execute
    pub failed: bool,
}

impl TxStatus {
    pub fn has_confirmations(&self, required: u64) -> bool {
        self.confirmations.map_or(true, |c| c >= required)
    }
}

/// RPC access to a ledger cluster.
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    /// Publish a memo transaction, returning its signature.
    async fn publish_memo(&self, memo: &[u8]) -> Result<String>;

    /// `Ok(None)` if the cluster does not know the transaction (yet).
    async fn transaction_status(&self, signature: &str) -> Result<Option<TxStatus>>;

    async fn block_time(&self, slot: u64) -> Result<Option<DateTime<Utc>>>;

    /// Memo payload carried by the transaction. `Ok(None)` if not found.
    async fn fetch_memo(&self, signature: &str) -> Result<Option<Vec<u8>>>;
}

/// Expected memo for a fingerprint.
pub fn memo_for(fingerprint: &ContentFingerprint) -> String {
    format!("{MEMO_PREFIX}{}", fingerprint.hash_hex)
}

fn signature_from_blob(proof_blob: &[u8]) -> Result<&str> {
    let signature = std::str::from_utf8(proof_blob)
        .map_err(|_| ProofError::CorruptProof("ledger proof is not a UTF-8 signature".into()))?;
    if signature.is_empty() || !signature.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ProofError::CorruptProof(format!(
            "malformed transaction signature {signature:?}"
        )));
    }
    Ok(signature)
}

/// Adapter for the `solana-*` backends.
pub struct LedgerAdapter {
    backend: Backend,
    rpc: Arc<dyn LedgerRpc>,
    required_confirmations: u64,
    instant_finality: bool,
}

impl LedgerAdapter {
    pub fn new(backend: Backend, rpc: Arc<dyn LedgerRpc>, config: LedgerConfig) -> Self {
        if config.instant_finality {
            warn!(backend = %backend, "Instant finality enabled; confirmations are not awaited");
        }
        Self {
            backend,
            rpc,
            required_confirmations: config.required_confirmations.max(1),
            instant_finality: config.instant_finality,
        }
    }

    /// Build the adapter against a live Solana RPC endpoint.
    ///
    /// Without `keypair_path` the adapter can verify but not publish.
    #[cfg(feature = "solana")]
    pub fn solana(config: LedgerConfig) -> Result<Self> {
        let rpc = solana_rpc::SolanaRpc::new(&config)?;
        Ok(Self::new(config.backend, Arc::new(rpc), config))
    }

    async fn confirmation_for(&self, signature: &str, status: &TxStatus) -> Result<Option<Confirmation>> {
        let Some(confirmed_at) = self.rpc.block_time(status.slot).await? else {
            debug!(slot = status.slot, "Block time not yet available");
            return Ok(None);
        };
        Ok(Some(Confirmation {
            block_ref: BlockRef {
                height: status.slot,
                hash: Some(signature.to_string()),
            },
            confirmed_at,
        }))
    }
}

#[async_trait]
impl ChainAdapter for LedgerAdapter {
    fn backend(&self) -> Backend {
        self.backend
    }

    #[instrument(skip(self), fields(backend = %self.backend, digest = %fingerprint.hash_hex))]
    async fn submit(&self, fingerprint: &ContentFingerprint) -> Result<SubmissionOutcome> {
        let memo = memo_for(fingerprint);
        let signature = self.rpc.publish_memo(memo.as_bytes()).await?;
        info!(signature = %signature, "Memo transaction published");

        // Instant finality skips the confirmation threshold, never the evidence:
        // a transaction the cluster cannot show yet stays pending.
        let confirmation = if self.instant_finality {
            match self.rpc.transaction_status(&signature).await? {
                Some(status) if status.failed => {
                    return Err(ProofError::Rejected(format!(
                        "transaction {signature} failed on chain"
                    )));
                }
                Some(status) => self.confirmation_for(&signature, &status).await?,
                None => {
                    debug!(signature = %signature, "Transaction not yet visible, left pending");
                    None
                }
            }
        } else {
            None
        };

        Ok(SubmissionOutcome {
            proof_blob: signature.into_bytes(),
            confirmation,
        })
    }

    #[instrument(skip(self, proof_blob), fields(backend = %self.backend))]
    async fn attempt_maturation(
        &self,
        proof_blob: &[u8],
        _fingerprint: &ContentFingerprint,
    ) -> Result<MaturationOutcome> {
        let signature = signature_from_blob(proof_blob)?;

        let Some(status) = self.rpc.transaction_status(signature).await? else {
            debug!(signature, "Transaction not yet visible");
            return Ok(MaturationOutcome::pending(None, 0));
        };
        if status.failed {
            return Err(ProofError::Rejected(format!(
                "transaction {signature} failed on chain"
            )));
        }
        if !status.has_confirmations(self.required_confirmations) {
            debug!(
                signature,
                confirmations = status.confirmations,
                required = self.required_confirmations,
                "Awaiting confirmations"
            );
            return Ok(MaturationOutcome::pending(None, 0));
        }

        match self.confirmation_for(signature, &status).await? {
            Some(confirmation) => {
                info!(signature, slot = status.slot, "Ledger transaction confirmed");
                Ok(MaturationOutcome::confirmed(None, confirmation))
            }
            None => Ok(MaturationOutcome::pending(None, 0)),
        }
    }

    #[instrument(skip(self, proof_blob), fields(backend = %self.backend, digest = %fingerprint.hash_hex))]
    async fn verify_attestation(
        &self,
        proof_blob: &[u8],
        fingerprint: &ContentFingerprint,
    ) -> Result<AttestationReport> {
        let signature = signature_from_blob(proof_blob)?;
        let mut report = AttestationReport {
            is_valid: false,
            attested_timestamps: Default::default(),
            earliest_block: None,
            rejected_attestations: 0,
        };

        let Some(memo) = self.rpc.fetch_memo(signature).await? else {
            warn!(signature, "Transaction not found on ledger");
            return Ok(report);
        };
        let expected = memo_for(fingerprint);
        if memo != expected.as_bytes() {
            return Err(ProofError::Mismatch {
                expected,
                found: String::from_utf8_lossy(&memo).into_owned(),
            });
        }
        report.is_valid = true;

        if let Some(status) = self.rpc.transaction_status(signature).await? {
            if !status.failed && status.has_confirmations(self.required_confirmations) {
                if let Some(confirmation) = self.confirmation_for(signature, &status).await? {
                    report.attested_timestamps.insert(confirmation.confirmed_at);
                    report.earliest_block = Some(confirmation.block_ref);
                }
            }
        }
        Ok(report)
    }
}

#[cfg(feature = "solana")]
mod solana_rpc {
    use std::str::FromStr;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use solana_client::nonblocking::rpc_client::RpcClient;
    use solana_client::rpc_config::RpcTransactionConfig;
    use solana_client::rpc_request::RpcRequest;
    use solana_sdk::{
        commitment_config::CommitmentConfig,
        message::Message,
        signature::{read_keypair_file, Keypair, Signature, Signer},
        transaction::Transaction,
    };
    use serde_json::json;
    use solana_transaction_status::{
        EncodedConfirmedTransactionWithStatusMeta, UiTransactionEncoding,
    };
    use spl_memo::build_memo;
    use tracing::debug;

    use super::{LedgerConfig, LedgerRpc, TxStatus};
    use crate::error::{ProofError, Result};

    pub struct SolanaRpc {
        client: RpcClient,
        /// Fee payer; without one the client can only read
        payer: Option<Keypair>,
    }

    impl SolanaRpc {
        pub fn new(config: &LedgerConfig) -> Result<Self> {
            let payer = config
                .keypair_path
                .as_ref()
                .map(|path| {
                    read_keypair_file(path).map_err(|e| {
                        ProofError::InvalidInput(format!(
                            "failed to read keypair {}: {e}",
                            path.display()
                        ))
                    })
                })
                .transpose()?;
            let client = RpcClient::new_with_timeout_and_commitment(
                config.rpc_url.clone(),
                config.request_timeout,
                CommitmentConfig::confirmed(),
            );
            Ok(Self { client, payer })
        }

        fn parse_signature(signature: &str) -> Result<Signature> {
            Signature::from_str(signature).map_err(|e| {
                ProofError::CorruptProof(format!("invalid transaction signature: {e}"))
            })
        }
    }

    fn rpc_error(context: &str, e: impl std::fmt::Display) -> ProofError {
        ProofError::Network(format!("{context}: {e}"))
    }

    #[async_trait]
    impl LedgerRpc for SolanaRpc {
        async fn publish_memo(&self, memo: &[u8]) -> Result<String> {
            let signer = self.payer.as_ref().ok_or_else(|| {
                ProofError::InvalidInput("publishing requires a fee payer keypair".into())
            })?;
            let payer = signer.pubkey();
            let memo_ix = build_memo(memo, &[&payer]);
            let recent_blockhash = self
                .client
                .get_latest_blockhash()
                .await
                .map_err(|e| rpc_error("failed to get recent blockhash", e))?;

            let message = Message::new(&[memo_ix], Some(&payer));
            let transaction = Transaction::new(&[signer], message, recent_blockhash);

            let signature = self
                .client
                .send_transaction(&transaction)
                .await
                .map_err(|e| ProofError::Submission(format!("failed to send transaction: {e}")))?;
            Ok(signature.to_string())
        }

        async fn transaction_status(&self, signature: &str) -> Result<Option<TxStatus>> {
            let signature = Self::parse_signature(signature)?;
            let response = self
                .client
                .get_signature_statuses(&[signature])
                .await
                .map_err(|e| rpc_error("failed to get signature status", e))?;

            Ok(response.value.into_iter().next().flatten().map(|status| TxStatus {
                slot: status.slot,
                confirmations: status.confirmations.map(|c| c as u64),
                failed: status.err.is_some(),
            }))
        }

        async fn block_time(&self, slot: u64) -> Result<Option<DateTime<Utc>>> {
            match self.client.get_block_time(slot).await {
                Ok(unix) => Ok(DateTime::from_timestamp(unix, 0)),
                Err(e) => {
                    debug!(slot, error = %e, "Block time unavailable");
                    Ok(None)
                }
            }
        }

        async fn fetch_memo(&self, signature: &str) -> Result<Option<Vec<u8>>> {
            let signature = Self::parse_signature(signature)?;
            let config = RpcTransactionConfig {
                encoding: Some(UiTransactionEncoding::Base64),
                commitment: Some(CommitmentConfig::confirmed()),
                max_supported_transaction_version: Some(0),
            };
            // A null result means the cluster does not know the signature;
            // anything else that goes wrong is an RPC failure.
            let confirmed: Option<EncodedConfirmedTransactionWithStatusMeta> = self
                .client
                .send(
                    RpcRequest::GetTransaction,
                    json!([signature.to_string(), config]),
                )
                .await
                .map_err(|e| rpc_error("failed to fetch transaction", e))?;
            let Some(confirmed) = confirmed else {
                debug!(%signature, "Transaction unknown to the cluster");
                return Ok(None);
            };

            let transaction = confirmed.transaction.transaction.decode().ok_or_else(|| {
                ProofError::Serialization("undecodable transaction from RPC".into())
            })?;
            let keys = transaction.message.static_account_keys();
            let memo = transaction
                .message
                .instructions()
                .iter()
                .find(|ix| keys.get(ix.program_id_index as usize) == Some(&spl_memo::id()))
                .map(|ix| ix.data.clone())
                .unwrap_or_default();
            Ok(Some(memo))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::MockLedger;
    use crate::chain::Maturity;
    use crate::fingerprint::{hash, HashAlgorithm};

    fn fp() -> ContentFingerprint {
        hash(b"ledger post", HashAlgorithm::Sha256)
    }

    fn adapter(ledger: &MockLedger, instant: bool) -> LedgerAdapter {
        let config = LedgerConfig {
            required_confirmations: 3,
            instant_finality: instant,
            ..LedgerConfig::for_backend(Backend::SolanaDevnet)
        };
        LedgerAdapter::new(Backend::SolanaDevnet, Arc::new(ledger.clone()), config)
    }

    #[tokio::test]
    async fn test_submit_publishes_prefixed_memo() {
        let ledger = MockLedger::new();
        let adapter = adapter(&ledger, false);
        let outcome = adapter.submit(&fp()).await.unwrap();
        assert_eq!(outcome.status(), Maturity::Pending);

        let signature = String::from_utf8(outcome.proof_blob).unwrap();
        let memo = ledger.memo(&signature).unwrap();
        assert_eq!(memo, format!("POSTPROOF:{}", fp().hash_hex).into_bytes());
    }

    #[tokio::test]
    async fn test_instant_finality_confirms_at_submission() {
        let ledger = MockLedger::new();
        let adapter = adapter(&ledger, true);
        let outcome = adapter.submit(&fp()).await.unwrap();
        assert_eq!(outcome.status(), Maturity::Confirmed);
        assert!(outcome.confirmation.unwrap().block_ref.hash.is_some());
    }

    /// Real ledger for publishing, with a fixed answer to status queries.
    struct FixedStatus {
        inner: MockLedger,
        status: Option<TxStatus>,
    }

    #[async_trait]
    impl LedgerRpc for FixedStatus {
        async fn publish_memo(&self, memo: &[u8]) -> Result<String> {
            self.inner.publish_memo(memo).await
        }

        async fn transaction_status(&self, _signature: &str) -> Result<Option<TxStatus>> {
            Ok(self.status)
        }

        async fn block_time(&self, slot: u64) -> Result<Option<DateTime<Utc>>> {
            self.inner.block_time(slot).await
        }

        async fn fetch_memo(&self, signature: &str) -> Result<Option<Vec<u8>>> {
            self.inner.fetch_memo(signature).await
        }
    }

    fn instant_adapter(status: Option<TxStatus>) -> LedgerAdapter {
        let config = LedgerConfig {
            instant_finality: true,
            ..LedgerConfig::for_backend(Backend::SolanaDevnet)
        };
        let rpc = FixedStatus {
            inner: MockLedger::new(),
            status,
        };
        LedgerAdapter::new(Backend::SolanaDevnet, Arc::new(rpc), config)
    }

    #[tokio::test]
    async fn test_instant_finality_unseen_transaction_stays_pending() {
        let outcome = instant_adapter(None).submit(&fp()).await.unwrap();
        assert_eq!(outcome.status(), Maturity::Pending);
        assert!(outcome.confirmation.is_none());
        assert!(!outcome.proof_blob.is_empty());
    }

    #[tokio::test]
    async fn test_instant_finality_failed_transaction_is_rejected() {
        let status = TxStatus {
            slot: 7,
            confirmations: Some(0),
            failed: true,
        };
        let err = instant_adapter(Some(status)).submit(&fp()).await.unwrap_err();
        assert!(matches!(err, ProofError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_instant_finality_uses_real_slot_and_block_time() {
        let status = TxStatus {
            slot: 7,
            confirmations: Some(0),
            failed: false,
        };
        let outcome = instant_adapter(Some(status)).submit(&fp()).await.unwrap();
        let confirmation = outcome.confirmation.unwrap();
        assert_eq!(confirmation.block_ref.height, 7);
        assert_eq!(
            Some(confirmation.confirmed_at),
            MockLedger::new().block_time(7).await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_verify_with_ledger_offline_is_network_error() {
        let ledger = MockLedger::new();
        let adapter = adapter(&ledger, false);
        let blob = adapter.submit(&fp()).await.unwrap().proof_blob;

        ledger.set_offline(true);
        let err = adapter.verify_attestation(&blob, &fp()).await.unwrap_err();
        assert!(matches!(err, ProofError::Network(_)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_maturation_waits_for_threshold() {
        let ledger = MockLedger::new();
        let adapter = adapter(&ledger, false);
        let blob = adapter.submit(&fp()).await.unwrap().proof_blob;

        ledger.add_confirmations(2);
        let outcome = adapter.attempt_maturation(&blob, &fp()).await.unwrap();
        assert_eq!(outcome.status, Maturity::Pending);

        ledger.add_confirmations(1);
        let outcome = adapter.attempt_maturation(&blob, &fp()).await.unwrap();
        assert_eq!(outcome.status, Maturity::Confirmed);
        assert!(outcome.proof_blob.is_none());

        let again = adapter.attempt_maturation(&blob, &fp()).await.unwrap();
        assert_eq!(again.confirmation, outcome.confirmation);
    }

    #[tokio::test]
    async fn test_failed_transaction_is_rejected() {
        let ledger = MockLedger::new();
        let adapter = adapter(&ledger, false);
        let blob = adapter.submit(&fp()).await.unwrap().proof_blob;
        ledger.fail_transaction(std::str::from_utf8(&blob).unwrap());

        let err = adapter.attempt_maturation(&blob, &fp()).await.unwrap_err();
        assert!(matches!(err, ProofError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_verify_detects_tampered_memo() {
        let ledger = MockLedger::new();
        let adapter = adapter(&ledger, false);
        let blob = adapter.submit(&fp()).await.unwrap().proof_blob;
        ledger.tamper_memo(std::str::from_utf8(&blob).unwrap(), b"POSTPROOF:00");

        let err = adapter.verify_attestation(&blob, &fp()).await.unwrap_err();
        assert!(matches!(err, ProofError::Mismatch { .. }));
    }

    #[tokio::test]
    async fn test_verify_confirmed_transaction() {
        let ledger = MockLedger::new();
        let adapter = adapter(&ledger, false);
        let blob = adapter.submit(&fp()).await.unwrap().proof_blob;

        let report = adapter.verify_attestation(&blob, &fp()).await.unwrap();
        assert!(report.is_valid);
        assert!(!report.is_confirmed());

        ledger.add_confirmations(40);
        let report = adapter.verify_attestation(&blob, &fp()).await.unwrap();
        assert!(report.is_confirmed());
    }

    #[tokio::test]
    async fn test_unknown_signature_is_not_valid() {
        let ledger = MockLedger::new();
        let adapter = adapter(&ledger, false);
        let report = adapter.verify_attestation(b"abc123", &fp()).await.unwrap();
        assert!(!report.is_valid);
    }

    #[tokio::test]
    async fn test_malformed_blob_is_corrupt() {
        let ledger = MockLedger::new();
        let adapter = adapter(&ledger, false);
        let err = adapter
            .attempt_maturation(&[0xff, 0x00], &fp())
            .await
            .unwrap_err();
        assert!(matches!(err, ProofError::CorruptProof(_)));
    }

    #[test]
    fn test_finalized_status_meets_any_threshold() {
        let status = TxStatus {
            slot: 1,
            confirmations: None,
            failed: false,
        };
        assert!(status.has_confirmations(1_000));
        let status = TxStatus {
            confirmations: Some(5),
            ..status
        };
        assert!(status.has_confirmations(5));
        assert!(!status.has_confirmations(6));
    }
}
