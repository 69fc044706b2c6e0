//! Bitcoin timestamping through aggregating calendar servers.
//!
//! Submission salts the digest with a random nonce, hashes it, and sends the
//! resulting commitment to every configured calendar. Each calendar answers
//! with a partial proof ending in a pending attestation. Once the calendar's
//! aggregation transaction is mined, asking it again for the same commitment
//! returns the path up to a Bitcoin block merkle root.
//!
//! The adapter only ever talks to calendars it was configured with. Pending
//! attestations naming any other server are left alone.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use rand::RngCore;
use tracing::{debug, info, instrument, warn};

use super::{
    AttestationReport, Backend, BlockRef, ChainAdapter, Confirmation, MaturationOutcome,
    SubmissionOutcome,
};
use crate::error::{ProofError, Result};
use crate::fingerprint::ContentFingerprint;
use crate::ots::{Attestation, DetachedTimestampFile, Op, Timestamp};

/// Random bytes appended to the digest before it leaves the process.
pub const NONCE_LENGTH: usize = 16;

/// Default public calendars.
pub const DEFAULT_CALENDARS: &[&str] = &[
    "https://a.pool.opentimestamps.org",
    "https://b.pool.opentimestamps.org",
    "https://a.pool.eternitywall.com",
    "https://ots.btc.catallaxy.com",
];

pub const DEFAULT_ESPLORA_URL: &str = "https://blockstream.info/api";

/// Calendar backend settings.
#[derive(Debug, Clone)]
pub struct CalendarConfig {
    /// Calendars to submit to; also the allow-list for upgrade requests
    pub calendar_urls: Vec<String>,
    /// Successful submissions to wait for before returning
    pub min_acceptances: usize,
    /// Per-call deadline
    pub request_timeout: Duration,
    /// Retry budget for transient HTTP failures
    pub max_retries: u32,
    /// Block explorer used to resolve Bitcoin attestations
    pub esplora_url: String,
    /// Refuse plain-HTTP endpoints
    pub https_only: bool,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            calendar_urls: DEFAULT_CALENDARS.iter().map(|s| s.to_string()).collect(),
            min_acceptances: 1,
            request_timeout: Duration::from_secs(10),
            max_retries: 3,
            esplora_url: DEFAULT_ESPLORA_URL.to_string(),
            https_only: true,
        }
    }
}

/// Wire access to calendar servers.
#[async_trait]
pub trait CalendarTransport: Send + Sync {
    /// Submit a commitment. The returned tree is rooted at `commitment`.
    async fn submit_digest(&self, calendar: &str, commitment: &[u8]) -> Result<Timestamp>;

    /// Ask for an upgraded tree rooted at `commitment`.
    ///
    /// `Ok(None)` means the calendar has nothing newer yet.
    async fn fetch_upgrade(&self, calendar: &str, commitment: &[u8]) -> Result<Option<Timestamp>>;
}

/// Bitcoin block header facts needed to check an attestation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub height: u64,
    /// Block hash, display (big-endian) hex
    pub hash: String,
    /// Merkle root in internal byte order, as committed by proofs
    pub merkle_root: [u8; 32],
    pub time: DateTime<Utc>,
}

/// Source of Bitcoin block headers.
#[async_trait]
pub trait BlockHeaderSource: Send + Sync {
    /// `Ok(None)` if the source does not know the block yet.
    async fn block_header(&self, height: u64) -> Result<Option<BlockHeader>>;
}

/// Strip the trailing slash so configured and attested URIs compare equal.
pub fn normalize_calendar_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

/// One attempt per retry plus the first, each bounded by `request_timeout`.
fn call_deadline(config: &CalendarConfig) -> Duration {
    config.request_timeout * (config.max_retries + 1)
}

/// Adapter for the `calendar-bitcoin` backend.
pub struct CalendarProofAdapter {
    calendars: Vec<String>,
    min_acceptances: usize,
    /// Budget for one transport call, retries included
    call_deadline: Duration,
    transport: Arc<dyn CalendarTransport>,
    headers: Arc<dyn BlockHeaderSource>,
}

/// Outcome of checking every Bitcoin attestation in a tree.
#[derive(Debug, Default)]
struct ResolvedAttestations {
    times: BTreeSet<DateTime<Utc>>,
    earliest: Option<(DateTime<Utc>, BlockRef)>,
    rejected: usize,
    lookup_errors: usize,
}

impl CalendarProofAdapter {
    pub fn new(
        config: &CalendarConfig,
        transport: Arc<dyn CalendarTransport>,
        headers: Arc<dyn BlockHeaderSource>,
    ) -> Result<Self> {
        if config.calendar_urls.is_empty() {
            return Err(ProofError::InvalidInput(
                "at least one calendar URL is required".into(),
            ));
        }
        if config.min_acceptances == 0 {
            return Err(ProofError::InvalidInput(
                "min_acceptances must be at least 1".into(),
            ));
        }

        let mut calendars = Vec::with_capacity(config.calendar_urls.len());
        for raw in &config.calendar_urls {
            let parsed = url::Url::parse(raw).map_err(|e| {
                ProofError::InvalidInput(format!("invalid calendar URL {raw}: {e}"))
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ProofError::InvalidInput(format!(
                    "calendar URL {raw} must use http or https"
                )));
            }
            calendars.push(normalize_calendar_url(raw));
        }
        let mut seen = HashSet::new();
        calendars.retain(|c| seen.insert(c.clone()));

        Ok(Self {
            min_acceptances: config.min_acceptances.min(calendars.len()),
            calendars,
            call_deadline: call_deadline(config),
            transport,
            headers,
        })
    }

    /// Build the adapter with HTTP calendar and Esplora clients.
    #[cfg(feature = "network")]
    pub fn from_config(config: CalendarConfig) -> Result<Self> {
        let transport = super::http::HttpCalendarClient::new(&config)?;
        let headers = super::http::EsploraHeaderSource::new(&config)?;
        Self::new(&config, Arc::new(transport), Arc::new(headers))
    }

    pub fn calendars(&self) -> &[String] {
        &self.calendars
    }

    fn is_allowed(&self, uri: &str) -> bool {
        let uri = normalize_calendar_url(uri);
        self.calendars.iter().any(|c| *c == uri)
    }

    async fn with_deadline<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.call_deadline, fut)
            .await
            .map_err(|_| ProofError::Timeout(self.call_deadline))?
    }

    /// Check every Bitcoin attestation in the tree against the header source.
    async fn resolve_bitcoin(&self, timestamp: &Timestamp) -> ResolvedAttestations {
        let mut resolved = ResolvedAttestations::default();

        for attested in timestamp.all_attestations() {
            let Attestation::Bitcoin { height } = attested.attestation else {
                continue;
            };
            let header = match self.headers.block_header(*height).await {
                Ok(Some(header)) => header,
                Ok(None) => {
                    debug!(height, "Block not yet known to header source");
                    continue;
                }
                Err(e) => {
                    warn!(height, error = %e, "Block header lookup failed");
                    resolved.lookup_errors += 1;
                    continue;
                }
            };

            if attested.msg != header.merkle_root.as_slice() {
                warn!(
                    height,
                    merkle_root = %hex::encode(header.merkle_root),
                    attested = %hex::encode(attested.msg),
                    "Attestation does not match block merkle root"
                );
                resolved.rejected += 1;
                continue;
            }

            resolved.times.insert(header.time);
            let block_ref = BlockRef {
                height: header.height,
                hash: Some(header.hash.clone()),
            };
            // Earliest time wins; on equal times the lower block.
            let replace = match &resolved.earliest {
                None => true,
                Some((time, current)) => {
                    (header.time, header.height) < (*time, current.height)
                }
            };
            if replace {
                resolved.earliest = Some((header.time, block_ref));
            }
        }

        resolved
    }
}

#[async_trait]
impl ChainAdapter for CalendarProofAdapter {
    fn backend(&self) -> Backend {
        Backend::CalendarBitcoin
    }

    #[instrument(skip(self), fields(digest = %fingerprint.hash_hex))]
    async fn submit(&self, fingerprint: &ContentFingerprint) -> Result<SubmissionOutcome> {
        let mut file = DetachedTimestampFile::for_fingerprint(fingerprint)?;

        let mut nonce = [0u8; NONCE_LENGTH];
        rand::thread_rng().fill_bytes(&mut nonce);
        let commitment_node = file
            .timestamp
            .add_op(Op::Append(nonce.to_vec()))?
            .add_op(Op::Sha256)?;
        let commitment = commitment_node.msg.clone();

        let mut requests: FuturesUnordered<_> = self
            .calendars
            .iter()
            .map(|calendar| {
                let commitment = &commitment;
                async move {
                    let result = self
                        .with_deadline(self.transport.submit_digest(calendar, commitment))
                        .await;
                    (calendar.as_str(), result)
                }
            })
            .collect();

        let mut accepted = 0usize;
        let mut failures = Vec::new();
        while let Some((calendar, result)) = requests.next().await {
            match result.and_then(|tree| {
                if tree.msg != commitment {
                    return Err(ProofError::CorruptProof(format!(
                        "calendar {calendar} answered for a different commitment"
                    )));
                }
                commitment_node.merge_from(&tree)
            }) {
                Ok(_) => {
                    accepted += 1;
                    debug!(calendar, "Calendar accepted commitment");
                    if accepted >= self.min_acceptances {
                        break;
                    }
                }
                Err(e) => {
                    warn!(calendar, error = %e, "Calendar submission failed");
                    failures.push((calendar, e));
                }
            }
        }
        // Dropping the remaining futures cancels calls we no longer need.
        drop(requests);

        if accepted == 0 {
            let all_rejected = failures
                .iter()
                .all(|(_, e)| matches!(e, ProofError::Rejected(_)));
            let detail = failures
                .iter()
                .map(|(calendar, e)| format!("{calendar}: {e}"))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(if all_rejected && !failures.is_empty() {
                ProofError::Rejected(format!("every calendar refused the commitment ({detail})"))
            } else {
                ProofError::Submission(format!("no calendar accepted the commitment ({detail})"))
            });
        }
        if accepted < self.min_acceptances {
            warn!(
                accepted,
                required = self.min_acceptances,
                "Fewer calendars accepted than requested"
            );
        }

        info!(accepted, "Digest submitted to calendars");
        Ok(SubmissionOutcome {
            proof_blob: file.to_bytes()?,
            confirmation: None,
        })
    }

    #[instrument(skip(self, proof_blob), fields(digest = %fingerprint.hash_hex))]
    async fn attempt_maturation(
        &self,
        proof_blob: &[u8],
        fingerprint: &ContentFingerprint,
    ) -> Result<MaturationOutcome> {
        let mut file = DetachedTimestampFile::from_bytes(proof_blob)?;
        file.check_rooted_at(fingerprint)?;

        let existing = self.resolve_bitcoin(&file.timestamp).await;
        if let Some((confirmed_at, block_ref)) = existing.earliest {
            debug!(height = block_ref.height, "Proof already anchored");
            return Ok(MaturationOutcome::confirmed(
                None,
                Confirmation {
                    block_ref,
                    confirmed_at,
                },
            ));
        }

        let pending: Vec<(Vec<u8>, String)> = file
            .timestamp
            .all_attestations()
            .into_iter()
            .filter_map(|a| {
                a.attestation
                    .pending_uri()
                    .map(|uri| (a.msg.to_vec(), normalize_calendar_url(uri)))
            })
            .filter(|(_, uri)| {
                let allowed = self.is_allowed(uri);
                if !allowed {
                    warn!(calendar = %uri, "Ignoring pending attestation from unlisted calendar");
                }
                allowed
            })
            .collect();

        let attempted = pending.len();
        let upgrades: Vec<_> = futures::future::join_all(pending.iter().map(
            |(commitment, calendar)| async move {
                let result = self
                    .with_deadline(self.transport.fetch_upgrade(calendar, commitment))
                    .await;
                (commitment, calendar, result)
            },
        ))
        .await;

        let mut errors = 0usize;
        let mut changed = false;
        for (commitment, calendar, result) in upgrades {
            match result {
                Ok(Some(upgrade)) => {
                    if upgrade.msg != *commitment {
                        warn!(calendar = %calendar, "Upgrade rooted at a different commitment");
                        errors += 1;
                        continue;
                    }
                    let Some(node) = file.timestamp.find_mut(commitment) else {
                        continue;
                    };
                    changed |= node.merge_from(&upgrade)?;
                }
                Ok(None) => debug!(calendar = %calendar, "Commitment still pending"),
                Err(e) => {
                    warn!(calendar = %calendar, error = %e, "Upgrade request failed");
                    errors += 1;
                }
            }
        }

        if attempted > 0 && errors == attempted {
            return Err(ProofError::Network(format!(
                "all {attempted} upgrade requests failed"
            )));
        }

        let proof_blob = if changed {
            Some(file.to_bytes()?)
        } else {
            None
        };

        let resolved = self.resolve_bitcoin(&file.timestamp).await;
        errors += resolved.lookup_errors;
        match resolved.earliest {
            Some((confirmed_at, block_ref)) => {
                info!(
                    height = block_ref.height,
                    confirmed_at = %confirmed_at,
                    "Proof anchored in Bitcoin"
                );
                Ok(MaturationOutcome::confirmed(
                    proof_blob,
                    Confirmation {
                        block_ref,
                        confirmed_at,
                    },
                ))
            }
            None => Ok(MaturationOutcome::pending(proof_blob, errors)),
        }
    }

    #[instrument(skip(self, proof_blob), fields(digest = %fingerprint.hash_hex))]
    async fn verify_attestation(
        &self,
        proof_blob: &[u8],
        fingerprint: &ContentFingerprint,
    ) -> Result<AttestationReport> {
        let file = DetachedTimestampFile::from_bytes(proof_blob)?;
        file.check_rooted_at(fingerprint)?;
        file.timestamp.check_consistency()?;

        let resolved = self.resolve_bitcoin(&file.timestamp).await;
        if resolved.lookup_errors > 0 && resolved.times.is_empty() {
            return Err(ProofError::Network(format!(
                "{} block header lookups failed",
                resolved.lookup_errors
            )));
        }

        Ok(AttestationReport {
            is_valid: true,
            attested_timestamps: resolved.times,
            earliest_block: resolved.earliest.map(|(_, block)| block),
            rejected_attestations: resolved.rejected,
        })
    }
}
