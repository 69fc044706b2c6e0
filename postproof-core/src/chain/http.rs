//! HTTP clients for calendar servers and the Esplora block explorer,
//! with retry and backoff on transient failures.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use backoff::{future::retry_notify, ExponentialBackoff};
use chrono::DateTime;
use dashmap::DashMap;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use super::calendar::{BlockHeader, BlockHeaderSource, CalendarConfig, CalendarTransport};
use crate::error::{ProofError, Result, MAX_PROOF_SIZE};
use crate::ots::{ProofReader, Timestamp};

const USER_AGENT: &str = concat!("postproof/", env!("CARGO_PKG_VERSION"));
const OTS_CONTENT_TYPE: &str = "application/vnd.opentimestamps.v1";

fn build_client(config: &CalendarConfig) -> Result<Client> {
    Client::builder()
        .timeout(config.request_timeout)
        .https_only(config.https_only)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| ProofError::Network(format!("Failed to create HTTP client: {e}")))
}

/// Shared GET/POST with retry. `Ok(None)` on 404.
struct RetryingClient {
    client: Client,
    timeout: Duration,
    max_retries: u32,
}

impl RetryingClient {
    fn build_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: Duration::from_millis(250),
            max_interval: Duration::from_secs(2),
            max_elapsed_time: Some(self.timeout * self.max_retries.max(1)),
            ..Default::default()
        }
    }

    async fn send<F>(&self, label: &str, request: F) -> Result<Option<Vec<u8>>>
    where
        F: Fn(&Client) -> RequestBuilder + Send + Sync,
    {
        retry_notify(
            self.build_backoff(),
            || async {
                tokio::time::timeout(self.timeout, self.send_once(label, &request))
                    .await
                    .map_err(|_| {
                        warn!(
                            endpoint = label,
                            timeout_ms = self.timeout.as_millis() as u64,
                            "Attempt timed out"
                        );
                        backoff::Error::transient(ProofError::Timeout(self.timeout))
                    })?
            },
            |err: ProofError, duration: Duration| {
                warn!(
                    endpoint = label,
                    error = %err,
                    retry_after_ms = duration.as_millis() as u64,
                    "Retry scheduled"
                );
            },
        )
        .await
    }

    async fn send_once<F>(
        &self,
        label: &str,
        request: &F,
    ) -> std::result::Result<Option<Vec<u8>>, backoff::Error<ProofError>>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let start = Instant::now();

        let response = request(&self.client).send().await.map_err(|e| {
            let latency_ms = start.elapsed().as_millis() as u64;
            if is_transient_error(&e) {
                warn!(endpoint = label, error = %e, latency_ms, "Transient error, will retry");
                backoff::Error::transient(ProofError::HttpError(e))
            } else {
                warn!(endpoint = label, error = %e, latency_ms, "Permanent error, aborting");
                backoff::Error::permanent(ProofError::HttpError(e))
            }
        })?;

        let status = response.status();
        debug!(endpoint = label, status = %status, "Received HTTP response");

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(if is_transient_status(status) {
                backoff::Error::transient(ProofError::Network(format!(
                    "{label} returned status {status}"
                )))
            } else {
                backoff::Error::permanent(ProofError::Rejected(format!(
                    "{label} returned status {status}"
                )))
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| backoff::Error::transient(ProofError::HttpError(e)))?;
        if body.len() > MAX_PROOF_SIZE {
            return Err(backoff::Error::permanent(ProofError::CorruptProof(format!(
                "{label} response of {} bytes is too large",
                body.len()
            ))));
        }

        debug!(
            endpoint = label,
            latency_ms = start.elapsed().as_millis() as u64,
            "Request completed successfully"
        );
        Ok(Some(body.to_vec()))
    }
}

fn parse_tree(body: &[u8], commitment: &[u8]) -> Result<Timestamp> {
    let mut reader = ProofReader::new(body);
    let tree = Timestamp::read(&mut reader, commitment.to_vec())?;
    reader.assert_eof()?;
    Ok(tree)
}

/// Calendar server client speaking the OpenTimestamps calendar protocol.
pub struct HttpCalendarClient {
    inner: RetryingClient,
}

impl HttpCalendarClient {
    pub fn new(config: &CalendarConfig) -> Result<Self> {
        Ok(Self {
            inner: RetryingClient {
                client: build_client(config)?,
                timeout: config.request_timeout,
                max_retries: config.max_retries,
            },
        })
    }
}

#[async_trait]
impl CalendarTransport for HttpCalendarClient {
    async fn submit_digest(&self, calendar: &str, commitment: &[u8]) -> Result<Timestamp> {
        let url = format!("{calendar}/digest");
        let body = self
            .inner
            .send(calendar, |client| {
                client
                    .post(&url)
                    .header(reqwest::header::ACCEPT, OTS_CONTENT_TYPE)
                    .body(commitment.to_vec())
            })
            .await?
            .ok_or_else(|| ProofError::Rejected(format!("{calendar} has no digest endpoint")))?;
        parse_tree(&body, commitment)
    }

    async fn fetch_upgrade(&self, calendar: &str, commitment: &[u8]) -> Result<Option<Timestamp>> {
        let url = format!("{calendar}/timestamp/{}", hex::encode(commitment));
        let body = self
            .inner
            .send(calendar, |client| {
                client
                    .get(&url)
                    .header(reqwest::header::ACCEPT, OTS_CONTENT_TYPE)
            })
            .await?;
        body.map(|body| parse_tree(&body, commitment)).transpose()
    }
}

#[derive(Debug, Deserialize)]
struct EsploraBlock {
    id: String,
    height: u64,
    timestamp: i64,
    merkle_root: String,
}

/// Block headers from an Esplora-compatible explorer.
///
/// Headers are cached once fetched.
pub struct EsploraHeaderSource {
    inner: RetryingClient,
    base_url: String,
    cache: DashMap<u64, BlockHeader>,
}

impl EsploraHeaderSource {
    pub fn new(config: &CalendarConfig) -> Result<Self> {
        Ok(Self {
            inner: RetryingClient {
                client: build_client(config)?,
                timeout: config.request_timeout,
                max_retries: config.max_retries,
            },
            base_url: config.esplora_url.trim_end_matches('/').to_string(),
            cache: DashMap::new(),
        })
    }

    fn parse_block(block: EsploraBlock) -> Result<BlockHeader> {
        let mut merkle_root: [u8; 32] = hex::decode(&block.merkle_root)
            .ok()
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or_else(|| {
                ProofError::Serialization(format!("invalid merkle root {}", block.merkle_root))
            })?;
        // Explorers display the root byte-reversed.
        merkle_root.reverse();

        let time = DateTime::from_timestamp(block.timestamp, 0).ok_or_else(|| {
            ProofError::Serialization(format!("invalid block timestamp {}", block.timestamp))
        })?;

        Ok(BlockHeader {
            height: block.height,
            hash: block.id,
            merkle_root,
            time,
        })
    }
}

#[async_trait]
impl BlockHeaderSource for EsploraHeaderSource {
    async fn block_header(&self, height: u64) -> Result<Option<BlockHeader>> {
        if let Some(cached) = self.cache.get(&height) {
            return Ok(Some(cached.clone()));
        }

        let url = format!("{}/block-height/{height}", self.base_url);
        let Some(hash) = self.inner.send("esplora", |client| client.get(&url)).await? else {
            return Ok(None);
        };
        let hash = String::from_utf8(hash)
            .map_err(|e| ProofError::Serialization(format!("invalid block hash: {e}")))?;

        let url = format!("{}/block/{}", self.base_url, hash.trim());
        let Some(body) = self.inner.send("esplora", |client| client.get(&url)).await? else {
            return Ok(None);
        };
        let block: EsploraBlock = serde_json::from_slice(&body)
            .map_err(|e| ProofError::Serialization(format!("invalid block JSON: {e}")))?;

        let header = Self::parse_block(block)?;
        if header.height != height {
            return Err(ProofError::Serialization(format!(
                "explorer returned block {} for height {height}",
                header.height
            )));
        }
        self.cache.insert(height, header.clone());
        Ok(Some(header))
    }
}

/// Check if a reqwest error is transient and should be retried.
pub fn is_transient_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

/// Check if an HTTP status code indicates a transient error.
pub fn is_transient_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
            | StatusCode::BAD_GATEWAY
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_status_classification() {
        assert!(is_transient_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_transient_status(StatusCode::BAD_REQUEST));
        assert!(!is_transient_status(StatusCode::FORBIDDEN));
    }

    #[test]
    fn test_esplora_merkle_root_is_reversed() {
        let block = EsploraBlock {
            id: "00".repeat(32),
            height: 1,
            timestamp: 1_231_469_665,
            merkle_root: format!("{}{}", "00".repeat(31), "ff"),
        };
        let header = EsploraHeaderSource::parse_block(block).unwrap();
        assert_eq!(header.merkle_root[0], 0xff);
        assert_eq!(header.merkle_root[31], 0x00);
    }

    #[test]
    fn test_esplora_rejects_bad_root() {
        let block = EsploraBlock {
            id: "00".repeat(32),
            height: 1,
            timestamp: 0,
            merkle_root: "abcd".into(),
        };
        assert!(EsploraHeaderSource::parse_block(block).is_err());
    }
}
