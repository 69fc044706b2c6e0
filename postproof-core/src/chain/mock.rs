//! In-process backends for testing and local development.
//!
//! WARNING: Do not use in production. Nothing here touches a real chain.
//!
//! [`MockCalendarNetwork`] plays every calendar server and the Bitcoin block
//! explorer at once. Anchoring aggregates all pending commitments into one
//! merkle root per block, so proofs produced here verify exactly like real
//! ones. [`MockLedger`] keeps memo transactions in memory.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};

use super::calendar::{
    normalize_calendar_url, BlockHeader, BlockHeaderSource, CalendarConfig, CalendarProofAdapter,
    CalendarTransport,
};
use super::ledger::{LedgerRpc, TxStatus};
use crate::error::{ProofError, Result};
use crate::ots::{Attestation, Op, Timestamp};

/// Calendars used by [`MockCalendarNetwork::adapter`].
pub const MOCK_CALENDARS: &[&str] = &[
    "https://alice.calendar.mock",
    "https://bob.calendar.mock",
];

/// First block height handed out by automatic anchoring.
const FIRST_MOCK_HEIGHT: u64 = 800_000;

#[derive(Default)]
struct CalendarState {
    offline: bool,
    rejecting: bool,
    received: Vec<Vec<u8>>,
    /// Submitted commitment -> (server salt, leaf message), awaiting a block
    pending: BTreeMap<Vec<u8>, (Vec<u8>, Vec<u8>)>,
    upgrades: HashMap<Vec<u8>, Timestamp>,
    upgrade_requests: usize,
}

#[derive(Default)]
struct NetworkState {
    calendars: HashMap<String, CalendarState>,
    blocks: BTreeMap<u64, BlockHeader>,
    latency: Option<Duration>,
    auto_anchor: bool,
}

impl NetworkState {
    fn calendar(&mut self, url: &str) -> &mut CalendarState {
        self.calendars
            .entry(normalize_calendar_url(url))
            .or_default()
    }

    fn next_height(&self) -> u64 {
        self.blocks
            .keys()
            .next_back()
            .map_or(FIRST_MOCK_HEIGHT, |h| h + 1)
    }

    /// Aggregate pending leaves of the selected calendars into one block.
    fn anchor(&mut self, only: Option<&str>, height: u64, time: DateTime<Utc>) -> Result<usize> {
        let only = only.map(normalize_calendar_url);
        let mut leaves: Vec<(String, Vec<u8>, Vec<u8>, Vec<u8>)> = Vec::new();
        for (url, calendar) in self.calendars.iter_mut() {
            if only.as_ref().is_some_and(|o| o != url) {
                continue;
            }
            for (commitment, (salt, leaf)) in std::mem::take(&mut calendar.pending) {
                leaves.push((url.clone(), commitment, salt, leaf));
            }
        }
        if leaves.is_empty() {
            return Ok(0);
        }

        let concatenated: Vec<u8> = leaves.iter().flat_map(|l| l.3.iter().copied()).collect();
        let merkle_root: [u8; 32] = Sha256::digest(&concatenated).into();

        let mut offset = 0;
        for (url, commitment, salt, leaf) in &leaves {
            let prefix = &concatenated[..offset];
            let suffix = &concatenated[offset + leaf.len()..];
            offset += leaf.len();

            let mut upgrade = Timestamp::new(commitment.clone());
            let mut node = upgrade
                .add_op(Op::Append(salt.clone()))?
                .add_op(Op::Sha256)?;
            if !prefix.is_empty() {
                node = node.add_op(Op::Prepend(prefix.to_vec()))?;
            }
            if !suffix.is_empty() {
                node = node.add_op(Op::Append(suffix.to_vec()))?;
            }
            let root = node.add_op(Op::Sha256)?;
            root.attestations.insert(Attestation::Bitcoin { height });

            self.calendar(url).upgrades.insert(commitment.clone(), upgrade);
        }

        self.blocks.insert(
            height,
            BlockHeader {
                height,
                hash: hex::encode(Sha256::digest(merkle_root)),
                merkle_root,
                time,
            },
        );
        Ok(leaves.len())
    }
}

/// Simulated calendar servers plus the Bitcoin chain they anchor into.
#[derive(Clone, Default)]
pub struct MockCalendarNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl MockCalendarNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, NetworkState> {
        // A panicking test thread must not wedge the others.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Adapter over [`MOCK_CALENDARS`].
    pub fn adapter(&self) -> Result<CalendarProofAdapter> {
        let config = CalendarConfig {
            calendar_urls: MOCK_CALENDARS.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        };
        self.adapter_with(&config)
    }

    pub fn adapter_with(&self, config: &CalendarConfig) -> Result<CalendarProofAdapter> {
        CalendarProofAdapter::new(config, Arc::new(self.clone()), Arc::new(self.clone()))
    }

    pub fn set_offline(&self, calendar: &str, offline: bool) {
        self.lock().calendar(calendar).offline = offline;
    }

    /// Make a calendar refuse submissions permanently.
    pub fn set_rejecting(&self, calendar: &str, rejecting: bool) {
        self.lock().calendar(calendar).rejecting = rejecting;
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.lock().latency = latency;
    }

    /// Mine a block for everything pending whenever an upgrade is requested.
    pub fn set_auto_anchor(&self, enabled: bool) {
        self.lock().auto_anchor = enabled;
    }

    /// Mine one block holding every pending commitment on every calendar.
    pub fn anchor_pending(&self, height: u64, time: DateTime<Utc>) -> usize {
        self.lock().anchor(None, height, time).unwrap_or_default()
    }

    /// Mine one block holding only `calendar`'s pending commitments.
    pub fn anchor_calendar(&self, calendar: &str, height: u64, time: DateTime<Utc>) -> usize {
        self.lock()
            .anchor(Some(calendar), height, time)
            .unwrap_or_default()
    }

    /// Commitments a calendar has received, in arrival order.
    pub fn received_commitments(&self, calendar: &str) -> Vec<Vec<u8>> {
        self.lock().calendar(calendar).received.clone()
    }

    pub fn upgrade_requests(&self, calendar: &str) -> usize {
        self.lock().calendar(calendar).upgrade_requests
    }

    /// Replace a block's merkle root, simulating a lying explorer.
    pub fn corrupt_block(&self, height: u64) {
        if let Some(block) = self.lock().blocks.get_mut(&height) {
            block.merkle_root = [0u8; 32];
        }
    }

    async fn simulate_latency(&self) {
        let latency = self.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl CalendarTransport for MockCalendarNetwork {
    async fn submit_digest(&self, calendar: &str, commitment: &[u8]) -> Result<Timestamp> {
        self.simulate_latency().await;

        let mut state = self.lock();
        let cal = state.calendar(calendar);
        if cal.offline {
            return Err(ProofError::Network(format!("{calendar} unreachable")));
        }
        if cal.rejecting {
            return Err(ProofError::Rejected(format!("{calendar} refused the digest")));
        }
        cal.received.push(commitment.to_vec());

        let mut salt = vec![0u8; 8];
        rand::thread_rng().fill_bytes(&mut salt);

        let mut tree = Timestamp::new(commitment.to_vec());
        let leaf = tree.add_op(Op::Append(salt.clone()))?.add_op(Op::Sha256)?;
        leaf.attestations.insert(Attestation::Pending {
            uri: normalize_calendar_url(calendar),
        });
        let leaf_msg = leaf.msg.clone();

        cal.pending.insert(commitment.to_vec(), (salt, leaf_msg));
        Ok(tree)
    }

    async fn fetch_upgrade(&self, calendar: &str, commitment: &[u8]) -> Result<Option<Timestamp>> {
        self.simulate_latency().await;

        let mut state = self.lock();
        {
            let cal = state.calendar(calendar);
            if cal.offline {
                return Err(ProofError::Network(format!("{calendar} unreachable")));
            }
            cal.upgrade_requests += 1;
        }

        if state.auto_anchor && state.calendar(calendar).pending.contains_key(commitment) {
            let height = state.next_height();
            state.anchor(None, height, Utc::now())?;
        }

        Ok(state.calendar(calendar).upgrades.get(commitment).cloned())
    }
}

#[async_trait]
impl BlockHeaderSource for MockCalendarNetwork {
    async fn block_header(&self, height: u64) -> Result<Option<BlockHeader>> {
        Ok(self.lock().blocks.get(&height).cloned())
    }
}

#[derive(Debug, Clone)]
struct MockTransaction {
    memo: Vec<u8>,
    slot: u64,
    confirmations: u64,
    failed: bool,
}

#[derive(Default)]
struct LedgerState {
    transactions: HashMap<String, MockTransaction>,
    next_slot: u64,
    offline: bool,
    auto_confirm: u64,
}

/// In-memory memo ledger.
#[derive(Clone, Default)]
pub struct MockLedger {
    state: Arc<Mutex<LedgerState>>,
}

/// Confirmations after which the mock reports a transaction as finalized.
const MOCK_FINALITY_DEPTH: u64 = 32;

/// Unix time of slot zero.
const MOCK_GENESIS: i64 = 1_700_000_000;

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Add `n` confirmations on every status query.
    pub fn set_auto_confirm(&self, n: u64) {
        self.lock().auto_confirm = n;
    }

    /// Add confirmations to every transaction.
    pub fn add_confirmations(&self, n: u64) {
        for tx in self.lock().transactions.values_mut() {
            tx.confirmations += n;
        }
    }

    pub fn fail_transaction(&self, signature: &str) {
        if let Some(tx) = self.lock().transactions.get_mut(signature) {
            tx.failed = true;
        }
    }

    pub fn tamper_memo(&self, signature: &str, memo: &[u8]) {
        if let Some(tx) = self.lock().transactions.get_mut(signature) {
            tx.memo = memo.to_vec();
        }
    }

    pub fn memo(&self, signature: &str) -> Option<Vec<u8>> {
        self.lock()
            .transactions
            .get(signature)
            .map(|tx| tx.memo.clone())
    }

    pub fn transaction_count(&self) -> usize {
        self.lock().transactions.len()
    }

    fn check_online(state: &LedgerState) -> Result<()> {
        if state.offline {
            Err(ProofError::Network("mock ledger unreachable".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl LedgerRpc for MockLedger {
    async fn publish_memo(&self, memo: &[u8]) -> Result<String> {
        let mut state = self.lock();
        if state.offline {
            return Err(ProofError::Submission("mock ledger unreachable".into()));
        }
        let slot = state.next_slot;
        state.next_slot += 1;

        let mut hasher = Sha256::new();
        hasher.update(memo);
        hasher.update(slot.to_le_bytes());
        let signature = hex::encode(hasher.finalize());

        state.transactions.insert(
            signature.clone(),
            MockTransaction {
                memo: memo.to_vec(),
                slot,
                confirmations: 0,
                failed: false,
            },
        );
        Ok(signature)
    }

    async fn transaction_status(&self, signature: &str) -> Result<Option<TxStatus>> {
        let mut state = self.lock();
        Self::check_online(&state)?;
        let auto_confirm = state.auto_confirm;
        Ok(state.transactions.get_mut(signature).map(|tx| {
            tx.confirmations += auto_confirm;
            TxStatus {
                slot: tx.slot,
                confirmations: (tx.confirmations < MOCK_FINALITY_DEPTH)
                    .then_some(tx.confirmations),
                failed: tx.failed,
            }
        }))
    }

    async fn block_time(&self, slot: u64) -> Result<Option<DateTime<Utc>>> {
        Self::check_online(&self.lock())?;
        Ok(DateTime::from_timestamp(MOCK_GENESIS + slot as i64, 0))
    }

    async fn fetch_memo(&self, signature: &str) -> Result<Option<Vec<u8>>> {
        let state = self.lock();
        Self::check_online(&state)?;
        Ok(state.transactions.get(signature).map(|tx| tx.memo.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ots::DetachedTimestampFile;

    #[tokio::test]
    async fn test_anchor_builds_valid_paths_for_every_leaf() {
        let network = MockCalendarNetwork::new();
        let cal = MOCK_CALENDARS[0];
        let commitments: Vec<Vec<u8>> = (0u8..3).map(|i| vec![i; 32]).collect();
        for c in &commitments {
            network.submit_digest(cal, c).await.unwrap();
        }
        assert_eq!(network.anchor_pending(1, Utc::now()), 3);

        let header = network.block_header(1).await.unwrap().unwrap();
        for c in &commitments {
            let upgrade = network.fetch_upgrade(cal, c).await.unwrap().unwrap();
            upgrade.check_consistency().unwrap();
            let anchors: Vec<_> = upgrade
                .all_attestations()
                .into_iter()
                .filter(|a| a.attestation.is_bitcoin())
                .collect();
            assert_eq!(anchors.len(), 1);
            assert_eq!(anchors[0].msg, header.merkle_root.as_slice());
        }
    }

    #[tokio::test]
    async fn test_auto_anchor_on_upgrade_request() {
        let network = MockCalendarNetwork::new();
        network.set_auto_anchor(true);
        let adapter = network.adapter().unwrap();
        let fp = crate::fingerprint::hash(b"x", crate::fingerprint::HashAlgorithm::Sha256);
        let blob = {
            use crate::chain::ChainAdapter;
            let blob = adapter.submit(&fp).await.unwrap().proof_blob;
            let outcome = adapter.attempt_maturation(&blob, &fp).await.unwrap();
            outcome.proof_blob.unwrap()
        };
        let file = DetachedTimestampFile::from_bytes(&blob).unwrap();
        assert!(file.timestamp.is_complete());
    }

    #[tokio::test]
    async fn test_mock_ledger_finalizes_after_depth() {
        let ledger = MockLedger::new();
        let sig = ledger.publish_memo(b"POSTPROOF:aa").await.unwrap();
        let status = ledger.transaction_status(&sig).await.unwrap().unwrap();
        assert_eq!(status.confirmations, Some(0));

        ledger.add_confirmations(MOCK_FINALITY_DEPTH);
        let status = ledger.transaction_status(&sig).await.unwrap().unwrap();
        assert_eq!(status.confirmations, None);
    }

    #[tokio::test]
    async fn test_mock_ledger_offline() {
        let ledger = MockLedger::new();
        ledger.set_offline(true);
        assert!(ledger.publish_memo(b"m").await.is_err());
        assert!(ledger.fetch_memo("abc").await.is_err());
    }
}
