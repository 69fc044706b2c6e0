//! Calendar and Esplora clients against a local HTTP server.
#![cfg(feature = "network")]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::DateTime;
use postproof_core::chain::{
    BlockHeaderSource, CalendarConfig, CalendarProofAdapter, CalendarTransport,
    EsploraHeaderSource, HttpCalendarClient, Maturity,
};
use postproof_core::fingerprint::{fingerprint, Content};
use postproof_core::ots::{Attestation, Op, Timestamp};
use postproof_core::{ChainAdapter, ProofError};
use sha2::{Digest, Sha256};
use wiremock::matchers::{body_bytes, header, method, path, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const BLOCK_HASH: &str = "00000000000000000001a2b3c4d5e6f708192a3b4c5d6e7f8091a2b3c4d5e6f7";

fn config(server: &MockServer) -> CalendarConfig {
    CalendarConfig {
        calendar_urls: vec![server.uri()],
        request_timeout: Duration::from_secs(2),
        max_retries: 2,
        esplora_url: server.uri(),
        https_only: false,
        ..Default::default()
    }
}

fn tree_bytes(tree: &Timestamp) -> Vec<u8> {
    let mut out = Vec::new();
    tree.write(&mut out).unwrap();
    out
}

/// Answers `POST /digest` the way a calendar does: salt, hash, promise.
struct DigestResponder {
    uri: String,
}

impl Respond for DigestResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let mut tree = Timestamp::new(request.body.clone());
        tree.add_op(Op::Append(vec![7, 7, 7, 7]))
            .unwrap()
            .add_op(Op::Sha256)
            .unwrap()
            .attestations
            .insert(Attestation::Pending {
                uri: self.uri.clone(),
            });
        ResponseTemplate::new(200).set_body_bytes(tree_bytes(&tree))
    }
}

/// Answers `GET /timestamp/{hex}` with a one-hop Bitcoin attestation and
/// records the resulting merkle root.
struct UpgradeResponder {
    root: Arc<Mutex<Option<[u8; 32]>>>,
}

impl Respond for UpgradeResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let hex_msg = request.url.path().trim_start_matches("/timestamp/");
        let msg = hex::decode(hex_msg).unwrap();
        let mut tree = Timestamp::new(msg);
        let leaf = tree.add_op(Op::Sha256).unwrap();
        leaf.attestations
            .insert(Attestation::Bitcoin { height: 900_000 });
        *self.root.lock().unwrap() = Some(leaf.msg.clone().try_into().unwrap());
        ResponseTemplate::new(200).set_body_bytes(tree_bytes(&tree))
    }
}

/// Serves the block JSON for whatever root the upgrade responder issued.
struct BlockResponder {
    root: Arc<Mutex<Option<[u8; 32]>>>,
}

impl Respond for BlockResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let mut display = self.root.lock().unwrap().unwrap_or([0; 32]);
        display.reverse();
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": BLOCK_HASH,
            "height": 900_000,
            "timestamp": 1_750_000_000,
            "merkle_root": hex::encode(display),
        }))
    }
}

#[tokio::test]
async fn submit_digest_posts_commitment_and_parses_tree() {
    let server = MockServer::start().await;
    let commitment = [0xab; 32];
    Mock::given(method("POST"))
        .and(path("/digest"))
        .and(header("accept", "application/vnd.opentimestamps.v1"))
        .and(body_bytes(commitment.to_vec()))
        .respond_with(DigestResponder { uri: server.uri() })
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpCalendarClient::new(&config(&server)).unwrap();
    let tree = client.submit_digest(&server.uri(), &commitment).await.unwrap();

    assert_eq!(tree.msg, commitment.to_vec());
    let attestations = tree.all_attestations();
    assert_eq!(attestations.len(), 1);
    assert_eq!(
        attestations[0].attestation.pending_uri(),
        Some(server.uri().as_str())
    );
}

#[tokio::test]
async fn upgrade_not_found_means_pending() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex("^/timestamp/[0-9a-f]+$"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = HttpCalendarClient::new(&config(&server)).unwrap();
    let upgrade = client.fetch_upgrade(&server.uri(), &[1; 32]).await.unwrap();
    assert!(upgrade.is_none());
}

#[tokio::test]
async fn transient_status_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/digest"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/digest"))
        .respond_with(DigestResponder { uri: server.uri() })
        .mount(&server)
        .await;

    let client = HttpCalendarClient::new(&config(&server)).unwrap();
    let tree = client.submit_digest(&server.uri(), &[2; 32]).await.unwrap();
    assert!(!tree.all_attestations().is_empty());
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn slow_attempt_is_retried_within_call_budget() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/digest"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/digest"))
        .respond_with(DigestResponder { uri: server.uri() })
        .mount(&server)
        .await;

    // The first attempt outlives its 2 s deadline; the retry must still run.
    let adapter = CalendarProofAdapter::from_config(config(&server)).unwrap();
    let fp = fingerprint(&Content::Text("slow calendar".into())).unwrap();
    let submitted = adapter.submit(&fp).await.unwrap();
    assert_eq!(submitted.status(), Maturity::Pending);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn client_error_is_permanent_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/digest"))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpCalendarClient::new(&config(&server)).unwrap();
    let err = client.submit_digest(&server.uri(), &[3; 32]).await.unwrap_err();
    assert!(matches!(err, ProofError::Rejected(_)));
}

#[tokio::test]
async fn garbage_tree_is_corrupt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/digest"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xee, 0x01]))
        .mount(&server)
        .await;

    let client = HttpCalendarClient::new(&config(&server)).unwrap();
    let err = client.submit_digest(&server.uri(), &[4; 32]).await.unwrap_err();
    assert!(err.is_integrity_failure(), "unexpected error: {err}");
}

#[tokio::test]
async fn esplora_header_is_reversed_and_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/block-height/900000"))
        .respond_with(ResponseTemplate::new(200).set_body_string(BLOCK_HASH))
        .expect(1)
        .mount(&server)
        .await;
    let root = Arc::new(Mutex::new(Some([0x11; 32])));
    root.lock().unwrap().as_mut().unwrap()[0] = 0x01;
    Mock::given(method("GET"))
        .and(path(format!("/block/{BLOCK_HASH}")))
        .respond_with(BlockResponder { root })
        .expect(1)
        .mount(&server)
        .await;

    let source = EsploraHeaderSource::new(&config(&server)).unwrap();
    let header = source.block_header(900_000).await.unwrap().unwrap();
    assert_eq!(header.hash, BLOCK_HASH);
    assert_eq!(header.merkle_root[0], 0x01);
    assert_eq!(header.time, DateTime::from_timestamp(1_750_000_000, 0).unwrap());

    let again = source.block_header(900_000).await.unwrap().unwrap();
    assert_eq!(again, header);
}

#[tokio::test]
async fn unknown_height_has_no_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/block-height/999999999"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let source = EsploraHeaderSource::new(&config(&server)).unwrap();
    assert!(source.block_header(999_999_999).await.unwrap().is_none());
}

#[tokio::test]
async fn calendar_adapter_over_http_submits_and_confirms() {
    let server = MockServer::start().await;
    let root = Arc::new(Mutex::new(None));

    Mock::given(method("POST"))
        .and(path("/digest"))
        .respond_with(DigestResponder { uri: server.uri() })
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex("^/timestamp/[0-9a-f]+$"))
        .respond_with(UpgradeResponder { root: root.clone() })
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/block-height/900000"))
        .respond_with(ResponseTemplate::new(200).set_body_string(BLOCK_HASH))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/block/{BLOCK_HASH}")))
        .respond_with(BlockResponder { root })
        .mount(&server)
        .await;

    let adapter = CalendarProofAdapter::from_config(config(&server)).unwrap();
    let fp = fingerprint(&Content::Text("over the wire".into())).unwrap();

    let submitted = adapter.submit(&fp).await.unwrap();
    assert_eq!(submitted.status(), Maturity::Pending);

    // The commitment on the wire is salted, never the bare digest.
    let requests = server.received_requests().await.unwrap();
    let digest = Sha256::digest(b"over the wire");
    assert!(requests
        .iter()
        .filter(|r| r.url.path() == "/digest")
        .all(|r| r.body != digest.to_vec()));

    let matured = adapter
        .attempt_maturation(&submitted.proof_blob, &fp)
        .await
        .unwrap();
    assert_eq!(matured.status, Maturity::Confirmed);
    let confirmation = matured.confirmation.unwrap();
    assert_eq!(confirmation.block_ref.height, 900_000);
    assert_eq!(
        confirmation.confirmed_at,
        DateTime::from_timestamp(1_750_000_000, 0).unwrap()
    );

    let blob = matured.proof_blob.unwrap();
    let report = adapter.verify_attestation(&blob, &fp).await.unwrap();
    assert!(report.is_valid);
}
