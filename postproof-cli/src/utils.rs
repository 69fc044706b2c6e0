//! Common utility functions shared across CLI commands.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use postproof_core::{
    canonicalize, hash, ots::DetachedTimestampFile, Content, ContentFingerprint, Engagement,
    HashAlgorithm, PostContent, PostSnapshot, TimestampRecord,
};
use tracing::debug;

/// Build the proof output path from the snapshot path.
///
/// Transforms `post.json` into `post.json.ots`.
pub fn build_proof_path(snapshot: &Path) -> PathBuf {
    append_extension(snapshot, "ots")
}

/// Build the ledger receipt path from the snapshot path.
///
/// Transforms `post.json` into `post.json.receipt`.
pub fn build_receipt_path(snapshot: &Path) -> PathBuf {
    append_extension(snapshot, "receipt")
}

fn append_extension(path: &Path, ext: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

/// Load a captured post: a full snapshot, or just its attested fields.
pub fn load_snapshot(path: &Path) -> Result<PostSnapshot> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read snapshot: {}", path.display()))?;

    if let Ok(snapshot) = serde_json::from_slice::<PostSnapshot>(&bytes) {
        debug!(kind = "snapshot", "Parsed post");
        return Ok(snapshot);
    }
    match serde_json::from_slice::<PostContent>(&bytes) {
        Ok(content) => {
            debug!(kind = "content", "Parsed post");
            Ok(PostSnapshot::new(content, Engagement::default()))
        }
        Err(e) => bail!(
            "Failed to parse snapshot {} (expected a post snapshot or post content JSON): {e}",
            path.display()
        ),
    }
}

/// Fingerprint the attested fields of a post.
pub fn fingerprint_post(content: &PostContent, algorithm: HashAlgorithm) -> Result<ContentFingerprint> {
    let bytes = canonicalize(&Content::structured(content)?)?;
    Ok(hash(&bytes, algorithm))
}

/// Load and parse a `.ots` proof file.
pub fn load_proof(path: &Path) -> Result<(Vec<u8>, DetachedTimestampFile)> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read proof: {}", path.display()))?;
    let file = DetachedTimestampFile::from_bytes(&bytes)
        .with_context(|| format!("Failed to parse proof: {}", path.display()))?;
    Ok((bytes, file))
}

/// Load a ledger receipt, trying CBOR first then JSON.
pub fn load_receipt(path: &Path) -> Result<TimestampRecord> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read receipt: {}", path.display()))?;

    let record = if let Ok(record) = TimestampRecord::from_cbor(&bytes) {
        debug!(format = "cbor", "Parsed receipt");
        record
    } else if let Ok(record) = serde_json::from_slice(&bytes) {
        debug!(format = "json", "Parsed receipt");
        record
    } else {
        bail!("Failed to parse receipt file (tried CBOR and JSON)");
    };

    Ok(record)
}

/// The fingerprint a calendar proof is rooted at.
pub fn proof_fingerprint(file: &DetachedTimestampFile) -> Result<ContentFingerprint> {
    Ok(ContentFingerprint::from_hex(
        HashAlgorithm::Sha256,
        &hex::encode(file.digest()),
    )?)
}

/// Format a UTC time as a human-readable string.
pub fn format_time(time: &DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}
