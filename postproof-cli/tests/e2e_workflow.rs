//! End-to-end workflow tests for postproof-cli.
//!
//! These tests verify complete user workflows involving multiple commands.
//! Stamping runs against the in-process mock calendars so nothing leaves
//! the machine.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Get a Command for the postproof binary.
fn postproof() -> Command {
    cargo_bin_cmd!("postproof").into()
}

fn snapshot_json(text: &str, likes: u64) -> String {
    format!(
        r#"{{
  "content": {{"post_id": "1790000000000000001", "author": "grace", "text": "{text}"}},
  "engagement": {{"likes": {likes}, "reposts": 2, "replies": 1}},
  "captured_at": "2025-06-01T12:00:00Z"
}}"#
    )
}

fn write_post(dir: &TempDir, text: &str, likes: u64) -> PathBuf {
    let path = dir.path().join("post.json");
    fs::write(&path, snapshot_json(text, likes)).unwrap();
    path
}

fn stamp_mock(snapshot: &Path) {
    postproof()
        .args(["stamp", "--mock", snapshot.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Timestamp submitted (pending)"));
}

// ============================================================================
// Complete Workflow Tests: Stamp → Info → Verify
// ============================================================================

#[test]
fn test_e2e_stamp_info_verify() {
    let temp = TempDir::new().unwrap();
    let snapshot = write_post(&temp, "launch day", 3);

    // Step 1: Stamp the post
    stamp_mock(&snapshot);
    let proof = temp.path().join("post.json.ots");
    assert!(proof.exists(), "Proof should exist after stamping");

    // Step 2: Inspect the proof offline
    postproof()
        .args(["info", proof.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("pending"))
        .stdout(predicate::str::contains("Pending at"))
        .stdout(predicate::str::contains("sha256"));

    // Step 3: Verify the post against its proof
    postproof()
        .args(["verify", "--mock", snapshot.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("PENDING"))
        .stdout(predicate::str::contains("Matches proof"));
}

#[test]
fn test_e2e_info_tree_lists_operations() {
    let temp = TempDir::new().unwrap();
    let snapshot = write_post(&temp, "tree view", 0);
    stamp_mock(&snapshot);

    postproof()
        .args(["info", "--tree", temp.path().join("post.json.ots").to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("pending"));
}

// ============================================================================
// Tamper Detection Tests
// ============================================================================

#[test]
fn test_e2e_edited_text_fails_verification() {
    let temp = TempDir::new().unwrap();
    let snapshot = write_post(&temp, "original wording", 3);
    stamp_mock(&snapshot);

    fs::write(&snapshot, snapshot_json("edited wording", 3)).unwrap();

    postproof()
        .args(["verify", "--mock", snapshot.to_str().unwrap()])
        .assert()
        .code(65)
        .stdout(predicate::str::contains("MISMATCH"))
        .stderr(predicate::str::contains("Verification failed"));
}

#[test]
fn test_e2e_engagement_change_still_verifies() {
    let temp = TempDir::new().unwrap();
    let snapshot = write_post(&temp, "stable words", 3);
    stamp_mock(&snapshot);

    // Likes and replies move all the time; they are not part of the proof.
    fs::write(&snapshot, snapshot_json("stable words", 90_000)).unwrap();

    postproof()
        .args(["verify", "--mock", snapshot.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("PENDING"));
}

#[test]
fn test_e2e_proof_for_other_post_fails() {
    let temp = TempDir::new().unwrap();
    let first = write_post(&temp, "first post", 0);
    stamp_mock(&first);
    let first_proof = temp.path().join("first.ots");
    fs::rename(temp.path().join("post.json.ots"), &first_proof).unwrap();

    let other = temp.path().join("other.json");
    fs::write(&other, snapshot_json("a different post", 0)).unwrap();

    postproof()
        .args([
            "verify",
            "--mock",
            other.to_str().unwrap(),
            first_proof.to_str().unwrap(),
        ])
        .assert()
        .code(65);
}

// ============================================================================
// Output Options
// ============================================================================

#[test]
fn test_e2e_custom_output_path() {
    let temp = TempDir::new().unwrap();
    let snapshot = write_post(&temp, "custom output", 0);
    let custom = temp.path().join("proofs").join("custom.ots");
    fs::create_dir_all(custom.parent().unwrap()).unwrap();

    postproof()
        .args([
            "stamp",
            "--mock",
            "-o",
            custom.to_str().unwrap(),
            snapshot.to_str().unwrap(),
        ])
        .assert()
        .success();

    assert!(custom.exists());
    assert!(!temp.path().join("post.json.ots").exists());

    postproof()
        .args([
            "verify",
            "--mock",
            snapshot.to_str().unwrap(),
            custom.to_str().unwrap(),
        ])
        .assert()
        .success();
}

#[test]
fn test_e2e_quiet_mode_outputs() {
    let temp = TempDir::new().unwrap();
    let snapshot = write_post(&temp, "quiet please", 0);

    let stamped = postproof()
        .args(["-q", "stamp", "--mock", snapshot.to_str().unwrap()])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let stamped = String::from_utf8(stamped).unwrap();
    assert!(stamped.trim().ends_with("post.json.ots"));

    postproof()
        .args(["-q", "verify", "--mock", snapshot.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::diff("pending\n"));
}

#[test]
fn test_e2e_unwritable_output_exits_74() {
    let temp = TempDir::new().unwrap();
    let snapshot = write_post(&temp, "nowhere to go", 0);
    let missing_dir = temp.path().join("missing").join("proof.ots");

    postproof()
        .args([
            "stamp",
            "--mock",
            "-o",
            missing_dir.to_str().unwrap(),
            snapshot.to_str().unwrap(),
        ])
        .assert()
        .code(74)
        .stderr(predicate::str::contains("Failed to write proof"));
}
