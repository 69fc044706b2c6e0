//! Upgrade command - ask calendars for a completed proof.

use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;
use postproof_core::{ChainAdapter, Maturity};
use tracing::info;

use super::calendar_adapter;
use crate::utils::{format_time, load_proof, proof_fingerprint};

/// Execute the upgrade command.
pub async fn execute(proof_path: PathBuf, calendars: Vec<String>, quiet: bool) -> Result<()> {
    let (bytes, file) = load_proof(&proof_path)?;
    let fingerprint = proof_fingerprint(&file)?;

    if file.timestamp.is_complete() && !quiet {
        println!("{}", "Proof already has a Bitcoin attestation.".dimmed());
    }

    let adapter = calendar_adapter(calendars, None)?;
    let outcome = adapter
        .attempt_maturation(&bytes, &fingerprint)
        .await
        .context("Upgrade failed")?;

    if let Some(upgraded) = &outcome.proof_blob {
        std::fs::write(&proof_path, upgraded)
            .with_context(|| format!("Failed to write proof: {}", proof_path.display()))?;
        info!(path = %proof_path.display(), bytes = upgraded.len(), "Proof upgraded");
    }

    match (outcome.status, &outcome.confirmation) {
        (Maturity::Confirmed, Some(confirmation)) => {
            if quiet {
                println!("confirmed");
            } else {
                println!("{}", "✅ Timestamp complete".green().bold());
                println!(
                    "   {} {}",
                    "Bitcoin block:".dimmed(),
                    confirmation.block_ref.height
                );
                println!(
                    "   {} {}",
                    "Attested time:".dimmed(),
                    format_time(&confirmation.confirmed_at)
                );
            }
        }
        _ => {
            if quiet {
                println!("pending");
            } else {
                println!("{}", "⏳ Not yet anchored in Bitcoin; try again later".yellow());
                if outcome.attempt_errors > 0 {
                    println!(
                        "   {} {}",
                        "Calendar errors:".dimmed(),
                        outcome.attempt_errors
                    );
                }
            }
        }
    }
    Ok(())
}
