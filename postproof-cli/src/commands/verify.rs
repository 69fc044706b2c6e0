//! Verify command implementation.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use colored::Colorize;
use postproof_core::chain::ledger::{LedgerAdapter, LedgerConfig};
use postproof_core::chain::mock::MockCalendarNetwork;
use postproof_core::{AttestationReport, ChainAdapter, ContentFingerprint, PostSnapshot};
use tracing::{error, info};

use super::calendar_adapter;
use crate::utils::{
    build_proof_path, build_receipt_path, fingerprint_post, format_time, load_receipt,
    load_snapshot,
};

/// Arguments for the verify command.
pub struct VerifyArgs {
    pub snapshot: PathBuf,
    pub proof: Option<PathBuf>,
    pub esplora_url: Option<String>,
    pub rpc_url: Option<String>,
    pub mock: bool,
    pub quiet: bool,
}

enum ProofKind {
    Calendar(PathBuf),
    Receipt(PathBuf),
}

fn locate_proof(snapshot: &Path, explicit: Option<PathBuf>) -> Result<ProofKind> {
    if let Some(path) = explicit {
        let is_receipt = path.extension().is_some_and(|ext| ext == "receipt");
        return Ok(if is_receipt {
            ProofKind::Receipt(path)
        } else {
            ProofKind::Calendar(path)
        });
    }
    let ots = build_proof_path(snapshot);
    if ots.exists() {
        return Ok(ProofKind::Calendar(ots));
    }
    let receipt = build_receipt_path(snapshot);
    if receipt.exists() {
        return Ok(ProofKind::Receipt(receipt));
    }
    bail!(
        "Failed to read proof: neither {} nor {} exists",
        ots.display(),
        receipt.display()
    )
}

/// Execute the verify command.
pub async fn execute(args: VerifyArgs) -> Result<()> {
    let snapshot = load_snapshot(&args.snapshot)?;

    let (fingerprint, report) = match locate_proof(&args.snapshot, args.proof)? {
        ProofKind::Calendar(path) => {
            let proof = std::fs::read(&path)
                .with_context(|| format!("Failed to read proof: {}", path.display()))?;
            info!(path = %path.display(), bytes = proof.len(), "Read proof");

            let fingerprint = snapshot.content.fingerprint()?;
            let adapter = if args.mock {
                MockCalendarNetwork::new().adapter()?
            } else {
                calendar_adapter(Vec::new(), args.esplora_url)?
            };
            let report = adapter
                .verify_attestation(&proof, &fingerprint)
                .await
                .map_err(|e| report_failure(&snapshot, e, args.quiet))?;
            (fingerprint, report)
        }
        ProofKind::Receipt(path) => {
            let record = load_receipt(&path)?;
            info!(path = %path.display(), backend = %record.backend, "Read receipt");

            let fingerprint = fingerprint_post(&snapshot.content, record.content_hash.algorithm)?;
            if fingerprint != record.content_hash {
                let mismatch = postproof_core::ProofError::Mismatch {
                    expected: record.content_hash.to_string(),
                    found: fingerprint.to_string(),
                };
                return Err(report_failure(&snapshot, mismatch, args.quiet));
            }
            let proof = record
                .proof_blob
                .as_deref()
                .context("Receipt carries no transaction signature")?;

            let mut config = LedgerConfig::for_backend(record.backend);
            if let Some(url) = args.rpc_url {
                config.rpc_url = url;
            }
            let adapter = LedgerAdapter::solana(config)?;
            let report = adapter
                .verify_attestation(proof, &fingerprint)
                .await
                .map_err(|e| report_failure(&snapshot, e, args.quiet))?;
            (fingerprint, report)
        }
    };

    print_report(&fingerprint, &report, args.quiet);
    Ok(())
}

fn report_failure(
    snapshot: &PostSnapshot,
    err: postproof_core::ProofError,
    quiet: bool,
) -> anyhow::Error {
    if err.is_integrity_failure() {
        error!(error = %err, post_id = %snapshot.content.post_id, "Proof does not match post");
        if !quiet {
            println!();
            println!("{}", "╔════════════════════════════════════════╗".red());
            println!(
                "{}",
                "║              MISMATCH                  ║".red().bold()
            );
            println!("{}", "╚════════════════════════════════════════╝".red());
            println!();
            println!(
                "   {} {}",
                "Post:".dimmed(),
                "MODIFIED since stamping, or proof is for another post".red()
            );
        }
    }
    anyhow::Error::new(err).context("Verification failed")
}

fn print_report(fingerprint: &ContentFingerprint, report: &AttestationReport, quiet: bool) {
    let earliest = report.earliest();

    if quiet {
        match earliest {
            Some(time) => println!("confirmed {}", time.to_rfc3339()),
            None => println!("pending"),
        }
        return;
    }

    println!();
    match earliest {
        Some(time) => {
            println!("{}", "╔════════════════════════════════════════╗".green());
            println!(
                "{}",
                "║              VERIFIED                  ║".green().bold()
            );
            println!("{}", "╚════════════════════════════════════════╝".green());
            println!();
            println!("   {} {}", "Post:".dimmed(), "Matches proof".green());
            println!("   {} {}", "Existed by:".dimmed(), format_time(&time));
            if let Some(block) = &report.earliest_block {
                println!("   {} {}", "Block:".dimmed(), block.height);
            }
        }
        None => {
            println!("{}", "╔════════════════════════════════════════╗".yellow());
            println!(
                "{}",
                "║              PENDING                   ║".yellow().bold()
            );
            println!("{}", "╚════════════════════════════════════════╝".yellow());
            println!();
            println!("   {} {}", "Post:".dimmed(), "Matches proof".green());
            println!(
                "   {} {}",
                "Chain:".dimmed(),
                "No confirmed attestation yet".yellow()
            );
        }
    }
    println!("   {} {}", "Fingerprint:".dimmed(), fingerprint);
    if report.rejected_attestations > 0 {
        println!(
            "   {} {}",
            "Rejected attestations:".dimmed(),
            report.rejected_attestations.to_string().red()
        );
    }
}
