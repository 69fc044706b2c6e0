//! Info command - describe a proof file without touching the network.

use std::path::PathBuf;

use anyhow::Result;
use colored::Colorize;
use postproof_core::ots::Attestation;

use crate::utils::load_proof;

/// Execute the info command.
pub fn execute(proof_path: PathBuf, show_tree: bool) -> Result<()> {
    let (bytes, file) = load_proof(&proof_path)?;

    println!("{} {}", "File:".dimmed(), proof_path.display());
    println!("{} {} bytes", "Size:".dimmed(), bytes.len());
    println!(
        "{} {} {}",
        "Digest:".dimmed(),
        file.file_hash_op.name(),
        hex::encode(file.digest())
    );
    println!(
        "{} {}",
        "Status:".dimmed(),
        if file.timestamp.is_complete() {
            "complete".green()
        } else {
            "pending".yellow()
        }
    );

    let attestations = file.timestamp.all_attestations();
    println!("{} {}", "Attestations:".dimmed(), attestations.len());
    for attested in &attestations {
        match attested.attestation {
            Attestation::Bitcoin { height } => {
                println!("   Bitcoin block {height}");
            }
            Attestation::Pending { uri } => {
                println!("   Pending at {uri}");
            }
            other => println!("   {other}"),
        }
    }

    if show_tree {
        println!();
        print!("{}", file.timestamp.render_tree());
    }
    Ok(())
}
