//! Fingerprint command - print the digest a timestamp would commit to.

use std::path::PathBuf;

use anyhow::Result;
use colored::Colorize;
use postproof_core::{canonicalize, Content, HashAlgorithm};
use tracing::info;

use crate::utils::{fingerprint_post, load_snapshot};

/// Execute the fingerprint command.
pub fn execute(
    snapshot_path: PathBuf,
    algorithm: HashAlgorithm,
    show_canonical: bool,
    quiet: bool,
) -> Result<()> {
    let snapshot = load_snapshot(&snapshot_path)?;
    let fingerprint = fingerprint_post(&snapshot.content, algorithm)?;
    info!(%fingerprint, path = %snapshot_path.display(), "Fingerprinted post");

    if quiet {
        println!("{}", fingerprint.hash_hex);
        return Ok(());
    }

    println!("{} {}", "Post:".dimmed(), snapshot.content.post_id);
    println!("{} @{}", "Author:".dimmed(), snapshot.content.author);
    println!("{} {}", "Algorithm:".dimmed(), fingerprint.algorithm);
    println!("{} {}", "Fingerprint:".dimmed(), fingerprint.hash_hex.green());

    if show_canonical {
        let bytes = canonicalize(&Content::structured(&snapshot.content)?)?;
        println!();
        println!("{}", String::from_utf8_lossy(&bytes));
    }
    Ok(())
}
