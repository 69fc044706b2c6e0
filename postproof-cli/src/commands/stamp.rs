//! Stamp command - submit a post's fingerprint to calendars or a Solana memo.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use colored::Colorize;
use postproof_core::chain::ledger::{LedgerAdapter, LedgerConfig};
use postproof_core::chain::mock::MockCalendarNetwork;
use postproof_core::ots::DetachedTimestampFile;
use postproof_core::{Backend, ChainAdapter, TimestampRecord};
use solana_client::rpc_client::RpcClient;
use solana_sdk::{
    commitment_config::CommitmentConfig,
    native_token::LAMPORTS_PER_SOL,
    pubkey::Pubkey,
    signature::{write_keypair_file, Keypair, Signer},
};
use tracing::info;

use super::calendar_adapter;
use crate::utils::{build_proof_path, build_receipt_path, load_snapshot};

/// Airdrop amount in SOL for a devnet burner.
const AIRDROP_SOL: u64 = 1;

/// Maximum retries for airdrop.
const AIRDROP_RETRIES: u32 = 3;

/// Execute the stamp command against calendar servers.
pub async fn execute(
    snapshot_path: PathBuf,
    calendars: Vec<String>,
    output: Option<PathBuf>,
    mock: bool,
    quiet: bool,
) -> Result<()> {
    let snapshot = load_snapshot(&snapshot_path)?;
    let fingerprint = snapshot.content.fingerprint()?;

    let adapter = if mock {
        MockCalendarNetwork::new().adapter()?
    } else {
        calendar_adapter(calendars, None)?
    };

    if !quiet {
        println!(
            "{}",
            format!(
                "📝 Submitting {} to {} calendar(s)...",
                &fingerprint.hash_hex[..16],
                adapter.calendars().len()
            )
            .dimmed()
        );
    }

    let outcome = adapter
        .submit(&fingerprint)
        .await
        .context("Calendar submission failed")?;

    let output = output.unwrap_or_else(|| build_proof_path(&snapshot_path));
    std::fs::write(&output, &outcome.proof_blob)
        .with_context(|| format!("Failed to write proof: {}", output.display()))?;
    info!(path = %output.display(), bytes = outcome.proof_blob.len(), "Proof written");

    if quiet {
        println!("{}", output.display());
        return Ok(());
    }

    let file = DetachedTimestampFile::from_bytes(&outcome.proof_blob)?;
    println!();
    println!("{}", "⏳ Timestamp submitted (pending)".green().bold());
    println!();
    println!("   {} {}", "Fingerprint:".dimmed(), fingerprint);
    println!("   {} {}", "Proof:".dimmed(), output.display());
    for attested in file.timestamp.all_attestations() {
        if let Some(uri) = attested.attestation.pending_uri() {
            println!("   {} {}", "Calendar:".dimmed(), uri);
        }
    }
    println!();
    println!(
        "{}",
        format!(
            "   Run `postproof upgrade {}` in a few hours to complete it.",
            output.display()
        )
        .dimmed()
    );
    Ok(())
}

/// Options for a Solana memo timestamp.
pub struct LedgerStamp {
    pub snapshot: PathBuf,
    pub output: Option<PathBuf>,
    pub backend: Backend,
    pub keypair: Option<PathBuf>,
    pub rpc_url: Option<String>,
    pub json: bool,
    pub quiet: bool,
}

/// Execute the stamp command against a Solana cluster.
pub async fn execute_ledger(args: LedgerStamp) -> Result<()> {
    let snapshot = load_snapshot(&args.snapshot)?;
    let fingerprint = snapshot.content.fingerprint()?;

    let mut config = LedgerConfig::for_backend(args.backend);
    if let Some(url) = args.rpc_url {
        config.rpc_url = url;
    }
    let keypair_path = match args.keypair {
        Some(path) => path,
        None if matches!(args.backend, Backend::SolanaDevnet) => {
            let rpc_url = config.rpc_url.clone();
            let quiet = args.quiet;
            tokio::task::spawn_blocking(move || fund_burner(&rpc_url, quiet))
                .await
                .context("Burner funding task failed")??
        }
        None => bail!("--keypair is required for {}", args.backend),
    };
    config.keypair_path = Some(keypair_path);

    if !args.quiet {
        println!("{}", format!("📤 Publishing memo to {}...", args.backend).dimmed());
    }
    let adapter = LedgerAdapter::solana(config)?;
    let outcome = adapter
        .submit(&fingerprint)
        .await
        .context("Solana submission failed")?;

    let signature = String::from_utf8_lossy(&outcome.proof_blob).into_owned();
    let record = TimestampRecord::submitted(
        "cli",
        snapshot.content.post_id.clone(),
        snapshot,
        args.backend,
        fingerprint.clone(),
        outcome.proof_blob,
        outcome.confirmation,
    );
    let bytes = if args.json {
        serde_json::to_vec_pretty(&record)?
    } else {
        record.to_cbor()?
    };
    let output = args
        .output
        .unwrap_or_else(|| build_receipt_path(&args.snapshot));
    std::fs::write(&output, bytes)
        .with_context(|| format!("Failed to write receipt: {}", output.display()))?;

    if args.quiet {
        println!("{signature}");
        return Ok(());
    }

    let cluster = match args.backend {
        Backend::SolanaMainnet => "",
        _ => "?cluster=devnet",
    };
    println!();
    println!("{}", format!("⚓ Published to {}!", args.backend).green().bold());
    println!();
    println!("   {} {}", "Transaction:".dimmed(), signature);
    println!(
        "   {} {}",
        "Explorer:".dimmed(),
        format!("https://explorer.solana.com/tx/{signature}{cluster}").cyan()
    );
    println!("   {} {}", "Fingerprint:".dimmed(), fingerprint);
    println!("   {} {}", "Receipt:".dimmed(), output.display());
    Ok(())
}

/// Create a devnet keypair, fund it by airdrop and save it next to the temp dir.
fn fund_burner(rpc_url: &str, quiet: bool) -> Result<PathBuf> {
    let payer = Keypair::new();
    if !quiet {
        println!("{}", "🔑 Generating burner keypair...".dimmed());
        println!("{}", format!("   Pubkey: {}", payer.pubkey()).dimmed());
    }

    let client = RpcClient::new_with_timeout_and_commitment(
        rpc_url.to_string(),
        Duration::from_secs(30),
        CommitmentConfig::confirmed(),
    );

    if !quiet {
        println!(
            "{}",
            format!("💰 Requesting {AIRDROP_SOL} SOL airdrop...").dimmed()
        );
    }
    request_airdrop_with_retry(&client, &payer.pubkey(), AIRDROP_SOL, quiet)?;
    wait_for_balance(&client, &payer.pubkey(), AIRDROP_SOL * LAMPORTS_PER_SOL)?;

    let path = std::env::temp_dir().join(format!("postproof-burner-{}.json", payer.pubkey()));
    write_burner(&payer, &path)?;
    Ok(path)
}

fn write_burner(payer: &Keypair, path: &Path) -> Result<()> {
    write_keypair_file(payer, path)
        .map_err(|e| anyhow!("Failed to write burner keypair {}: {e}", path.display()))?;
    Ok(())
}

/// Request airdrop with retries.
fn request_airdrop_with_retry(
    client: &RpcClient,
    pubkey: &Pubkey,
    sol_amount: u64,
    quiet: bool,
) -> Result<()> {
    let lamports = sol_amount * LAMPORTS_PER_SOL;

    let mut attempt = 1;
    loop {
        match client.request_airdrop(pubkey, lamports) {
            Ok(sig) => {
                info!(attempt, signature = %sig, "Airdrop requested");
                return Ok(());
            }
            Err(e) if attempt >= AIRDROP_RETRIES => {
                return Err(anyhow!(
                    "Solana airdrop failed after {AIRDROP_RETRIES} attempts: {e}"
                ));
            }
            Err(_) => {
                if !quiet {
                    println!(
                        "{}",
                        format!("   Airdrop attempt {attempt} failed, retrying...").yellow()
                    );
                }
                attempt += 1;
                std::thread::sleep(Duration::from_secs(2));
            }
        }
    }
}

/// Wait for the account to have at least the specified balance.
fn wait_for_balance(client: &RpcClient, pubkey: &Pubkey, min_lamports: u64) -> Result<()> {
    for _ in 0..30 {
        match client.get_balance(pubkey) {
            Ok(balance) if balance >= min_lamports => return Ok(()),
            _ => std::thread::sleep(Duration::from_millis(500)),
        }
    }

    bail!("Timeout waiting for Solana airdrop to confirm")
}
