//! PostProof CLI - fingerprint and timestamp social media posts.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use postproof_core::{Backend, HashAlgorithm};
use tracing_subscriber::EnvFilter;

mod commands;
mod exit_codes;
mod utils;

use exit_codes::ExitCode;

const EXIT_CODES_HELP: &str = "Exit codes:
  0   Success
  1   General error
  65  Verification failed (proof does not match the post, or is corrupt)
  66  Cannot read input file
  69  Calendar, block explorer or Solana RPC unavailable
  74  Cannot write output file";

#[derive(Parser)]
#[command(name = "postproof")]
#[command(author, version, about = "Proof-of-existence timestamps for social media posts", long_about = None)]
#[command(after_help = EXIT_CODES_HELP)]
struct Cli {
    /// Suppress decorated output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum AlgorithmArg {
    Sha256,
    #[value(name = "sha3-256")]
    Sha3_256,
}

impl From<AlgorithmArg> for HashAlgorithm {
    fn from(arg: AlgorithmArg) -> Self {
        match arg {
            AlgorithmArg::Sha256 => HashAlgorithm::Sha256,
            AlgorithmArg::Sha3_256 => HashAlgorithm::Sha3_256,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ClusterArg {
    Devnet,
    Mainnet,
}

impl From<ClusterArg> for Backend {
    fn from(arg: ClusterArg) -> Self {
        match arg {
            ClusterArg::Devnet => Backend::SolanaDevnet,
            ClusterArg::Mainnet => Backend::SolanaMainnet,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ReceiptFormat {
    Cbor,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the fingerprint of a captured post
    Fingerprint {
        /// Post snapshot or post content (JSON)
        #[arg(value_name = "SNAPSHOT")]
        snapshot: PathBuf,

        /// Digest algorithm
        #[arg(short, long, value_enum, default_value = "sha256")]
        algorithm: AlgorithmArg,

        /// Print the canonical bytes that are hashed
        #[arg(long)]
        canonical: bool,
    },

    /// Timestamp a captured post
    Stamp {
        /// Post snapshot or post content (JSON)
        #[arg(value_name = "SNAPSHOT")]
        snapshot: PathBuf,

        /// Calendar server to submit to (repeatable; defaults to the public calendars)
        #[arg(long = "calendar", value_name = "URL")]
        calendars: Vec<String>,

        /// Output path (defaults to <SNAPSHOT>.ots, or <SNAPSHOT>.receipt with --ledger)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Publish a Solana memo instead of using calendars
        #[arg(long, value_enum)]
        ledger: Option<ClusterArg>,

        /// Fee payer keypair for --ledger (a funded burner is created on devnet if omitted)
        #[arg(long, value_name = "PATH")]
        keypair: Option<PathBuf>,

        /// Solana RPC endpoint for --ledger
        #[arg(long, value_name = "URL")]
        rpc_url: Option<String>,

        /// Receipt encoding for --ledger
        #[arg(short, long, value_enum, default_value = "cbor")]
        format: ReceiptFormat,

        /// Use the in-process mock calendar network (for testing)
        #[arg(long)]
        mock: bool,
    },

    /// Fetch calendar upgrades into a pending proof, in place
    Upgrade {
        /// Proof file (.ots)
        #[arg(value_name = "PROOF")]
        proof: PathBuf,

        /// Calendar servers allowed to answer upgrade requests (defaults to the public calendars)
        #[arg(long = "calendar", value_name = "URL")]
        calendars: Vec<String>,
    },

    /// Verify a proof against a captured post
    Verify {
        /// Post snapshot or post content (JSON)
        #[arg(value_name = "SNAPSHOT")]
        snapshot: PathBuf,

        /// Proof file (defaults to <SNAPSHOT>.ots, then <SNAPSHOT>.receipt)
        #[arg(value_name = "PROOF")]
        proof: Option<PathBuf>,

        /// Esplora API used to check Bitcoin attestations
        #[arg(long, value_name = "URL")]
        esplora_url: Option<String>,

        /// Solana RPC endpoint for ledger receipts
        #[arg(long, value_name = "URL")]
        rpc_url: Option<String>,

        /// Use the in-process mock calendar network (for testing)
        #[arg(long)]
        mock: bool,
    },

    /// Show the contents of a proof file (offline)
    Info {
        /// Proof file (.ots)
        #[arg(value_name = "PROOF")]
        proof: PathBuf,

        /// Print the full operation tree
        #[arg(long)]
        tree: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let quiet = cli.quiet;

    let result = match cli.command {
        Commands::Fingerprint {
            snapshot,
            algorithm,
            canonical,
        } => commands::fingerprint::execute(snapshot, algorithm.into(), canonical, quiet),
        Commands::Stamp {
            snapshot,
            calendars,
            output,
            ledger,
            keypair,
            rpc_url,
            format,
            mock,
        } => match ledger {
            Some(cluster) => {
                commands::stamp::execute_ledger(commands::stamp::LedgerStamp {
                    snapshot,
                    output,
                    backend: cluster.into(),
                    keypair,
                    rpc_url,
                    json: matches!(format, ReceiptFormat::Json),
                    quiet,
                })
                .await
            }
            None => commands::stamp::execute(snapshot, calendars, output, mock, quiet).await,
        },
        Commands::Upgrade { proof, calendars } => {
            commands::upgrade::execute(proof, calendars, quiet).await
        }
        Commands::Verify {
            snapshot,
            proof,
            esplora_url,
            rpc_url,
            mock,
        } => {
            commands::verify::execute(commands::verify::VerifyArgs {
                snapshot,
                proof,
                esplora_url,
                rpc_url,
                mock,
                quiet,
            })
            .await
        }
        Commands::Info { proof, tree } => commands::info::execute(proof, tree),
    };

    let exit = match result {
        Ok(()) => ExitCode::success(),
        Err(err) => ExitCode::from_anyhow(&err),
    };
    if let Some(message) = &exit.message {
        eprintln!("{} {}", "error:".red().bold(), message);
    }
    std::process::exit(exit.code);
}
