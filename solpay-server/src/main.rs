//! Solana Pay transaction-request server.
//!
//! # Usage
//!
//! ```bash
//! # Serve the endpoint described by config.toml
//! solpay-server serve
//!
//! # Print a payment link carrying a fresh reference
//! solpay-server link
//! solpay-server link --transfer
//!
//! # Wait until a transaction carrying the reference lands, then check it
//! solpay-server watch --reference <REFERENCE> --validate
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` - Path to the TOML configuration file (default: `config.toml`)
//! - `HOST` / `PORT` - Override the bind address
//! - `RUST_LOG` - Log level filter (default: `info`)

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use solana_signer::Signer;
use solpay::Reference;
use solpay_server::{ServerConfig, Shutdown};
use solpay_svm::ledger::RpcLedger;
use solpay_svm::Ledger;
use solpay_svm::reference::{FindReferenceOptions, PollPolicy, wait_for_reference};
use solpay_svm::validate::validate_transfer;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "solpay-server", version, about = "Solana Pay transaction-request server")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, env = "CONFIG", default_value = "config.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the transaction-request endpoint (default).
    Serve,
    /// Print a `solana:` URL carrying a fresh reference.
    Link {
        /// Print a non-interactive transfer request instead of a link to the
        /// endpoint.
        #[arg(long)]
        transfer: bool,
    },
    /// Wait for a transaction carrying a reference.
    Watch {
        /// Reference to look for.
        #[arg(long)]
        reference: Reference,
        /// Milliseconds between two lookups.
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
        /// Seconds after which waiting stops.
        #[arg(long, default_value_t = 120)]
        timeout_secs: u64,
        /// Check the found transaction against the configured transfer.
        #[arg(long)]
        validate: bool,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        tracing::debug!("rustls crypto provider already installed");
    }

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        tracing::error!("solpay-server failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::load(&cli.config)?;
    tracing::info!(config = %cli.config.display(), "loaded configuration");

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&config).await,
        Command::Link { transfer } => link(&config, transfer),
        Command::Watch {
            reference,
            interval_ms,
            timeout_secs,
            validate,
        } => {
            let policy = PollPolicy::new(
                Duration::from_millis(interval_ms),
                Duration::from_secs(timeout_secs),
            );
            watch(&config, reference, policy, validate).await
        }
    }
}

fn ledger(config: &ServerConfig) -> Arc<dyn Ledger> {
    let url = config.rpc_endpoint();
    tracing::info!(rpc = %url, finality = %config.finality, "using ledger");
    Arc::new(RpcLedger::with_commitment(url, config.finality.commitment()))
}

async fn serve(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(signer) = config.signer()? {
        tracing::info!(signer = %signer.pubkey(), "transactions are co-signed");
    }
    if let Some(gate) = &config.gate {
        tracing::info!(collection = %gate.collection, "requests gated on collection membership");
    }

    let app = solpay_server::router(config, ledger(config))?;
    let shutdown = Shutdown::install()?;
    let token = shutdown.token();

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("transaction requests served at http://{addr}{}", config.path);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await?;

    shutdown.recv().await;
    tracing::info!("server shut down gracefully");
    Ok(())
}

#[allow(clippy::print_stdout)]
fn link(config: &ServerConfig, transfer: bool) -> Result<(), Box<dyn std::error::Error>> {
    let reference = Reference::random();
    let url = if transfer {
        config.transfer_request(Some(reference)).to_string()
    } else {
        config.transaction_link(&reference)?.to_string()
    };
    println!("{url}");
    println!("reference: {reference}");
    Ok(())
}

#[allow(clippy::print_stdout)]
async fn watch(
    config: &ServerConfig,
    reference: Reference,
    policy: PollPolicy,
    validate: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let ledger = ledger(config);
    let shutdown = Shutdown::install()?;
    let options = FindReferenceOptions::at(config.finality);

    tracing::info!(%reference, timeout = ?policy.timeout, "waiting for payment");
    let found =
        wait_for_reference(&*ledger, &reference, &options, policy, &shutdown.token()).await?;
    tracing::info!(signature = %found.signature, slot = found.slot, "transaction found");

    if validate {
        let request = config.transfer_request(Some(reference));
        validate_transfer(&*ledger, &found.signature, &request, config.finality).await?;
        tracing::info!("transfer matches the configured request");
    }

    println!("{}", found.signature);
    Ok(())
}
