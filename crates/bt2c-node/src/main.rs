//! bt2c-node — the BT2C full-node binary.
//!
//! Startup sequence:
//!   1. Open (or initialise) the block log and state
//!   2. Apply genesis if the data dir is fresh
//!   3. Start the consensus engine and background schedules
//!   4. Run until interrupted, then flush and stop
//!
//! The P2P transport is pluggable and out of tree; without one the node
//! runs standalone on the in-process loopback, which is also the mode the
//! end-to-end tests use.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use bt2c_core::constants::SATS_PER_BT2C;
use bt2c_crypto::KeyPair;
use bt2c_network::LoopbackHub;
use bt2c_node::{GenesisParams, Node, NodeConfig};

#[derive(Parser, Debug)]
#[command(
    name = "bt2c-node",
    version,
    about = "BT2C full node — fixed supply, reputation-weighted proof of stake"
)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the node.
    Run(RunArgs),
    /// Generate a validator keypair and write it to a key file.
    Keygen {
        /// Where to write the key file.
        #[arg(long, default_value = "~/.bt2c/validator.key.json")]
        out: PathBuf,
    },
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Directory for the block log, checkpoints and side-store.
    #[arg(long, default_value = "~/.bt2c/data")]
    data_dir: PathBuf,

    /// Node configuration JSON (defaults apply for absent keys).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Validator key file (created by `keygen`). Generated ephemerally if
    /// absent — fine for local experiments only.
    #[arg(long)]
    key_file: Option<PathBuf>,

    /// Genesis parameters JSON (required to join an existing network).
    #[arg(long)]
    genesis_params: Option<PathBuf>,

    /// Reserved listen address for an external transport adapter.
    #[arg(long, default_value = "127.0.0.1:7770")]
    listen: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,bt2c=debug".parse().unwrap()),
        )
        .init();

    match Args::parse().command {
        Command::Keygen { out } => keygen(&expand_tilde(&out)),
        Command::Run(args) => run(args).await,
    }
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    info!("BT2C node starting");

    let data_dir = expand_tilde(&args.data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;

    let config = match &args.config {
        Some(path) => NodeConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => NodeConfig::default(),
    };

    let keypair = load_or_generate_keypair(args.key_file.as_deref())?;
    let genesis = load_or_generate_genesis(args.genesis_params.as_deref(), &keypair)?;

    // Standalone transport. A real deployment plugs a socket-backed
    // `Network` in here; `listen` is reserved for that adapter.
    let hub = LoopbackHub::new();
    let (network, inbound) = hub.join(keypair.address.to_string());

    let (node, mut events) = Node::start(
        &data_dir,
        config,
        keypair,
        genesis,
        Arc::new(network),
        inbound,
    )
    .await
    .map_err(|e| anyhow::anyhow!("starting node: {e}"))?;

    // Surface engine events in the log until shutdown.
    let event_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            info!(?event, "consensus event");
        }
    });

    info!("node ready");
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutting down");
    node.stop()
        .await
        .map_err(|e| anyhow::anyhow!("stopping node: {e}"))?;
    event_task.abort();
    Ok(())
}

fn keygen(out: &Path) -> anyhow::Result<()> {
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let keypair = KeyPair::generate();
    let json = serde_json::to_string_pretty(&keypair).context("serializing keypair")?;
    std::fs::write(out, json).with_context(|| format!("writing {}", out.display()))?;
    info!(address = %keypair.address, file = %out.display(), "validator key generated");
    Ok(())
}

fn load_or_generate_keypair(path: Option<&Path>) -> anyhow::Result<KeyPair> {
    if let Some(path) = path {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading key file {}", path.display()))?;
        return serde_json::from_str(&json).context("parsing key file");
    }
    warn!("No --key-file provided. Generating an ephemeral key — DO NOT USE IN PRODUCTION.");
    Ok(KeyPair::generate())
}

/// Load genesis parameters, or build a single-validator genesis around our
/// own key.
///
/// # Warning
/// A generated genesis is **not reproducible**: a node started without
/// `--genesis-params` creates a network no other node can join. Only use
/// this for local development.
fn load_or_generate_genesis(
    path: Option<&Path>,
    keypair: &KeyPair,
) -> anyhow::Result<GenesisParams> {
    if let Some(path) = path {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading genesis params from {}", path.display()))?;
        return serde_json::from_str(&json).context("parsing genesis params JSON");
    }
    warn!("No --genesis-params provided. Generating a local single-validator genesis.");
    Ok(GenesisParams {
        validator_public_key: keypair.public_key.clone(),
        validator_stake: 10 * SATS_PER_BT2C,
        moniker: "developer".into(),
        timestamp_ms: chrono::Utc::now().timestamp_millis(),
    })
}

/// Expand a leading `~` to the user's home directory (`HOME` or `USERPROFILE`).
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}
