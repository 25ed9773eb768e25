mod api;
mod constants;

use api::AppState;
use clap::Parser;
use constants::{DEFAULT_DATA_DIR, DEFAULT_LISTEN};
use ledger_core::{
    constants::{DEFAULT_DIFFICULTY, HASH_HEX_SIZE},
    Ledger, LedgerConfig,
};
use ledger_storage::SledStore;
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tracing::info;

#[derive(Parser, Debug)]
struct Args {
    /// Address to listen on, e.g. 127.0.0.1:8080
    #[arg(long, env = "LEDGER_LISTEN", default_value = DEFAULT_LISTEN)]
    listen: String,

    /// Data directory for sled
    #[arg(long, env = "LEDGER_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    /// Leading zero hex characters required of new and re-mined blocks
    #[arg(
        long,
        env = "LEDGER_DIFFICULTY",
        default_value_t = DEFAULT_DIFFICULTY,
        value_parser = clap::value_parser!(u32).range(0..=HASH_HEX_SIZE as i64)
    )]
    difficulty: u32,

    /// Difficulty for the genesis block, used only when the store is empty
    #[arg(
        long,
        env = "LEDGER_GENESIS_DIFFICULTY",
        default_value_t = DEFAULT_DIFFICULTY,
        value_parser = clap::value_parser!(u32).range(0..=HASH_HEX_SIZE as i64)
    )]
    genesis_difficulty: u32,

    /// Search nonces across all cores
    #[arg(long, env = "LEDGER_PARALLEL_MINING")]
    parallel_mining: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = LedgerConfig::default()
        .with_difficulty(args.difficulty)
        .with_genesis_difficulty(args.genesis_difficulty)
        .with_parallel_mining(args.parallel_mining);

    let store = Arc::new(SledStore::open(&args.data_dir)?);
    let ledger = Arc::new(Ledger::new(store.clone(), config));
    if let Some(genesis) = ledger.initialize().await? {
        info!(hash = %genesis.hash, "initialized new ledger");
    }
    info!(blocks = ledger.len()?, valid = ledger.validate()?, "ledger loaded");

    let app = api::router(AppState { ledger });

    let addr: SocketAddr = args.listen.parse()?;
    info!("ledger-node listening on http://{addr}");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    store.close()?;
    info!("ledger-node stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(%err, "failed to listen for shutdown signal");
    }
}
