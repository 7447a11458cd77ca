//! Favorr - favor ledger and public request board

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

use favorr::{config::Args, logging, server, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    logging::init(&args.log_level, args.log_format);

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Favorr");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("Store: {:?}", args.store);
    info!("Upload dir: {}", args.upload_dir.display());
    info!("======================================");

    let reconcile = args.reconcile_leaderboard;
    let state = Arc::new(AppState::build(args).await?);

    if reconcile {
        server::reconcile_leaderboard(&state).await?;
    }

    server::run(state).await?;
    Ok(())
}
