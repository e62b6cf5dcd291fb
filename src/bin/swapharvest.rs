//! Swap ledger harvester
//!
//! Usage:
//!   cargo run --release --bin swapharvest
//!
//! Environment variables (see `.env`):
//!   RPC_URL, TOKEN_MINT, ROUTER_ACCOUNT - required
//!   QUOTE_MINT - quote leg mint (default: wrapped SOL)
//!   TARGET_TX_COUNT - rows to write this run (default: 1000)
//!   RATE_LIMIT_PER_SEC / RATE_LIMIT_BURST - upstream pacing (default: 5 / 5)
//!   WORKER_LIMIT - concurrent fetches (default: 10)
//!   OUTPUT_PATH, LEDGER_BACKEND - sink location and kind (default: transactions.csv, csv)

use dotenv::dotenv;
use log::{error, info, warn};
use swapharvest::harvester::{self, HarvestConfig, HarvestError};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let config = match HarvestConfig::from_env().map_err(HarvestError::from) {
        Ok(config) => config,
        Err(e) => {
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
                .target(env_logger::Target::Stderr)
                .init();
            error!("❌ {}", e);
            return Err(e.into());
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.rust_log))
        .target(env_logger::Target::Stderr)
        .init();

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("⚠️  Received CTRL+C, finishing in-flight fetches...");
                ctrl_c_cancel.cancel();
            }
            Err(err) => error!("❌ Failed to listen for CTRL+C: {}", err),
        }
    });

    match harvester::run(config, cancel).await {
        Ok(report) => {
            info!("✅ Harvest complete");
            info!("   ├─ Stop reason: {:?}", report.stop_reason);
            info!("   ├─ Rows written: {}", report.persisted);
            info!("   ├─ Ledger size: {}", report.ledger_size);
            info!("   ├─ Signatures listed: {} ({} already recorded)", report.signatures_listed, report.already_recorded);
            info!("   ├─ Not relevant: {}", report.not_relevant);
            info!(
                "   └─ Fetches: {} ok, {} failed, {} not found, {} reverted",
                report.fetch.fetched,
                report.fetch.failed,
                report.fetch.not_found,
                report.fetch.execution_failed
            );
            if let Some(before) = &report.resume_before {
                info!("   Resume deeper with START_BEFORE={}", before);
            }
            Ok(())
        }
        Err(e) => {
            error!("❌ Harvest aborted: {}", e);
            Err(e.into())
        }
    }
}
