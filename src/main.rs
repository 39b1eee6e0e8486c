//! Gameday channel bot
//!
//! Mirrors a league's live games into per-game text channels.
//!
//! Architecture:
//! - Tokio async runtime for concurrent I/O
//! - REST-polled stats source with client-side rate limiting
//! - One tracker task per actively tracked game
//! - Season orchestrator with bounded per-team game windows
//! - Discord REST gateway, or an in-memory gateway in dry-run mode

mod api;
mod bot;
mod config;
mod data;
mod gateway;

use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use api::client::StatsApiClient;
use bot::scheduler::ScheduleOrchestrator;
use config::Settings;
use gateway::discord::DiscordGateway;
use gateway::memory::MemoryGateway;
use gateway::MessagingGateway;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration.
    let settings = Settings::from_env();

    // Initialize logging.
    init_logging(&settings);

    info!("=== Gameday Channel Bot ===");
    info!(
        dry_run = settings.dry_run,
        stats_api = %settings.stats_api_base_url,
        "Configuration loaded"
    );

    // Validate settings.
    if let Err(errors) = settings.validate() {
        for e in &errors {
            error!(error = %e, "Configuration error");
        }
        anyhow::bail!("Configuration validation failed");
    }

    // Initialize the stats source (shared via Arc across trackers).
    let source = Arc::new(StatsApiClient::with_defaults(&settings.stats_api_base_url)?);

    // Pick the messaging gateway.
    let gateway: Arc<dyn MessagingGateway> = if settings.dry_run {
        info!("Dry-run mode: messages stay in memory, no token required");
        Arc::new(MemoryGateway::new())
    } else {
        let discord =
            DiscordGateway::connect(&settings.discord_token, &settings.discord_guild_id).await?;
        Arc::new(discord)
    };

    // Shutdown signal.
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_err() {
            error!("Failed to listen for ctrl+c");
            return;
        }
        info!("Shutdown signal received");
        signal_cancel.cancel();
    });

    // Run the orchestrator: season load, window seeding, channel
    // reconciliation, then the maintenance loop until cancelled.
    let orchestrator =
        ScheduleOrchestrator::new(source, gateway, settings.orchestrator_config(), cancel);
    orchestrator.run().await?;

    info!("Bot shutdown complete.");
    Ok(())
}

fn init_logging(settings: &Settings) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_level));

    if settings.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }
}
