//! `optrade run`: start the engine from configuration and keep it running
//! until Ctrl-C or until no subscription is left active.

use anyhow::{Context, Result};
use clap::Args;
use optrade_core::clock::SystemClock;
use optrade_core::config::AppConfig;
use optrade_core::subscription::BrokerId;
use optrade_core::ConfigLoader;
use optrade_orchestrator::{start, BrokerSet, EngineEvent, EngineSettings, EngineState};
use optrade_paper::PaperBroker;
use optrade_upstox::UpstoxClient;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Arguments for the run command.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Config file path (defaults to config/Config.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Profile file layered over the base config (config/Config.{profile}.toml)
    #[arg(short, long, env = "OPTRADE_PROFILE", conflicts_with = "config")]
    pub profile: Option<String>,

    /// Route every subscription through the paper broker
    #[arg(long)]
    pub paper: bool,
}

fn load_config(args: &RunArgs) -> Result<AppConfig> {
    match (&args.config, &args.profile) {
        (Some(path), _) => ConfigLoader::load_file(path),
        (None, Some(profile)) => ConfigLoader::load_with_profile(profile),
        (None, None) => ConfigLoader::load(),
    }
}

/// Connects the brokers the subscriptions trade through.
fn connect_brokers(config: &AppConfig) -> Result<BrokerSet> {
    let mut brokers = BrokerSet::new();
    let wanted = |id: BrokerId| config.subscriptions.iter().any(|s| s.broker == id);

    if wanted(BrokerId::Paper) {
        let paper = PaperBroker::from_config(&config.brokers.paper)
            .context("Failed to seed paper broker")?;
        brokers.insert(BrokerId::Paper, Arc::new(paper));
    }

    if wanted(BrokerId::Upstox) {
        let upstox_config = config
            .brokers
            .upstox
            .as_ref()
            .context("Subscriptions use Upstox but [brokers.upstox] is missing")?;
        let client = UpstoxClient::from_config(
            upstox_config,
            config.engine.tz()?,
            config.engine.adapter_timeout_secs,
        )
        .context("Failed to connect to Upstox")?;
        tracing::info!(base_url = client.base_url(), "Upstox session ready");
        brokers.insert(BrokerId::Upstox, Arc::new(client));
    }

    Ok(brokers)
}

/// Runs the engine.
///
/// # Errors
/// Returns an error if the configuration is invalid, a broker cannot be
/// connected, or the engine fails to start.
pub async fn run_engine(args: RunArgs) -> Result<()> {
    let mut config = load_config(&args)?;
    if config.subscriptions.is_empty() {
        anyhow::bail!("No subscriptions configured");
    }
    if args.paper {
        for subscription in &mut config.subscriptions {
            subscription.broker = BrokerId::Paper;
        }
    }

    let brokers = connect_brokers(&config)?;
    let settings = EngineSettings::from_config(&config.engine, &config.retry);
    let clock = Arc::new(SystemClock::new(config.engine.tz()?));

    tracing::info!(
        subscriptions = config.subscriptions.len(),
        brokers = ?brokers,
        paper = args.paper,
        "Starting engine"
    );
    let engine = start(settings, config.subscriptions, brokers, clock)?;
    let reporter = tokio::spawn(report_events(engine.events));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            tracing::info!("Received Ctrl-C, shutting down");
        }
        state = engine.handle.wait_until_done() => {
            if state? == EngineState::Idle {
                tracing::info!("No active subscriptions left, shutting down");
            }
        }
    }

    engine.handle.shutdown().await;
    engine.task.await.context("Scheduler task panicked")?;
    reporter.abort();

    tracing::info!("Engine stopped");
    Ok(())
}

/// Logs order and lifecycle events as they happen.
async fn report_events(mut events: broadcast::Receiver<EngineEvent>) {
    loop {
        match events.recv().await {
            Ok(EngineEvent::EntryPlaced {
                symbol,
                trading_symbol,
                quantity,
                entry_price,
                target_price,
                order_id,
            }) => tracing::info!(
                %symbol,
                %trading_symbol,
                quantity,
                entry = %entry_price,
                target = %target_price,
                %order_id,
                "ENTRY"
            ),
            Ok(EngineEvent::ExitPlaced {
                symbol,
                trading_symbol,
                quantity,
                price,
                order_id,
            }) => tracing::info!(%symbol, %trading_symbol, quantity, %price, %order_id, "EXIT"),
            Ok(EngineEvent::Deactivated { symbol, reason }) => {
                tracing::warn!(%symbol, %reason, "DEACTIVATED");
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event reporter lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
