//! Polymarket frontrun bot entry point.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use polymarket_frontrun::api::{create_router, AppState};
use polymarket_frontrun::config::Config;
use polymarket_frontrun::events::{BotEvent, ControlSignal, EventBus};
use polymarket_frontrun::feed::{ConnectionManager, FeedConfig};
use polymarket_frontrun::market::{ClobClient, ClobExchange};
use polymarket_frontrun::metrics;
use polymarket_frontrun::orderbook::MarketCache;
use polymarket_frontrun::persist::{load_risk_seed, spawn_recorder, JsonlSink};
use polymarket_frontrun::risk::RiskManager;
use polymarket_frontrun::strategy::FrontrunEngine;
use polymarket_frontrun::trading::{ExecutorConfig, OrderExecutor};
use polymarket_frontrun::utils::shutdown_signal;

/// Polymarket frontrun bot.
#[derive(Parser, Debug)]
#[command(name = "polymarket-frontrun")]
#[command(about = "Bait-and-frontrun bot for Polymarket CLOB order books")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the trading loop (default).
    Run {
        /// Run in dry-run mode (no real orders).
        #[arg(long)]
        dry_run: Option<bool>,

        /// HTTP server port for health/control endpoints.
        #[arg(short, long)]
        port: Option<u16>,

        /// Journal file for trade records and risk snapshots.
        #[arg(long)]
        journal: Option<PathBuf>,
    },

    /// Check configuration validity.
    CheckConfig,

    /// Run one market scan and print what clears the spread threshold.
    Scan,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("polymarket_frontrun=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    metrics::init_metrics();

    match args.command {
        Some(Command::CheckConfig) => cmd_check_config().await,
        Some(Command::Scan) => cmd_scan().await,
        Some(Command::Run { dry_run, port, journal }) => cmd_run(dry_run, port, journal).await,
        None => cmd_run(None, None, None).await,
    }
}

/// Check configuration validity.
async fn cmd_check_config() -> anyhow::Result<()> {
    println!("======================================================================");
    println!("POLYMARKET FRONTRUN BOT - CONFIGURATION CHECK");
    println!("======================================================================");

    print!("Loading configuration... ");
    let config = match Config::load() {
        Ok(c) => {
            println!("OK");
            c
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration load failed"));
        }
    };

    print!("Validating configuration... ");
    match config.validate() {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration validation failed"));
        }
    }

    println!("----------------------------------------------------------------------");
    println!("Configuration Summary:");
    println!("  Bankroll: ${}", config.bankroll);
    println!("  Max Trade: {}% (${} per trade)", config.max_trade_percent, config.max_trade_amount());
    println!("  Daily Loss Limit: {}% (${})", config.max_daily_loss_percent, config.max_daily_loss());
    println!("  Bait Size: {} shares", config.micro_order_size);
    println!("  Spread Threshold: ${}", config.spread_threshold);
    println!("  Counter-Order Threshold: {} shares", config.min_counter_order_size);
    println!("  Reaction Window: {}ms", config.reaction_window_ms);
    println!("  Polling Interval: {}ms", config.polling_interval_ms);
    println!("  Push Feed: {}", if config.use_wss { "Enabled" } else { "Disabled" });
    println!("  Dry Run: {}", config.dry_run);
    println!("======================================================================");
    println!("CONFIGURATION CHECK PASSED");
    println!("======================================================================");

    Ok(())
}

/// One-shot market scan.
async fn cmd_scan() -> anyhow::Result<()> {
    let config = Config::load()?;
    config.validate().map_err(|e| anyhow::anyhow!(e))?;

    println!("======================================================================");
    println!("POLYMARKET FRONTRUN BOT - MARKET SCAN");
    println!("======================================================================");
    println!("Spread threshold: ${}", config.spread_threshold);
    println!();

    let exchange: Arc<dyn ClobExchange> = Arc::new(ClobClient::new(&config));
    let (engine, _, _) = build_engine(exchange, config);

    let mut markets = engine.scan().await;
    markets.sort_by(|a, b| b.spread.cmp(&a.spread));

    if markets.is_empty() {
        println!("No markets clear the threshold right now.");
    } else {
        for market in &markets {
            println!(
                "  {:<50} bid ${:<6} ask ${:<6} spread ${}",
                market.name, market.best_bid, market.best_ask, market.spread
            );
        }
        println!();
        println!("{} profitable markets", markets.len());
    }

    println!("======================================================================");
    Ok(())
}

/// Wire the engine and its collaborators around an exchange.
fn build_engine(
    exchange: Arc<dyn ClobExchange>,
    config: Config,
) -> (Arc<FrontrunEngine>, Arc<RiskManager>, Arc<ConnectionManager>) {
    build_engine_with_risk(exchange, config.clone(), Arc::new(RiskManager::new(&config)))
}

fn build_engine_with_risk(
    exchange: Arc<dyn ClobExchange>,
    config: Config,
    risk: Arc<RiskManager>,
) -> (Arc<FrontrunEngine>, Arc<RiskManager>, Arc<ConnectionManager>) {
    let bus = EventBus::default();
    let cache = Arc::new(MarketCache::new(config.market_cache_capacity));
    let executor = Arc::new(OrderExecutor::new(
        exchange.clone(),
        risk.clone(),
        bus.clone(),
        ExecutorConfig::from_config(&config),
    ));
    let feed = Arc::new(ConnectionManager::new(
        FeedConfig::from_config(&config),
        exchange.clone(),
    ));

    let engine = Arc::new(FrontrunEngine::new(
        exchange,
        cache,
        risk.clone(),
        executor,
        feed.clone(),
        bus,
        config,
    ));

    (engine, risk, feed)
}

/// Run the trading loop.
async fn cmd_run(
    dry_run_override: Option<bool>,
    port_override: Option<u16>,
    journal: Option<PathBuf>,
) -> anyhow::Result<()> {
    info!("Loading configuration...");
    let mut config = Config::load().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    if let Some(dry_run) = dry_run_override {
        config.dry_run = dry_run;
    }
    let port = port_override.unwrap_or(config.port);

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(anyhow::anyhow!("Configuration validation failed: {}", e));
    }

    info!("Mode: {}", if config.dry_run { "SIMULATION" } else { "LIVE TRADING" });
    info!("Bankroll: ${} (max ${} per trade)", config.bankroll, config.max_trade_amount());
    info!("Spread threshold: ${}", config.spread_threshold);
    info!(
        "Feed: {}",
        if config.use_wss { "push with poll fallback" } else { "poll only" }
    );

    // Prometheus exporter; the /metrics route renders this handle.
    let prometheus = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Metrics exporter unavailable");
            None
        }
    };

    // Restore daily risk counters from the journal when one is present.
    let risk = match journal.as_deref().and_then(load_risk_seed) {
        Some(seed) => {
            info!(day = %seed.day, daily_pnl = %seed.daily_pnl, "Seeding risk state from journal");
            Arc::new(RiskManager::with_seed(&config, &seed))
        }
        None => Arc::new(RiskManager::new(&config)),
    };

    let exchange: Arc<dyn ClobExchange> = Arc::new(ClobClient::new(&config));
    let (engine, risk, feed) = build_engine_with_risk(exchange, config.clone(), risk);
    let bus = engine.bus().clone();

    // Persistence collaborator.
    if let Some(path) = journal {
        let sink = Arc::new(JsonlSink::new(path));
        spawn_recorder(&bus, risk.clone(), sink, Duration::from_secs(60));
    }

    // Mirror connection transitions onto the event bus for observers.
    {
        let bus = bus.clone();
        let mut state_rx = feed.state();
        tokio::spawn(async move {
            loop {
                bus.publish(BotEvent::Connection(*state_rx.borrow_and_update()));
                if state_rx.changed().await.is_err() {
                    return;
                }
            }
        });
    }

    // Control channel and HTTP surface.
    let (control_tx, control_rx) = tokio::sync::mpsc::channel(16);
    let app_state = AppState::new(
        risk.clone(),
        engine.clone(),
        feed.state(),
        control_tx.clone(),
        prometheus,
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);

    let router = create_router(app_state.clone());
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!(error = %e, "HTTP server failed");
        }
    });

    // Feed into cache into delta stream.
    let updates = feed.clone().spawn(1024);
    tokio::spawn(engine.clone().run_ingest(updates));

    app_state.set_ready(true);

    info!("========================================");
    info!("FRONTRUN BOT STARTED");
    info!("========================================");

    let engine_task = tokio::spawn(engine.clone().run(control_rx));

    shutdown_signal().await;

    info!("Shutting down...");
    let _ = control_tx.send(ControlSignal::Stop).await;
    let _ = tokio::time::timeout(Duration::from_secs(10), engine_task).await;

    let stats = engine.stats();
    info!("========================================");
    info!("FINAL SUMMARY");
    info!("========================================");
    info!("Cycles run: {}", stats.cycles);
    info!("Baits placed: {}", stats.baits_placed);
    info!("Counter-orders detected: {}", stats.counters_detected);
    info!("Frontruns attempted: {}", stats.frontruns_attempted);
    info!("Frontruns filled: {}", stats.frontruns_filled);

    let snapshot = risk.snapshot();
    info!("Daily PnL: ${}", snapshot.daily_pnl);
    info!("Bankroll: ${}", snapshot.bankroll);
    info!("========================================");

    Ok(())
}
