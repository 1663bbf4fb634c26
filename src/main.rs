//! Funding Carry - Main Entry Point
//!
//! Runs the delta-neutral carry loop against Hyperliquid, or against an
//! in-process paper exchange unless live trading is explicitly enabled.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use funding_carry::config::{Config, SelectionMode};
use funding_carry::exchange::{ExchangeClient, HyperliquidClient, MarketDataSource, PaperExchange};
use funding_carry::market::{aggregate_funding_stats, next_strategy_boundary, MarketDataCache};
use funding_carry::notify::{LogNotifier, Notifier, TelegramNotifier};
use funding_carry::strategy::{
    Candidate, CycleKind, CycleOutcome, RebalanceScheduler, SchedulerSettings, StrategySelector,
};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Funding Carry CLI
#[derive(Parser)]
#[command(name = "funding-carry")]
#[command(version, about = "Funding-rate carry with delta-neutral rebalancing on Hyperliquid")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Establish the hedge, then rebalance on the configured interval
    Run {
        #[command(flatten)]
        trading: TradingArgs,
    },

    /// Fetch market data once and print the ranked candidates
    Scan,

    /// Run a single rebalance cycle and exit
    Once {
        #[command(flatten)]
        trading: TradingArgs,
    },
}

#[derive(clap::Args, Debug, Clone)]
struct TradingArgs {
    /// Force paper trading even when LIVE_TRADING=true
    #[arg(long)]
    paper: bool,

    /// Starting quote balance of the paper account
    #[arg(long, default_value = "10000")]
    paper_balance: Decimal,
}

impl Default for TradingArgs {
    fn default() -> Self {
        Self {
            paper: false,
            paper_balance: Decimal::from(10_000),
        }
    }
}

/// Trading mode: Live (real money) or Paper (in-process simulation).
#[derive(Debug, Clone, Copy, PartialEq)]
enum TradingMode {
    Live,
    Paper,
}

impl TradingMode {
    fn resolve(args: &TradingArgs) -> Self {
        let live_requested = std::env::var("LIVE_TRADING").unwrap_or_default() == "true";
        if live_requested && !args.paper {
            warn!("⚠️  LIVE TRADING MODE - Real money at risk!");
            TradingMode::Live
        } else {
            info!("📝 PAPER TRADING MODE - Simulated orders only");
            TradingMode::Paper
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;

    info!("╔════════════════════════════════════════════════════════════╗");
    info!(
        "║             Funding Carry v{}                            ║",
        env!("CARGO_PKG_VERSION")
    );
    info!("╚════════════════════════════════════════════════════════════╝");

    let config = Config::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    log_config(&config);

    match cli.command.unwrap_or(Commands::Run {
        trading: TradingArgs::default(),
    }) {
        Commands::Run { trading } => run_loop(&config, &trading).await,
        Commands::Scan => run_scan(&config).await,
        Commands::Once { trading } => run_once(&config, &trading).await,
    }
}

/// Initialize logging to stdout and an hourly rolling file.
fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::hourly("logs", "funding-carry.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Keep the writer alive for the program duration
    Box::leak(Box::new(guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("funding_carry=debug".parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .init();

    Ok(())
}

fn log_config(config: &Config) {
    let strategy = &config.strategy;
    info!("📋 Configuration:");
    info!("   Exchange: {}", config.exchange.base_url);
    info!("   Symbol: {}", strategy.normalized_symbol());
    info!("   Leverage: {}x", strategy.leverage);
    if strategy.quote_to_deploy > Decimal::ZERO {
        info!("   Quote to deploy: ${}", strategy.quote_to_deploy);
    } else {
        info!("   Quote to deploy: full balance");
    }
    info!("   Rebalance interval: {:?}", strategy.rebalance_interval());
    info!("   Selection mode: {:?}", strategy.selection_mode);
    info!("   Allowed bases: {}", strategy.allowed_bases.join(", "));
    info!("   Min score: {:.2}", strategy.min_score);
    info!("   Market cache TTL: {:?}", config.market_data.cache_ttl());
    info!(
        "   Telegram: {}",
        if config.telegram.is_configured() { "enabled" } else { "log only" }
    );
}

fn build_selector(config: &Config) -> StrategySelector {
    StrategySelector::new(&config.strategy.allowed_bases).with_min_score(config.strategy.min_score)
}

fn build_notifier(config: &Config) -> Result<Arc<dyn Notifier>> {
    if config.telegram.is_configured() {
        Ok(Arc::new(TelegramNotifier::new(&config.telegram)?))
    } else {
        warn!("Telegram not configured, notifications go to the log");
        Ok(Arc::new(LogNotifier))
    }
}

fn build_market(config: &Config, source: Arc<dyn MarketDataSource>) -> Arc<MarketDataCache> {
    Arc::new(MarketDataCache::new(source, config.market_data.cache_ttl()))
}

fn build_scheduler(config: &Config, args: &TradingArgs) -> Result<RebalanceScheduler> {
    let (exchange, market): (Arc<dyn ExchangeClient>, Arc<MarketDataCache>) =
        match TradingMode::resolve(args) {
            TradingMode::Live => {
                let client = Arc::new(
                    HyperliquidClient::new(&config.exchange)
                        .context("Failed to create Hyperliquid client")?,
                );
                let market = build_market(config, client.clone());
                (client as Arc<dyn ExchangeClient>, market)
            }
            TradingMode::Paper => {
                let source = Arc::new(
                    HyperliquidClient::public(Some(config.exchange.base_url.as_str()))
                        .context("Failed to create market data client")?,
                );
                let market = build_market(config, source);
                let paper = PaperExchange::new(args.paper_balance).with_market_data(market.clone());
                info!("   Paper balance: ${}", args.paper_balance);
                (Arc::new(paper) as Arc<dyn ExchangeClient>, market)
            }
        };

    Ok(RebalanceScheduler::new(
        exchange,
        market,
        build_notifier(config)?,
        build_selector(config),
        SchedulerSettings::from_config(&config.strategy)
            .with_request_timeout(config.exchange.request_timeout()),
    ))
}

async fn run_loop(config: &Config, args: &TradingArgs) -> Result<()> {
    let scheduler = build_scheduler(config, args)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("🛑 Ctrl-C received, finishing current cycle"),
            Err(e) => error!(error = %e, "Failed to listen for Ctrl-C"),
        }
        let _ = shutdown_tx.send(true);
    });

    scheduler.run(shutdown_rx).await?;

    let stats = scheduler.stats();
    info!(
        completed = stats.completed,
        failed = stats.failed,
        skipped = stats.skipped,
        partial_hedges = stats.partial_hedges,
        "👋 Shutdown complete"
    );
    Ok(())
}

async fn run_once(config: &Config, args: &TradingArgs) -> Result<()> {
    let scheduler = build_scheduler(config, args)?;

    match scheduler.run_cycle(CycleKind::Initial).await? {
        CycleOutcome::Completed(report) => {
            info!(
                symbol = %report.symbol,
                evaluated_for = %report.evaluated_for,
                action = ?report.action,
                "✅ Cycle complete"
            );
        }
        CycleOutcome::SkippedBusy => warn!("Cycle skipped"),
    }
    Ok(())
}

async fn run_scan(config: &Config) -> Result<()> {
    let source = Arc::new(
        HyperliquidClient::public(Some(config.exchange.base_url.as_str()))
            .context("Failed to create market data client")?,
    );
    let market = build_market(config, source);
    let selector = build_selector(config);

    let view = market.snapshots().await;
    if !view.origin.is_live() {
        warn!(origin = ?view.origin, "Market data is not live");
    }

    let stats = aggregate_funding_stats(&view.rows);
    info!(
        "📊 {} instruments | total OI ${:.0} | avg funding {} | avg APY {}",
        stats.count,
        stats.total_open_interest,
        stats
            .avg_funding
            .map(|f| format!("{:.6}%", f * 100.0))
            .unwrap_or_else(|| "n/a".to_string()),
        stats
            .avg_apy
            .map(|a| format!("{:.2}%", a))
            .unwrap_or_else(|| "n/a".to_string()),
    );

    let ranked = selector.rank(view.rows.iter().cloned().map(Candidate::new).collect());
    info!("🔍 {} eligible candidates", ranked.len());
    for (i, candidate) in ranked.iter().enumerate() {
        info!(
            "   {:>2}. {:<10} APY {:>8.2}% | score {:>5.2} | funding {:.6}%",
            i + 1,
            candidate.snapshot.pair,
            candidate.apy,
            candidate.score,
            candidate.snapshot.funding_rate * 100.0
        );
    }

    match selector.select(&view.rows) {
        Some(strategy) => {
            info!(
                "🎯 Selected {} | {} | APY {:.2}% | score {:.2} | {}x",
                strategy.pair, strategy.direction, strategy.apy, strategy.score, strategy.leverage
            );
            if config.strategy.selection_mode == SelectionMode::Fixed {
                info!(
                    "   Fixed mode hedges {} regardless of selection",
                    config.strategy.normalized_symbol()
                );
            }
        }
        None => warn!("No eligible strategy"),
    }

    info!("⏰ Next strategy update at {}", next_strategy_boundary(Utc::now()));
    Ok(())
}
