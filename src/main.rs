//! Market Maker Engine - Main Entry Point

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use market_maker_engine::config::BotConfig;
use market_maker_engine::exchange::{ExchangeRegistry, LedgerVenue};
use market_maker_engine::filter::{
    make_market_id, DailyVolumeStore, SubmitFilter, VolumeFilter, VolumeFilterConfig,
};
use market_maker_engine::model::{Asset, OrderAction};
use market_maker_engine::persistence::TradeStore;
use market_maker_engine::strategy::{StrategyContext, StrategyRegistry};
use market_maker_engine::trader::{FillTracker, Trader};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Market Maker Engine CLI
#[derive(Parser)]
#[command(name = "market-maker-engine")]
#[command(version, about = "Liability-aware market making on a native-ledger venue")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the trading bot
    Trade {
        /// Path to the bot config file
        #[arg(short = 'c', long, default_value = "config/bot.toml")]
        bot_conf: String,

        /// Strategy key, see `strategies`
        #[arg(short, long)]
        strategy: String,

        /// Path to the strategy config file
        #[arg(long)]
        strat_conf: Option<String>,

        /// Run against the in-memory ledger seeded with `sim_balances`
        #[arg(long)]
        sim: bool,
    },

    /// List available strategies
    Strategies,

    /// List available backing exchanges
    Exchanges,

    /// Show the daily volume recorded for one or more markets
    Volume {
        /// Path to SQLite database
        #[arg(short, long, default_value = "data/trades.db")]
        db: String,

        /// Market ids, comma separated
        #[arg(short, long, value_delimiter = ',', required = true)]
        market_ids: Vec<String>,

        /// UTC date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<String>,
    },

    /// Print the market id used to key recorded fills
    MarketId {
        #[arg(long, default_value = "sdex")]
        venue: String,
        #[arg(long)]
        base: String,
        #[arg(long)]
        quote: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Trade {
            bot_conf,
            strategy,
            strat_conf,
            sim,
        }) => {
            init_logging()?;
            run_trade(&bot_conf, &strategy, strat_conf, sim).await
        }
        Some(Commands::Strategies) => {
            list_strategies();
            Ok(())
        }
        Some(Commands::Exchanges) => {
            list_exchanges();
            Ok(())
        }
        Some(Commands::Volume {
            db,
            market_ids,
            date,
        }) => show_volume(&db, &market_ids, date.as_deref()),
        Some(Commands::MarketId { venue, base, quote }) => {
            println!("{}", make_market_id(&venue, &base, &quote));
            Ok(())
        }
        None => {
            println!("No command given, try --help");
            Ok(())
        }
    }
}

async fn run_trade(
    bot_conf: &str,
    strategy_key: &str,
    strat_conf: Option<String>,
    sim: bool,
) -> Result<()> {
    info!("╔════════════════════════════════════════════════════════════╗");
    info!(
        "║          Market Maker Engine v{}                       ║",
        env!("CARGO_PKG_VERSION")
    );
    info!("╚════════════════════════════════════════════════════════════╝");

    let config = BotConfig::load(bot_conf)?;
    config.validate()?;
    log_config(&config);

    if !sim {
        bail!("only the simulated ledger venue is available, pass --sim");
    }

    let pair = config.pair();
    let balances: HashMap<Asset, _> = config
        .sim_balances
        .iter()
        .map(|(code, amount)| (Asset::new(code.as_str()), *amount))
        .collect();
    let ledger = Arc::new(LedgerVenue::new(
        config.primary_constraints(),
        balances,
        config.venue.new_offer_fee_buffer,
    ));
    info!("🧪 Running against the simulated ledger");

    if let Some(parent) = Path::new(&config.db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }
    }
    let store = Arc::new(TradeStore::new(&config.db_path)?);

    let mut filters: Vec<Arc<dyn SubmitFilter>> = Vec::new();
    if !config.filters.is_empty() {
        let filter_config = VolumeFilterConfig::parse_all(&config.filters)?;
        let filter = VolumeFilter::new(
            &config.venue.name,
            pair.clone(),
            filter_config,
            config.primary_constraints(),
            store.clone(),
        )?;
        filters.push(Arc::new(filter));
    }

    let exchanges = ExchangeRegistry::with_defaults();
    let strategies = StrategyRegistry::with_defaults();
    let ctx = StrategyContext {
        pair: pair.clone(),
        builder: ledger.clone(),
        venue_name: config.venue.name.clone(),
        config_path: strat_conf,
        exchanges: &exchanges,
        ccxt_base_url: config.ccxt_rest_url.clone(),
        volume_store: store.clone(),
    };
    let strategy = match strategies.make(strategy_key, &ctx) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "❌ Could not build strategy, deleting all offers");
            let cleanup = Trader::new(
                pair.clone(),
                ledger.clone(),
                strategies.make("delete", &ctx)?,
                Vec::new(),
                config.reserve_asset(),
                config.venue.operational_buffer,
                Duration::from_secs(config.tick_interval_seconds),
            );
            if let Err(delete_err) = cleanup.delete_all_offers().await {
                error!(error = %delete_err, "Could not delete offers");
            }
            return Err(e);
        }
    };

    let mut trader = Trader::new(
        pair.clone(),
        ledger.clone(),
        strategy,
        filters,
        config.reserve_asset(),
        config.venue.operational_buffer,
        Duration::from_secs(config.tick_interval_seconds),
    );

    // Shutdown signal
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Shutdown signal received");
        shutdown_clone.store(true, Ordering::SeqCst);
    });

    if config.fill_tracker_sleep_millis > 0 {
        let market_id = make_market_id(&config.venue.name, pair.base.code(), pair.quote.code());
        let mut fill_tracker = FillTracker::new(
            pair.clone(),
            ledger.clone(),
            store.clone(),
            market_id,
            Duration::from_millis(config.fill_tracker_sleep_millis),
        );
        fill_tracker.register_handlers(trader.strategy().fill_handlers());
        tokio::spawn(fill_tracker.run(shutdown.clone()));
    } else {
        let handlers = trader.strategy().fill_handlers().len();
        if handlers > 0 {
            warn!(handlers, "Fill tracking disabled, fill handlers will never run");
        }
    }

    trader.run(shutdown).await;

    if config.delete_offers_on_shutdown {
        match trader.delete_all_offers().await {
            Ok(stats) => info!(ops = stats.ops, "Deleted offers on shutdown"),
            Err(e) => error!(error = %e, "Could not delete offers on shutdown"),
        }
    }

    info!(recorded_fills = store.trade_count()?, "👋 Market maker stopped");
    Ok(())
}

fn list_strategies() {
    println!("Strategies:");
    for (key, entry) in StrategyRegistry::with_defaults().list() {
        println!(
            "  {:<12} {:<13} {}{}",
            key,
            entry.complexity,
            entry.description,
            if entry.needs_config { " (needs --strat-conf)" } else { "" }
        );
    }
}

fn list_exchanges() {
    println!("Exchanges:");
    for (key, entry) in ExchangeRegistry::with_defaults().list() {
        let trading = if entry.trade_enabled { "trading" } else { "prices only" };
        println!("  {:<16} {:<12} {}", key, trading, entry.description);
    }
}

/// Print sell and buy volume recorded on one UTC day.
fn show_volume(db_path: &str, market_ids: &[String], date: Option<&str>) -> Result<()> {
    if !Path::new(db_path).exists() {
        println!("❌ Database not found: {}", db_path);
        return Ok(());
    }

    let date = match date {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", raw))?,
        None => Utc::now().date_naive(),
    };
    let store = TradeStore::new(db_path)?;

    println!("Daily volume on {} for {}", date, market_ids.join(", "));
    for action in [OrderAction::Sell, OrderAction::Buy] {
        let volume = store.daily_volume(market_ids, action, date)?;
        println!(
            "  {:<5} base: {:>20}  quote: {:>20}",
            action.to_string(),
            volume.base_vol,
            volume.quote_vol
        );
    }
    Ok(())
}

/// Initialize logging with tracing-subscriber.
fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::hourly("logs", "market-maker.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

    // Leak the guard to keep it alive for the program duration
    Box::leak(Box::new(_guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("market_maker_engine=debug".parse()?)
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

/// Log configuration on startup.
fn log_config(config: &BotConfig) {
    info!("📋 Configuration:");
    info!("   Market: {}/{}", config.asset_base, config.asset_quote);
    info!("   Venue: {}", config.venue.name);
    info!("   Tick interval: {}s", config.tick_interval_seconds);
    info!(
        "   Fill tracking: {}",
        if config.fill_tracker_sleep_millis > 0 {
            format!("every {}ms", config.fill_tracker_sleep_millis)
        } else {
            "disabled".to_string()
        }
    );
    info!("   Filters: {:?}", config.filters);
    info!("   Delete offers on shutdown: {}", config.delete_offers_on_shutdown);
}
