//! quotefeed: stream live quotes for one symbol
//!
//! Prints each quote as a JSON line on stdout. Logs go to stderr.

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quotefeed_lib::{
    normalize_symbol, run_server, QuoteStreamClient, QuoteUpdate, ServerState, StockSnapshot,
    StreamConfig,
};

#[derive(Parser, Debug)]
#[command(name = "quotefeed")]
#[command(about = "Auto-reconnecting real-time quote stream")]
struct Args {
    /// Ticker symbol to stream
    #[arg(short, long, env = "QUOTEFEED_SYMBOL")]
    symbol: String,

    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP(S) base address of the market-data API
    #[arg(long)]
    api_base: Option<String>,

    /// Requested update interval in milliseconds
    #[arg(long)]
    interval_ms: Option<u32>,

    /// Consecutive connection failures tolerated before giving up
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Previous close, to print change figures with each quote
    #[arg(long)]
    previous_close: Option<f64>,

    /// Health server bind address (disabled when unset)
    #[arg(long)]
    health_addr: Option<SocketAddr>,
}

/// Defaults, then the YAML file, then the environment, then flags
fn build_config(args: &Args) -> anyhow::Result<StreamConfig> {
    let config = match &args.config {
        Some(path) => StreamConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => StreamConfig::default(),
    };
    let mut config = config.with_env()?;

    if let Some(base) = &args.api_base {
        config.api_base_url = base.clone();
    }
    if let Some(interval) = args.interval_ms {
        config.subscribe_interval_ms = interval;
    }
    if let Some(attempts) = args.max_attempts {
        config.reconnect.max_attempts = attempts;
    }

    config.validate()?;
    Ok(config)
}

fn initial_snapshot(symbol: &str, previous_close: f64) -> StockSnapshot {
    StockSnapshot {
        symbol: symbol.to_string(),
        price: previous_close,
        previous_close,
        change: 0.0,
        change_percent: 0.0,
        day_low: previous_close,
        day_high: previous_close,
        updated_at: 0,
    }
}

fn render(quote: &QuoteUpdate, snapshot: Option<&mut StockSnapshot>) -> serde_json::Result<String> {
    match snapshot {
        Some(snapshot) => {
            if snapshot.apply_quote(quote) {
                serde_json::to_string(snapshot)
            } else {
                serde_json::to_string(quote)
            }
        }
        None => serde_json::to_string(quote),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let symbol = normalize_symbol(&args.symbol)?;
    let config = build_config(&args)?;

    info!(
        symbol = %symbol,
        api_base_url = %config.api_base_url,
        interval_ms = config.subscribe_interval_ms,
        max_attempts = config.reconnect.max_attempts,
        "Starting quotefeed"
    );

    let client = QuoteStreamClient::new(config)?;

    if let Some(addr) = args.health_addr {
        let state = ServerState::new(symbol.clone(), client.connection_status());
        tokio::spawn(async move {
            info!(addr = %addr, "Starting health server");
            if let Err(e) = run_server(addr, state).await {
                error!(error = %e, "Health server failed");
            }
        });
    }

    let stream = client.stream(&symbol)?;
    let mut quotes = stream.subscribe();
    let mut status = client.connection_status();
    let mut snapshot = args.previous_close.map(|pc| initial_snapshot(&symbol, pc));

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Received shutdown signal");
                client.disconnect();
                return Ok(());
            }
            changed = status.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let current = *status.borrow_and_update();
                info!(symbol = %symbol, status = %current, "Connection status changed");
            }
            item = quotes.recv() => match item {
                Some(Ok(quote)) => println!("{}", render(&quote, snapshot.as_mut())?),
                Some(Err(e)) => {
                    error!(symbol = %symbol, error = %e, "Quote stream failed");
                    return Err(e.into());
                }
                None => return Ok(()),
            },
        }
    }
}
