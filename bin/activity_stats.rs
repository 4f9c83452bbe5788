//! # Activity Stats CLI
//!
//! Prints per-address Memebase activity (Hearted, Collected, Summoned,
//! Unleashed, Purged) over the last few days.
//!
//! ## Usage
//!
//! ```bash
//! RPC_URLS=https://mainnet.base.org,https://base.llamarpc.com \
//!   cargo run --bin activity_stats -- \
//!   --address 0x39FCE6a33596b7319d7941F3F90d256574bcc954 --events 1,3 --days 7
//! ```

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use memebase_stats_sdk::types::conversions::{checksum, to_human_units, to_usd};
use memebase_stats_sdk::{AddressEventStats, Settings, StatsEngine, StatsResult};
use std::path::PathBuf;

/// Memebase activity statistics per address
#[derive(Parser)]
#[command(name = "activity_stats")]
#[command(about = "Count and sum Memebase events per address over a recent block window", long_about = None)]
#[command(version)]
struct Cli {
    /// Address to investigate (repeat or comma-separate for several)
    #[arg(short, long = "address", value_delimiter = ',', required = true)]
    addresses: Vec<String>,

    /// Event keys or names, or "all"
    #[arg(short, long, value_delimiter = ',', default_value = "all")]
    events: Vec<String>,

    /// RPC URL to use instead of the configured ones (repeatable)
    #[arg(long = "rpc-url", value_name = "URL")]
    rpc_urls: Vec<String>,

    /// Days of history to scan (1-7)
    #[arg(short, long, default_value_t = 7, allow_negative_numbers = true)]
    days: i64,

    /// Config file (defaults to ./Config.toml when present)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Serve Prometheus metrics on this address while running
    #[cfg(feature = "observability")]
    #[arg(long, value_name = "ADDR")]
    metrics_addr: Option<std::net::SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    env_logger::init();

    let cli = Cli::parse();

    #[cfg(feature = "observability")]
    if let Some(addr) = cli.metrics_addr {
        memebase_stats_sdk::metrics::install_prometheus_exporter(addr)?;
    }

    let settings = match &cli.config {
        Some(path) => Settings::from_path(path)?,
        None => Settings::new()?,
    };
    let native_decimals = settings.chain.native_decimals;
    let engine = StatsEngine::from_settings(settings)?;

    println!("{}", "🔎 Memebase activity stats".bold());
    println!("═══════════════════════════════════════════════════════════════════\n");

    let result = engine
        .compute_stats(&cli.addresses, &cli.events, &cli.rpc_urls, cli.days)
        .await?;

    print_result(&result, native_decimals);
    Ok(())
}

fn print_result(result: &StatsResult, decimals: u32) {
    if let Some(window) = &result.window {
        println!(
            "Blocks {} to {} ({} blocks)",
            window.from,
            window.to,
            window.block_count()
        );
    }
    match result.usd_rate {
        Some(rate) => println!("ETH/USD: {}", format!("${:.2}", rate).green()),
        None => println!("ETH/USD: {}", "N/A".yellow()),
    }

    for (address, events) in &result.stats {
        println!("\n{}", checksum(address).cyan().bold());
        if events.is_empty() {
            println!("  {}", "no events selected".dimmed());
        }
        for (event, stats) in events {
            println!("  {:<10} {}", event, format_stats(stats, decimals, result.usd_rate));
        }
    }

    if !result.warnings.is_empty() {
        println!("\n{}", "Warnings".yellow().bold());
        for warning in &result.warnings {
            println!("  ⚠️  {}", warning);
        }
    }
}

fn format_stats(stats: &AddressEventStats, decimals: u32, usd_rate: Option<f64>) -> String {
    let mut parts = vec![format!("count={}", stats.count)];

    if !stats.native_total.is_zero() || stats.token_totals.is_empty() {
        let native = to_human_units(stats.native_total, decimals)
            .map(|d| d.to_string())
            .unwrap_or_else(|_| stats.native_total.to_string());
        let usd = usd_rate
            .and_then(|rate| to_usd(stats.native_total, decimals, rate).ok())
            .map(|v| format!("${}", v))
            .unwrap_or_else(|| "N/A".to_string());
        parts.push(format!("total={} ETH ({})", native, usd));
    }

    for (token, amount) in &stats.token_totals {
        let human = to_human_units(*amount, decimals)
            .map(|d| d.to_string())
            .unwrap_or_else(|_| amount.to_string());
        parts.push(format!("{}={}", checksum(token), human));
    }

    let line = parts.join("  ");
    if stats.count == 0 {
        line.dimmed().to_string()
    } else {
        line
    }
}
