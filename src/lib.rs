//! # Memebase Stats SDK
//!
//! Per-address activity statistics for the Memebase contract on Base, built
//! on a resilient chunked `eth_getLogs` engine.
//!
//! ## Overview
//!
//! A stats request walks a fixed pipeline:
//!
//! - **Health probe**: every candidate RPC endpoint gets one `eth_blockNumber`
//!   call; only responders are used for the rest of the request.
//! - **Chunk planning**: the block window is cut into spans the providers
//!   accept, each with its own rotated endpoint order.
//! - **Fetching**: chunks run concurrently (one slot per healthy endpoint),
//!   retrying rate limits on the same endpoint and failing over on anything
//!   else. A chunk that fails everywhere is reported, never fatal.
//! - **Attribution**: logs are folded into per-address counts and totals,
//!   either from an actor argument or, for events without one, from the
//!   sender of the emitting transaction.
//!
//! ## Example
//!
//! ```no_run
//! use memebase_stats_sdk::{Settings, StatsEngine};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let engine = StatsEngine::from_settings(Settings::new()?)?;
//! let result = engine
//!     .compute_stats(
//!         &["0x39FCE6a33596b7319d7941F3F90d256574bcc954".to_string()],
//!         &["all".to_string()],
//!         &[],
//!         7,
//!     )
//!     .await?;
//! for warning in &result.warnings {
//!     println!("{}", warning);
//! }
//! # Ok(())
//! # }
//! ```

// Core Types
/// Data model shared by every stage
pub mod types;
/// Error taxonomy
pub mod error;
/// Configuration loading
pub mod settings;
/// Event catalog for the tracked contract
pub mod contracts;

// Upstream access
/// `ChainClient` seam and the ethers-backed implementation
pub mod rpc_pool;
/// Currency rate lookup
pub mod currency_rate;

// Fetch pipeline
/// Pre-request endpoint liveness probe
pub mod endpoint_health;
/// Block range partitioning
pub mod chunk_planner;
/// Single-chunk fetch with retry and failover
pub mod chunk_fetcher;
/// Concurrent fetch of all chunks of an event
pub mod fetch_orchestrator;

// Attribution
/// Transaction sender lookups
pub mod sender_index;
/// Per-address folds
pub mod aggregator;

/// Public entry point
pub mod stats;

// Observability
pub mod metrics;

#[cfg(test)]
mod test_support;

pub use contracts::EventCatalog;
pub use error::{RpcError, StatsError};
pub use rpc_pool::{ChainClient, Endpoint, EndpointConnector, EthersConnector};
pub use settings::Settings;
pub use stats::StatsEngine;
pub use types::{AddressEventStats, ArgValue, BlockWindow, EventSpec, LogRecord, StatsResult};
