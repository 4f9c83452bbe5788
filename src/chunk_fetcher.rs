// src/chunk_fetcher.rs

use log::{debug, error, warn};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tokio_retry::strategy::FixedInterval;
use tokio_retry::RetryIf;

use crate::error::RpcError;
use crate::metrics;
use crate::rpc_pool::Endpoint;
use crate::settings::Fetch;
use crate::types::{Chunk, LogRecord};

/// Retry budget and back-off for one chunk.
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    /// Attempts per endpoint, counting the first one
    pub max_attempts_per_endpoint: u32,
    pub rate_limit_backoff: Duration,
}

impl FetchPolicy {
    pub fn from_settings(fetch: &Fetch) -> Self {
        Self {
            max_attempts_per_endpoint: fetch.max_attempts_per_endpoint.max(1),
            rate_limit_backoff: Duration::from_secs(fetch.rate_limit_backoff_seconds),
        }
    }
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self::from_settings(&Fetch::default())
    }
}

/// What happened to one chunk. `succeeded == false` means every endpoint was
/// exhausted and `logs` is empty.
#[derive(Debug, Clone)]
pub struct ChunkReport {
    pub index: usize,
    pub from: u64,
    pub to: u64,
    pub logs: Vec<LogRecord>,
    pub succeeded: bool,
    pub backoffs: u32,
    pub failovers: u32,
}

impl ChunkReport {
    pub(crate) fn failed(index: usize, from: u64, to: u64) -> Self {
        Self {
            index,
            from,
            to,
            logs: Vec::new(),
            succeeded: false,
            backoffs: 0,
            failovers: 0,
        }
    }
}

/// Fetches `event` logs for one chunk, walking its endpoint order.
///
/// Rate-limit errors are retried on the same endpoint after a fixed back-off
/// until the per-endpoint budget runs out. Any other error abandons the
/// endpoint at once. Never fails: an exhausted chunk comes back with
/// `succeeded == false`.
pub async fn fetch_chunk(chunk: &Chunk, event: &str, policy: &FetchPolicy) -> ChunkReport {
    let started = Instant::now();
    let mut report = ChunkReport::failed(chunk.index, chunk.from, chunk.to);

    for (position, endpoint) in chunk.endpoints.iter().enumerate() {
        if position > 0 {
            report.failovers += 1;
            metrics::increment_chunk_failover(&endpoint.host());
        }

        let (result, attempts) = fetch_from_endpoint(endpoint, chunk, event, policy).await;
        report.backoffs += attempts.saturating_sub(1);

        match result {
            Ok(logs) => {
                debug!(
                    "[ChunkFetcher] {} blocks {}-{}: {} logs from {}",
                    event,
                    chunk.from,
                    chunk.to,
                    logs.len(),
                    endpoint.url
                );
                report.logs = logs;
                report.succeeded = true;
                metrics::record_chunk_fetch(event, started.elapsed());
                return report;
            }
            Err(e) => {
                warn!(
                    "⚠️ [ChunkFetcher] {} blocks {}-{} failed on {}: {}. Trying next RPC.",
                    event, chunk.from, chunk.to, endpoint.url, e
                );
            }
        }
    }

    error!(
        "❌ [ChunkFetcher] Failed to fetch {} logs for blocks {}-{} after trying all RPCs.",
        event, chunk.from, chunk.to
    );
    metrics::increment_chunk_exhausted(event);
    report
}

/// Returns the final outcome on this endpoint and how many calls it took.
async fn fetch_from_endpoint(
    endpoint: &Endpoint,
    chunk: &Chunk,
    event: &str,
    policy: &FetchPolicy,
) -> (Result<Vec<LogRecord>, RpcError>, u32) {
    let max_attempts = policy.max_attempts_per_endpoint.max(1);
    let strategy = FixedInterval::new(policy.rate_limit_backoff).take(max_attempts as usize - 1);
    let attempts = AtomicU32::new(0);

    let result = RetryIf::spawn(
        strategy,
        || {
            let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
            async move {
                let result = endpoint.client.event_logs(event, chunk.from, chunk.to).await;
                if let Err(RpcError::RateLimited(_)) = &result {
                    if attempt < max_attempts {
                        warn!(
                            "⚠️ [ChunkFetcher] Rate limit on {} for {} (blocks {}-{}). Retrying in {:?} (attempt {}/{} on this RPC).",
                            endpoint.url,
                            event,
                            chunk.from,
                            chunk.to,
                            policy.rate_limit_backoff,
                            attempt,
                            max_attempts
                        );
                        metrics::increment_chunk_backoff(&endpoint.host());
                    }
                }
                result
            }
        },
        RpcError::is_rate_limited,
    )
    .await;

    (result, attempts.into_inner())
}
