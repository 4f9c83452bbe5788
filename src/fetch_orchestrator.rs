// src/fetch_orchestrator.rs

use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{timeout_at, Instant};

use crate::chunk_fetcher::{fetch_chunk, ChunkReport, FetchPolicy};
use crate::types::{BlockWindow, Chunk, LogRecord};

/// Time limits applied to every chunk task.
#[derive(Debug, Clone, Copy)]
pub struct FetchLimits {
    pub chunk_timeout: Duration,
    /// Absolute request deadline; no chunk runs past it
    pub deadline: Instant,
}

/// All logs gathered for one event plus the chunks that yielded nothing.
#[derive(Debug, Clone, Default)]
pub struct EventFetch {
    pub event: String,
    pub logs: Vec<LogRecord>,
    pub chunks_total: usize,
    pub failed_chunks: Vec<BlockWindow>,
    pub backoffs: u32,
    pub failovers: u32,
}

impl EventFetch {
    fn absorb(&mut self, report: ChunkReport) {
        self.backoffs += report.backoffs;
        self.failovers += report.failovers;
        if report.succeeded {
            self.logs.extend(report.logs);
        } else {
            self.failed_chunks.push(BlockWindow {
                from: report.from,
                to: report.to,
            });
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failed_chunks.is_empty()
    }
}

/// Fetches every chunk of one event concurrently, at most `concurrency`
/// at a time, and concatenates the results once all tasks have finished.
///
/// Chunk failures, timeouts, and panicking tasks become entries in
/// `failed_chunks`; they never cancel sibling chunks.
pub async fn fetch_event_logs(
    chunks: Vec<Chunk>,
    event: &str,
    policy: &FetchPolicy,
    concurrency: usize,
    limits: FetchLimits,
) -> EventFetch {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut fetch = EventFetch {
        event: event.to_string(),
        chunks_total: chunks.len(),
        ..Default::default()
    };

    info!(
        "[FetchOrchestrator] Fetching {} in {} chunks ({} concurrent)",
        event,
        chunks.len(),
        concurrency.max(1)
    );

    let mut tasks = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let semaphore = semaphore.clone();
        let event = event.to_string();
        let policy = policy.clone();
        let (index, from, to) = (chunk.index, chunk.from, chunk.to);

        let task = tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return ChunkReport::failed(index, from, to),
            };

            let until = (Instant::now() + limits.chunk_timeout).min(limits.deadline);
            match timeout_at(until, fetch_chunk(&chunk, &event, &policy)).await {
                Ok(report) => report,
                Err(_) => {
                    warn!(
                        "⏱️ [FetchOrchestrator] {} blocks {}-{} did not finish in time",
                        event, from, to
                    );
                    ChunkReport::failed(index, from, to)
                }
            }
        });
        tasks.push((index, from, to, task));
    }

    for (index, from, to, task) in tasks {
        match task.await {
            Ok(report) => fetch.absorb(report),
            Err(e) => {
                error!(
                    "❌ [FetchOrchestrator] Chunk task for {} blocks {}-{} panicked: {}",
                    event, from, to, e
                );
                fetch.absorb(ChunkReport::failed(index, from, to));
            }
        }
    }

    if !fetch.is_complete() {
        warn!(
            "⚠️ [FetchOrchestrator] {}: {}/{} chunks failed",
            event,
            fetch.failed_chunks.len(),
            fetch.chunks_total
        );
    }
    fetch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk_planner::plan_chunks;
    use crate::error::RpcError;
    use crate::rpc_pool::{ChainClient, Endpoint};
    use crate::test_support::{actor_log, addr, endpoint, tx, ScriptedClient};
    use async_trait::async_trait;
    use ethers::types::{Address, H256};

    fn limits() -> FetchLimits {
        FetchLimits {
            chunk_timeout: Duration::from_secs(180),
            deadline: Instant::now() + Duration::from_secs(900),
        }
    }

    struct PanickingClient;

    #[async_trait]
    impl ChainClient for PanickingClient {
        async fn block_number(&self) -> Result<u64, RpcError> {
            Ok(1)
        }
        async fn event_logs(&self, _: &str, _: u64, _: u64) -> Result<Vec<LogRecord>, RpcError> {
            panic!("decoder bug");
        }
        async fn transaction_sender(&self, _: H256) -> Result<Option<Address>, RpcError> {
            Ok(None)
        }
        async fn receipt_logs(&self, _: H256, _: &str) -> Result<Option<Vec<LogRecord>>, RpcError> {
            Ok(None)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_failed_chunk_does_not_abort_siblings() {
        let log = actor_log("Hearted", "hearter", addr(1), 1, tx(1));
        let a = Arc::new(ScriptedClient::ok(vec![log]));
        let b = Arc::new(ScriptedClient::failing(RpcError::Unexpected("bad".into())));
        let endpoints = vec![endpoint("http://a", a.clone())];
        let mut chunks = plan_chunks(0, 1499, 500, &endpoints).unwrap();
        // Both endpoints of the middle chunk fail.
        chunks[1].endpoints = vec![
            endpoint("http://a", Arc::new(ScriptedClient::failing(RpcError::Transport("x".into())))),
            endpoint("http://b", b.clone()),
        ];

        let fetch = fetch_event_logs(chunks, "Hearted", &FetchPolicy::default(), 1, limits()).await;

        assert_eq!(fetch.chunks_total, 3);
        assert_eq!(fetch.logs.len(), 2);
        assert_eq!(fetch.failed_chunks, vec![BlockWindow { from: 500, to: 999 }]);
        assert!(!fetch.is_complete());
        assert_eq!(a.calls(), 2);
        assert_eq!(b.calls(), 1);
    }

    #[tokio::test]
    async fn test_panicking_chunk_is_contained() {
        let good = Arc::new(ScriptedClient::ok(vec![actor_log("Hearted", "hearter", addr(1), 1, tx(1))]));
        let endpoints: Vec<Endpoint> = vec![
            endpoint("http://good", good),
            Endpoint::new("http://panics", Arc::new(PanickingClient)),
        ];
        // Chunk 0 starts on the good endpoint, chunk 1 on the panicking one.
        let chunks = plan_chunks(0, 999, 500, &endpoints).unwrap();

        let fetch = fetch_event_logs(chunks, "Hearted", &FetchPolicy::default(), 2, limits()).await;

        assert_eq!(fetch.logs.len(), 1);
        assert_eq!(fetch.failed_chunks, vec![BlockWindow { from: 500, to: 999 }]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_chunk_times_out() {
        let slow = Arc::new(ScriptedClient::ok(vec![]).delayed(Duration::from_secs(3600)));
        let chunks = plan_chunks(0, 99, 100, &[endpoint("http://slow", slow)]).unwrap();
        let limits = FetchLimits {
            chunk_timeout: Duration::from_secs(5),
            deadline: Instant::now() + Duration::from_secs(900),
        };

        let started = Instant::now();
        let fetch = fetch_event_logs(chunks, "Hearted", &FetchPolicy::default(), 1, limits).await;

        assert_eq!(fetch.failed_chunks.len(), 1);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_bounded() {
        let slow = Arc::new(ScriptedClient::ok(vec![]).delayed(Duration::from_secs(10)));
        let endpoints = vec![endpoint("http://a", slow.clone()), endpoint("http://b", slow.clone())];
        let chunks = plan_chunks(0, 399, 100, &endpoints).unwrap();

        let started = Instant::now();
        let fetch = fetch_event_logs(chunks, "Hearted", &FetchPolicy::default(), 2, limits()).await;

        assert!(fetch.is_complete());
        assert_eq!(slow.calls(), 4);
        // Four 10s chunks, two at a time.
        assert_eq!(started.elapsed().as_secs(), 20);
    }
}
