// src/rpc_pool.rs

use crate::contracts::EventCatalog;
use crate::error::RpcError;
use crate::metrics;
use crate::settings::Rpc;
use crate::types::LogRecord;
use anyhow::Result;
use async_trait::async_trait;
use ethers::middleware::Middleware;
use ethers::prelude::{Http, Provider};
use ethers::providers::ProviderError;
use ethers::types::{Address, H256};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use log::debug;
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

type DefaultDirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// The upstream calls the engine makes against one data provider.
///
/// Every failure is already classified so callers can decide between
/// retrying the same endpoint and failing over.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn block_number(&self) -> Result<u64, RpcError>;

    /// Decoded logs of one contract event in `[from, to]`.
    async fn event_logs(&self, event: &str, from: u64, to: u64)
        -> Result<Vec<LogRecord>, RpcError>;

    /// `Ok(None)` when the provider does not know the transaction.
    async fn transaction_sender(&self, tx_hash: H256) -> Result<Option<Address>, RpcError>;

    /// Every log of `event` emitted by the tracked contract within the
    /// transaction. `Ok(None)` when the provider has no receipt for it.
    async fn receipt_logs(&self, tx_hash: H256, event: &str) -> Result<Option<Vec<LogRecord>>, RpcError>;
}

/// A provider URL paired with the client that talks to it.
#[derive(Clone)]
pub struct Endpoint {
    pub url: String,
    pub client: Arc<dyn ChainClient>,
}

impl Endpoint {
    pub fn new(url: impl Into<String>, client: Arc<dyn ChainClient>) -> Self {
        Self {
            url: url.into(),
            client,
        }
    }

    /// Host part of the URL, used as a metrics label so API keys in paths never leak.
    pub fn host(&self) -> String {
        host_label(&self.url)
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint").field("url", &self.url).finish()
    }
}

fn host_label(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            u.host_str().map(|h| match u.port() {
                Some(p) => format!("{}:{}", h, p),
                None => h.to_string(),
            })
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// Builds endpoints from URLs. The engine only ever sees this seam, which
/// lets tests hand it in-memory clients.
pub trait EndpointConnector: Send + Sync {
    fn connect(&self, url: &str) -> Result<Endpoint>;
}

/// JSON-RPC over HTTP through an ethers `Provider`, throttled per endpoint.
pub struct EthersClient {
    provider: Provider<Http>,
    catalog: Arc<EventCatalog>,
    limiter: Arc<DefaultDirectRateLimiter>,
    host: String,
}

impl EthersClient {
    pub fn new(url: &str, catalog: Arc<EventCatalog>, settings: &Rpc) -> Result<Self> {
        let parsed = Url::parse(url)?;
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_seconds))
            .build()?;
        let provider = Provider::new(Http::new_with_client(parsed, http_client));

        let quota = Quota::per_second(
            NonZeroU32::new(settings.qps_limit)
                .ok_or_else(|| anyhow::anyhow!("QPS must be non-zero"))?,
        );

        Ok(Self {
            provider,
            catalog,
            limiter: Arc::new(RateLimiter::direct(quota)),
            host: host_label(url),
        })
    }

    async fn call<T, Fut>(&self, method: &'static str, request: Fut) -> Result<T, RpcError>
    where
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        self.limiter.until_ready().await;

        let start = Instant::now();
        let result = request.await;
        metrics::record_rpc_request(&self.host, method, start.elapsed());

        result.map_err(|e| {
            let classified = RpcError::from_provider_error(&e);
            if classified.is_rate_limited() {
                metrics::increment_rpc_429(&self.host);
            }
            debug!("[RpcPool] {} on {} failed: {}", method, self.host, classified);
            classified
        })
    }
}

#[async_trait]
impl ChainClient for EthersClient {
    async fn block_number(&self) -> Result<u64, RpcError> {
        self.call("eth_blockNumber", self.provider.get_block_number())
            .await
            .map(|n| n.as_u64())
    }

    async fn event_logs(
        &self,
        event: &str,
        from: u64,
        to: u64,
    ) -> Result<Vec<LogRecord>, RpcError> {
        let filter = self
            .catalog
            .filter(event, from, to)
            .ok_or_else(|| RpcError::Unexpected(format!("event {} is not in the catalog", event)))?;

        let raw = self.call("eth_getLogs", self.provider.get_logs(&filter)).await?;
        let total = raw.len();
        let decoded: Vec<LogRecord> = raw
            .iter()
            .filter_map(|log| self.catalog.decode(log))
            .filter(|record| record.event == event)
            .collect();
        if decoded.len() != total {
            debug!(
                "[RpcPool] {} of {} {} logs in {}-{} could not be decoded",
                total - decoded.len(),
                total,
                event,
                from,
                to
            );
        }
        Ok(decoded)
    }

    async fn transaction_sender(&self, tx_hash: H256) -> Result<Option<Address>, RpcError> {
        self.call("eth_getTransactionByHash", self.provider.get_transaction(tx_hash))
            .await
            .map(|tx| tx.map(|t| t.from))
    }

    async fn receipt_logs(&self, tx_hash: H256, event: &str) -> Result<Option<Vec<LogRecord>>, RpcError> {
        let receipt = self
            .call(
                "eth_getTransactionReceipt",
                self.provider.get_transaction_receipt(tx_hash),
            )
            .await?;

        Ok(receipt.map(|r| {
            r.logs
                .iter()
                .filter_map(|log| self.catalog.decode(log))
                .filter(|record| record.event == event)
                .collect()
        }))
    }
}

/// Connects URLs through [`EthersClient`].
pub struct EthersConnector {
    catalog: Arc<EventCatalog>,
    settings: Rpc,
}

impl EthersConnector {
    pub fn new(catalog: Arc<EventCatalog>, settings: Rpc) -> Self {
        Self { catalog, settings }
    }
}

impl EndpointConnector for EthersConnector {
    fn connect(&self, url: &str) -> Result<Endpoint> {
        let client = EthersClient::new(url, self.catalog.clone(), &self.settings)?;
        Ok(Endpoint::new(url, Arc::new(client)))
    }
}
