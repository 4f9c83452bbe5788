//! Shared in-memory chain for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use ethers::types::{Address, H256, U256};
use memebase_stats_sdk::currency_rate::RateSource;
use memebase_stats_sdk::{ArgValue, ChainClient, Endpoint, EndpointConnector, LogRecord, RpcError, Settings};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const TARGET: &str = "0x39FCE6a33596b7319d7941F3F90d256574bcc954";

pub fn target() -> Address {
    TARGET.parse().unwrap()
}

pub fn addr(n: u64) -> Address {
    Address::from_low_u64_be(n)
}

pub fn tx(n: u64) -> H256 {
    H256::from_low_u64_be(n)
}

/// Window 3000..=10000 at 1000 blocks/day, split into 500-block chunks.
pub fn settings() -> Settings {
    let mut settings = Settings::default();
    settings.chain.pinned_end_block = Some(10_000);
    settings.chain.blocks_per_day = 1_000;
    settings.fetch.max_block_range_per_request = 500;
    settings
}

pub fn hearted(hearter: Address, amount: u64, block: u64, tx_hash: H256) -> LogRecord {
    let mut args = BTreeMap::new();
    args.insert("hearter".to_string(), ArgValue::Address(hearter));
    args.insert("memeNonce".to_string(), ArgValue::Uint(U256::one()));
    args.insert("amount".to_string(), ArgValue::Uint(U256::from(amount)));
    LogRecord {
        event: "Hearted".to_string(),
        block_number: block,
        tx_hash,
        log_index: 0,
        args,
    }
}

pub fn purged(token: Address, amount: u64, block: u64, tx_hash: H256, log_index: u64) -> LogRecord {
    let mut args = BTreeMap::new();
    args.insert("memeToken".to_string(), ArgValue::Address(token));
    args.insert("amount".to_string(), ArgValue::Uint(U256::from(amount)));
    LogRecord {
        event: "Purged".to_string(),
        block_number: block,
        tx_hash,
        log_index,
        args,
    }
}

/// Serves a fixed set of logs by event and block range.
#[derive(Default)]
pub struct MockChain {
    pub logs: Vec<LogRecord>,
    pub failing_ranges: Vec<(u64, u64)>,
    pub senders: HashMap<H256, Address>,
    /// Height answers succeed this many times, then fail
    pub height_budget: Option<usize>,
    pub down: bool,
    pub height_calls: AtomicUsize,
    pub log_calls: AtomicUsize,
    pub tx_calls: AtomicUsize,
    pub receipt_calls: AtomicUsize,
}

impl MockChain {
    pub fn with_logs(logs: Vec<LogRecord>) -> Self {
        Self {
            logs,
            ..Default::default()
        }
    }

    pub fn down() -> Self {
        Self {
            down: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn block_number(&self) -> Result<u64, RpcError> {
        let call = self.height_calls.fetch_add(1, Ordering::SeqCst);
        if self.down || self.height_budget.map_or(false, |budget| call >= budget) {
            return Err(RpcError::Transport("connection refused".to_string()));
        }
        Ok(20_000)
    }

    async fn event_logs(&self, event: &str, from: u64, to: u64) -> Result<Vec<LogRecord>, RpcError> {
        self.log_calls.fetch_add(1, Ordering::SeqCst);
        if self.down || self.failing_ranges.contains(&(from, to)) {
            return Err(RpcError::Transport("connection reset by peer".to_string()));
        }
        Ok(self
            .logs
            .iter()
            .filter(|l| l.event == event && l.block_number >= from && l.block_number <= to)
            .cloned()
            .collect())
    }

    async fn transaction_sender(&self, tx_hash: H256) -> Result<Option<Address>, RpcError> {
        self.tx_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.senders.get(&tx_hash).copied())
    }

    async fn receipt_logs(&self, tx_hash: H256, event: &str) -> Result<Option<Vec<LogRecord>>, RpcError> {
        self.receipt_calls.fetch_add(1, Ordering::SeqCst);
        if !self.logs.iter().any(|l| l.tx_hash == tx_hash) {
            return Ok(None);
        }
        Ok(Some(
            self.logs
                .iter()
                .filter(|l| l.tx_hash == tx_hash && l.event == event)
                .cloned()
                .collect(),
        ))
    }
}

#[derive(Default)]
pub struct MockConnector {
    chains: HashMap<String, Arc<MockChain>>,
}

impl MockConnector {
    pub fn with(mut self, url: &str, chain: Arc<MockChain>) -> Self {
        self.chains.insert(url.to_string(), chain);
        self
    }
}

impl EndpointConnector for MockConnector {
    fn connect(&self, url: &str) -> anyhow::Result<Endpoint> {
        let chain = self
            .chains
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown endpoint {}", url))?;
        Ok(Endpoint::new(url, chain))
    }
}

pub struct FixedRate(pub Option<f64>);

#[async_trait]
impl RateSource for FixedRate {
    async fn usd_rate(&self) -> Option<f64> {
        self.0
    }
}
