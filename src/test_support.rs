//! In-memory `ChainClient` used by unit tests.

use async_trait::async_trait;
use ethers::types::{Address, H256, U256};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::currency_rate::RateSource;
use crate::error::RpcError;
use crate::rpc_pool::{ChainClient, Endpoint, EndpointConnector};
use crate::types::{ArgValue, LogRecord};

/// Replays scripted `event_logs` outcomes in order, then repeats `fallback`.
pub(crate) struct ScriptedClient {
    height: Result<u64, RpcError>,
    script: Mutex<VecDeque<Result<Vec<LogRecord>, RpcError>>>,
    fallback: Result<Vec<LogRecord>, RpcError>,
    delay: Option<Duration>,
    senders: HashMap<H256, Address>,
    receipts: HashMap<H256, Vec<LogRecord>>,
    failing_txs: Vec<H256>,
    pub log_calls: AtomicUsize,
    pub tx_calls: AtomicUsize,
    pub receipt_calls: AtomicUsize,
}

impl ScriptedClient {
    pub fn ok(logs: Vec<LogRecord>) -> Self {
        Self::with_fallback(Ok(logs))
    }

    pub fn failing(err: RpcError) -> Self {
        let mut client = Self::with_fallback(Err(err.clone()));
        client.height = Err(err);
        client
    }

    fn with_fallback(fallback: Result<Vec<LogRecord>, RpcError>) -> Self {
        Self {
            height: Ok(1_000_000),
            script: Mutex::new(VecDeque::new()),
            fallback,
            delay: None,
            senders: HashMap::new(),
            receipts: HashMap::new(),
            failing_txs: Vec::new(),
            log_calls: AtomicUsize::new(0),
            tx_calls: AtomicUsize::new(0),
            receipt_calls: AtomicUsize::new(0),
        }
    }

    pub fn then(self, outcome: Result<Vec<LogRecord>, RpcError>) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(outcome);
        }
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_tx(mut self, tx: H256, sender: Address, receipt: Vec<LogRecord>) -> Self {
        self.senders.insert(tx, sender);
        self.receipts.insert(tx, receipt);
        self
    }

    /// Knows the transaction but not its receipt, like a lagging node.
    pub fn with_sender(mut self, tx: H256, sender: Address) -> Self {
        self.senders.insert(tx, sender);
        self
    }

    pub fn with_failing_tx(mut self, tx: H256) -> Self {
        self.failing_txs.push(tx);
        self
    }

    pub fn calls(&self) -> usize {
        self.log_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainClient for ScriptedClient {
    async fn block_number(&self) -> Result<u64, RpcError> {
        self.height.clone()
    }

    async fn event_logs(
        &self,
        _event: &str,
        _from: u64,
        _to: u64,
    ) -> Result<Vec<LogRecord>, RpcError> {
        self.log_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        next.unwrap_or_else(|| self.fallback.clone())
    }

    async fn transaction_sender(&self, tx_hash: H256) -> Result<Option<Address>, RpcError> {
        self.tx_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_txs.contains(&tx_hash) {
            return Err(RpcError::Transport("connection reset".to_string()));
        }
        Ok(self.senders.get(&tx_hash).copied())
    }

    async fn receipt_logs(&self, tx_hash: H256, event: &str) -> Result<Option<Vec<LogRecord>>, RpcError> {
        self.receipt_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .receipts
            .get(&tx_hash)
            .map(|logs| logs.iter().filter(|l| l.event == event).cloned().collect()))
    }
}

pub(crate) fn endpoint(url: &str, client: Arc<ScriptedClient>) -> Endpoint {
    Endpoint::new(url, client)
}

pub(crate) fn addr(n: u64) -> Address {
    Address::from_low_u64_be(n)
}

pub(crate) fn tx(n: u64) -> H256 {
    H256::from_low_u64_be(n)
}

/// Log with an actor argument and a native amount.
pub(crate) fn actor_log(event: &str, field: &str, actor: Address, amount: u64, tx_hash: H256) -> LogRecord {
    let mut args = BTreeMap::new();
    args.insert(field.to_string(), ArgValue::Address(actor));
    args.insert("amount".to_string(), ArgValue::Uint(U256::from(amount)));
    LogRecord {
        event: event.to_string(),
        block_number: 1,
        tx_hash,
        log_index: 0,
        args,
    }
}

/// Purged-style log: no actor, amount plus a token address.
pub(crate) fn token_log(event: &str, token: Address, amount: u64, tx_hash: H256, log_index: u64) -> LogRecord {
    let mut args = BTreeMap::new();
    args.insert("memeToken".to_string(), ArgValue::Address(token));
    args.insert("amount".to_string(), ArgValue::Uint(U256::from(amount)));
    LogRecord {
        event: event.to_string(),
        block_number: 1,
        tx_hash,
        log_index,
        args,
    }
}

/// Hands out the registered client for a URL, or a healthy empty one.
#[derive(Default)]
pub(crate) struct StaticConnector {
    clients: HashMap<String, Arc<ScriptedClient>>,
}

impl StaticConnector {
    pub fn with(mut self, url: &str, client: Arc<ScriptedClient>) -> Self {
        self.clients.insert(url.to_string(), client);
        self
    }
}

impl EndpointConnector for StaticConnector {
    fn connect(&self, url: &str) -> anyhow::Result<Endpoint> {
        let client = self
            .clients
            .get(url)
            .cloned()
            .unwrap_or_else(|| Arc::new(ScriptedClient::ok(vec![])));
        Ok(Endpoint::new(url, client))
    }
}

pub(crate) struct FixedRate(pub Option<f64>);

#[async_trait]
impl RateSource for FixedRate {
    async fn usd_rate(&self) -> Option<f64> {
        self.0
    }
}
