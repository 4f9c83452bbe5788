// src/sender_index.rs

use ethers::types::{Address, H256};
use futures::stream::{self, StreamExt};
use log::{debug, info};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::time::{timeout_at, Instant};

use crate::metrics;
use crate::rpc_pool::Endpoint;
use crate::types::LogRecord;

/// Transaction facts needed for sender attribution, resolved once per event
/// and shared by every target address.
///
/// A transaction missing from `senders` could not be looked up and is
/// skipped by the aggregator. Receipts are only fetched for transactions
/// sent by one of the targets.
#[derive(Debug, Clone, Default)]
pub struct SenderIndex {
    senders: HashMap<H256, Address>,
    receipts: HashMap<H256, Vec<LogRecord>>,
    pub skipped: usize,
}

impl SenderIndex {
    pub fn sender(&self, tx_hash: &H256) -> Option<Address> {
        self.senders.get(tx_hash).copied()
    }

    pub fn receipt_logs(&self, tx_hash: &H256) -> Option<&[LogRecord]> {
        self.receipts.get(tx_hash).map(Vec::as_slice)
    }

    pub fn insert(&mut self, tx_hash: H256, sender: Address, receipt_logs: Option<Vec<LogRecord>>) {
        self.senders.insert(tx_hash, sender);
        if let Some(logs) = receipt_logs {
            self.receipts.insert(tx_hash, logs);
        }
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }
}

/// Limits for transaction lookups.
#[derive(Debug, Clone, Copy)]
pub struct LookupLimits {
    pub per_tx_timeout: Duration,
    pub concurrency: usize,
    pub deadline: Instant,
}

enum Lookup {
    Resolved {
        sender: Address,
        receipt_logs: Option<Vec<LogRecord>>,
    },
    Failed,
}

/// Looks up the sender of every distinct transaction in `logs` and, for
/// transactions sent by a target, every `event` log in its receipt.
///
/// Transaction `i` starts on endpoint `i mod n` and fails over through the
/// rest. Lookups that fail everywhere are counted in `skipped`.
pub async fn build_sender_index(
    logs: &[LogRecord],
    event: &str,
    targets: &HashSet<Address>,
    endpoints: &[Endpoint],
    limits: LookupLimits,
) -> SenderIndex {
    let mut seen = HashSet::new();
    let tx_hashes: Vec<H256> = logs
        .iter()
        .map(|l| l.tx_hash)
        .filter(|h| seen.insert(*h))
        .collect();

    let mut index = SenderIndex::default();
    if tx_hashes.is_empty() || targets.is_empty() || endpoints.is_empty() {
        return index;
    }

    info!(
        "[SenderIndex] Resolving senders of {} {} transactions",
        tx_hashes.len(),
        event
    );

    let results: Vec<(H256, Lookup)> = stream::iter(tx_hashes.into_iter().enumerate())
        .map(|(i, tx_hash)| async move {
            let offset = i % endpoints.len();
            let order: Vec<&Endpoint> = endpoints[offset..].iter().chain(&endpoints[..offset]).collect();
            let until = (Instant::now() + limits.per_tx_timeout).min(limits.deadline);
            let lookup = timeout_at(until, resolve(tx_hash, &order, event, targets))
                .await
                .unwrap_or(Lookup::Failed);
            (tx_hash, lookup)
        })
        .buffer_unordered(limits.concurrency.max(1))
        .collect()
        .await;

    for (tx_hash, lookup) in results {
        match lookup {
            Lookup::Resolved { sender, receipt_logs } => index.insert(tx_hash, sender, receipt_logs),
            Lookup::Failed => {
                debug!("[SenderIndex] Skipping transaction {:?}: lookup failed", tx_hash);
                index.skipped += 1;
            }
        }
    }

    if index.skipped > 0 {
        metrics::increment_tx_lookups_skipped(index.skipped as u64);
    }
    index
}

async fn resolve(tx_hash: H256, order: &[&Endpoint], event: &str, targets: &HashSet<Address>) -> Lookup {
    let mut sender = None;
    for endpoint in order {
        match endpoint.client.transaction_sender(tx_hash).await {
            Ok(Some(from)) => {
                sender = Some(from);
                break;
            }
            Ok(None) => debug!("[SenderIndex] {} does not know {:?}", endpoint.url, tx_hash),
            Err(e) => debug!("[SenderIndex] sender of {:?} on {}: {}", tx_hash, endpoint.url, e),
        }
    }
    let Some(sender) = sender else {
        return Lookup::Failed;
    };

    if !targets.contains(&sender) {
        return Lookup::Resolved {
            sender,
            receipt_logs: None,
        };
    }

    for endpoint in order {
        match endpoint.client.receipt_logs(tx_hash, event).await {
            Ok(Some(logs)) => {
                return Lookup::Resolved {
                    sender,
                    receipt_logs: Some(logs),
                }
            }
            Ok(None) => debug!("[SenderIndex] {} has no receipt for {:?}", endpoint.url, tx_hash),
            Err(e) => debug!("[SenderIndex] receipt of {:?} on {}: {}", tx_hash, endpoint.url, e),
        }
    }
    Lookup::Failed
}
