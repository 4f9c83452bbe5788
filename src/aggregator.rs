//! Per-address folds over one event's log list.
//!
//! Everything here is pure: network lookups for sender attribution happen
//! beforehand in [`crate::sender_index`], so these functions are plain
//! iterations over already-fetched data.

use ethers::types::Address;
use log::debug;
use std::collections::HashSet;

use crate::sender_index::SenderIndex;
use crate::types::{AddressEventStats, EventSpec, LogRecord};

/// Aggregates one event for one address, choosing the mode from `spec`.
pub fn attribute(
    logs: &[LogRecord],
    index: &SenderIndex,
    address: Address,
    spec: &EventSpec,
) -> AddressEventStats {
    if spec.uses_sender_attribution() {
        aggregate_by_sender(logs, index, address, spec)
    } else {
        aggregate_by_actor(logs, address, spec)
    }
}

/// Counts logs whose actor argument is `address`.
pub fn aggregate_by_actor(logs: &[LogRecord], address: Address, spec: &EventSpec) -> AddressEventStats {
    let mut stats = AddressEventStats::default();
    let Some(actor_field) = spec.actor_field.as_deref() else {
        return stats;
    };

    for log in logs {
        if log.address_arg(actor_field) == Some(address) {
            credit(&mut stats, log, spec);
        }
    }
    stats
}

/// Counts logs from transactions sent by `address`.
///
/// Each transaction is considered once. When its sender matches, every
/// `spec` log in its receipt is credited, so a transaction emitting the
/// event several times counts each emission exactly once.
pub fn aggregate_by_sender(
    logs: &[LogRecord],
    index: &SenderIndex,
    address: Address,
    spec: &EventSpec,
) -> AddressEventStats {
    let mut stats = AddressEventStats::default();
    let mut processed = HashSet::new();

    for log in logs {
        if !processed.insert(log.tx_hash) {
            continue;
        }
        if index.sender(&log.tx_hash) != Some(address) {
            continue;
        }
        let Some(receipt_logs) = index.receipt_logs(&log.tx_hash) else {
            continue;
        };
        for receipt_log in receipt_logs.iter().filter(|l| l.event == spec.name) {
            credit(&mut stats, receipt_log, spec);
        }
    }
    stats
}

fn credit(stats: &mut AddressEventStats, log: &LogRecord, spec: &EventSpec) {
    let Some(amount) = log.uint_arg(&spec.amount_field) else {
        debug!(
            "[Aggregator] {} log {:?}#{} has no {}",
            spec.name, log.tx_hash, log.log_index, spec.amount_field
        );
        return;
    };

    match spec.token_field.as_deref() {
        Some(token_field) => match log.address_arg(token_field) {
            Some(token) => stats.record(amount, Some(token)),
            None => debug!(
                "[Aggregator] {} log {:?}#{} has no {}",
                spec.name, log.tx_hash, log.log_index, token_field
            ),
        },
        None => stats.record(amount, None),
    }
}
