use chrono::{DateTime, Utc};
use ethers::types::{Address, H256, U256};
use ethers::utils::to_checksum;
use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::rpc_pool::Endpoint;

/// Static descriptor of one contract event, validated once when the catalog is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventSpec {
    pub key: String,
    pub name: String,
    /// Argument naming the acting address. `None` means the actor is the
    /// sender of the enclosing transaction.
    pub actor_field: Option<String>,
    pub amount_field: String,
    /// Argument naming the token an amount is denominated in. `None` means native currency.
    pub token_field: Option<String>,
}

impl EventSpec {
    pub fn uses_sender_attribution(&self) -> bool {
        self.actor_field.is_none()
    }

    pub fn is_token_denominated(&self) -> bool {
        self.token_field.is_some()
    }
}

/// Typed value of a decoded event argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ArgValue {
    Address(Address),
    Uint(U256),
    Other(String),
}

/// One observed event occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub event: String,
    pub block_number: u64,
    pub tx_hash: H256,
    pub log_index: u64,
    pub args: BTreeMap<String, ArgValue>,
}

impl LogRecord {
    pub fn address_arg(&self, field: &str) -> Option<Address> {
        match self.args.get(field) {
            Some(ArgValue::Address(a)) => Some(*a),
            _ => None,
        }
    }

    pub fn uint_arg(&self, field: &str) -> Option<U256> {
        match self.args.get(field) {
            Some(ArgValue::Uint(v)) => Some(*v),
            _ => None,
        }
    }
}

/// Inclusive block range `[from, to]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockWindow {
    pub from: u64,
    pub to: u64,
}

impl BlockWindow {
    pub fn block_count(&self) -> u64 {
        self.to - self.from + 1
    }
}

/// A bounded sub-range of the request window plus the endpoint order to try it with.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub index: usize,
    pub from: u64,
    pub to: u64,
    pub endpoints: Vec<Endpoint>,
}

impl Chunk {
    pub fn span(&self) -> u64 {
        self.to - self.from + 1
    }
}

/// Per (address, event) aggregate. Amounts are in the smallest unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AddressEventStats {
    pub count: u64,
    pub native_total: U256,
    #[serde(serialize_with = "checksummed_keys")]
    pub token_totals: BTreeMap<Address, U256>,
}

impl AddressEventStats {
    /// Counts one occurrence and credits its amount. Totals only ever grow.
    pub fn record(&mut self, amount: U256, token: Option<Address>) {
        self.count += 1;
        match token {
            Some(token) => {
                let total = self.token_totals.entry(token).or_default();
                *total = total.saturating_add(amount);
            }
            None => {
                self.native_total = self.native_total.saturating_add(amount);
            }
        }
    }
}

/// The engine's output: stats per address per event, the currency rate and
/// every non-fatal issue gathered while building it.
#[derive(Debug, Clone, Serialize)]
pub struct StatsResult {
    pub request_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub window: Option<BlockWindow>,
    #[serde(serialize_with = "checksummed_keys")]
    pub stats: IndexMap<Address, IndexMap<String, AddressEventStats>>,
    pub usd_rate: Option<f64>,
    pub warnings: Vec<String>,
}

impl StatsResult {
    pub fn new(request_id: Uuid) -> Self {
        Self {
            request_id,
            generated_at: Utc::now(),
            window: None,
            stats: IndexMap::new(),
            usd_rate: None,
            warnings: Vec::new(),
        }
    }

    /// Looks up stats for an address given in any letter case.
    pub fn get(&self, address: &str, event: &str) -> Option<&AddressEventStats> {
        let address: Address = address.parse().ok()?;
        self.stats.get(&address)?.get(event)
    }

    /// Result keys in their EIP-55 checksummed form, in input order.
    pub fn checksummed_addresses(&self) -> Vec<String> {
        self.stats.keys().map(|a| to_checksum(a, None)).collect()
    }
}

// Address-keyed maps serialize with EIP-55 keys, matching what users typed.
fn checksummed_keys<'a, M, V, S>(map: &'a M, serializer: S) -> Result<S::Ok, S::Error>
where
    &'a M: IntoIterator<Item = (&'a Address, &'a V)>,
    V: Serialize + 'a,
    S: Serializer,
{
    serializer.collect_map(map.into_iter().map(|(k, v)| (to_checksum(k, None), v)))
}
