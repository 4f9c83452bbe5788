use config::{Config, ConfigError, File};
use ethers::types::Address;
use indexmap::IndexMap;
use serde::Deserialize;
use std::env;
use std::path::Path;

use crate::contracts::memebase;
use crate::error::StatsError;

#[derive(Debug, Deserialize, Clone)]
pub struct HealthCheck {
    /// Upper bound for a single liveness probe
    #[serde(default = "default_health_check_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_health_check_timeout_seconds() -> u64 {
    5
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self {
            timeout_seconds: default_health_check_timeout_seconds(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Rpc {
    #[serde(default)]
    pub http_urls: Vec<String>,
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
    /// Client-side requests per second allowed against each endpoint
    #[serde(default = "default_qps_limit")]
    pub qps_limit: u32,
    #[serde(default)]
    pub health_check: HealthCheck,
}

fn default_request_timeout_seconds() -> u64 {
    30
}
fn default_qps_limit() -> u32 {
    25
}

impl Default for Rpc {
    fn default() -> Self {
        Self {
            http_urls: Vec::new(),
            request_timeout_seconds: default_request_timeout_seconds(),
            qps_limit: default_qps_limit(),
            health_check: HealthCheck::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Fetch {
    /// Largest block span a single eth_getLogs call may cover (Alchemy caps at 500)
    #[serde(default = "default_max_block_range_per_request")]
    pub max_block_range_per_request: u64,
    #[serde(default = "default_max_attempts_per_endpoint")]
    pub max_attempts_per_endpoint: u32,
    #[serde(default = "default_rate_limit_backoff_seconds")]
    pub rate_limit_backoff_seconds: u64,
    #[serde(default = "default_chunk_timeout_seconds")]
    pub chunk_timeout_seconds: u64,
    #[serde(default = "default_request_deadline_seconds")]
    pub request_deadline_seconds: u64,
    #[serde(default = "default_tx_lookup_timeout_seconds")]
    pub tx_lookup_timeout_seconds: u64,
}

fn default_max_block_range_per_request() -> u64 {
    500
}
fn default_max_attempts_per_endpoint() -> u32 {
    3
}
fn default_rate_limit_backoff_seconds() -> u64 {
    10
}
fn default_chunk_timeout_seconds() -> u64 {
    180
}
fn default_request_deadline_seconds() -> u64 {
    900
}
fn default_tx_lookup_timeout_seconds() -> u64 {
    30
}

impl Default for Fetch {
    fn default() -> Self {
        Self {
            max_block_range_per_request: default_max_block_range_per_request(),
            max_attempts_per_endpoint: default_max_attempts_per_endpoint(),
            rate_limit_backoff_seconds: default_rate_limit_backoff_seconds(),
            chunk_timeout_seconds: default_chunk_timeout_seconds(),
            request_deadline_seconds: default_request_deadline_seconds(),
            tx_lookup_timeout_seconds: default_tx_lookup_timeout_seconds(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Chain {
    #[serde(default = "default_blocks_per_day")]
    pub blocks_per_day: u64,
    /// Fixed end block for reproducible runs; the live head is used when unset
    #[serde(default)]
    pub pinned_end_block: Option<u64>,
    #[serde(default = "default_duration_days")]
    pub default_duration_days: u64,
    #[serde(default = "default_duration_days")]
    pub max_duration_days: u64,
    #[serde(default = "default_native_decimals")]
    pub native_decimals: u32,
}

fn default_blocks_per_day() -> u64 {
    43_200 // Base: one block every 2s
}
fn default_duration_days() -> u64 {
    7
}
fn default_native_decimals() -> u32 {
    18
}

impl Default for Chain {
    fn default() -> Self {
        Self {
            blocks_per_day: default_blocks_per_day(),
            pinned_end_block: None,
            default_duration_days: default_duration_days(),
            max_duration_days: default_duration_days(),
            native_decimals: default_native_decimals(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Contract {
    #[serde(default = "default_contract_address")]
    pub address: String,
}

fn default_contract_address() -> String {
    memebase::MEMEBASE_ADDRESS.to_string()
}

impl Default for Contract {
    fn default() -> Self {
        Self {
            address: default_contract_address(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Price {
    #[serde(default = "default_price_primary_url")]
    pub primary_url: String,
    #[serde(default = "default_price_fallback_url")]
    pub fallback_url: String,
    #[serde(default = "default_base_currency")]
    pub base_currency: String,
    #[serde(default = "default_quote_currency")]
    pub quote_currency: String,
    #[serde(default = "default_price_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_price_primary_url() -> String {
    "https://cdn.jsdelivr.net/npm/@fawazahmed0/currency-api@latest/v1/currencies/eth.json"
        .to_string()
}
fn default_price_fallback_url() -> String {
    "https://latest.currency-api.pages.dev/v1/currencies/eth.json".to_string()
}
fn default_base_currency() -> String {
    "eth".to_string()
}
fn default_quote_currency() -> String {
    "usd".to_string()
}
fn default_price_timeout_ms() -> u64 {
    5000
}

impl Default for Price {
    fn default() -> Self {
        Self {
            primary_url: default_price_primary_url(),
            fallback_url: default_price_fallback_url(),
            base_currency: default_base_currency(),
            quote_currency: default_quote_currency(),
            timeout_ms: default_price_timeout_ms(),
        }
    }
}

/// One row of the event table. `signature` is a human-readable ABI event declaration.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct EventConfig {
    pub name: String,
    pub signature: String,
    #[serde(default)]
    pub actor_field: Option<String>,
    pub amount_field: String,
    #[serde(default)]
    pub token_field: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    #[serde(default)]
    pub rpc: Rpc,
    #[serde(default)]
    pub fetch: Fetch,
    #[serde(default)]
    pub chain: Chain,
    #[serde(default)]
    pub contract: Contract,
    #[serde(default)]
    pub price: Price,
    /// Keyed by the selector users type ("1", "2", ...); order is preserved
    #[serde(default)]
    pub events: IndexMap<String, EventConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rpc: Rpc::default(),
            fetch: Fetch::default(),
            chain: Chain::default(),
            contract: Contract::default(),
            price: Price::default(),
            events: memebase::default_event_table(),
        }
    }
}

impl Settings {
    /// Loads `Config.toml` from the working directory if present, then applies ENV overrides.
    pub fn new() -> Result<Self, ConfigError> {
        Self::load(File::with_name("Config.toml").required(false))
    }

    /// Loads settings from an explicit file path, then applies ENV overrides.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::load(File::from(path.as_ref()).required(true))
    }

    fn load<S>(source: S) -> Result<Self, ConfigError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let s = Config::builder().add_source(source).build()?;

        let mut settings: Self = s.try_deserialize()?;
        settings.apply_env_overrides();
        ensure_event_table(&mut settings);

        Ok(settings)
    }

    fn apply_env_overrides(&mut self) {
        // RPC_URLS / RPC_URL are the names operators already export for this tool
        let raw_urls = env::var("STATS_RPC_HTTP_URLS")
            .or_else(|_| env::var("RPC_URLS"))
            .or_else(|_| env::var("RPC_URL"));
        if let Ok(raw_http) = raw_urls {
            if let Some(list) = parse_string_list(&raw_http) {
                if !list.is_empty() {
                    self.rpc.http_urls = list;
                }
            }
        }

        if let Ok(raw_block) = env::var("STATS_PINNED_END_BLOCK") {
            let trimmed = raw_block.trim();
            if trimmed.is_empty() {
                self.chain.pinned_end_block = None;
            } else {
                match trimmed.parse::<u64>() {
                    Ok(block) => self.chain.pinned_end_block = Some(block),
                    Err(e) => log::warn!("Failed to parse STATS_PINNED_END_BLOCK as u64: {}", e),
                }
            }
        }

        if let Ok(contract) = env::var("STATS_CONTRACT_ADDRESS") {
            let trimmed = contract.trim();
            if !trimmed.is_empty() {
                self.contract.address = trimmed.to_string();
            }
        }
    }

    pub fn contract_address(&self) -> Result<Address, StatsError> {
        self.contract.address.trim().parse::<Address>().map_err(|e| {
            StatsError::Config(format!(
                "contract address {:?} is not a valid address: {}",
                self.contract.address, e
            ))
        })
    }

    /// Rejects values that would make the engine loop forever or never fetch.
    pub fn validate(&self) -> Result<(), StatsError> {
        if self.fetch.max_block_range_per_request == 0 {
            return Err(StatsError::Config(
                "fetch.max_block_range_per_request must be > 0".to_string(),
            ));
        }
        if self.fetch.max_attempts_per_endpoint == 0 {
            return Err(StatsError::Config(
                "fetch.max_attempts_per_endpoint must be > 0".to_string(),
            ));
        }
        if self.chain.blocks_per_day == 0 {
            return Err(StatsError::Config("chain.blocks_per_day must be > 0".to_string()));
        }
        if self.chain.max_duration_days == 0
            || self.chain.default_duration_days == 0
            || self.chain.default_duration_days > self.chain.max_duration_days
        {
            return Err(StatsError::Config(format!(
                "chain.default_duration_days ({}) must be within 1..={}",
                self.chain.default_duration_days, self.chain.max_duration_days
            )));
        }
        if self.rpc.qps_limit == 0 {
            return Err(StatsError::Config("rpc.qps_limit must be > 0".to_string()));
        }
        self.contract_address()?;
        Ok(())
    }
}

fn parse_string_list(input: &str) -> Option<Vec<String>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Some(vec![]);
    }

    if trimmed.starts_with('[') {
        if let Ok(v) = serde_json::from_str::<Vec<String>>(trimmed) {
            return Some(v);
        }
        // Bracketed but not JSON, e.g. [http://a, http://b]
        let without_brackets = trimmed.trim_start_matches('[').trim_end_matches(']').trim();
        let parts: Vec<String> = without_brackets
            .split(',')
            .map(|s| s.trim().trim_matches('"').trim_matches('\'').to_string())
            .filter(|s| !s.is_empty())
            .collect();
        return Some(parts);
    }

    let parts: Vec<String> = trimmed
        .split(',')
        .map(|s| s.trim().trim_matches('"').to_string())
        .filter(|s| !s.is_empty())
        .collect();
    Some(parts)
}

fn ensure_event_table(settings: &mut Settings) {
    if settings.events.is_empty() {
        settings.events = memebase::default_event_table();
    }
}
