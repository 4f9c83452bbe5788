// Contracts Module - event catalog for the tracked contract

pub mod memebase;

use ethers::abi::{self, Event, ParamType, RawLog, Token};
use ethers::types::{Address, Filter, Log, H256};
use indexmap::IndexMap;
use std::collections::BTreeMap;

use crate::error::StatsError;
use crate::settings::{EventConfig, Settings};
use crate::types::{ArgValue, EventSpec, LogRecord};

#[derive(Debug, Clone)]
struct CatalogEntry {
    spec: EventSpec,
    abi: Event,
}

/// Validated event table plus the ABI needed to filter and decode each event.
///
/// Field names are checked against the event's parameters once, here, so the
/// aggregator can rely on typed arguments being present in decoded logs.
#[derive(Debug, Clone)]
pub struct EventCatalog {
    contract: Address,
    entries: IndexMap<String, CatalogEntry>,
}

/// Result of resolving user-supplied event selectors.
#[derive(Debug, Clone, Default)]
pub struct EventSelection {
    pub events: Vec<EventSpec>,
    pub warnings: Vec<String>,
}

impl EventCatalog {
    pub fn from_settings(settings: &Settings) -> Result<Self, StatsError> {
        Self::new(settings.contract_address()?, &settings.events)
    }

    pub fn new(
        contract: Address,
        table: &IndexMap<String, EventConfig>,
    ) -> Result<Self, StatsError> {
        if table.is_empty() {
            return Err(StatsError::Config("event table is empty".to_string()));
        }

        let mut entries = IndexMap::with_capacity(table.len());
        for (key, cfg) in table {
            let abi = parse_event(&cfg.signature)?;
            if abi.name != cfg.name {
                return Err(StatsError::Config(format!(
                    "event {:?}: signature declares {:?}",
                    cfg.name, abi.name
                )));
            }
            if let Some(actor) = &cfg.actor_field {
                expect_param(&abi, actor, |k| matches!(k, ParamType::Address), "address")?;
            }
            expect_param(&abi, &cfg.amount_field, |k| matches!(k, ParamType::Uint(_)), "uint")?;
            if let Some(token) = &cfg.token_field {
                expect_param(&abi, token, |k| matches!(k, ParamType::Address), "address")?;
            }

            let spec = EventSpec {
                key: key.clone(),
                name: cfg.name.clone(),
                actor_field: cfg.actor_field.clone(),
                amount_field: cfg.amount_field.clone(),
                token_field: cfg.token_field.clone(),
            };
            entries.insert(key.clone(), CatalogEntry { spec, abi });
        }

        Ok(Self { contract, entries })
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    pub fn specs(&self) -> impl Iterator<Item = &EventSpec> {
        self.entries.values().map(|e| &e.spec)
    }

    /// Resolves selectors to event specs. A selector is a table key, an event
    /// name (any case), or `*` / `all` for every event. Unknown selectors
    /// produce a warning and are skipped; duplicates collapse.
    pub fn select(&self, selectors: &[String]) -> EventSelection {
        let mut selection = EventSelection::default();
        let push = |spec: &EventSpec, events: &mut Vec<EventSpec>| {
            if !events.iter().any(|e| e.key == spec.key) {
                events.push(spec.clone());
            }
        };

        for raw in selectors {
            let selector = raw.trim();
            if is_wildcard(selector) {
                for spec in self.specs() {
                    push(spec, &mut selection.events);
                }
                continue;
            }

            let found = self
                .entries
                .get(selector)
                .map(|e| &e.spec)
                .or_else(|| self.specs().find(|s| s.name.eq_ignore_ascii_case(selector)));
            match found {
                Some(spec) => push(spec, &mut selection.events),
                None => selection
                    .warnings
                    .push(format!("Warning: Invalid event selection: {}. Skipping.", selector)),
            }
        }

        selection
    }

    fn by_name(&self, event: &str) -> Option<&CatalogEntry> {
        self.entries.values().find(|e| e.spec.name == event)
    }

    pub fn topic0(&self, event: &str) -> Option<H256> {
        self.by_name(event).map(|e| e.abi.signature())
    }

    /// eth_getLogs filter for one event over `[from, to]`.
    pub fn filter(&self, event: &str, from: u64, to: u64) -> Option<Filter> {
        let topic0 = self.topic0(event)?;
        Some(
            Filter::new()
                .address(self.contract)
                .topic0(topic0)
                .from_block(from)
                .to_block(to),
        )
    }

    /// Decodes a raw log emitted by the tracked contract. Logs from other
    /// contracts, unknown topics, and pending logs yield `None`.
    pub fn decode(&self, log: &Log) -> Option<LogRecord> {
        if log.address != self.contract {
            return None;
        }
        let topic0 = log.topics.first()?;
        let entry = self.entries.values().find(|e| e.abi.signature() == *topic0)?;
        let tx_hash = log.transaction_hash?;

        let parsed = entry
            .abi
            .parse_log(RawLog {
                topics: log.topics.clone(),
                data: log.data.to_vec(),
            })
            .ok()?;

        let args: BTreeMap<String, ArgValue> = parsed
            .params
            .into_iter()
            .map(|p| (p.name, arg_value(p.value)))
            .collect();

        Some(LogRecord {
            event: entry.spec.name.clone(),
            block_number: log.block_number.map(|b| b.as_u64()).unwrap_or_default(),
            tx_hash,
            log_index: log.log_index.map(|i| i.as_u64()).unwrap_or_default(),
            args,
        })
    }
}

fn is_wildcard(selector: &str) -> bool {
    selector == "*"
        || selector.eq_ignore_ascii_case("all")
        || selector.eq_ignore_ascii_case("all events")
}

fn parse_event(signature: &str) -> Result<Event, StatsError> {
    let parsed = abi::parse_abi(&[signature])
        .map_err(|e| StatsError::Config(format!("bad event signature {:?}: {}", signature, e)))?;
    parsed
        .events()
        .next()
        .cloned()
        .ok_or_else(|| StatsError::Config(format!("no event in signature {:?}", signature)))
}

fn expect_param(
    event: &Event,
    field: &str,
    kind_ok: impl Fn(&ParamType) -> bool,
    expected: &str,
) -> Result<(), StatsError> {
    match event.inputs.iter().find(|p| p.name == field) {
        Some(p) if kind_ok(&p.kind) => Ok(()),
        Some(p) => Err(StatsError::Config(format!(
            "{}.{} is {}, expected {}",
            event.name, field, p.kind, expected
        ))),
        None => Err(StatsError::Config(format!(
            "{} has no argument named {:?}",
            event.name, field
        ))),
    }
}

fn arg_value(token: Token) -> ArgValue {
    match token {
        Token::Address(a) => ArgValue::Address(a),
        Token::Uint(v) => ArgValue::Uint(v),
        other => ArgValue::Other(other.to_string()),
    }
}
