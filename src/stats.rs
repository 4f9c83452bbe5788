// src/stats.rs

use ethers::types::Address;
use indexmap::IndexMap;
use log::{info, warn};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use uuid::Uuid;

use crate::aggregator::attribute;
use crate::chunk_fetcher::FetchPolicy;
use crate::chunk_planner::plan_chunks;
use crate::contracts::EventCatalog;
use crate::currency_rate::{CurrencyApi, RateSource};
use crate::endpoint_health::probe_endpoints;
use crate::error::StatsError;
use crate::fetch_orchestrator::{fetch_event_logs, FetchLimits};
use crate::rpc_pool::{Endpoint, EndpointConnector, EthersConnector};
use crate::sender_index::{build_sender_index, LookupLimits, SenderIndex};
use crate::settings::Settings;
use crate::types::conversions::string_to_address;
use crate::types::{AddressEventStats, BlockWindow, EventSpec, StatsResult};

type StatsMap = IndexMap<Address, IndexMap<String, AddressEventStats>>;

/// Everything one request needs, resolved up front and passed down
/// explicitly. Read-only once built.
#[derive(Debug)]
struct RequestContext {
    request_id: Uuid,
    endpoints: Vec<Endpoint>,
    window: BlockWindow,
    deadline: Instant,
}

/// Public entry point: per-address activity stats for the tracked contract.
pub struct StatsEngine {
    settings: Arc<Settings>,
    catalog: Arc<EventCatalog>,
    connector: Arc<dyn EndpointConnector>,
    rate_source: Arc<dyn RateSource>,
}

impl StatsEngine {
    /// Wires the engine to live JSON-RPC endpoints and the currency API.
    pub fn from_settings(settings: Settings) -> Result<Self, StatsError> {
        settings.validate()?;
        let catalog = Arc::new(EventCatalog::from_settings(&settings)?);
        let connector = Arc::new(EthersConnector::new(catalog.clone(), settings.rpc.clone()));
        let rate_source = Arc::new(
            CurrencyApi::new(&settings.price).map_err(|e| StatsError::Config(e.to_string()))?,
        );

        Ok(Self {
            settings: Arc::new(settings),
            catalog,
            connector,
            rate_source,
        })
    }

    pub fn new(
        settings: Settings,
        connector: Arc<dyn EndpointConnector>,
        rate_source: Arc<dyn RateSource>,
    ) -> Result<Self, StatsError> {
        settings.validate()?;
        let catalog = Arc::new(EventCatalog::from_settings(&settings)?);

        Ok(Self {
            settings: Arc::new(settings),
            catalog,
            connector,
            rate_source,
        })
    }

    pub fn catalog(&self) -> &EventCatalog {
        &self.catalog
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Counts and sums `event_keys` activity for each of `addresses` over the
    /// last `duration_days` days.
    ///
    /// Only two conditions fail the call: no endpoint passes the liveness
    /// probe, or the chain height cannot be read. Everything else (bad
    /// addresses, unknown events, out-of-range durations, failed chunks, a
    /// missing currency rate) ends up in `StatsResult::warnings` next to
    /// whatever data was obtained. An empty endpoint list means the
    /// configured ones.
    pub async fn compute_stats(
        &self,
        addresses: &[String],
        event_keys: &[String],
        endpoints: &[String],
        duration_days: i64,
    ) -> Result<StatsResult, StatsError> {
        let request_id = Uuid::new_v4();
        let deadline = Instant::now() + Duration::from_secs(self.settings.fetch.request_deadline_seconds);
        let mut result = StatsResult::new(request_id);

        let targets = parse_addresses(addresses, &mut result.warnings);
        let selection = self.catalog.select(event_keys);
        result.warnings.extend(selection.warnings);
        let days = self.resolve_duration(duration_days, &mut result.warnings);

        let candidates = self.connect_endpoints(endpoints, &mut result.warnings);
        info!(
            "[StatsEngine {}] Checking {} RPC endpoints",
            request_id,
            candidates.len()
        );
        let health_timeout = Duration::from_secs(self.settings.rpc.health_check.timeout_seconds);
        let healthy = probe_endpoints(&candidates, health_timeout).await;
        if healthy.is_empty() {
            return Err(StatsError::NoHealthyEndpoints {
                candidates: candidates.len(),
            });
        }

        let (usd_rate, collected) = tokio::join!(
            self.rate_source.usd_rate(),
            self.collect(request_id, healthy, deadline, days, &targets, &selection.events)
        );
        let (window, stats, warnings) = collected?;

        result.window = Some(window);
        result.stats = stats;
        result.warnings.extend(warnings);
        result.usd_rate = usd_rate;
        if usd_rate.is_none() {
            result
                .warnings
                .push("Failed to fetch ETH to USD rate. USD values will be N/A.".to_string());
        }

        info!(
            "[StatsEngine {}] Done: {} addresses, {} events, {} warnings",
            request_id,
            result.stats.len(),
            selection.events.len(),
            result.warnings.len()
        );
        Ok(result)
    }

    async fn collect(
        &self,
        request_id: Uuid,
        endpoints: Vec<Endpoint>,
        deadline: Instant,
        days: u64,
        targets: &[Address],
        events: &[EventSpec],
    ) -> Result<(BlockWindow, StatsMap, Vec<String>), StatsError> {
        let window = self.resolve_window(&endpoints, days).await?;
        let ctx = RequestContext {
            request_id,
            endpoints,
            window,
            deadline,
        };
        info!(
            "[StatsEngine {}] Log investigation range: block {} to {} (total {} blocks)",
            ctx.request_id,
            ctx.window.from,
            ctx.window.to,
            ctx.window.block_count()
        );

        let mut stats: StatsMap = targets.iter().map(|a| (*a, IndexMap::new())).collect();
        let mut warnings = Vec::new();

        for spec in events {
            self.collect_event(&ctx, spec, targets, &mut stats, &mut warnings).await;
        }

        Ok((ctx.window, stats, warnings))
    }

    async fn collect_event(
        &self,
        ctx: &RequestContext,
        spec: &EventSpec,
        targets: &[Address],
        stats: &mut StatsMap,
        warnings: &mut Vec<String>,
    ) {
        let fetch_settings = &self.settings.fetch;
        let chunks = match plan_chunks(
            ctx.window.from,
            ctx.window.to,
            fetch_settings.max_block_range_per_request,
            &ctx.endpoints,
        ) {
            Ok(chunks) => chunks,
            Err(e) => {
                warnings.push(format!("Could not plan {} fetch: {}", spec.name, e));
                return;
            }
        };

        let limits = FetchLimits {
            chunk_timeout: Duration::from_secs(fetch_settings.chunk_timeout_seconds),
            deadline: ctx.deadline,
        };
        let policy = FetchPolicy::from_settings(fetch_settings);
        let fetch = fetch_event_logs(chunks, &spec.name, &policy, ctx.endpoints.len(), limits).await;

        for failed in &fetch.failed_chunks {
            warnings.push(format!(
                "Failed to fetch {} logs for blocks {}-{} after trying all RPCs.",
                spec.name, failed.from, failed.to
            ));
        }
        if fetch.logs.is_empty() {
            info!(
                "[StatsEngine {}] No logs found for {}. Either there were no such events in the range, or chunks failed.",
                ctx.request_id, spec.name
            );
        }

        let index = if spec.uses_sender_attribution() && !targets.is_empty() {
            let target_set: HashSet<Address> = targets.iter().copied().collect();
            let limits = LookupLimits {
                per_tx_timeout: Duration::from_secs(fetch_settings.tx_lookup_timeout_seconds),
                concurrency: ctx.endpoints.len(),
                deadline: ctx.deadline,
            };
            build_sender_index(&fetch.logs, &spec.name, &target_set, &ctx.endpoints, limits).await
        } else {
            SenderIndex::default()
        };

        for address in targets {
            let per_address = attribute(&fetch.logs, &index, *address, spec);
            stats
                .entry(*address)
                .or_default()
                .insert(spec.name.clone(), per_address);
        }
    }

    async fn resolve_window(&self, endpoints: &[Endpoint], days: u64) -> Result<BlockWindow, StatsError> {
        let end = match self.settings.chain.pinned_end_block {
            Some(pinned) => pinned,
            None => self.current_height(endpoints).await?,
        };
        let span = days.saturating_mul(self.settings.chain.blocks_per_day);
        Ok(BlockWindow {
            from: end.saturating_sub(span),
            to: end,
        })
    }

    async fn current_height(&self, endpoints: &[Endpoint]) -> Result<u64, StatsError> {
        let limit = Duration::from_secs(self.settings.rpc.health_check.timeout_seconds);
        let mut last_error = String::from("no endpoints");
        for endpoint in endpoints {
            match timeout(limit, endpoint.client.block_number()).await {
                Ok(Ok(height)) => return Ok(height),
                Ok(Err(e)) => last_error = format!("{}: {}", endpoint.url, e),
                Err(_) => last_error = format!("{}: timed out", endpoint.url),
            }
        }
        Err(StatsError::BlockWindow(format!(
            "Failed to get current block number ({})",
            last_error
        )))
    }

    fn resolve_duration(&self, requested: i64, warnings: &mut Vec<String>) -> u64 {
        let chain = &self.settings.chain;
        match u64::try_from(requested) {
            Ok(days) if (1..=chain.max_duration_days).contains(&days) => days,
            _ => {
                warnings.push(format!(
                    "Duration of {} days is outside 1-{}; using {} days.",
                    requested, chain.max_duration_days, chain.default_duration_days
                ));
                chain.default_duration_days
            }
        }
    }

    fn connect_endpoints(&self, urls: &[String], warnings: &mut Vec<String>) -> Vec<Endpoint> {
        let source: &[String] = if urls.is_empty() {
            &self.settings.rpc.http_urls
        } else {
            urls
        };

        let mut seen = HashSet::new();
        let mut endpoints = Vec::new();
        for url in source.iter().map(|u| u.trim()).filter(|u| !u.is_empty()) {
            if !seen.insert(url.to_string()) {
                continue;
            }
            match self.connector.connect(url) {
                Ok(endpoint) => endpoints.push(endpoint),
                Err(e) => {
                    warn!("❌ [StatsEngine] Cannot use RPC URL {}: {}", url, e);
                    warnings.push(format!("Invalid RPC URL {}: {}", url, e));
                }
            }
        }
        endpoints
    }
}

/// Parses user addresses in order, dropping invalid ones and duplicates.
fn parse_addresses(raw: &[String], warnings: &mut Vec<String>) -> Vec<Address> {
    let mut out: Vec<Address> = Vec::new();
    for input in raw {
        match string_to_address(input) {
            Ok(address) if !out.contains(&address) => out.push(address),
            Ok(_) => {}
            Err(_) => warnings.push(format!(
                "Warning: Invalid address format: {}. Skipping.",
                input.trim()
            )),
        }
    }
    if out.is_empty() {
        warnings.push("No valid addresses to investigate.".to_string());
    }
    out
}
