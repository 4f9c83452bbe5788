// src/endpoint_health.rs

use futures::future::join_all;
use log::{info, warn};
use std::time::Duration;
use tokio::time::timeout;

use crate::metrics;
use crate::rpc_pool::Endpoint;

/// Probes every candidate concurrently with one `eth_blockNumber` call and
/// returns the ones that answered, in input order. Failed or slow endpoints
/// are dropped without retry.
pub async fn probe_endpoints(candidates: &[Endpoint], probe_timeout: Duration) -> Vec<Endpoint> {
    let probes = candidates.iter().map(|endpoint| async move {
        match timeout(probe_timeout, endpoint.client.block_number()).await {
            Ok(Ok(height)) => {
                info!(
                    "✅ [HealthProbe] RPC URL is healthy: {} (head {})",
                    endpoint.url, height
                );
                true
            }
            Ok(Err(e)) => {
                warn!(
                    "❌ [HealthProbe] RPC URL failed health check: {} - Error: {}",
                    endpoint.url, e
                );
                metrics::increment_rpc_unhealthy(&endpoint.host());
                false
            }
            Err(_) => {
                warn!(
                    "❌ [HealthProbe] RPC URL failed health check: {} - no answer within {:?}",
                    endpoint.url, probe_timeout
                );
                metrics::increment_rpc_unhealthy(&endpoint.host());
                false
            }
        }
    });

    let outcomes = join_all(probes).await;
    candidates
        .iter()
        .zip(outcomes)
        .filter(|(_, healthy)| *healthy)
        .map(|(endpoint, _)| endpoint.clone())
        .collect()
}
