// src/error.rs

use ethers::providers::ProviderError;
use ethers::providers::RpcError as _;

/// Classification of a single failed upstream call.
///
/// The chunk fetcher retries `RateLimited` on the same endpoint and fails over
/// to the next endpoint on anything else.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl RpcError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, RpcError::RateLimited(_))
    }

    /// Classifies an ethers provider error using the same signals the
    /// upstream providers emit: HTTP status, JSON-RPC error codes and message text.
    pub fn from_provider_error(err: &ProviderError) -> Self {
        if let ProviderError::HTTPError(e) = err {
            if e.status().map(|s| s.as_u16()) == Some(429) {
                return RpcError::RateLimited(e.to_string());
            }
            return RpcError::Transport(e.to_string());
        }

        if let Some(resp) = err.as_error_response() {
            if json_rpc_rate_limited(resp.code, &resp.message) {
                return RpcError::RateLimited(resp.message.clone());
            }
        }

        let message = err.to_string();
        if looks_rate_limited(&message) {
            return RpcError::RateLimited(message);
        }

        let lowered = message.to_lowercase();
        if lowered.contains("error sending request")
            || lowered.contains("connection")
            || lowered.contains("timed out")
            || lowered.contains("timeout")
            || lowered.contains("dns")
        {
            return RpcError::Transport(message);
        }

        RpcError::Unexpected(message)
    }
}

/// Text-based rate-limit detection for providers that answer 429 with a non-JSON body.
///
/// A bare "limit exceeded" is not enough: providers use it for oversized
/// block ranges and result sets too, which must fail over instead of backing off.
pub fn looks_rate_limited(message: &str) -> bool {
    let lowered = message.to_lowercase();
    lowered.contains("429")
        || lowered.contains("too many requests")
        || lowered.contains("rate limit")
        || lowered.contains("request limit")
        || lowered.contains("requests limit")
}

/// -32005 ("limit exceeded") is shared between throttling and query-size
/// limits, so it only counts when the message says which.
fn json_rpc_rate_limited(code: i64, message: &str) -> bool {
    match code {
        429 => true,
        -32005 => looks_rate_limited(message),
        _ => false,
    }
}

/// Errors that abort a stats request. Everything else degrades into warnings.
#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    #[error("No healthy RPC endpoints available ({candidates} candidates checked). Cannot proceed.")]
    NoHealthyEndpoints { candidates: usize },
    #[error("Failed to determine block window: {0}")]
    BlockWindow(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
}
