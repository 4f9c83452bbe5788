// src/currency_rate.rs

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde_json::Value;
use std::time::Duration;

use crate::settings::Price;

/// Native-to-quote conversion rate collaborator. `None` means unavailable.
#[async_trait]
pub trait RateSource: Send + Sync {
    async fn usd_rate(&self) -> Option<f64>;
}

/// Static currency API (jsDelivr CDN with a Cloudflare Pages mirror).
///
/// Response shape: `{ "date": "...", "<base>": { "<quote>": 3120.55, ... } }`.
pub struct CurrencyApi {
    client: reqwest::Client,
    urls: Vec<String>,
    base: String,
    quote: String,
}

impl CurrencyApi {
    pub fn new(settings: &Price) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()?;

        Ok(Self {
            client,
            urls: vec![settings.primary_url.clone(), settings.fallback_url.clone()],
            base: settings.base_currency.to_lowercase(),
            quote: settings.quote_currency.to_lowercase(),
        })
    }

    async fn fetch_rate(&self, url: &str) -> Result<f64> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| anyhow!("HTTP request failed: {}", e))?;

        if !response.status().is_success() {
            if response.status() == 429 {
                return Err(anyhow!("Rate limited (429)"));
            }
            return Err(anyhow!("HTTP error: {}", response.status()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| anyhow!("JSON parse failed: {}", e))?;
        parse_rate(&body, &self.base, &self.quote)
    }
}

#[async_trait]
impl RateSource for CurrencyApi {
    async fn usd_rate(&self) -> Option<f64> {
        for url in &self.urls {
            match self.fetch_rate(url).await {
                Ok(rate) => {
                    info!("[CurrencyRate] 1 {} = {} {} ({})", self.base, rate, self.quote, url);
                    return Some(rate);
                }
                Err(e) => warn!("⚠️ [CurrencyRate] {} failed: {}", url, e),
            }
        }
        debug!("[CurrencyRate] every source failed");
        None
    }
}

/// Extracts `body[base][quote]`, rejecting non-positive or non-finite values.
pub fn parse_rate(body: &Value, base: &str, quote: &str) -> Result<f64> {
    let rate = body
        .get(base)
        .and_then(|b| b.get(quote))
        .and_then(Value::as_f64)
        .ok_or_else(|| anyhow!("missing {}.{} in response", base, quote))?;

    if !rate.is_finite() || rate <= 0.0 {
        return Err(anyhow!("invalid {}/{} rate: {}", base, quote, rate));
    }
    Ok(rate)
}
