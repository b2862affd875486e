use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::domain::CurrencyCode;

use super::RateSource;

/// Rate service reached over HTTP.
///
/// `GET {base_url}/rates/{from}/{to}` answers
/// `{"from_currency": "USD", "to_currency": "EUR", "rate": "0.90"}`.
#[derive(Debug, Clone)]
pub struct HttpRateSource {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct RateResponse {
    from_currency: String,
    to_currency: String,
    rate: Decimal,
}

impl HttpRateSource {
    /// `timeout` bounds the whole request; the oracle applies its own bound on top.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build rate service client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl RateSource for HttpRateSource {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch_rate(&self, from: &CurrencyCode, to: &CurrencyCode) -> Result<Decimal> {
        let url = format!("{}/rates/{}/{}", self.base_url, from, to);
        let response: RateResponse = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Rate request to {} failed", url))?
            .error_for_status()
            .with_context(|| format!("Rate service rejected {}->{}", from, to))?
            .json()
            .await
            .context("Malformed rate response")?;

        // Guard against a service answering a different pair than asked.
        if response.from_currency != from.as_str() || response.to_currency != to.as_str() {
            anyhow::bail!(
                "rate service answered {}->{} for {}->{}",
                response.from_currency,
                response.to_currency,
                from,
                to
            );
        }
        Ok(response.rate)
    }
}
