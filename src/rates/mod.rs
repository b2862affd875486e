//! Exchange-rate lookup.
//!
//! A [`RateSource`] is the remote service; [`RateOracle`] is what the ledger
//! calls. The oracle bounds every lookup with a timeout, answers same-currency
//! lookups locally and never caches: every exchange pays for a fresh rate.

mod fixed;
mod http;

pub use fixed::*;
pub use http::*;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{CurrencyCode, ExchangeRate};

/// Default bound on a single remote rate lookup.
pub const DEFAULT_RATE_TIMEOUT: Duration = Duration::from_secs(1);

/// A remote service quoting `to` units per one `from` unit.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Source name for logs (e.g. "http", "fixed")
    fn name(&self) -> &str;

    async fn fetch_rate(&self, from: &CurrencyCode, to: &CurrencyCode) -> anyhow::Result<Decimal>;
}

#[derive(Error, Debug)]
pub enum RateError {
    #[error("rate lookup timed out after {0:?}")]
    Timeout(Duration),

    #[error("rate source failed: {0:#}")]
    Source(anyhow::Error),

    #[error("rate source returned non-positive rate {0}")]
    NonPositive(Decimal),
}

/// Client side of the rate service.
#[derive(Clone)]
pub struct RateOracle {
    source: Arc<dyn RateSource>,
    timeout: Duration,
}

impl RateOracle {
    pub fn new(source: Arc<dyn RateSource>) -> Self {
        Self {
            source,
            timeout: DEFAULT_RATE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fetch the current `from`→`to` rate.
    ///
    /// A failed lookup is an error; there is no fallback rate.
    pub async fn get_rate(
        &self,
        from: &CurrencyCode,
        to: &CurrencyCode,
    ) -> Result<ExchangeRate, RateError> {
        if from == to {
            return Ok(ExchangeRate::identity(from.clone()));
        }

        let rate = match tokio::time::timeout(self.timeout, self.source.fetch_rate(from, to)).await
        {
            Ok(Ok(rate)) => rate,
            Ok(Err(e)) => {
                warn!(
                    source = self.source.name(),
                    %from,
                    %to,
                    error = %e,
                    "Rate lookup failed"
                );
                return Err(RateError::Source(e));
            }
            Err(_) => {
                warn!(
                    source = self.source.name(),
                    %from,
                    %to,
                    timeout = ?self.timeout,
                    "Rate lookup timed out"
                );
                return Err(RateError::Timeout(self.timeout));
            }
        };

        debug!(source = self.source.name(), %from, %to, %rate, "Rate fetched");
        ExchangeRate::new(from.clone(), to.clone(), rate).ok_or(RateError::NonPositive(rate))
    }
}
