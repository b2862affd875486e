//! Ledger configuration
//!
//! Defaults, overlaid by an optional JSON settings file, overlaid by CLI
//! flags and environment variables:
//! ```json
//! {
//!   "database": "valuta.db",
//!   "currencies": ["USD", "EUR", "RUB"],
//!   "rateServiceUrl": "http://rates:8080",
//!   "rateTimeoutMs": 1000,
//!   "fixedRates": ["USD:EUR=0.90"],
//!   "compensationAttempts": 3
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::application::DEFAULT_COMPENSATION_ATTEMPTS;
use crate::domain::CurrencyCode;
use crate::rates::DEFAULT_RATE_TIMEOUT;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LedgerConfig {
    /// SQLite database file
    pub database: String,
    /// Currencies every account is provisioned with
    pub currencies: Vec<CurrencyCode>,
    /// Base URL of the rate service; when unset, `fixed_rates` are used
    pub rate_service_url: Option<String>,
    pub rate_timeout_ms: u64,
    /// Offline rate table entries, `FROM:TO=RATE`
    pub fixed_rates: Vec<String>,
    pub compensation_attempts: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database: "valuta.db".to_string(),
            currencies: ["USD", "EUR", "RUB"]
                .into_iter()
                .filter_map(|code| CurrencyCode::parse(code).ok())
                .collect(),
            rate_service_url: None,
            rate_timeout_ms: DEFAULT_RATE_TIMEOUT.as_millis() as u64,
            fixed_rates: Vec::new(),
            compensation_attempts: DEFAULT_COMPENSATION_ATTEMPTS,
        }
    }
}

impl LedgerConfig {
    /// Load settings from a JSON file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn rate_timeout(&self) -> Duration {
        Duration::from_millis(self.rate_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.currencies.is_empty() {
            anyhow::bail!("at least one currency must be configured");
        }
        if self.rate_timeout_ms == 0 {
            anyhow::bail!("rate timeout must be positive");
        }
        if self.compensation_attempts == 0 {
            anyhow::bail!("compensation attempts must be at least 1");
        }
        Ok(())
    }
}
