use std::collections::HashMap;
use std::str::FromStr;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::CurrencyCode;

use super::RateSource;

/// In-process rate table. Useful offline and in tests; quotes only the pairs
/// it was given and never derives inverse or cross rates.
#[derive(Debug, Clone, Default)]
pub struct FixedRates {
    rates: HashMap<(CurrencyCode, CurrencyCode), Decimal>,
}

impl FixedRates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rate(mut self, from: CurrencyCode, to: CurrencyCode, rate: Decimal) -> Self {
        self.rates.insert((from, to), rate);
        self
    }

    /// Parse entries of the form `USD:EUR=0.90`.
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a str>) -> anyhow::Result<Self> {
        let mut table = Self::new();
        for entry in entries {
            let (from, to, rate) = parse_rate_entry(entry)?;
            table = table.with_rate(from, to, rate);
        }
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

#[async_trait]
impl RateSource for FixedRates {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn fetch_rate(&self, from: &CurrencyCode, to: &CurrencyCode) -> anyhow::Result<Decimal> {
        self.rates
            .get(&(from.clone(), to.clone()))
            .copied()
            .ok_or_else(|| anyhow!("no rate configured for {}->{}", from, to))
    }
}

/// Parse `FROM:TO=RATE`, e.g. `USD:EUR=0.90`.
pub fn parse_rate_entry(entry: &str) -> anyhow::Result<(CurrencyCode, CurrencyCode, Decimal)> {
    let (pair, rate) = entry
        .split_once('=')
        .ok_or_else(|| anyhow!("expected FROM:TO=RATE, got {:?}", entry))?;
    let (from, to) = pair
        .split_once(':')
        .ok_or_else(|| anyhow!("expected FROM:TO=RATE, got {:?}", entry))?;

    let rate = Decimal::from_str(rate.trim())
        .with_context(|| format!("invalid rate in {:?}", entry))?;
    if rate <= Decimal::ZERO {
        anyhow::bail!("rate must be positive in {:?}", entry);
    }

    Ok((CurrencyCode::parse(from)?, CurrencyCode::parse(to)?, rate))
}
