use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::application::LedgerService;
use crate::domain::{AccountId, BalanceMap, MINOR_EXPONENT, format_minor};

/// Balances of one account at a point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub account: AccountId,
    pub balances: BalanceMap,
}

/// Writes account data out for reconciliation and reporting.
pub struct Exporter<'a> {
    service: &'a LedgerService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a LedgerService) -> Self {
        Self { service }
    }

    /// Export the account's mutation journal (oldest first) as CSV.
    pub async fn export_history_csv<W: Write>(
        &self,
        account: AccountId,
        writer: W,
    ) -> Result<usize> {
        let mut mutations = self.service.history(account, None).await?;
        mutations.reverse();
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "id",
            "operation_id",
            "recorded_at",
            "kind",
            "currency",
            "delta_minor",
            "resulting_balance_minor",
        ])?;

        for mutation in &mutations {
            csv_writer.write_record(&[
                mutation.id.to_string(),
                mutation.operation_id.to_string(),
                mutation.recorded_at.to_rfc3339(),
                mutation.kind.as_str().to_string(),
                mutation.currency.to_string(),
                mutation.delta.to_string(),
                mutation.resulting_balance.to_string(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(mutations.len())
    }

    /// Export current balances as CSV, one row per currency.
    pub async fn export_balances_csv<W: Write>(
        &self,
        account: AccountId,
        writer: W,
    ) -> Result<usize> {
        let balances = self.service.get_balances(account).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["currency", "balance_minor", "balance"])?;
        for (currency, amount) in &balances {
            csv_writer.write_record(&[
                currency.to_string(),
                amount.to_string(),
                format_minor(*amount, MINOR_EXPONENT),
            ])?;
        }

        csv_writer.flush()?;
        Ok(balances.len())
    }

    /// Export current balances as a JSON snapshot.
    pub async fn export_balances_json<W: Write>(
        &self,
        account: AccountId,
        mut writer: W,
    ) -> Result<BalanceSnapshot> {
        let snapshot = BalanceSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            account,
            balances: self.service.get_balances(account).await?,
        };

        let json = serde_json::to_string_pretty(&snapshot)?;
        writer.write_all(json.as_bytes())?;
        writer.flush()?;

        Ok(snapshot)
    }
}
