use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::domain::{
    AccountId, Balance, CurrencyCode, Minor, MutationKind, MutationRecord, OperationId,
};

use super::{MIGRATION_001_BALANCES, StoreError};

/// How long a writer waits for the lock before the store reports itself unavailable.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_CONNECTIONS: u32 = 8;

/// Durable table of (account, currency) balances plus the mutation journal.
///
/// Rows are only ever changed through a [`BalanceLock`]. Reads outside a lock
/// see the last committed state.
#[derive(Clone)]
pub struct BalanceStore {
    pool: SqlitePool,
}

/// An open write scope over one balance row.
///
/// While the lock lives, no other scope can mutate the row. Ending it with
/// [`commit`](Self::commit) publishes the write; [`rollback`](Self::rollback)
/// or dropping it discards everything written inside the scope.
pub struct BalanceLock {
    tx: Transaction<'static, Sqlite>,
    account: AccountId,
    currency: CurrencyCode,
    amount: Minor,
}

impl BalanceStore {
    /// Create a store over an existing SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database.
    /// Use `?mode=rwc` in the URL to create the file if it doesn't exist.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .context("Invalid database URL")?
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_BALANCES)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let store = Self::connect(database_url).await?;
        store.migrate().await?;
        Ok(store)
    }

    // ========================
    // Provisioning
    // ========================

    /// Create a zero balance for each currency the account doesn't hold yet.
    /// Returns how many rows were created.
    pub async fn provision_account(
        &self,
        account: AccountId,
        currencies: &[CurrencyCode],
    ) -> Result<u64> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin provisioning")?;

        let mut created = 0;
        for currency in currencies {
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO balances (account_id, currency, amount, created_at, updated_at)
                VALUES (?, ?, 0, ?, ?)
                "#,
            )
            .bind(account.to_string())
            .bind(currency.as_str())
            .bind(&now)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to provision {} balance", currency))?;
            created += result.rows_affected();
        }

        tx.commit().await.context("Failed to commit provisioning")?;
        Ok(created)
    }

    // ========================
    // Locked mutation
    // ========================

    /// Open a write scope on the (account, currency) row and read its amount.
    ///
    /// Waits up to the busy timeout for a concurrent scope to finish.
    pub async fn lock_balance(
        &self,
        account: AccountId,
        currency: &CurrencyCode,
    ) -> Result<BalanceLock, StoreError> {
        // IMMEDIATE takes the write lock up front, so two scopes can never
        // both read the same amount and then race to write it.
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;

        let row = sqlx::query("SELECT amount FROM balances WHERE account_id = ? AND currency = ?")
            .bind(account.to_string())
            .bind(currency.as_str())
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Err(StoreError::NotFound {
                account,
                currency: currency.clone(),
            });
        };

        Ok(BalanceLock {
            tx,
            account,
            currency: currency.clone(),
            amount: row.try_get("amount")?,
        })
    }

    // ========================
    // Unlocked reads
    // ========================

    /// Snapshot of all balance rows for an account, ordered by currency.
    pub async fn read_balances(&self, account: AccountId) -> Result<Vec<Balance>, StoreError> {
        let rows = sqlx::query(
            "SELECT currency, amount FROM balances WHERE account_id = ? ORDER BY currency",
        )
        .bind(account.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<Balance, StoreError> {
                let currency: String = row.try_get("currency")?;
                Ok(Balance {
                    account,
                    currency: CurrencyCode::parse(&currency)
                        .map_err(|e| StoreError::Corrupt(e.to_string()))?,
                    amount: row.try_get("amount")?,
                })
            })
            .collect()
    }

    /// Journal entries for an account, newest first.
    pub async fn list_mutations(
        &self,
        account: AccountId,
        limit: Option<usize>,
    ) -> Result<Vec<MutationRecord>> {
        let mut query = String::from(
            "SELECT id, operation_id, kind, account_id, currency, delta, resulting_balance, recorded_at \
             FROM balance_mutations WHERE account_id = ? ORDER BY rowid DESC",
        );
        if let Some(lim) = limit {
            query.push_str(&format!(" LIMIT {}", lim));
        }

        let rows = sqlx::query(&query)
            .bind(account.to_string())
            .fetch_all(&self.pool)
            .await
            .context("Failed to list mutations")?;

        rows.iter().map(Self::row_to_mutation).collect()
    }

    /// Journal entries written by one operation, in the order they were applied.
    pub async fn list_operation(&self, operation_id: OperationId) -> Result<Vec<MutationRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, operation_id, kind, account_id, currency, delta, resulting_balance, recorded_at
            FROM balance_mutations
            WHERE operation_id = ?
            ORDER BY rowid
            "#,
        )
        .bind(operation_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list operation mutations")?;

        rows.iter().map(Self::row_to_mutation).collect()
    }

    fn row_to_mutation(row: &SqliteRow) -> Result<MutationRecord> {
        let id_str: String = row.get("id");
        let operation_str: String = row.get("operation_id");
        let kind_str: String = row.get("kind");
        let account_str: String = row.get("account_id");
        let currency_str: String = row.get("currency");
        let recorded_at_str: String = row.get("recorded_at");

        Ok(MutationRecord {
            id: Uuid::parse_str(&id_str).context("Invalid mutation ID")?,
            operation_id: Uuid::parse_str(&operation_str).context("Invalid operation ID")?,
            kind: MutationKind::from_str(&kind_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid mutation kind: {}", kind_str))?,
            account: Uuid::parse_str(&account_str).context("Invalid account ID")?,
            currency: CurrencyCode::parse(&currency_str)?,
            delta: row.get("delta"),
            resulting_balance: row.get("resulting_balance"),
            recorded_at: DateTime::parse_from_rfc3339(&recorded_at_str)
                .context("Invalid recorded_at timestamp")?
                .with_timezone(&Utc),
        })
    }
}

impl BalanceLock {
    /// Amount as of lock acquisition, or as last written inside this scope.
    pub fn amount(&self) -> Minor {
        self.amount
    }

    pub fn account(&self) -> AccountId {
        self.account
    }

    pub fn currency(&self) -> &CurrencyCode {
        &self.currency
    }

    /// Write `record.resulting_balance` to the locked row and journal the record.
    /// Nothing is visible to other readers until [`commit`](Self::commit).
    pub async fn write(&mut self, record: &MutationRecord) -> Result<(), StoreError> {
        if record.account != self.account || record.currency != self.currency {
            return Err(StoreError::Corrupt(format!(
                "mutation for {}/{} written under lock of {}/{}",
                record.account, record.currency, self.account, self.currency
            )));
        }

        sqlx::query(
            "UPDATE balances SET amount = ?, updated_at = ? WHERE account_id = ? AND currency = ?",
        )
        .bind(record.resulting_balance)
        .bind(record.recorded_at.to_rfc3339())
        .bind(self.account.to_string())
        .bind(self.currency.as_str())
        .execute(&mut *self.tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO balance_mutations (id, operation_id, kind, account_id, currency, delta, resulting_balance, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.operation_id.to_string())
        .bind(record.kind.as_str())
        .bind(record.account.to_string())
        .bind(record.currency.as_str())
        .bind(record.delta)
        .bind(record.resulting_balance)
        .bind(record.recorded_at.to_rfc3339())
        .execute(&mut *self.tx)
        .await?;

        self.amount = record.resulting_balance;
        Ok(())
    }

    /// Publish the scope. A failure here is reported as
    /// [`StoreError::CommitUncertain`] whatever its cause.
    pub async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(StoreError::CommitUncertain)
    }

    pub async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
