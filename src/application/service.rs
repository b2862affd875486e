use std::sync::Arc;

use anyhow::Context;

use crate::config::LedgerConfig;
use crate::domain::{
    AccountId, BalanceMap, CurrencyCode, DeltaRequest, ExchangeRate, Minor, MutationKind,
    MutationRecord, OperationId, to_balance_map,
};
use crate::rates::{FixedRates, HttpRateSource, RateOracle, RateSource};
use crate::storage::BalanceStore;

use super::{
    BalanceMutator, DEFAULT_COMPENSATION_ATTEMPTS, ExchangeCoordinator, ExchangeReceipt,
    LedgerError, StoreMutator,
};

/// Application service providing the public ledger operations.
/// Handlers (CLI, HTTP, gRPC) call this with an already-authenticated account.
pub struct LedgerService {
    store: BalanceStore,
    mutator: Arc<dyn BalanceMutator>,
    oracle: RateOracle,
    exchanger: ExchangeCoordinator,
    currencies: Vec<CurrencyCode>,
    compensation_attempts: u32,
}

impl LedgerService {
    /// Create a service over `store`, mutating balances through the store's lock.
    pub fn new(store: BalanceStore, oracle: RateOracle, currencies: Vec<CurrencyCode>) -> Self {
        let mutator: Arc<dyn BalanceMutator> = Arc::new(StoreMutator::new(store.clone()));
        let exchanger = ExchangeCoordinator::new(mutator.clone(), oracle.clone());
        Self {
            store,
            mutator,
            oracle,
            exchanger,
            currencies,
            compensation_attempts: DEFAULT_COMPENSATION_ATTEMPTS,
        }
    }

    /// Replace the balance mutator (e.g. to wrap it with instrumentation).
    pub fn with_mutator(mut self, mutator: Arc<dyn BalanceMutator>) -> Self {
        self.mutator = mutator;
        self.rebuild_exchanger();
        self
    }

    pub fn with_compensation_attempts(mut self, attempts: u32) -> Self {
        self.compensation_attempts = attempts;
        self.rebuild_exchanger();
        self
    }

    fn rebuild_exchanger(&mut self) {
        self.exchanger = ExchangeCoordinator::new(self.mutator.clone(), self.oracle.clone())
            .with_compensation_attempts(self.compensation_attempts);
    }

    /// Initialize the database at `config.database` and wire the configured
    /// rate source.
    pub async fn from_config(config: &LedgerConfig) -> Result<Self, LedgerError> {
        config.validate()?;
        let db_url = format!("sqlite:{}?mode=rwc", config.database);
        let store = BalanceStore::init(&db_url).await?;

        let source: Arc<dyn RateSource> = match &config.rate_service_url {
            Some(url) => Arc::new(HttpRateSource::new(url, config.rate_timeout())?),
            None => Arc::new(FixedRates::from_entries(
                config.fixed_rates.iter().map(String::as_str),
            )?),
        };
        let oracle = RateOracle::new(source).with_timeout(config.rate_timeout());

        Ok(Self::new(store, oracle, config.currencies.clone())
            .with_compensation_attempts(config.compensation_attempts))
    }

    pub fn currencies(&self) -> &[CurrencyCode] {
        &self.currencies
    }

    fn ensure_supported(&self, currency: &CurrencyCode) -> Result<(), LedgerError> {
        if self.currencies.contains(currency) {
            Ok(())
        } else {
            Err(LedgerError::invalid(format!(
                "unsupported currency {}",
                currency
            )))
        }
    }

    // ========================
    // Accounts
    // ========================

    /// Create a zero balance in every supported currency the account lacks.
    /// Safe to call again; existing balances are left alone.
    pub async fn provision_account(&self, account: AccountId) -> Result<BalanceMap, LedgerError> {
        self.store
            .provision_account(account, &self.currencies)
            .await
            .with_context(|| format!("Failed to provision account {}", account))?;
        self.get_balances(account).await
    }

    /// All balances of an account, zero balances included.
    pub async fn get_balances(&self, account: AccountId) -> Result<BalanceMap, LedgerError> {
        let balances = self
            .store
            .read_balances(account)
            .await
            .map_err(|e| LedgerError::from_store(format!("read balances of {}", account), e))?;

        if balances.is_empty() {
            return Err(LedgerError::NotFound {
                account,
                currency: None,
            });
        }
        Ok(to_balance_map(balances))
    }

    // ========================
    // Mutations
    // ========================

    pub async fn deposit(
        &self,
        account: AccountId,
        currency: &CurrencyCode,
        amount: Minor,
    ) -> Result<MutationRecord, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::invalid("deposit amount must be positive"));
        }
        self.ensure_supported(currency)?;

        self.mutator
            .apply_delta(DeltaRequest::new(
                account,
                currency.clone(),
                amount,
                MutationKind::Deposit,
            ))
            .await
    }

    pub async fn withdraw(
        &self,
        account: AccountId,
        currency: &CurrencyCode,
        amount: Minor,
    ) -> Result<MutationRecord, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::invalid("withdrawal amount must be positive"));
        }
        self.ensure_supported(currency)?;

        self.mutator
            .apply_delta(DeltaRequest::new(
                account,
                currency.clone(),
                -amount,
                MutationKind::Withdrawal,
            ))
            .await
    }

    /// Exchange `amount` of `from` into `to` at the rate service's current rate.
    pub async fn exchange(
        &self,
        account: AccountId,
        from: &CurrencyCode,
        to: &CurrencyCode,
        amount: Minor,
    ) -> Result<ExchangeReceipt, LedgerError> {
        self.ensure_supported(from)?;
        self.ensure_supported(to)?;
        self.exchanger.exchange(account, from, to, amount).await
    }

    // ========================
    // Rates
    // ========================

    /// Fresh quotes from `base` into every other supported currency.
    pub async fn exchange_rates(
        &self,
        base: &CurrencyCode,
    ) -> Result<Vec<ExchangeRate>, LedgerError> {
        self.ensure_supported(base)?;

        let mut quotes = Vec::new();
        for target in self.currencies.iter().filter(|c| *c != base) {
            let quote = self.oracle.get_rate(base, target).await.map_err(|e| {
                LedgerError::RateUnavailable {
                    from: base.clone(),
                    to: target.clone(),
                    reason: e.to_string(),
                }
            })?;
            quotes.push(quote);
        }
        Ok(quotes)
    }

    // ========================
    // Journal
    // ========================

    /// Mutations applied to an account, newest first.
    pub async fn history(
        &self,
        account: AccountId,
        limit: Option<usize>,
    ) -> Result<Vec<MutationRecord>, LedgerError> {
        Ok(self.store.list_mutations(account, limit).await?)
    }

    /// Mutations written by one operation, in application order.
    pub async fn operation(
        &self,
        operation_id: OperationId,
    ) -> Result<Vec<MutationRecord>, LedgerError> {
        Ok(self.store.list_operation(operation_id).await?)
    }
}
