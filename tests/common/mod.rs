// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use tempfile::TempDir;
use valuta::application::{BalanceMutator, LedgerError, LedgerService, StoreMutator};
use valuta::domain::{
    AccountId, CurrencyCode, DeltaRequest, Minor, MutationKind, MutationRecord,
};
use valuta::rates::{FixedRates, RateOracle, RateSource};
use valuta::storage::{BalanceStore, StoreError};

pub fn code(s: &str) -> CurrencyCode {
    CurrencyCode::parse(s).unwrap()
}

pub fn currencies() -> Vec<CurrencyCode> {
    vec![code("USD"), code("EUR"), code("RUB")]
}

/// Rates used by most tests
pub fn default_rates() -> FixedRates {
    FixedRates::from_entries([
        "USD:EUR=0.90",
        "EUR:USD=1.10",
        "USD:RUB=92.50",
        "RUB:USD=0.0108",
    ])
    .unwrap()
}

/// Helper to create a store over a temporary database
pub async fn test_store() -> Result<(BalanceStore, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let store = BalanceStore::init(&format!("sqlite:{}?mode=rwc", db_path.display())).await?;
    Ok((store, temp_dir))
}

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(LedgerService, TempDir)> {
    test_service_with_rates(Arc::new(default_rates())).await
}

pub async fn test_service_with_rates(
    rates: Arc<dyn RateSource>,
) -> Result<(LedgerService, TempDir)> {
    let (store, temp_dir) = test_store().await?;
    let oracle = RateOracle::new(rates).with_timeout(Duration::from_millis(200));
    Ok((LedgerService::new(store, oracle, currencies()), temp_dir))
}

/// Service whose mutations go through a [`FaultyMutator`]
pub async fn faulty_service() -> Result<(LedgerService, Arc<FaultyMutator>, TempDir)> {
    let (store, temp_dir) = test_store().await?;
    let faulty = Arc::new(FaultyMutator::new(store.clone()));
    let oracle = RateOracle::new(Arc::new(default_rates()));
    let service = LedgerService::new(store, oracle, currencies()).with_mutator(faulty.clone());
    Ok((service, faulty, temp_dir))
}

/// Provision a fresh account and deposit the given amounts.
pub async fn funded_account(
    service: &LedgerService,
    funds: &[(&str, Minor)],
) -> Result<AccountId> {
    let account = uuid::Uuid::new_v4();
    service.provision_account(account).await?;
    for (currency, amount) in funds {
        service.deposit(account, &code(currency), *amount).await?;
    }
    Ok(account)
}

pub async fn balance_of(
    service: &LedgerService,
    account: AccountId,
    currency: &str,
) -> Result<Minor> {
    Ok(service.get_balances(account).await?[&code(currency)])
}

/// How a [`FaultyMutator`] misbehaves for one mutation kind.
#[derive(Clone, Copy)]
enum Fault {
    /// Fail before touching the store, as if the lock could not be taken.
    Transient,
    /// Apply the mutation, then report that the commit outcome is unknown.
    AfterCommit,
}

/// Mutator that injects failures or delays for chosen mutation kinds before
/// passing requests through to the store.
pub struct FaultyMutator {
    inner: StoreMutator,
    failures: Mutex<HashMap<MutationKind, (Fault, u32)>>,
    delays: Mutex<HashMap<MutationKind, Duration>>,
    calls: Mutex<HashMap<MutationKind, u32>>,
}

impl FaultyMutator {
    pub fn new(store: BalanceStore) -> Self {
        Self {
            inner: StoreMutator::new(store),
            failures: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Fail the next `times` requests of `kind` with a transient store error.
    pub fn fail(&self, kind: MutationKind, times: u32) {
        self.failures
            .lock()
            .unwrap()
            .insert(kind, (Fault::Transient, times));
    }

    /// Commit the next `times` requests of `kind` but report the commit as failed.
    pub fn fail_after_commit(&self, kind: MutationKind, times: u32) {
        self.failures
            .lock()
            .unwrap()
            .insert(kind, (Fault::AfterCommit, times));
    }

    /// Sleep before applying every request of `kind`.
    pub fn delay(&self, kind: MutationKind, delay: Duration) {
        self.delays.lock().unwrap().insert(kind, delay);
    }

    pub fn calls(&self, kind: MutationKind) -> u32 {
        self.calls.lock().unwrap().get(&kind).copied().unwrap_or(0)
    }

    fn take_fault(&self, kind: MutationKind) -> Option<Fault> {
        let mut failures = self.failures.lock().unwrap();
        match failures.get_mut(&kind) {
            Some((fault, remaining)) if *remaining > 0 => {
                *remaining -= 1;
                Some(*fault)
            }
            _ => None,
        }
    }
}

#[async_trait]
impl BalanceMutator for FaultyMutator {
    async fn apply_delta(&self, request: DeltaRequest) -> Result<MutationRecord, LedgerError> {
        *self.calls.lock().unwrap().entry(request.kind).or_insert(0) += 1;

        let delay = self.delays.lock().unwrap().get(&request.kind).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let context = format!("apply {} to {}", request.delta, request.currency);
        match self.take_fault(request.kind) {
            Some(Fault::Transient) => Err(LedgerError::TransientUnavailable {
                context,
                source: StoreError::Unavailable(sqlx::Error::PoolTimedOut),
            }),
            Some(Fault::AfterCommit) => {
                self.inner.apply_delta(request).await?;
                Err(LedgerError::Internal(
                    anyhow::Error::new(StoreError::CommitUncertain(sqlx::Error::PoolTimedOut))
                        .context(context),
                ))
            }
            None => self.inner.apply_delta(request).await,
        }
    }
}

/// Rate source that never answers in time.
pub struct StalledRates;

#[async_trait]
impl RateSource for StalledRates {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn fetch_rate(&self, _: &CurrencyCode, _: &CurrencyCode) -> anyhow::Result<Decimal> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Decimal::from_str("1")?)
    }
}
