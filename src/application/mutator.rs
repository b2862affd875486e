//! Balance mutation under the store's row lock.
//!
//! The lock taken by [`BalanceStore::lock_balance`] is the only thing that
//! serializes writers, so several processes may share one database safely.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::domain::{DeltaRequest, MutationRecord};
use crate::storage::BalanceStore;

use super::LedgerError;

/// Applies a signed delta to one (account, currency) balance.
///
/// The exchange coordinator only talks to balances through this trait.
#[async_trait]
pub trait BalanceMutator: Send + Sync {
    /// Apply `request.delta` and return the journal record, whose
    /// `resulting_balance` is the new amount.
    ///
    /// Fails with `InvalidArgument` for a zero delta and `InsufficientFunds`
    /// when the result would be negative; in both cases nothing is written.
    async fn apply_delta(&self, request: DeltaRequest) -> Result<MutationRecord, LedgerError>;
}

/// [`BalanceMutator`] backed by a [`BalanceStore`].
#[derive(Clone)]
pub struct StoreMutator {
    store: BalanceStore,
}

impl StoreMutator {
    pub fn new(store: BalanceStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl BalanceMutator for StoreMutator {
    async fn apply_delta(&self, request: DeltaRequest) -> Result<MutationRecord, LedgerError> {
        if request.delta == 0 {
            return Err(LedgerError::invalid("delta must be non-zero"));
        }

        // The scope runs on its own task: if the caller is dropped mid-flight
        // the transaction still reaches commit or rollback.
        let store = self.store.clone();
        tokio::spawn(apply_locked(store, request))
            .await
            .map_err(|e| LedgerError::task_failed(e, "balance mutation"))?
    }
}

async fn apply_locked(
    store: BalanceStore,
    request: DeltaRequest,
) -> Result<MutationRecord, LedgerError> {
    let context = format!(
        "apply {} to {} for account {}",
        request.delta, request.currency, request.account
    );

    let mut lock = store
        .lock_balance(request.account, &request.currency)
        .await
        .map_err(|e| LedgerError::from_store(context.as_str(), e))?;

    let current = lock.amount();
    let new_amount = match current.checked_add(request.delta) {
        Some(amount) if amount >= 0 => amount,
        outcome => {
            if let Err(e) = lock.rollback().await {
                warn!(
                    account = %request.account,
                    currency = %request.currency,
                    error = %e,
                    "Rollback after rejected mutation failed"
                );
            }
            return Err(match outcome {
                None => LedgerError::invalid(format!(
                    "{} would overflow balance {}",
                    request.delta, current
                )),
                Some(_) => {
                    debug!(
                        account = %request.account,
                        currency = %request.currency,
                        balance = current,
                        delta = request.delta,
                        "Insufficient funds"
                    );
                    LedgerError::InsufficientFunds {
                        account: request.account,
                        currency: request.currency,
                        balance: current,
                        delta: request.delta,
                    }
                }
            });
        }
    };

    let record = MutationRecord::applied(&request, new_amount);
    // A failed write drops the lock, which rolls the scope back.
    lock.write(&record)
        .await
        .map_err(|e| LedgerError::from_store(context.as_str(), e))?;
    lock.commit()
        .await
        .map_err(|e| LedgerError::from_store(context.as_str(), e))?;

    info!(
        mutation = %record.id,
        operation = %record.operation_id,
        kind = %record.kind,
        account = %record.account,
        currency = %record.currency,
        delta = record.delta,
        balance = record.resulting_balance,
        "Balance updated"
    );
    Ok(record)
}
