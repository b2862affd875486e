//! Currency exchange as a debit followed by a credit.
//!
//! The store only locks one balance row per scope, so the two legs commit
//! separately. When the credit fails after the debit committed, the debit is
//! refunded; when the refund fails too, the caller gets a `PartialFailure`
//! carrying everything needed to reconcile by hand.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::{
    AccountId, CurrencyCode, DeltaRequest, ExchangeRate, Minor, MutationKind, MutationRecord,
    OperationId,
};
use crate::rates::RateOracle;

use super::{BalanceMutator, ErrorKind, LedgerError, PartialFailure};

pub const DEFAULT_COMPENSATION_ATTEMPTS: u32 = 3;
const COMPENSATION_BACKOFF: Duration = Duration::from_millis(50);

/// Result of a completed exchange
#[derive(Debug, Clone)]
pub struct ExchangeReceipt {
    pub operation_id: OperationId,
    pub rate: Decimal,
    pub withdrawn: Minor,
    pub deposited: Minor,
    pub debit: MutationRecord,
    pub credit: MutationRecord,
}

/// Orchestrates exchanges. Never touches balance rows itself; every change
/// goes through the [`BalanceMutator`].
#[derive(Clone)]
pub struct ExchangeCoordinator {
    mutator: Arc<dyn BalanceMutator>,
    oracle: RateOracle,
    compensation_attempts: u32,
    compensation_backoff: Duration,
}

/// Everything decided before money moves.
struct ExchangePlan {
    operation_id: OperationId,
    account: AccountId,
    rate: ExchangeRate,
    withdraw: Minor,
    deposit: Minor,
}

impl ExchangeCoordinator {
    pub fn new(mutator: Arc<dyn BalanceMutator>, oracle: RateOracle) -> Self {
        Self {
            mutator,
            oracle,
            compensation_attempts: DEFAULT_COMPENSATION_ATTEMPTS,
            compensation_backoff: COMPENSATION_BACKOFF,
        }
    }

    /// Total refund attempts before giving up (at least one).
    pub fn with_compensation_attempts(mut self, attempts: u32) -> Self {
        self.compensation_attempts = attempts.max(1);
        self
    }

    pub fn with_compensation_backoff(mut self, backoff: Duration) -> Self {
        self.compensation_backoff = backoff;
        self
    }

    /// Exchange `amount` minor units of `from` into `to` at the current rate.
    pub async fn exchange(
        &self,
        account: AccountId,
        from: &CurrencyCode,
        to: &CurrencyCode,
        amount: Minor,
    ) -> Result<ExchangeReceipt, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::invalid("exchange amount must be positive"));
        }
        if from == to {
            return Err(LedgerError::invalid(format!(
                "cannot exchange {} into itself",
                from
            )));
        }

        // No money has moved yet; a missing rate simply aborts.
        let rate = self
            .oracle
            .get_rate(from, to)
            .await
            .map_err(|e| LedgerError::RateUnavailable {
                from: from.clone(),
                to: to.clone(),
                reason: e.to_string(),
            })?;

        let deposit = rate.convert(amount).ok_or_else(|| {
            LedgerError::invalid(format!("{} {} overflows at rate {}", amount, from, rate.rate))
        })?;
        if deposit == 0 {
            return Err(LedgerError::invalid(format!(
                "{} {} is worth less than one minor unit of {} at rate {}",
                amount, from, to, rate.rate
            )));
        }

        let plan = ExchangePlan {
            operation_id: Uuid::new_v4(),
            account,
            rate,
            withdraw: amount,
            deposit,
        };

        // Past this point the debit may commit; run to the end even if the
        // caller goes away, so a committed debit is always credited or refunded.
        let this = self.clone();
        tokio::spawn(async move { this.settle(plan).await })
            .await
            .map_err(|e| LedgerError::task_failed(e, "exchange"))?
    }

    async fn settle(&self, plan: ExchangePlan) -> Result<ExchangeReceipt, LedgerError> {
        let debit = self
            .mutator
            .apply_delta(
                DeltaRequest::new(
                    plan.account,
                    plan.rate.from.clone(),
                    -plan.withdraw,
                    MutationKind::ExchangeDebit,
                )
                .within(plan.operation_id),
            )
            .await?;

        let credit = self
            .mutator
            .apply_delta(
                DeltaRequest::new(
                    plan.account,
                    plan.rate.to.clone(),
                    plan.deposit,
                    MutationKind::ExchangeCredit,
                )
                .within(plan.operation_id),
            )
            .await;

        match credit {
            Ok(credit) => {
                info!(
                    operation = %plan.operation_id,
                    account = %plan.account,
                    from = %plan.rate.from,
                    to = %plan.rate.to,
                    rate = %plan.rate.rate,
                    withdrawn = plan.withdraw,
                    deposited = plan.deposit,
                    "Exchange completed"
                );
                Ok(ExchangeReceipt {
                    operation_id: plan.operation_id,
                    rate: plan.rate.rate,
                    withdrawn: plan.withdraw,
                    deposited: plan.deposit,
                    debit,
                    credit,
                })
            }
            Err(deposit_error) => {
                warn!(
                    operation = %plan.operation_id,
                    account = %plan.account,
                    error = %deposit_error,
                    "Exchange credit failed, refunding debit"
                );
                Err(self.compensate(&plan, &debit, deposit_error).await)
            }
        }
    }

    /// Refund the debit. Returns the error the caller should see: the original
    /// credit failure when the refund lands, `PartialFailure` when it doesn't.
    async fn compensate(
        &self,
        plan: &ExchangePlan,
        debit: &MutationRecord,
        deposit_error: LedgerError,
    ) -> LedgerError {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let refund = DeltaRequest::new(
                plan.account,
                plan.rate.from.clone(),
                plan.withdraw,
                MutationKind::Compensation,
            )
            .within(plan.operation_id);

            match self.mutator.apply_delta(refund).await {
                Ok(record) => {
                    warn!(
                        operation = %plan.operation_id,
                        account = %plan.account,
                        refund = %record.id,
                        attempt,
                        "Exchange rolled back"
                    );
                    return deposit_error;
                }
                // Only retry failures that guarantee nothing was written;
                // anything else could mean a refund already landed.
                Err(e)
                    if e.kind() == ErrorKind::TransientUnavailable
                        && attempt < self.compensation_attempts =>
                {
                    warn!(
                        operation = %plan.operation_id,
                        attempt,
                        error = %e,
                        "Refund attempt failed, retrying"
                    );
                    tokio::time::sleep(self.compensation_backoff * attempt).await;
                }
                Err(e) => {
                    let report = PartialFailure {
                        operation_id: plan.operation_id,
                        account: plan.account,
                        from_currency: plan.rate.from.clone(),
                        to_currency: plan.rate.to.clone(),
                        withdrawn: plan.withdraw,
                        deposit_amount: plan.deposit,
                        debit_mutation: debit.id,
                        deposit_error: deposit_error.to_string(),
                        compensation_error: e.to_string(),
                        compensation_attempts: attempt,
                    };
                    error!(
                        operation = %report.operation_id,
                        account = %report.account,
                        from = %report.from_currency,
                        to = %report.to_currency,
                        withdrawn = report.withdrawn,
                        deposit_amount = report.deposit_amount,
                        debit_mutation = %report.debit_mutation,
                        deposit_error = %report.deposit_error,
                        compensation_error = %report.compensation_error,
                        attempts = attempt,
                        "Exchange partially applied; manual reconciliation required"
                    );
                    return LedgerError::PartialFailure(Box::new(report));
                }
            }
        }
    }
}
