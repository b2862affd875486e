use thiserror::Error;

use crate::domain::{AccountId, CurrencyCode, Minor, MutationId, OperationId};
use crate::storage::StoreError;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(
        "No balance{} for account {account}",
        .currency.as_ref().map(|c| format!(" in {}", c)).unwrap_or_default()
    )]
    NotFound {
        account: AccountId,
        currency: Option<CurrencyCode>,
    },

    #[error(
        "Insufficient funds in {currency} for account {account}: balance {balance}, delta {delta}"
    )]
    InsufficientFunds {
        account: AccountId,
        currency: CurrencyCode,
        balance: Minor,
        delta: Minor,
    },

    #[error("Exchange rate {from}->{to} unavailable: {reason}")]
    RateUnavailable {
        from: CurrencyCode,
        to: CurrencyCode,
        reason: String,
    },

    /// Failed before the commit was attempted, so nothing was written and the
    /// whole operation may be retried. A failed commit is `Internal` instead.
    #[error("Store unavailable while trying to {context}")]
    TransientUnavailable {
        context: String,
        #[source]
        source: StoreError,
    },

    /// An exchange debit committed and could not be refunded.
    #[error("{0}")]
    PartialFailure(Box<PartialFailure>),

    #[error("Internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

/// Coarse classification of [`LedgerError`] for callers mapping errors onto
/// their own transport (status codes, exit codes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    InsufficientFunds,
    RateUnavailable,
    TransientUnavailable,
    PartialFailure,
    Internal,
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            LedgerError::NotFound { .. } => ErrorKind::NotFound,
            LedgerError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            LedgerError::RateUnavailable { .. } => ErrorKind::RateUnavailable,
            LedgerError::TransientUnavailable { .. } => ErrorKind::TransientUnavailable,
            LedgerError::PartialFailure(_) => ErrorKind::PartialFailure,
            LedgerError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// True when retrying the whole operation is safe and may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::RateUnavailable | ErrorKind::TransientUnavailable
        )
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        LedgerError::InvalidArgument(message.into())
    }

    pub(crate) fn task_failed(err: tokio::task::JoinError, what: &str) -> Self {
        LedgerError::Internal(anyhow::Error::new(err).context(format!("{} task failed", what)))
    }

    /// Wrap a store failure with the operation it interrupted.
    pub(crate) fn from_store(context: impl Into<String>, err: StoreError) -> Self {
        match err {
            StoreError::NotFound { account, currency } => LedgerError::NotFound {
                account,
                currency: Some(currency),
            },
            err if err.is_transient() => LedgerError::TransientUnavailable {
                context: context.into(),
                source: err,
            },
            err => LedgerError::Internal(
                anyhow::Error::new(err).context(format!("failed to {}", context.into())),
            ),
        }
    }
}

/// Everything needed to reconcile an exchange by hand: the debit committed,
/// the credit failed, and the refund failed too.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialFailure {
    pub operation_id: OperationId,
    pub account: AccountId,
    pub from_currency: CurrencyCode,
    pub to_currency: CurrencyCode,
    pub withdrawn: Minor,
    pub deposit_amount: Minor,
    pub debit_mutation: MutationId,
    pub deposit_error: String,
    pub compensation_error: String,
    pub compensation_attempts: u32,
}

impl std::fmt::Display for PartialFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Exchange {} left account {} debited {} {} (mutation {}) without crediting {} {}: \
             deposit failed ({}), refund failed after {} attempt(s) ({})",
            self.operation_id,
            self.account,
            self.withdrawn,
            self.from_currency,
            self.debit_mutation,
            self.deposit_amount,
            self.to_currency,
            self.deposit_error,
            self.compensation_attempts,
            self.compensation_error
        )
    }
}
