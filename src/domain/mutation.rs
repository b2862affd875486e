use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, CurrencyCode, Minor};

pub type MutationId = Uuid;

/// Groups the mutations issued by one public operation. Both legs of an
/// exchange, and its compensation, share an operation id.
pub type OperationId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Deposit,
    Withdrawal,
    /// Source leg of an exchange
    ExchangeDebit,
    /// Destination leg of an exchange
    ExchangeCredit,
    /// Refund of an exchange debit whose credit failed
    Compensation,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Deposit => "deposit",
            MutationKind::Withdrawal => "withdrawal",
            MutationKind::ExchangeDebit => "exchange_debit",
            MutationKind::ExchangeCredit => "exchange_credit",
            MutationKind::Compensation => "compensation",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "deposit" => Some(MutationKind::Deposit),
            "withdrawal" => Some(MutationKind::Withdrawal),
            "exchange_debit" => Some(MutationKind::ExchangeDebit),
            "exchange_credit" => Some(MutationKind::ExchangeCredit),
            "compensation" => Some(MutationKind::Compensation),
            _ => None,
        }
    }
}

impl std::fmt::Display for MutationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A request to move one balance by a signed amount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaRequest {
    pub account: AccountId,
    pub currency: CurrencyCode,
    pub delta: Minor,
    pub kind: MutationKind,
    pub operation_id: OperationId,
}

impl DeltaRequest {
    /// A request that starts its own operation.
    pub fn new(
        account: AccountId,
        currency: CurrencyCode,
        delta: Minor,
        kind: MutationKind,
    ) -> Self {
        Self {
            account,
            currency,
            delta,
            kind,
            operation_id: Uuid::new_v4(),
        }
    }

    pub fn within(mut self, operation_id: OperationId) -> Self {
        self.operation_id = operation_id;
        self
    }
}

/// Journal entry written in the same transaction as the balance update it
/// describes. Never modified after commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationRecord {
    pub id: MutationId,
    pub operation_id: OperationId,
    pub kind: MutationKind,
    pub account: AccountId,
    pub currency: CurrencyCode,
    pub delta: Minor,
    pub resulting_balance: Minor,
    pub recorded_at: DateTime<Utc>,
}

impl MutationRecord {
    pub fn applied(request: &DeltaRequest, resulting_balance: Minor) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation_id: request.operation_id,
            kind: request.kind,
            account: request.account,
            currency: request.currency.clone(),
            delta: request.delta,
            resulting_balance,
            recorded_at: Utc::now(),
        }
    }
}
