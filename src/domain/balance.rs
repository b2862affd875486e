use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{CurrencyCode, Minor};

/// Accounts are owned by the identity system; the ledger only stores the id.
pub type AccountId = Uuid;

/// Balance row for one (account, currency) pair. `amount` is never negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub account: AccountId,
    pub currency: CurrencyCode,
    pub amount: Minor,
}

/// Snapshot of every provisioned currency for one account.
pub type BalanceMap = BTreeMap<CurrencyCode, Minor>;

pub fn to_balance_map(balances: impl IntoIterator<Item = Balance>) -> BalanceMap {
    balances
        .into_iter()
        .map(|balance| (balance.currency, balance.amount))
        .collect()
}
