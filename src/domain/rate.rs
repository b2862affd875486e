use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use super::{CurrencyCode, Minor};

/// Number of `to` units paid for one `from` unit.
///
/// Rates are exact decimals. Constructing one with a zero or negative rate
/// fails, so a held `ExchangeRate` is always usable for conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub from: CurrencyCode,
    pub to: CurrencyCode,
    pub rate: Decimal,
}

impl ExchangeRate {
    pub fn new(from: CurrencyCode, to: CurrencyCode, rate: Decimal) -> Option<Self> {
        if rate > Decimal::ZERO {
            Some(Self { from, to, rate })
        } else {
            None
        }
    }

    /// The identity rate for converting a currency into itself.
    pub fn identity(currency: CurrencyCode) -> Self {
        Self {
            from: currency.clone(),
            to: currency,
            rate: Decimal::ONE,
        }
    }

    /// Convert `amount` minor units of `from` into `to`, rounding down.
    ///
    /// Both currencies share the same minor-unit exponent, so the rate applies
    /// directly to minor units. Returns `None` on overflow.
    pub fn convert(&self, amount: Minor) -> Option<Minor> {
        Decimal::from(amount)
            .checked_mul(self.rate)?
            .floor()
            .to_i64()
    }
}
