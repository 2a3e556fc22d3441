//! Money in minor currency units.
//!
//! Totals are computed in SQL and arrive as whole cents. The payment
//! processor wants lowercase ISO codes, the terminal shows uppercase ones,
//! so the currency is normalized once here.

use serde::{Deserialize, Serialize};

/// Errors that can occur when constructing [`Money`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    /// The amount is zero or negative.
    #[error("amount must be positive, got {0}")]
    NonPositive(i64),
    /// The currency code is empty.
    #[error("currency cannot be empty")]
    EmptyCurrency,
}

/// An amount in minor units (cents) together with its currency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    cents: i64,
    currency: String,
}

impl Money {
    /// Build a chargeable amount.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::NonPositive`] for amounts `<= 0` and
    /// [`MoneyError::EmptyCurrency`] for a blank currency code.
    pub fn chargeable(cents: i64, currency: &str) -> Result<Self, MoneyError> {
        if cents <= 0 {
            return Err(MoneyError::NonPositive(cents));
        }
        let currency = currency.trim();
        if currency.is_empty() {
            return Err(MoneyError::EmptyCurrency);
        }
        Ok(Self {
            cents,
            currency: currency.to_ascii_lowercase(),
        })
    }

    #[must_use]
    pub const fn cents(&self) -> i64 {
        self.cents
    }

    /// Lowercase ISO 4217 code, as the payment processor expects it.
    #[must_use]
    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Whether `other_cents`/`other_currency` describe the same amount.
    ///
    /// Currency comparison ignores case.
    #[must_use]
    pub fn matches(&self, other_cents: i64, other_currency: &str) -> bool {
        self.cents == other_cents && self.currency.eq_ignore_ascii_case(other_currency.trim())
    }

    /// Major units for display (`1050` cents -> `10.5`).
    #[must_use]
    pub fn as_major(&self) -> f64 {
        cents_to_major(self.cents)
    }
}

/// Convert minor units to major units for JSON responses.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn cents_to_major(cents: i64) -> f64 {
    cents as f64 / 100.0
}

/// Uppercase display currency, defaulting to `USD` when unknown.
#[must_use]
pub fn display_currency(code: Option<&str>) -> String {
    match code.map(str::trim) {
        Some(c) if !c.is_empty() => c.to_ascii_uppercase(),
        _ => "USD".to_owned(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_chargeable_rejects_non_positive() {
        assert_eq!(Money::chargeable(0, "usd"), Err(MoneyError::NonPositive(0)));
        assert_eq!(Money::chargeable(-5, "usd"), Err(MoneyError::NonPositive(-5)));
    }

    #[test]
    fn test_chargeable_rejects_blank_currency() {
        assert_eq!(Money::chargeable(100, "  "), Err(MoneyError::EmptyCurrency));
    }

    #[test]
    fn test_currency_is_lowercased() {
        let money = Money::chargeable(1250, "EUR").unwrap();
        assert_eq!(money.currency(), "eur");
        assert!(money.matches(1250, "EUR"));
        assert!(!money.matches(1249, "eur"));
        assert!(!money.matches(1250, "usd"));
    }

    #[test]
    fn test_major_units() {
        assert!((cents_to_major(1050) - 10.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_display_currency() {
        assert_eq!(display_currency(Some("gbp")), "GBP");
        assert_eq!(display_currency(Some("")), "USD");
        assert_eq!(display_currency(None), "USD");
    }
}
