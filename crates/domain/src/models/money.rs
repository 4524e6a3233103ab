//! Money value object.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// An amount in minor units (cents) with its currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct Money {
    #[validate(custom(function = "shared::validation::validate_price_minor"))]
    pub amount_minor: i64,

    #[validate(custom(function = "shared::validation::validate_currency_code"))]
    pub currency: String,
}

impl Money {
    pub fn new(amount_minor: i64, currency: impl Into<String>) -> Self {
        Self {
            amount_minor,
            currency: currency.into(),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.amount_minor == 0
    }

    /// Multiplies by a count, returning `None` on overflow.
    pub fn times(&self, count: i32) -> Option<Money> {
        self.amount_minor
            .checked_mul(i64::from(count))
            .map(|amount_minor| Money::new(amount_minor, self.currency.clone()))
    }

    /// Builds a Money from nullable columns. Both must be present.
    pub fn from_parts(amount_minor: Option<i64>, currency: Option<String>) -> Option<Money> {
        match (amount_minor, currency) {
            (Some(amount_minor), Some(currency)) => Some(Money::new(amount_minor, currency)),
            _ => None,
        }
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{:02} {}",
            self.amount_minor / 100,
            (self.amount_minor % 100).abs(),
            self.currency
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_times() {
        let price = Money::new(2500, "USD");
        assert_eq!(price.times(3), Some(Money::new(7500, "USD")));
        assert_eq!(price.times(0), Some(Money::new(0, "USD")));
        assert_eq!(Money::new(i64::MAX, "USD").times(2), None);
    }

    #[test]
    fn test_is_zero() {
        assert!(Money::new(0, "USD").is_zero());
        assert!(!Money::new(1, "USD").is_zero());
    }

    #[test]
    fn test_from_parts() {
        assert_eq!(
            Money::from_parts(Some(100), Some("EUR".into())),
            Some(Money::new(100, "EUR"))
        );
        assert_eq!(Money::from_parts(Some(100), None), None);
        assert_eq!(Money::from_parts(None, Some("EUR".into())), None);
    }

    #[test]
    fn test_validation() {
        assert!(Money::new(1000, "USD").validate().is_ok());
        assert!(Money::new(-1, "USD").validate().is_err());
        assert!(Money::new(1000, "usd").validate().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::new(2505, "USD").to_string(), "25.05 USD");
        assert_eq!(Money::new(7, "LKR").to_string(), "0.07 LKR");
    }
}
