//! Common validation utilities.

use validator::ValidationError;

/// Maximum attendee age accepted on a registration.
const MAX_ATTENDEE_AGE: i32 = 120;

/// Maximum price in minor units (one million in major units).
const MAX_PRICE_MINOR: i64 = 100_000_000;

lazy_static::lazy_static! {
    pub static ref CURRENCY_CODE_REGEX: regex::Regex = regex::Regex::new(r"^[A-Z]{3}$").unwrap();
}

/// Validates an ISO-4217 style currency code (three upper-case letters).
pub fn validate_currency_code(code: &str) -> Result<(), ValidationError> {
    if CURRENCY_CODE_REGEX.is_match(code) {
        Ok(())
    } else {
        let mut err = ValidationError::new("currency_code");
        err.message = Some("Currency must be a three-letter upper-case code".into());
        Err(err)
    }
}

/// Validates a price expressed in minor units (cents).
pub fn validate_price_minor(amount: i64) -> Result<(), ValidationError> {
    if (0..=MAX_PRICE_MINOR).contains(&amount) {
        Ok(())
    } else {
        let mut err = ValidationError::new("price_range");
        err.message = Some("Price must be between 0 and 100000000 minor units".into());
        Err(err)
    }
}

/// Validates an attendee age.
pub fn validate_attendee_age(age: i32) -> Result<(), ValidationError> {
    if (0..=MAX_ATTENDEE_AGE).contains(&age) {
        Ok(())
    } else {
        let mut err = ValidationError::new("age_range");
        err.message = Some("Age must be between 0 and 120".into());
        Err(err)
    }
}

/// Validates an image display order.
pub fn validate_display_order(order: i32) -> Result<(), ValidationError> {
    if order >= 0 {
        Ok(())
    } else {
        let mut err = ValidationError::new("display_order_range");
        err.message = Some("Display order must be non-negative".into());
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_currency_code() {
        assert!(validate_currency_code("USD").is_ok());
        assert!(validate_currency_code("LKR").is_ok());
        assert!(validate_currency_code("usd").is_err());
        assert!(validate_currency_code("US").is_err());
        assert!(validate_currency_code("USDT").is_err());
        assert!(validate_currency_code("").is_err());
    }

    #[test]
    fn test_validate_currency_code_error_message() {
        let err = validate_currency_code("x").unwrap_err();
        assert_eq!(
            err.message.unwrap().to_string(),
            "Currency must be a three-letter upper-case code"
        );
    }

    #[test]
    fn test_validate_price_minor() {
        assert!(validate_price_minor(0).is_ok());
        assert!(validate_price_minor(2500).is_ok());
        assert!(validate_price_minor(MAX_PRICE_MINOR).is_ok());
        assert!(validate_price_minor(-1).is_err());
        assert!(validate_price_minor(MAX_PRICE_MINOR + 1).is_err());
    }

    #[test]
    fn test_validate_attendee_age() {
        assert!(validate_attendee_age(0).is_ok());
        assert!(validate_attendee_age(35).is_ok());
        assert!(validate_attendee_age(120).is_ok());
        assert!(validate_attendee_age(-1).is_err());
        assert!(validate_attendee_age(121).is_err());
    }

    #[test]
    fn test_validate_display_order() {
        assert!(validate_display_order(0).is_ok());
        assert!(validate_display_order(7).is_ok());
        assert!(validate_display_order(-1).is_err());
    }
}
