use crate::errors::{AppError, Result};
use regex::Regex;

pub struct Validator;

impl Validator {
    /// Validates an Aadhaar number and returns it normalized (whitespace
    /// stripped). Anything other than exactly 12 digits is rejected.
    pub fn validate_aadhaar(aadhaar: &str) -> Result<String> {
        let normalized: String = aadhaar.chars().filter(|c| !c.is_whitespace()).collect();

        let aadhaar_regex = Regex::new(r"^[0-9]{12}$")
            .map_err(|e| AppError::InternalError(format!("Regex error: {}", e)))?;

        if !aadhaar_regex.is_match(&normalized) {
            return Err(AppError::ValidationError(
                "Aadhaar number must be exactly 12 digits".to_string(),
            ));
        }

        Ok(normalized)
    }

    /// Validates a one-time password: exactly 6 digits.
    pub fn validate_otp(otp: &str) -> Result<String> {
        let otp = otp.trim().to_string();

        let otp_regex = Regex::new(r"^[0-9]{6}$")
            .map_err(|e| AppError::InternalError(format!("Regex error: {}", e)))?;

        if !otp_regex.is_match(&otp) {
            return Err(AppError::ValidationError("OTP must be exactly 6 digits".to_string()));
        }

        Ok(otp)
    }

    pub fn validate_transaction_id(transaction_id: &str) -> Result<String> {
        let transaction_id = transaction_id.trim().to_string();
        if transaction_id.is_empty() {
            return Err(AppError::ValidationError("Transaction id is required".to_string()));
        }
        Ok(transaction_id)
    }

    /// Consent must be explicitly accepted before any provider call.
    pub fn validate_consent(consent_accepted: Option<bool>) -> Result<()> {
        if consent_accepted != Some(true) {
            return Err(AppError::ValidationError(
                "Consent must be accepted to start verification".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aadhaar_accepts_exactly_twelve_digits() {
        assert_eq!(Validator::validate_aadhaar("123456789012").unwrap(), "123456789012");
    }

    #[test]
    fn aadhaar_strips_whitespace_before_checking() {
        assert_eq!(Validator::validate_aadhaar("1234 5678 9012").unwrap(), "123456789012");
        assert_eq!(Validator::validate_aadhaar(" 123456789012 ").unwrap(), "123456789012");
    }

    #[test]
    fn aadhaar_rejects_wrong_lengths_and_non_digits() {
        for bad in ["", "12345678901", "1234567890123", "12345678901a", "abcd efgh ijkl"] {
            assert!(Validator::validate_aadhaar(bad).is_err(), "should reject {:?}", bad);
        }
    }

    #[test]
    fn otp_accepts_only_six_digits() {
        assert_eq!(Validator::validate_otp("123456").unwrap(), "123456");
        assert_eq!(Validator::validate_otp(" 123456 ").unwrap(), "123456");
        for bad in ["", "12345", "1234567", "12345a", "12 345"] {
            assert!(Validator::validate_otp(bad).is_err(), "should reject {:?}", bad);
        }
    }

    #[test]
    fn consent_must_be_explicitly_true() {
        assert!(Validator::validate_consent(Some(true)).is_ok());
        assert!(Validator::validate_consent(Some(false)).is_err());
        assert!(Validator::validate_consent(None).is_err());
    }

    #[test]
    fn transaction_id_must_be_present() {
        assert!(Validator::validate_transaction_id("  ").is_err());
        assert_eq!(Validator::validate_transaction_id(" txn-1 ").unwrap(), "txn-1");
    }
}
