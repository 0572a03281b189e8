use crate::errors::{AppError, Result};
use crate::models::verification::RecordStatus;
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;

/// Provider status value that marks a successful verification.
pub const VALID_STATUS: &str = "VALID";

/// Shared provider handle, set once at startup (tests install a mock here).
pub static GLOBAL_PROVIDER: OnceCell<Arc<dyn AadhaarProvider>> = OnceCell::new();

#[derive(Debug, Clone)]
pub struct OtpChallenge {
    pub transaction_id: String,
    pub message: Option<String>,
}

/// Everything the provider returns for a verify call: the status verdict,
/// the identity attributes, and the raw payload kept for the record.
#[derive(Debug, Clone)]
pub struct ProviderOutcome {
    pub status: String,
    pub confidence: Option<f64>,
    pub full_name: Option<String>,
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub address: Option<String>,
    pub raw: Value,
}

impl ProviderOutcome {
    /// Maps the provider verdict onto the terminal record status.
    pub fn record_status(&self) -> RecordStatus {
        if self.status.eq_ignore_ascii_case(VALID_STATUS) {
            RecordStatus::Verified
        } else if self.status.eq_ignore_ascii_case("INVALID") {
            RecordStatus::Invalid
        } else {
            RecordStatus::Rejected
        }
    }
}

#[async_trait]
pub trait AadhaarProvider: Send + Sync {
    async fn send_otp(&self, aadhaar_number: &str) -> Result<OtpChallenge>;
    async fn verify_otp(&self, transaction_id: &str, otp: &str) -> Result<ProviderOutcome>;
}

/// Client for the sandbox Aadhaar OTP API.
pub struct SandboxAadhaarProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl SandboxAadhaarProvider {
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("AADHAAR_API_BASE_URL")
            .map_err(|_| AppError::ConfigError("AADHAAR_API_BASE_URL must be set in environment".to_string()))?;
        let api_key = std::env::var("AADHAAR_API_KEY")
            .map_err(|_| AppError::ConfigError("AADHAAR_API_KEY must be set in environment".to_string()))?;

        Ok(Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl AadhaarProvider for SandboxAadhaarProvider {
    async fn send_otp(&self, aadhaar_number: &str) -> Result<OtpChallenge> {
        let url = format!("{}/aadhaar/otp", self.base_url);
        let payload = json!({
            "aadhaar_number": aadhaar_number,
            "consent": "Y",
        });

        let res = self
            .client
            .post(&url)
            .header("Authorization", &self.api_key)
            .json(&payload)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(AppError::ProviderError(format!(
                "OTP request failed ({}): {}",
                status, body
            )));
        }

        let body: Value = res.json().await?;
        let transaction_id = body
            .get("transaction_id")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AppError::ProviderError("Provider response missing transaction_id".to_string())
            })?
            .to_string();

        Ok(OtpChallenge {
            transaction_id,
            message: body.get("message").and_then(Value::as_str).map(String::from),
        })
    }

    async fn verify_otp(&self, transaction_id: &str, otp: &str) -> Result<ProviderOutcome> {
        let url = format!("{}/aadhaar/otp/verify", self.base_url);
        let payload = json!({
            "transaction_id": transaction_id,
            "otp": otp,
        });

        let res = self
            .client
            .post(&url)
            .header("Authorization", &self.api_key)
            .json(&payload)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(AppError::ProviderError(format!(
                "OTP verification failed ({}): {}",
                status, body
            )));
        }

        let body: Value = res.json().await?;
        Ok(outcome_from_payload(body))
    }
}

/// Pulls the fields this service persists out of the provider payload; the
/// full payload stays on the record untouched.
fn outcome_from_payload(body: Value) -> ProviderOutcome {
    let data = body.get("data").unwrap_or(&body).clone();

    ProviderOutcome {
        status: body
            .get("status")
            .or_else(|| data.get("status"))
            .and_then(Value::as_str)
            .unwrap_or("ERROR")
            .to_string(),
        confidence: body
            .get("confidence")
            .or_else(|| data.get("confidence"))
            .and_then(Value::as_f64),
        full_name: data.get("name").and_then(Value::as_str).map(String::from),
        date_of_birth: data
            .get("date_of_birth")
            .or_else(|| data.get("dob"))
            .and_then(Value::as_str)
            .map(String::from),
        gender: data.get("gender").and_then(Value::as_str).map(String::from),
        address: flatten_address(data.get("address")),
        raw: body,
    }
}

/// Providers return the address either as a string or as a component object
/// (house, street, district, ...); component objects are joined in a fixed
/// order.
fn flatten_address(address: Option<&Value>) -> Option<String> {
    let address = address?;
    if let Some(s) = address.as_str() {
        return Some(s.to_string());
    }
    let object = address.as_object()?;

    let parts: Vec<String> = ["house", "street", "landmark", "vtc", "district", "state", "pincode"]
        .iter()
        .filter_map(|key| object.get(*key))
        .filter_map(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;

    /// Deterministic provider used by handler tests: OTP "123456" verifies,
    /// "999999" comes back INVALID, anything else FAILED.
    #[derive(Default)]
    pub struct MockAadhaarProvider;

    #[async_trait]
    impl AadhaarProvider for MockAadhaarProvider {
        async fn send_otp(&self, _aadhaar_number: &str) -> Result<OtpChallenge> {
            Ok(OtpChallenge {
                transaction_id: "txn-mock-0001".to_string(),
                message: Some("OTP sent to registered mobile".to_string()),
            })
        }

        async fn verify_otp(&self, transaction_id: &str, otp: &str) -> Result<ProviderOutcome> {
            let status = match otp {
                "123456" => "VALID",
                "999999" => "INVALID",
                _ => "FAILED",
            };
            let raw = json!({
                "status": status,
                "transaction_id": transaction_id,
                "confidence": 0.98,
                "data": {
                    "name": "Ravi Kumar",
                    "dob": "1990-04-12",
                    "gender": "M",
                    "address": {
                        "house": "12", "street": "MG Road", "district": "Bengaluru",
                        "state": "Karnataka", "pincode": "560001"
                    }
                }
            });
            Ok(outcome_from_payload(raw))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_status_maps_to_verified() {
        let outcome = outcome_from_payload(serde_json::json!({"status": "VALID"}));
        assert_eq!(outcome.record_status(), RecordStatus::Verified);
    }

    #[test]
    fn invalid_status_maps_to_invalid() {
        let outcome = outcome_from_payload(serde_json::json!({"status": "invalid"}));
        assert_eq!(outcome.record_status(), RecordStatus::Invalid);
    }

    #[test]
    fn anything_else_maps_to_rejected() {
        for status in ["FAILED", "ERROR", "TIMEOUT", ""] {
            let outcome = outcome_from_payload(serde_json::json!({ "status": status }));
            assert_eq!(outcome.record_status(), RecordStatus::Rejected, "status {:?}", status);
        }
    }

    #[test]
    fn outcome_extracts_nested_identity_fields() {
        let outcome = outcome_from_payload(serde_json::json!({
            "status": "VALID",
            "confidence": 0.91,
            "data": {
                "name": "Asha Verma",
                "dob": "1988-11-02",
                "gender": "F",
                "address": {"house": "4A", "district": "Pune", "pincode": 411001}
            }
        }));
        assert_eq!(outcome.full_name.as_deref(), Some("Asha Verma"));
        assert_eq!(outcome.date_of_birth.as_deref(), Some("1988-11-02"));
        assert_eq!(outcome.confidence, Some(0.91));
        assert_eq!(outcome.address.as_deref(), Some("4A, Pune, 411001"));
    }

    #[test]
    fn string_address_passes_through() {
        assert_eq!(
            flatten_address(Some(&serde_json::json!("12, MG Road, Bengaluru"))),
            Some("12, MG Road, Bengaluru".to_string())
        );
        assert_eq!(flatten_address(Some(&serde_json::json!({}))), None);
        assert_eq!(flatten_address(None), None);
    }
}
