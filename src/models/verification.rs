use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Batch ids of QR-originated records carry this prefix; the public selfie
/// endpoints gate on it.
pub const QR_BATCH_PREFIX: &str = "QR-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Pending,
    Verified,
    Rejected,
    Invalid,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Pending => "pending",
            RecordStatus::Verified => "verified",
            RecordStatus::Rejected => "rejected",
            RecordStatus::Invalid => "invalid",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(RecordStatus::Pending),
            "verified" => Some(RecordStatus::Verified),
            "rejected" => Some(RecordStatus::Rejected),
            "invalid" => Some(RecordStatus::Invalid),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DynamicField {
    pub label: String,
    pub value: String,
}

/// Outcome details captured from the external provider at verification time.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerificationDetail {
    pub transaction_id: Option<String>,
    #[schema(value_type = Object)]
    pub raw_response: Option<serde_json::Value>,
    pub confidence: Option<f64>,
    pub verified_at: Option<DateTime<Utc>>,
}

/// Selfie metadata; the binary payload itself never travels with the record
/// and is fetched through the dedicated selfie endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SelfieMeta {
    pub mime_type: String,
    pub size: i64,
    pub uploaded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub batch_id: String,
    pub aadhaar_number: Option<String>,
    pub full_name: Option<String>,
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub address: Option<String>,
    pub status: RecordStatus,
    pub dynamic_fields: Vec<DynamicField>,
    pub selfie: Option<SelfieMeta>,
    pub verification: VerificationDetail,
    pub processing_duration_ms: Option<i64>,
    pub processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VerificationRecord {
    pub fn is_qr_originated(&self) -> bool {
        self.batch_id.starts_with(QR_BATCH_PREFIX)
    }
}

/// Normalizes a user-supplied dynamic-field list: labels and values are
/// trimmed and stringified, entries without a label are dropped, and
/// duplicate labels keep the first occurrence.
pub fn normalize_dynamic_fields(input: Vec<(Option<serde_json::Value>, Option<serde_json::Value>)>) -> Vec<DynamicField> {
    let mut seen: Vec<String> = Vec::new();
    let mut out = Vec::new();
    for (label, value) in input {
        let label = match label.map(stringify) {
            Some(l) => l.trim().to_string(),
            None => continue,
        };
        if label.is_empty() {
            continue;
        }
        let key = label.to_lowercase();
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        let value = value.map(stringify).unwrap_or_default().trim().to_string();
        out.push(DynamicField { label, value });
    }
    out
}

fn stringify(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}
