use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::custom_field::CustomFieldDefinition;
use crate::models::verification::{DynamicField, VerificationRecord};

/// Uniform JSON envelope for every endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), message: None, error: None }
    }

    pub fn ok_with_message(data: T, message: impl Into<String>) -> Self {
        Self { success: true, data: Some(data), message: Some(message.into()), error: None }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self { success: false, data: None, message: None, error: Some(error.into()) }
    }
}

/// Dynamic-field entry as submitted by clients. Values arrive as arbitrary
/// JSON and are stringified during normalization.
#[derive(Debug, Deserialize, ToSchema)]
pub struct DynamicFieldInput {
    #[schema(value_type = Option<String>)]
    pub label: Option<serde_json::Value>,
    #[schema(value_type = Option<String>)]
    pub value: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifySingleRequest {
    pub aadhaar_number: String,
    pub location: Option<String>,
    #[allow(dead_code)] // Echoed back by the form; stored at verify time
    pub dynamic_fields: Option<Vec<DynamicFieldInput>>,
    pub consent_accepted: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpRequest {
    pub aadhaar_number: String,
    pub otp: String,
    pub transaction_id: String,
    pub dynamic_fields: Option<Vec<DynamicFieldInput>>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDynamicFieldsRequest {
    pub dynamic_fields: Vec<DynamicFieldInput>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OtpChallengeResponse {
    pub transaction_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: i64,
    pub total_pages: i64,
    pub total_count: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Pagination {
    pub fn new(current_page: i64, limit: i64, total_count: i64) -> Self {
        let total_pages = if total_count == 0 { 0 } else { (total_count + limit - 1) / limit };
        Self {
            current_page,
            total_pages,
            total_count,
            has_next: current_page < total_pages,
            has_prev: current_page > 1 && total_pages > 0,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordListResponse {
    pub records: Vec<VerificationRecord>,
    pub pagination: Pagination,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordListParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
    pub status: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DynamicFieldsResponse {
    pub record_id: uuid::Uuid,
    pub dynamic_fields: Vec<DynamicField>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FieldKeysResponse {
    pub fields: Vec<CustomFieldDefinition>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SelfieUploadResponse {
    pub record_id: uuid::Uuid,
    pub size: i64,
    pub mime_type: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QrCodeResponse {
    pub qr_code: String,
    /// Data URL of the rendered SVG, embeddable in an <img> tag.
    pub qr_code_svg: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_math() {
        let p = Pagination::new(1, 10, 25);
        assert_eq!(p.total_pages, 3);
        assert!(p.has_next);
        assert!(!p.has_prev);

        let p = Pagination::new(3, 10, 25);
        assert!(!p.has_next);
        assert!(p.has_prev);

        let p = Pagination::new(1, 10, 0);
        assert_eq!(p.total_pages, 0);
        assert!(!p.has_next);
        assert!(!p.has_prev);
    }

    #[test]
    fn envelope_omits_empty_slots() {
        let json = serde_json::to_value(ApiResponse::ok("payload")).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"], "payload");
        assert!(json.get("error").is_none());
        assert!(json.get("message").is_none());

        let json = serde_json::to_value(ApiResponse::<()>::failure("boom")).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "boom");
        assert!(json.get("data").is_none());
    }
}
