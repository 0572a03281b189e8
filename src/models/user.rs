use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Capability flag required for selfie upload endpoints.
pub const MODULE_SELFIE_UPLOAD: &str = "selfie-upload";
/// Capability flag required for the QR verification flow.
pub const MODULE_QR_CODE: &str = "qr-code";

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: String, // "user" or "admin"
    pub module_access: Vec<String>,
    pub qr_code: Option<String>,
    pub qr_code_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn has_module_access(&self, module: &str) -> bool {
        self.module_access.iter().any(|m| m == module)
    }

    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}
