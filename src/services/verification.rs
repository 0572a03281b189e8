use crate::database::sqlite::SqliteDatabase;
use crate::errors::{AppError, Result};
use crate::models::user::User;
use crate::models::verification::{DynamicField, VerificationDetail, VerificationRecord, QR_BATCH_PREFIX};
use crate::services::aadhaar::{AadhaarProvider, OtpChallenge};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

/// How the verification was initiated. The QR variant carries the code that
/// resolved the owner, which also becomes the batch marker the public selfie
/// endpoints gate on.
#[derive(Debug, Clone)]
pub enum VerificationOrigin {
    Session,
    QrCode(String),
}

impl VerificationOrigin {
    fn batch_id(&self) -> String {
        match self {
            VerificationOrigin::Session => {
                format!("SINGLE-{}", Utc::now().format("%Y%m%d"))
            }
            VerificationOrigin::QrCode(code) => format!("{}{}", QR_BATCH_PREFIX, code),
        }
    }
}

/// The OTP verification flow. One implementation serves both the
/// authenticated and the public QR paths; the caller resolves the owner and
/// passes the origin.
pub struct VerificationService {
    database: Arc<SqliteDatabase>,
    provider: Arc<dyn AadhaarProvider>,
}

impl VerificationService {
    pub fn new(database: Arc<SqliteDatabase>, provider: Arc<dyn AadhaarProvider>) -> Self {
        Self { database, provider }
    }

    /// Send-OTP half of the flow. Persists nothing; the provider holds the
    /// pending OTP state until the verify call.
    pub async fn start_verification(&self, aadhaar_number: &str) -> Result<OtpChallenge> {
        let challenge = self.provider.send_otp(aadhaar_number).await?;
        info!(action = "verification_otp_sent", transaction_id = %challenge.transaction_id);
        Ok(challenge)
    }

    /// Verify-OTP half. On provider success the record is created in one
    /// write, already in its terminal status; on any failure nothing is
    /// persisted.
    pub async fn complete_verification(
        &self,
        owner: &User,
        origin: VerificationOrigin,
        aadhaar_number: &str,
        otp: &str,
        transaction_id: &str,
        dynamic_fields: Vec<DynamicField>,
    ) -> Result<VerificationRecord> {
        let started = Instant::now();

        let outcome = self.provider.verify_otp(transaction_id, otp).await?;
        let status = outcome.record_status();
        let now = Utc::now();

        let record = VerificationRecord {
            id: Uuid::new_v4(),
            user_id: owner.id,
            batch_id: origin.batch_id(),
            aadhaar_number: Some(aadhaar_number.to_string()),
            full_name: outcome.full_name.clone(),
            date_of_birth: outcome.date_of_birth.clone(),
            gender: outcome.gender.clone(),
            address: outcome.address.clone(),
            status,
            dynamic_fields,
            selfie: None,
            verification: VerificationDetail {
                transaction_id: Some(transaction_id.to_string()),
                raw_response: Some(outcome.raw.clone()),
                confidence: outcome.confidence,
                verified_at: Some(now),
            },
            processing_duration_ms: Some(started.elapsed().as_millis() as i64),
            processed: true,
            processed_at: Some(now),
            created_at: now,
            updated_at: now,
        };

        self.database.insert_verification_record(&record).await?;

        info!(
            action = "verification_completed",
            record_id = %record.id,
            user_id = %owner.id,
            status = status.as_str(),
            transaction_id = transaction_id,
        );

        // Re-read through the repository so the caller gets exactly what a
        // listing would return.
        self.database
            .get_record_by_id(&record.id)
            .await?
            .ok_or_else(|| AppError::InternalError("Stored record disappeared".to_string()))
    }
}
