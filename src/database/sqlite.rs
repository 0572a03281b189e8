use crate::errors::{AppError, Result};
use crate::models::audit::AuditLog;
use crate::models::custom_field::CustomFieldDefinition;
use crate::models::user::User;
use crate::models::verification::{
    DynamicField, RecordStatus, SelfieMeta, VerificationDetail, VerificationRecord,
};
use crate::utils::crypto::FieldCipher;
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

pub static GLOBAL_DB: OnceCell<Arc<SqliteDatabase>> = OnceCell::new();

/// Columns selected for record reads; the selfie blob is deliberately left
/// out and only fetched through `get_selfie`.
const RECORD_COLUMNS: &str = "id, user_id, batch_id, aadhaar_number, full_name, date_of_birth, \
     gender, address, status, dynamic_fields, selfie_mime_type, selfie_size, selfie_uploaded_at, \
     transaction_id, raw_response, confidence, verified_at, processing_duration_ms, processed, \
     processed_at, created_at, updated_at";

/// Listing/search parameters; all optional, defaults applied in `list_records`.
#[derive(Debug, Default, Clone)]
pub struct RecordQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
    pub status: Option<RecordStatus>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

/// Stored selfie payload: either an embedded blob or a legacy on-disk path.
#[derive(Debug)]
pub struct StoredSelfie {
    pub data: Option<Vec<u8>>,
    pub mime_type: Option<String>,
    pub legacy_path: Option<String>,
}

#[derive(Debug)]
pub struct SqliteDatabase {
    pool: SqlitePool,
    cipher: FieldCipher,
}

impl SqliteDatabase {
    pub async fn new(database_path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(database_path).parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AppError::DatabaseError(format!("Failed to create database directory: {}", e)))?;
        }

        if !Path::new(database_path).exists() {
            std::fs::File::create(database_path)
                .map_err(|e| AppError::DatabaseError(format!("Failed to create database file: {}", e)))?;
            println!("📁 Created new database file: {}", database_path);
        }
        let database_url = format!("sqlite:{}", database_path);

        let pool = SqlitePool::connect(&database_url)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to connect to database: {}", e)))?;

        let db = Self { pool, cipher: FieldCipher::from_env()? };

        db.create_tables().await?;

        println!("✅ Connected to SQLite database: {}", database_path);
        Ok(db)
    }

    async fn create_tables(&self) -> Result<()> {
        let query = r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT UNIQUE NOT NULL,
                email TEXT UNIQUE NOT NULL,
                role TEXT NOT NULL DEFAULT 'user',
                module_access TEXT NOT NULL DEFAULT '[]',
                qr_code TEXT UNIQUE,
                qr_code_active BOOLEAN DEFAULT FALSE,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS verification_records (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                batch_id TEXT NOT NULL,
                aadhaar_number TEXT,       -- encrypted
                full_name TEXT,            -- encrypted
                date_of_birth TEXT,        -- encrypted
                gender TEXT,               -- encrypted
                address TEXT,              -- encrypted
                search_name TEXT,          -- plaintext mirror, lowercased
                search_address TEXT,       -- plaintext mirror, lowercased
                dob TEXT,                  -- plaintext mirror, ISO date, range filtering
                status TEXT NOT NULL,
                dynamic_fields TEXT NOT NULL DEFAULT '[]',
                selfie_data BLOB,
                selfie_mime_type TEXT,
                selfie_size INTEGER,
                selfie_uploaded_at TEXT,
                selfie_legacy_path TEXT,
                transaction_id TEXT,
                raw_response TEXT,
                confidence REAL,
                verified_at TEXT,
                processing_duration_ms INTEGER,
                processed BOOLEAN DEFAULT FALSE,
                processed_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS custom_field_definitions (
                id TEXT PRIMARY KEY,
                field_name TEXT UNIQUE NOT NULL,
                field_label TEXT NOT NULL,
                field_type TEXT NOT NULL DEFAULT 'text',
                placeholder TEXT,
                required BOOLEAN DEFAULT FALSE,
                default_value TEXT,
                display_order INTEGER DEFAULT 0,
                applies_to TEXT NOT NULL DEFAULT 'verification',
                is_active BOOLEAN DEFAULT TRUE,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS audit_logs (
                id TEXT PRIMARY KEY,
                event_type TEXT NOT NULL,
                user_id TEXT,
                metadata TEXT,
                client_ip TEXT,
                user_agent TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_users_qr_code ON users(qr_code);
            CREATE INDEX IF NOT EXISTS idx_records_user_id ON verification_records(user_id);
            CREATE INDEX IF NOT EXISTS idx_records_status ON verification_records(status);
            CREATE INDEX IF NOT EXISTS idx_records_batch_id ON verification_records(batch_id);
            CREATE INDEX IF NOT EXISTS idx_records_created_at ON verification_records(created_at);
            CREATE INDEX IF NOT EXISTS idx_field_defs_active ON custom_field_definitions(is_active, display_order);
            CREATE INDEX IF NOT EXISTS idx_audit_user_id ON audit_logs(user_id);
        "#;

        sqlx::query(query)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to create tables: {}", e)))?;

        Ok(())
    }

    // ── Users ────────────────────────────────────────────────────────────

    pub async fn create_user(&self, user: &User) -> Result<()> {
        let query = r#"
            INSERT INTO users (id, username, email, role, module_access, qr_code, qr_code_active, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#;

        sqlx::query(query)
            .bind(user.id.to_string())
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.role)
            .bind(serde_json::to_string(&user.module_access)?)
            .bind(&user.qr_code)
            .bind(user.qr_code_active)
            .bind(user.created_at.to_rfc3339())
            .bind(user.updated_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if e.to_string().contains("UNIQUE constraint failed") {
                    AppError::ValidationError("User already exists".to_string())
                } else {
                    AppError::DatabaseError(format!("Failed to create user: {}", e))
                }
            })?;

        Ok(())
    }

    pub async fn get_user_by_id(&self, user_id: &Uuid) -> Result<User> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?1")
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to fetch user: {}", e)))?;

        match row {
            Some(row) => self.map_user_row(&row),
            None => Err(AppError::NotFound("User not found".to_string())),
        }
    }

    /// Resolves the owning user for the unauthenticated QR flow. Only active
    /// QR codes resolve.
    pub async fn get_user_by_qr_code(&self, qr_code: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE qr_code = ?1 AND qr_code_active = TRUE")
            .bind(qr_code)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to fetch user by QR code: {}", e)))?;

        match row {
            Some(row) => Ok(Some(self.map_user_row(&row)?)),
            None => Ok(None),
        }
    }

    fn map_user_row(&self, row: &SqliteRow) -> Result<User> {
        Ok(User {
            id: parse_uuid(&row.get::<String, _>("id"))?,
            username: row.get("username"),
            email: row.get("email"),
            role: row.get("role"),
            module_access: serde_json::from_str(&row.get::<String, _>("module_access"))
                .unwrap_or_default(),
            qr_code: row.get("qr_code"),
            qr_code_active: row.get("qr_code_active"),
            created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
            updated_at: parse_timestamp(&row.get::<String, _>("updated_at"))?,
        })
    }

    // ── Verification records ─────────────────────────────────────────────

    /// Persists a freshly verified record. Sensitive attributes are encrypted
    /// here; lowercased plaintext mirrors are kept for search and DOB-range
    /// filtering (search never runs over ciphertext).
    pub async fn insert_verification_record(&self, record: &VerificationRecord) -> Result<()> {
        let query = r#"
            INSERT INTO verification_records (
                id, user_id, batch_id, aadhaar_number, full_name, date_of_birth, gender, address,
                search_name, search_address, dob, status, dynamic_fields,
                transaction_id, raw_response, confidence, verified_at,
                processing_duration_ms, processed, processed_at, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)
        "#;

        let raw_response = match &record.verification.raw_response {
            Some(value) => Some(serde_json::to_string(value)?),
            None => None,
        };

        sqlx::query(query)
            .bind(record.id.to_string())
            .bind(record.user_id.to_string())
            .bind(&record.batch_id)
            .bind(self.encrypt_opt(&record.aadhaar_number))
            .bind(self.encrypt_opt(&record.full_name))
            .bind(self.encrypt_opt(&record.date_of_birth))
            .bind(self.encrypt_opt(&record.gender))
            .bind(self.encrypt_opt(&record.address))
            .bind(record.full_name.as_ref().map(|n| n.to_lowercase()))
            .bind(record.address.as_ref().map(|a| a.to_lowercase()))
            .bind(&record.date_of_birth)
            .bind(record.status.as_str())
            .bind(serde_json::to_string(&record.dynamic_fields)?)
            .bind(&record.verification.transaction_id)
            .bind(raw_response)
            .bind(record.verification.confidence)
            .bind(record.verification.verified_at.map(|t| t.to_rfc3339()))
            .bind(record.processing_duration_ms)
            .bind(record.processed)
            .bind(record.processed_at.map(|t| t.to_rfc3339()))
            .bind(record.created_at.to_rfc3339())
            .bind(record.updated_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to store verification record: {}", e)))?;

        Ok(())
    }

    pub async fn get_record_by_id(&self, record_id: &Uuid) -> Result<Option<VerificationRecord>> {
        let query = format!("SELECT {} FROM verification_records WHERE id = ?1", RECORD_COLUMNS);
        let row = sqlx::query(&query)
            .bind(record_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to fetch record: {}", e)))?;

        match row {
            Some(row) => Ok(Some(self.map_record_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Paginated, filtered listing scoped to one owner. Returns the page of
    /// decrypted records plus the total match count.
    pub async fn list_records(
        &self,
        user_id: &Uuid,
        params: &RecordQuery,
    ) -> Result<(Vec<VerificationRecord>, i64)> {
        let page = params.page.unwrap_or(1).max(1);
        let limit = params.limit.unwrap_or(10).clamp(1, 100);
        let offset = (page - 1) * limit;

        let mut filters = String::from("WHERE user_id = ?");
        if params.status.is_some() {
            filters.push_str(" AND status = ?");
        }
        if params.search.is_some() {
            filters.push_str(" AND (search_name LIKE ? OR search_address LIKE ? OR batch_id LIKE ?)");
        }
        if params.date_from.is_some() {
            filters.push_str(" AND dob >= ?");
        }
        if params.date_to.is_some() {
            filters.push_str(" AND dob <= ?");
        }

        let sort_column = match params.sort_by.as_deref() {
            Some("status") => "status",
            Some("verifiedAt") | Some("verified_at") => "verified_at",
            Some("batchId") | Some("batch_id") => "batch_id",
            _ => "created_at",
        };
        let sort_direction = match params.sort_order.as_deref() {
            Some("asc") | Some("ASC") => "ASC",
            _ => "DESC",
        };

        let list_sql = format!(
            "SELECT {} FROM verification_records {} ORDER BY {} {} LIMIT ? OFFSET ?",
            RECORD_COLUMNS, filters, sort_column, sort_direction
        );
        let count_sql = format!("SELECT COUNT(*) as count FROM verification_records {}", filters);

        let search_pattern = params
            .search
            .as_ref()
            .map(|term| format!("%{}%", term.trim().to_lowercase()));

        let mut list_query = sqlx::query(&list_sql).bind(user_id.to_string());
        let mut count_query = sqlx::query(&count_sql).bind(user_id.to_string());

        if let Some(status) = &params.status {
            list_query = list_query.bind(status.as_str());
            count_query = count_query.bind(status.as_str());
        }
        if let Some(pattern) = &search_pattern {
            list_query = list_query.bind(pattern).bind(pattern).bind(pattern);
            count_query = count_query.bind(pattern).bind(pattern).bind(pattern);
        }
        if let Some(date_from) = &params.date_from {
            list_query = list_query.bind(date_from);
            count_query = count_query.bind(date_from);
        }
        if let Some(date_to) = &params.date_to {
            list_query = list_query.bind(date_to);
            count_query = count_query.bind(date_to);
        }

        let rows = list_query
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to list records: {}", e)))?;

        let total: i64 = count_query
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to count records: {}", e)))?
            .get("count");

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(self.map_record_row(row)?);
        }

        Ok((records, total))
    }

    /// Replaces the whole dynamic-field list. Last write wins; there is no
    /// concurrency token on records.
    pub async fn update_dynamic_fields(&self, record_id: &Uuid, fields: &[DynamicField]) -> Result<()> {
        let result = sqlx::query(
            "UPDATE verification_records SET dynamic_fields = ?1, updated_at = ?2 WHERE id = ?3",
        )
        .bind(serde_json::to_string(fields)?)
        .bind(Utc::now().to_rfc3339())
        .bind(record_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to update dynamic fields: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Verification record not found".to_string()));
        }
        Ok(())
    }

    pub async fn attach_selfie(&self, record_id: &Uuid, data: &[u8], mime_type: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE verification_records
            SET selfie_data = ?1, selfie_mime_type = ?2, selfie_size = ?3, selfie_uploaded_at = ?4, updated_at = ?4
            WHERE id = ?5
            "#,
        )
        .bind(data)
        .bind(mime_type)
        .bind(data.len() as i64)
        .bind(Utc::now().to_rfc3339())
        .bind(record_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to store selfie: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Verification record not found".to_string()));
        }
        Ok(())
    }

    pub async fn get_selfie(&self, record_id: &Uuid) -> Result<Option<StoredSelfie>> {
        let row = sqlx::query(
            "SELECT selfie_data, selfie_mime_type, selfie_legacy_path FROM verification_records WHERE id = ?1",
        )
        .bind(record_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to fetch selfie: {}", e)))?;

        Ok(row.map(|row| StoredSelfie {
            data: row.get("selfie_data"),
            mime_type: row.get("selfie_mime_type"),
            legacy_path: row.get("selfie_legacy_path"),
        }))
    }

    fn map_record_row(&self, row: &SqliteRow) -> Result<VerificationRecord> {
        let selfie = match row.get::<Option<String>, _>("selfie_mime_type") {
            Some(mime_type) => Some(SelfieMeta {
                mime_type,
                size: row.get::<Option<i64>, _>("selfie_size").unwrap_or(0),
                uploaded_at: row
                    .get::<Option<String>, _>("selfie_uploaded_at")
                    .and_then(|s| parse_timestamp(&s).ok()),
            }),
            None => None,
        };

        let raw_response = row
            .get::<Option<String>, _>("raw_response")
            .and_then(|s| serde_json::from_str(&s).ok());

        let status_str: String = row.get("status");
        let status = RecordStatus::parse(&status_str).ok_or_else(|| {
            AppError::DatabaseError(format!("Unknown record status: {}", status_str))
        })?;

        Ok(VerificationRecord {
            id: parse_uuid(&row.get::<String, _>("id"))?,
            user_id: parse_uuid(&row.get::<String, _>("user_id"))?,
            batch_id: row.get("batch_id"),
            aadhaar_number: self.decrypt_opt(row.get("aadhaar_number"), "aadhaar_number"),
            full_name: self.decrypt_opt(row.get("full_name"), "full_name"),
            date_of_birth: self.decrypt_opt(row.get("date_of_birth"), "date_of_birth"),
            gender: self.decrypt_opt(row.get("gender"), "gender"),
            address: self.decrypt_opt(row.get("address"), "address"),
            status,
            dynamic_fields: serde_json::from_str(&row.get::<String, _>("dynamic_fields"))
                .unwrap_or_default(),
            selfie,
            verification: VerificationDetail {
                transaction_id: row.get("transaction_id"),
                raw_response,
                confidence: row.get("confidence"),
                verified_at: row
                    .get::<Option<String>, _>("verified_at")
                    .and_then(|s| parse_timestamp(&s).ok()),
            },
            processing_duration_ms: row.get("processing_duration_ms"),
            processed: row.get("processed"),
            processed_at: row
                .get::<Option<String>, _>("processed_at")
                .and_then(|s| parse_timestamp(&s).ok()),
            created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
            updated_at: parse_timestamp(&row.get::<String, _>("updated_at"))?,
        })
    }

    fn encrypt_opt(&self, value: &Option<String>) -> Option<String> {
        value.as_ref().map(|v| self.cipher.encrypt(v))
    }

    /// Decrypt-on-read with per-field fallback: a column that fails to
    /// decrypt is returned as stored and logged, never failing the read.
    fn decrypt_opt(&self, value: Option<String>, column: &str) -> Option<String> {
        value.map(|stored| match self.cipher.decrypt(&stored) {
            Ok(plain) => plain,
            Err(e) => {
                warn!(action = "field_decrypt_failed", column = column, error = %e);
                stored
            }
        })
    }

    // ── Custom field definitions ─────────────────────────────────────────

    pub async fn list_active_field_definitions(&self) -> Result<Vec<CustomFieldDefinition>> {
        let rows = sqlx::query(
            "SELECT * FROM custom_field_definitions WHERE is_active = TRUE ORDER BY display_order ASC, field_label ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to list field definitions: {}", e)))?;

        let mut definitions = Vec::with_capacity(rows.len());
        for row in rows {
            definitions.push(CustomFieldDefinition {
                id: parse_uuid(&row.get::<String, _>("id"))?,
                field_name: row.get("field_name"),
                field_label: row.get("field_label"),
                field_type: row.get("field_type"),
                placeholder: row.get("placeholder"),
                required: row.get("required"),
                default_value: row.get("default_value"),
                display_order: row.get("display_order"),
                applies_to: row.get("applies_to"),
                is_active: row.get("is_active"),
                created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
                updated_at: parse_timestamp(&row.get::<String, _>("updated_at"))?,
            });
        }
        Ok(definitions)
    }

    /// Definitions are managed by the admin application; this insert exists
    /// for seeding and tests.
    pub async fn create_field_definition(&self, definition: &CustomFieldDefinition) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO custom_field_definitions
                (id, field_name, field_label, field_type, placeholder, required, default_value,
                 display_order, applies_to, is_active, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(definition.id.to_string())
        .bind(&definition.field_name)
        .bind(&definition.field_label)
        .bind(&definition.field_type)
        .bind(&definition.placeholder)
        .bind(definition.required)
        .bind(&definition.default_value)
        .bind(definition.display_order)
        .bind(&definition.applies_to)
        .bind(definition.is_active)
        .bind(definition.created_at.to_rfc3339())
        .bind(definition.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to create field definition: {}", e)))?;

        Ok(())
    }

    // ── Audit ────────────────────────────────────────────────────────────

    pub async fn insert_audit_log(&self, entry: &AuditLog) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (id, event_type, user_id, metadata, client_ip, user_agent, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(&entry.event_type)
        .bind(entry.user_id.map(|id| id.to_string()))
        .bind(serde_json::to_string(&entry.metadata)?)
        .bind(&entry.client_ip)
        .bind(&entry.user_agent)
        .bind(entry.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to store audit log: {}", e)))?;

        Ok(())
    }
}

fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| AppError::DatabaseError(format!("Invalid UUID in database: {}", e)))
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AppError::DatabaseError(format!("Invalid timestamp in database: {}", e)))
}
