use axum::{
    extract::{DefaultBodyLimit, FromRequestParts, Multipart, Path, Query},
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use base64::{engine::general_purpose, Engine as _};
use qrcode::render::svg;
use qrcode::QrCode;
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::api::types::*;
use crate::database::sqlite::{RecordQuery, SqliteDatabase, GLOBAL_DB};
use crate::errors::AppError;
use crate::models::custom_field::resolve_dynamic_fields;
use crate::models::user::{User, MODULE_QR_CODE, MODULE_SELFIE_UPLOAD};
use crate::models::verification::{normalize_dynamic_fields, DynamicField, RecordStatus};
use crate::services::aadhaar::{AadhaarProvider, GLOBAL_PROVIDER};
use crate::services::audit::{AuditService, ClientInfo};
use crate::services::auth::AuthService;
use crate::services::verification::{VerificationOrigin, VerificationService};
use crate::utils::validation::Validator;

const MAX_SELFIE_BYTES: usize = 5 * 1024 * 1024;

/// Verification API routes, mounted under `/api/verification`.
pub fn verification_router() -> Router {
    Router::new()
        .route("/dynamic-field-keys", get(dynamic_field_keys))
        .route("/records", get(list_records))
        .route("/records/:id", patch(update_dynamic_fields).get(records_patch_only))
        .route("/records/:id/selfie", post(upload_selfie).get(get_selfie))
        .route("/records/:id/selfie-public", post(upload_selfie_public))
        .route("/verify-single", post(verify_single))
        .route("/verify-otp", post(verify_otp))
        .route("/verify-qr/:qr_code", post(verify_qr))
        .route("/verify-otp-qr/:qr_code", post(verify_otp_qr))
        .route("/qr-code", get(my_qr_code))
        .layer(DefaultBodyLimit::max(MAX_SELFIE_BYTES + 1024 * 1024))
}

// JWT extractor for Authorization: Bearer ...
pub struct AuthBearer(pub String);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthBearer
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(auth) = parts.headers.get(header::AUTHORIZATION) {
            if let Ok(auth_str) = auth.to_str() {
                if let Some(token) = auth_str.strip_prefix("Bearer ") {
                    return Ok(AuthBearer(token.to_string()));
                }
            }
        }
        Err(AppError::AuthenticationError(
            "Missing or invalid Authorization header".to_string(),
        ))
    }
}

fn db() -> Result<Arc<SqliteDatabase>, AppError> {
    GLOBAL_DB
        .get()
        .cloned()
        .ok_or_else(|| AppError::InternalError("Database not initialized".to_string()))
}

fn provider() -> Result<Arc<dyn AadhaarProvider>, AppError> {
    GLOBAL_PROVIDER
        .get()
        .cloned()
        .ok_or_else(|| AppError::ConfigError("Aadhaar provider not initialized".to_string()))
}

fn parse_record_id(id: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(id).map_err(|_| AppError::ValidationError("Invalid record id".to_string()))
}

fn client_info(headers: &HeaderMap) -> ClientInfo {
    ClientInfo {
        ip: headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string()),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(String::from),
    }
}

fn normalize_inputs(input: Option<Vec<DynamicFieldInput>>) -> Vec<DynamicField> {
    normalize_dynamic_fields(
        input
            .unwrap_or_default()
            .into_iter()
            .map(|f| (f.label, f.value))
            .collect(),
    )
}

async fn resolve_qr_owner(database: &Arc<SqliteDatabase>, qr_code: &str) -> Result<User, AppError> {
    let user = database
        .get_user_by_qr_code(qr_code)
        .await?
        .ok_or_else(|| AppError::NotFound("QR code not recognized or inactive".to_string()))?;
    if !user.has_module_access(MODULE_QR_CODE) {
        return Err(AppError::AuthorizationError(
            "QR verification is not enabled for this account".to_string(),
        ));
    }
    Ok(user)
}

// ── Custom field schema ─────────────────────────────────────────────────

#[utoipa::path(get, path = "/api/verification/dynamic-field-keys",
    responses((status = 200, body = FieldKeysResponse)), security(("bearerAuth" = [])))]
pub async fn dynamic_field_keys(
    AuthBearer(token): AuthBearer,
) -> Result<impl IntoResponse, AppError> {
    let db = db()?;
    AuthService::new(db.clone()).current_user(&token).await?;
    let fields = db.list_active_field_definitions().await?;
    Ok(Json(ApiResponse::ok(FieldKeysResponse { fields })))
}

// ── Listing ─────────────────────────────────────────────────────────────

#[utoipa::path(get, path = "/api/verification/records",
    responses((status = 200, body = RecordListResponse)), security(("bearerAuth" = [])))]
pub async fn list_records(
    AuthBearer(token): AuthBearer,
    Query(params): Query<RecordListParams>,
) -> Result<impl IntoResponse, AppError> {
    let db = db()?;
    let user = AuthService::new(db.clone()).current_user(&token).await?;

    let status = match params.status.as_deref() {
        Some(raw) => Some(RecordStatus::parse(raw).ok_or_else(|| {
            AppError::ValidationError(format!("Unknown status filter: {}", raw))
        })?),
        None => None,
    };

    let query = RecordQuery {
        page: params.page,
        limit: params.limit,
        search: params.search.clone(),
        status,
        date_from: params.date_from.clone(),
        date_to: params.date_to.clone(),
        sort_by: params.sort_by.clone(),
        sort_order: params.sort_order.clone(),
    };

    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(10).clamp(1, 100);

    let (mut records, total) = db.list_records(&user.id, &query).await?;
    let definitions = db.list_active_field_definitions().await?;
    for record in &mut records {
        record.dynamic_fields = resolve_dynamic_fields(&definitions, &record.dynamic_fields);
    }

    Ok(Json(ApiResponse::ok(RecordListResponse {
        records,
        pagination: Pagination::new(page, limit, total),
    })))
}

// ── Dynamic-field editing ───────────────────────────────────────────────

#[utoipa::path(patch, path = "/api/verification/records/{id}",
    request_body = UpdateDynamicFieldsRequest,
    responses((status = 200, body = DynamicFieldsResponse), (status = 403, description = "Not the record owner"), (status = 404, description = "Record not found")),
    security(("bearerAuth" = [])))]
pub async fn update_dynamic_fields(
    AuthBearer(token): AuthBearer,
    Path(id): Path<String>,
    Json(req): Json<UpdateDynamicFieldsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let db = db()?;
    let record_id = parse_record_id(&id)?;
    let user = AuthService::new(db.clone()).current_user(&token).await?;

    let record = db
        .get_record_by_id(&record_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Verification record not found".to_string()))?;
    if record.user_id != user.id {
        return Err(AppError::AuthorizationError(
            "You do not own this verification record".to_string(),
        ));
    }

    let fields = normalize_dynamic_fields(
        req.dynamic_fields.into_iter().map(|f| (f.label, f.value)).collect(),
    );
    db.update_dynamic_fields(&record_id, &fields).await?;

    info!(action = "dynamic_fields_updated", record_id = %record_id, user_id = %user.id, count = fields.len());
    Ok(Json(ApiResponse::ok(DynamicFieldsResponse { record_id, dynamic_fields: fields })))
}

/// The records path only supports PATCH; everything else is told so
/// explicitly instead of leaking a bare 404.
pub async fn records_patch_only() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(header::ALLOW, "PATCH")],
        Json(ApiResponse::<()>::failure("Method not allowed. Use PATCH to update dynamic fields.")),
    )
        .into_response()
}

// ── OTP flow ────────────────────────────────────────────────────────────

#[utoipa::path(post, path = "/api/verification/verify-single",
    request_body = VerifySingleRequest,
    responses((status = 200, body = OtpChallengeResponse), (status = 400, description = "Invalid Aadhaar number or missing consent")),
    security(("bearerAuth" = [])))]
pub async fn verify_single(
    AuthBearer(token): AuthBearer,
    headers: HeaderMap,
    Json(req): Json<VerifySingleRequest>,
) -> Result<impl IntoResponse, AppError> {
    let db = db()?;
    let user = AuthService::new(db.clone()).current_user(&token).await?;

    Validator::validate_consent(req.consent_accepted)?;
    let aadhaar = Validator::validate_aadhaar(&req.aadhaar_number)?;

    let service = VerificationService::new(db.clone(), provider()?);
    let challenge = service.start_verification(&aadhaar).await?;

    AuditService::new(db)
        .log_event(
            "verification-otp-sent",
            Some(user.id),
            json!({ "transactionId": challenge.transaction_id, "location": req.location }),
            client_info(&headers),
        )
        .await;

    Ok(Json(ApiResponse::ok_with_message(
        OtpChallengeResponse {
            transaction_id: challenge.transaction_id,
            message: challenge.message,
        },
        "OTP sent",
    )))
}

#[utoipa::path(post, path = "/api/verification/verify-otp",
    request_body = VerifyOtpRequest,
    responses((status = 200, description = "Record created in a terminal status"), (status = 400, description = "Invalid Aadhaar, OTP, or transaction id")),
    security(("bearerAuth" = [])))]
pub async fn verify_otp(
    AuthBearer(token): AuthBearer,
    headers: HeaderMap,
    Json(req): Json<VerifyOtpRequest>,
) -> Result<impl IntoResponse, AppError> {
    let db = db()?;
    let user = AuthService::new(db.clone()).current_user(&token).await?;
    complete_otp_flow(db, user, VerificationOrigin::Session, req, headers).await
}

#[utoipa::path(post, path = "/api/verification/verify-qr/{qr_code}",
    request_body = VerifySingleRequest,
    responses((status = 200, body = OtpChallengeResponse), (status = 400, description = "Invalid Aadhaar number or missing consent"), (status = 403, description = "QR verification not enabled")))]
pub async fn verify_qr(
    Path(qr_code): Path<String>,
    headers: HeaderMap,
    Json(req): Json<VerifySingleRequest>,
) -> Result<impl IntoResponse, AppError> {
    let db = db()?;
    let owner = resolve_qr_owner(&db, &qr_code).await?;

    Validator::validate_consent(req.consent_accepted)?;
    let aadhaar = Validator::validate_aadhaar(&req.aadhaar_number)?;

    let service = VerificationService::new(db.clone(), provider()?);
    let challenge = service.start_verification(&aadhaar).await?;

    AuditService::new(db)
        .log_event(
            "verification-otp-sent",
            Some(owner.id),
            json!({ "transactionId": challenge.transaction_id, "location": req.location, "origin": "qr" }),
            client_info(&headers),
        )
        .await;

    Ok(Json(ApiResponse::ok_with_message(
        OtpChallengeResponse {
            transaction_id: challenge.transaction_id,
            message: challenge.message,
        },
        "OTP sent",
    )))
}

#[utoipa::path(post, path = "/api/verification/verify-otp-qr/{qr_code}",
    request_body = VerifyOtpRequest,
    responses((status = 200, description = "Record created in a terminal status"), (status = 400, description = "Invalid Aadhaar, OTP, or transaction id"), (status = 403, description = "QR verification not enabled")))]
pub async fn verify_otp_qr(
    Path(qr_code): Path<String>,
    headers: HeaderMap,
    Json(req): Json<VerifyOtpRequest>,
) -> Result<impl IntoResponse, AppError> {
    let db = db()?;
    let owner = resolve_qr_owner(&db, &qr_code).await?;
    complete_otp_flow(db, owner, VerificationOrigin::QrCode(qr_code), req, headers).await
}

/// Shared verify-OTP tail for the session and QR paths: input validation,
/// the provider call, the single record write, the audit event.
async fn complete_otp_flow(
    db: Arc<SqliteDatabase>,
    owner: User,
    origin: VerificationOrigin,
    req: VerifyOtpRequest,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<crate::models::verification::VerificationRecord>>, AppError> {
    let aadhaar = Validator::validate_aadhaar(&req.aadhaar_number)?;
    let otp = Validator::validate_otp(&req.otp)?;
    let transaction_id =
        Validator::validate_transaction_id(&req.transaction_id)?;
    let fields = normalize_inputs(req.dynamic_fields);

    let service = VerificationService::new(db.clone(), provider()?);
    let record = service
        .complete_verification(&owner, origin, &aadhaar, &otp, &transaction_id, fields)
        .await?;

    AuditService::new(db)
        .log_event(
            "verification-completed",
            Some(owner.id),
            json!({ "recordId": record.id, "status": record.status, "transactionId": transaction_id }),
            client_info(&headers),
        )
        .await;

    Ok(Json(ApiResponse::ok(record)))
}

// ── Selfie attachment / retrieval ───────────────────────────────────────

#[utoipa::path(post, path = "/api/verification/records/{id}/selfie",
    responses((status = 200, body = SelfieUploadResponse), (status = 400, description = "Not an image"), (status = 403, description = "Ownership or capability check failed"), (status = 413, description = "Larger than 5 MB")),
    security(("bearerAuth" = [])))]
pub async fn upload_selfie(
    AuthBearer(token): AuthBearer,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let db = db()?;
    let record_id = parse_record_id(&id)?;
    let user = AuthService::new(db.clone()).current_user(&token).await?;

    let record = db
        .get_record_by_id(&record_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Verification record not found".to_string()))?;
    if record.user_id != user.id {
        return Err(AppError::AuthorizationError(
            "You do not own this verification record".to_string(),
        ));
    }
    if !user.has_module_access(MODULE_SELFIE_UPLOAD) {
        return Err(AppError::AuthorizationError(
            "Selfie upload is not enabled for this account".to_string(),
        ));
    }

    store_selfie(&db, &record_id, multipart).await
}

#[utoipa::path(post, path = "/api/verification/records/{id}/selfie-public",
    responses((status = 200, body = SelfieUploadResponse), (status = 400, description = "Not an image"), (status = 403, description = "Record is not QR-originated or capability missing"), (status = 413, description = "Larger than 5 MB")))]
pub async fn upload_selfie_public(
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let db = db()?;
    let record_id = parse_record_id(&id)?;

    let record = db
        .get_record_by_id(&record_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Verification record not found".to_string()))?;
    if !record.is_qr_originated() {
        return Err(AppError::AuthorizationError(
            "Public selfie upload is only available for QR verifications".to_string(),
        ));
    }
    let owner = db.get_user_by_id(&record.user_id).await?;
    if !owner.has_module_access(MODULE_SELFIE_UPLOAD) {
        return Err(AppError::AuthorizationError(
            "Selfie upload is not enabled for this account".to_string(),
        ));
    }

    store_selfie(&db, &record_id, multipart).await
}

/// Reads the image out of the multipart body and validates it before
/// anything touches storage.
async fn store_selfie(
    db: &Arc<SqliteDatabase>,
    record_id: &Uuid,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let mut file_data: Option<Vec<u8>> = None;
    let mut mime_type = String::from("application/octet-stream");

    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or("").to_string();
        if name == "selfie" || name == "file" {
            mime_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            match field.bytes().await {
                Ok(bytes) => file_data = Some(bytes.to_vec()),
                Err(e) => {
                    return Err(AppError::ValidationError(format!(
                        "Failed to read file data: {}",
                        e
                    )))
                }
            }
        }
    }

    let data = file_data.ok_or_else(|| {
        AppError::ValidationError("No selfie file provided (field name 'selfie')".to_string())
    })?;

    if !mime_type.starts_with("image/") {
        return Err(AppError::ValidationError(format!(
            "Unsupported content type '{}': only images are accepted",
            mime_type
        )));
    }
    if data.len() > MAX_SELFIE_BYTES {
        return Ok((
            StatusCode::PAYLOAD_TOO_LARGE,
            Json(ApiResponse::<()>::failure(format!(
                "Selfie too large ({} bytes). Max: {} bytes",
                data.len(),
                MAX_SELFIE_BYTES
            ))),
        )
            .into_response());
    }

    db.attach_selfie(record_id, &data, &mime_type).await?;
    info!(action = "selfie_attached", record_id = %record_id, size = data.len(), mime_type = %mime_type);

    Ok(Json(ApiResponse::ok(SelfieUploadResponse {
        record_id: *record_id,
        size: data.len() as i64,
        mime_type,
    }))
    .into_response())
}

#[utoipa::path(get, path = "/api/verification/records/{id}/selfie",
    responses((status = 200, description = "Selfie image served inline"), (status = 403, description = "Not the owner or an admin"), (status = 404, description = "No selfie stored")),
    security(("bearerAuth" = [])))]
pub async fn get_selfie(
    AuthBearer(token): AuthBearer,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let db = db()?;
    let record_id = parse_record_id(&id)?;
    let user = AuthService::new(db.clone()).current_user(&token).await?;

    let record = db
        .get_record_by_id(&record_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Verification record not found".to_string()))?;
    if record.user_id != user.id && !user.is_admin() {
        return Err(AppError::AuthorizationError(
            "You do not have access to this selfie".to_string(),
        ));
    }

    let stored = db
        .get_selfie(&record_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Verification record not found".to_string()))?;

    if let Some(data) = stored.data {
        let mime_type = stored.mime_type.unwrap_or_else(|| "image/jpeg".to_string());
        return Ok(selfie_response(data, &mime_type));
    }

    // Records from before blob storage carry a path into the legacy upload
    // directory instead.
    if let Some(path) = stored.legacy_path {
        let base = std::env::var("SELFIE_LEGACY_DIR").unwrap_or_else(|_| ".".to_string());
        let full_path = std::path::Path::new(&base).join(&path);
        match tokio::fs::read(&full_path).await {
            Ok(data) => {
                let mime_type = match full_path.extension().and_then(|e| e.to_str()) {
                    Some("png") => "image/png",
                    Some("webp") => "image/webp",
                    _ => "image/jpeg",
                };
                return Ok(selfie_response(data, mime_type));
            }
            Err(e) => {
                tracing::warn!(action = "legacy_selfie_read_failed", record_id = %record_id, error = %e);
            }
        }
    }

    Err(AppError::NotFound("No selfie stored for this record".to_string()))
}

/// Inline image response with the cross-origin headers cross-site `<img>`
/// embedding needs.
fn selfie_response(data: Vec<u8>, mime_type: &str) -> Response {
    (
        [
            (header::CONTENT_TYPE, mime_type.to_string()),
            (header::CONTENT_DISPOSITION, "inline".to_string()),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*".to_string()),
            (
                header::HeaderName::from_static("cross-origin-resource-policy"),
                "cross-origin".to_string(),
            ),
        ],
        data,
    )
        .into_response()
}

// ── QR code issuance ────────────────────────────────────────────────────

#[utoipa::path(get, path = "/api/verification/qr-code",
    responses((status = 200, body = QrCodeResponse), (status = 403, description = "QR verification not enabled")),
    security(("bearerAuth" = [])))]
pub async fn my_qr_code(AuthBearer(token): AuthBearer) -> Result<impl IntoResponse, AppError> {
    let db = db()?;
    let user = AuthService::new(db.clone()).current_user(&token).await?;

    if !user.has_module_access(MODULE_QR_CODE) {
        return Err(AppError::AuthorizationError(
            "QR verification is not enabled for this account".to_string(),
        ));
    }
    let qr_code = match (&user.qr_code, user.qr_code_active) {
        (Some(code), true) => code.clone(),
        _ => {
            return Err(AppError::NotFound(
                "No active QR code assigned to this account".to_string(),
            ))
        }
    };

    let rendered = QrCode::new(&qr_code)
        .map_err(|e| AppError::InternalError(format!("Failed to render QR code: {}", e)))?
        .render::<svg::Color>()
        .min_dimensions(200, 200)
        .dark_color(svg::Color("#000000"))
        .light_color(svg::Color("#ffffff"))
        .build();
    let svg_base64 = general_purpose::STANDARD.encode(rendered.as_bytes());

    Ok(Json(ApiResponse::ok(QrCodeResponse {
        qr_code,
        qr_code_svg: format!("data:image/svg+xml;base64,{}", svg_base64),
    })))
}
