use axum::response::IntoResponse;
use axum::routing::options;
use axum::{http::StatusCode, Json, Router};
use hyper::Method;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::{Modify, OpenApi};
use utoipa_redoc::{Redoc, Servable};
use utoipa_swagger_ui::SwaggerUi;

use crate::database::sqlite::{SqliteDatabase, GLOBAL_DB};
use crate::services::aadhaar::{SandboxAadhaarProvider, GLOBAL_PROVIDER};
use crate::utils::middleware::{global_rate_limiter, request_id_middleware};

pub mod routes;
pub mod types;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::dynamic_field_keys,
        routes::list_records,
        routes::update_dynamic_fields,
        routes::verify_single,
        routes::verify_otp,
        routes::verify_qr,
        routes::verify_otp_qr,
        routes::upload_selfie,
        routes::upload_selfie_public,
        routes::get_selfie,
        routes::my_qr_code,
    ),
    components(
        schemas(
            types::DynamicFieldInput,
            types::VerifySingleRequest,
            types::VerifyOtpRequest,
            types::UpdateDynamicFieldsRequest,
            types::OtpChallengeResponse,
            types::Pagination,
            types::RecordListResponse,
            types::DynamicFieldsResponse,
            types::FieldKeysResponse,
            types::SelfieUploadResponse,
            types::QrCodeResponse,
            crate::models::verification::VerificationRecord,
            crate::models::verification::VerificationDetail,
            crate::models::verification::DynamicField,
            crate::models::verification::SelfieMeta,
            crate::models::verification::RecordStatus,
            crate::models::custom_field::CustomFieldDefinition,
        )
    ),
    tags(
        (name = "Verification", description = "Aadhaar OTP verification endpoints. Most endpoints require JWT authentication; the QR variants are public and gated by an active QR code.")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
        openapi.components.as_mut().unwrap().add_security_scheme(
            "bearerAuth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

/// Main entry point for the verification API server.
/// Sets up routes, middleware, and documentation endpoints.
pub async fn start_http_server() {
    let openapi = ApiDoc::openapi();

    let database_path =
        std::env::var("DATABASE_PATH").unwrap_or_else(|_| "verification.db".to_string());
    let db = Arc::new(SqliteDatabase::new(&database_path).await.unwrap());
    GLOBAL_DB.set(db).unwrap();

    let provider = SandboxAadhaarProvider::from_env()
        .expect("Aadhaar provider configuration missing (AADHAAR_API_BASE_URL / AADHAAR_API_KEY)");
    GLOBAL_PROVIDER.set(Arc::new(provider)).ok();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    let app = Router::new()
        .route("/*path", options(|| async { StatusCode::NO_CONTENT }))
        .nest("/api/verification", routes::verification_router())
        .route("/health", axum::routing::get(health_check))
        .route("/docs/openapi.json", axum::routing::get(openapi_json))
        .merge(SwaggerUi::new("/api/docs").url("/api/openapi.json", openapi.clone()))
        .merge(Redoc::with_url("/api/redoc", openapi))
        .layer(cors)
        .layer(axum::middleware::from_fn(global_rate_limiter))
        .layer(axum::middleware::from_fn(request_id_middleware));

    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse().unwrap();

    println!("🚀 HTTP API running at http://{}/health", addr);
    println!("📚 API Documentation available at: http://{}/api/docs", addr);
    axum::serve(tokio::net::TcpListener::bind(addr).await.unwrap(), app)
        .await
        .unwrap();
}

async fn health_check() -> impl IntoResponse {
    "OK"
}

/// Export OpenAPI specification as JSON
async fn openapi_json() -> Json<Value> {
    let openapi = ApiDoc::openapi();
    Json(serde_json::to_value(openapi).unwrap())
}
