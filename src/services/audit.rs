use crate::database::sqlite::SqliteDatabase;
use crate::models::audit::AuditLog;
use chrono::Utc;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Client attribution captured from request headers.
#[derive(Debug, Default, Clone)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Fire-and-forget audit sink; a failed insert is logged and swallowed so it
/// never fails the request that triggered it.
pub struct AuditService {
    database: Arc<SqliteDatabase>,
}

impl AuditService {
    pub fn new(database: Arc<SqliteDatabase>) -> Self {
        Self { database }
    }

    pub async fn log_event(
        &self,
        event_type: &str,
        user_id: Option<Uuid>,
        metadata: serde_json::Value,
        client: ClientInfo,
    ) {
        let entry = AuditLog {
            id: Uuid::new_v4(),
            event_type: event_type.to_string(),
            user_id,
            metadata,
            client_ip: client.ip,
            user_agent: client.user_agent,
            created_at: Utc::now(),
        };

        if let Err(e) = self.database.insert_audit_log(&entry).await {
            warn!(action = "audit_log_failed", event_type = event_type, error = %e);
        }
    }
}
