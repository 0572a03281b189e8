use crate::database::sqlite::SqliteDatabase;
use crate::errors::Result;
use crate::models::user::User;
use crate::services::jwt::{AuthenticatedUser, JwtManager};
use std::sync::Arc;

/// Bearer-token authentication. Login and registration live in the separate
/// account application; this service only validates tokens it issued and
/// resolves the caller's user row.
pub struct AuthService {
    jwt_manager: JwtManager,
    database: Arc<SqliteDatabase>,
}

impl AuthService {
    pub fn new(database: Arc<SqliteDatabase>) -> Self {
        let jwt_secret = std::env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set in environment for production!");

        Self {
            jwt_manager: JwtManager::new(jwt_secret),
            database,
        }
    }

    pub async fn validate_token(&self, token: &str) -> Result<AuthenticatedUser> {
        let token_data = self.jwt_manager.validate_token(token)?;
        AuthenticatedUser::try_from(token_data.claims)
    }

    /// Validates the token and loads the caller's user row, so role and
    /// module access reflect the database rather than stale claims.
    pub async fn current_user(&self, token: &str) -> Result<User> {
        let authenticated = self.validate_token(token).await?;
        self.database.get_user_by_id(&authenticated.user_id).await
    }
}
