/// User manager: the credential store adapter behind register and login
use crate::{
    account::{LoginResponse, UserInfo},
    auth::{password, Identity, Role, TokenService},
    db::{models::User, UserStore},
    error::{ApiError, ApiResult},
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// User manager service
pub struct UserManager {
    users: Arc<dyn UserStore>,
    tokens: Arc<TokenService>,
}

impl UserManager {
    /// Create a new user manager
    pub fn new(users: Arc<dyn UserStore>, tokens: Arc<TokenService>) -> Self {
        Self { users, tokens }
    }

    /// Register a new user; role defaults to agent
    pub async fn register(
        &self,
        username: &str,
        password: &str,
        role: Option<&str>,
    ) -> ApiResult<UserInfo> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(credentials_required());
        }

        let role = match role {
            Some(r) => Role::from_str(r)?,
            None => Role::default(),
        };

        if self.users.find_user_by_username(username).await?.is_some() {
            return Err(ApiError::Conflict("Username already taken".to_string()));
        }

        let password_hash = password::hash_password_async(password.to_string()).await?;

        let user = User {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            password_hash,
            role,
            created_at: Utc::now(),
        };

        // A concurrent registration can still win the UNIQUE constraint
        self.users.insert_user(&user).await.map_err(|e| match e {
            ApiError::Conflict(_) => ApiError::Conflict("Username already taken".to_string()),
            other => other,
        })?;

        tracing::info!(username = %user.username, role = %user.role, "User registered");

        Ok(UserInfo::registered(&user))
    }

    /// Check credentials and issue an identity token
    pub async fn login(&self, username: &str, password: &str) -> ApiResult<LoginResponse> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(credentials_required());
        }

        let user = self
            .users
            .find_user_by_username(username)
            .await?
            .ok_or_else(invalid_credentials)?;

        let valid =
            password::verify_password_async(password.to_string(), user.password_hash.clone())
                .await?;
        if !valid {
            tracing::debug!(username, "Login rejected: bad password");
            return Err(invalid_credentials());
        }

        let token = self.tokens.issue(&user)?;

        tracing::info!(username = %user.username, "User logged in");

        Ok(LoginResponse {
            token,
            user: UserInfo::summary(&user),
        })
    }
}

impl UserManager {
    /// Resolve a token subject to the user as currently stored
    pub async fn find_identity(&self, id: &str) -> ApiResult<Option<Identity>> {
        let user = self.users.find_user_by_id(id).await?;

        Ok(user.map(|user| Identity {
            id: user.id,
            username: user.username,
            role: user.role,
        }))
    }
}

fn credentials_required() -> ApiError {
    ApiError::Validation("Username and password are required".to_string())
}

fn invalid_credentials() -> ApiError {
    ApiError::Authentication("Invalid username or password".to_string())
}
