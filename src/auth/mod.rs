/// Authentication and authorization gate
///
/// `AuthGate::authenticate` turns a bearer token into an `Identity`,
/// re-resolving the user so deleted accounts lose access immediately.
/// `authorize` is a pure role check applied per route.
pub mod password;
pub mod token;

pub use token::{Claims, TokenError, TokenService};

use crate::{
    account::UserManager,
    api::middleware::extract_bearer_token,
    context::AppContext,
    error::{ApiError, ApiResult},
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};
use std::{fmt, marker::PhantomData, sync::Arc};

/// Caller roles
///
/// `admin` and `agent` are the roles routes grant access to. Any other
/// stored role is kept as-is: it authenticates, but only passes routes that
/// admit every caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    #[default]
    Agent,
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::Admin => "admin",
            Role::Agent => "agent",
            Role::Other(name) => name,
        }
    }

    /// `admin` and `agent` match case-insensitively; only blank names fail
    pub fn from_str(s: &str) -> ApiResult<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ApiError::Validation("Role cannot be empty".to_string()));
        }

        Ok(match s.to_lowercase().as_str() {
            "admin" => Role::Admin,
            "agent" => Role::Agent,
            _ => Role::Other(s.to_string()),
        })
    }
}

impl Serialize for Role {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Role::from_str(&raw).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Route role allow-lists
pub mod policy {
    use super::Role;

    /// Any authenticated caller
    pub const ANY_ROLE: &[Role] = &[];
    pub const ADMIN_ONLY: &[Role] = &[Role::Admin];
    pub const FIELD_OPERATIVES: &[Role] = &[Role::Admin, Role::Agent];

    /// Binds an allow-list to a type so handlers can name it in their signature
    pub trait RoutePolicy: Send + Sync + 'static {
        const ALLOWED: &'static [Role];
    }

    pub struct AnyRole;
    pub struct AdminOnly;
    pub struct FieldOperatives;

    impl RoutePolicy for AnyRole {
        const ALLOWED: &'static [Role] = ANY_ROLE;
    }

    impl RoutePolicy for AdminOnly {
        const ALLOWED: &'static [Role] = ADMIN_ONLY;
    }

    impl RoutePolicy for FieldOperatives {
        const ALLOWED: &'static [Role] = FIELD_OPERATIVES;
    }
}

/// The authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub username: String,
    pub role: Role,
}

/// An empty allow-list admits every authenticated identity.
pub fn authorize(identity: &Identity, allowed: &[Role]) -> ApiResult<()> {
    if !allowed.is_empty() && !allowed.contains(&identity.role) {
        tracing::debug!(
            user = %identity.username,
            role = %identity.role,
            "Request rejected: insufficient role"
        );
        return Err(ApiError::Authorization(
            "Insufficient permissions".to_string(),
        ));
    }

    Ok(())
}

/// Resolves bearer tokens to identities
pub struct AuthGate {
    tokens: Arc<TokenService>,
    users: Arc<UserManager>,
}

impl AuthGate {
    pub fn new(tokens: Arc<TokenService>, users: Arc<UserManager>) -> Self {
        Self { tokens, users }
    }

    /// Verify the token and load the user it names
    pub async fn authenticate(&self, bearer: Option<&str>) -> ApiResult<Identity> {
        let token = bearer
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::Authentication("Authentication required".to_string()))?;

        let claims = self.tokens.verify(token).map_err(|e| {
            tracing::warn!(reason = %e, "Token verification failed");
            match e {
                TokenError::Expired => ApiError::Authentication("Token expired".to_string()),
                TokenError::Invalid(_) => ApiError::Authentication("Invalid token".to_string()),
            }
        })?;

        // Role comes from the stored user, not the token
        self.users.find_identity(&claims.id).await?.ok_or_else(|| {
            tracing::warn!(user_id = %claims.id, "Token names a user that no longer exists");
            ApiError::Authentication("Invalid token".to_string())
        })
    }
}

/// Authenticated context - extracts and validates the caller from the request
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub identity: Identity,
}

impl AuthContext {
    /// Enforce a route's role allow-list
    pub fn require(&self, allowed: &[Role]) -> ApiResult<&Identity> {
        authorize(&self.identity, allowed)?;
        Ok(&self.identity)
    }
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers);
        let identity = state.auth_gate.authenticate(token.as_deref()).await?;

        Ok(AuthContext { identity })
    }
}

/// Authenticated and authorized caller
///
/// Extracting this runs the gate and then the role check for `P`, so a
/// handler taking it ahead of its body extractor rejects unauthorized callers
/// before the body is parsed.
#[derive(Debug)]
pub struct Authorized<P> {
    pub identity: Identity,
    _policy: PhantomData<P>,
}

#[async_trait]
impl<P: policy::RoutePolicy> FromRequestParts<AppContext> for Authorized<P> {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let auth = AuthContext::from_request_parts(parts, state).await?;
        auth.require(P::ALLOWED)?;

        Ok(Authorized {
            identity: auth.identity,
            _policy: PhantomData,
        })
    }
}
