/// Configuration management for the gadget API
use crate::error::{ApiError, ApiResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub gadgets: GadgetConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub environment: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub database_path: PathBuf,
    pub max_connections: u32,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Fixed lifetime of every issued identity token
    pub token_ttl: Duration,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Requests allowed per window
    pub max_requests: u32,
    pub window: Duration,
}

/// Gadget lifecycle policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GadgetConfig {
    /// Reject `update` status changes out of Destroyed/Decommissioned
    pub lock_terminal_status: bool,
    pub codename_max_attempts: u32,
}

impl Default for GadgetConfig {
    fn default() -> Self {
        Self {
            lock_terminal_status: false,
            codename_max_attempts: 50,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive string
    pub level: String,
    pub json: bool,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> ApiResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("GADGETS_HOSTNAME").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| ApiError::Validation("Invalid port number".to_string()))?;
        let environment = env::var("GADGETS_ENV")
            .or_else(|_| env::var("NODE_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let database_path = env::var("GADGETS_DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/gadgets.sqlite"));
        let max_connections = env::var("GADGETS_DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);

        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| ApiError::Validation("JWT secret required".to_string()))?;
        let token_ttl = parse_duration(
            &env::var("JWT_EXPIRES_IN").unwrap_or_else(|_| "1d".to_string()),
        )?;

        let rate_limit_enabled = env::var("GADGETS_RATE_LIMIT_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);
        let max_requests = env::var("API_RATE_LIMIT")
            .unwrap_or_else(|_| "100".to_string())
            .parse()
            .map_err(|_| ApiError::Validation("Invalid API_RATE_LIMIT".to_string()))?;
        let window_secs: u64 = env::var("API_RATE_WINDOW_SECS")
            .unwrap_or_else(|_| "900".to_string())
            .parse()
            .unwrap_or(900);

        let lock_terminal_status = env::var("GADGETS_LOCK_TERMINAL_STATUS")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false);
        let codename_max_attempts = env::var("GADGETS_CODENAME_MAX_ATTEMPTS")
            .unwrap_or_else(|_| "50".to_string())
            .parse()
            .unwrap_or(50);

        let level = env::var("RUST_LOG").unwrap_or_else(|_| {
            if environment == "development" {
                "imf_gadgets=debug,tower_http=debug".to_string()
            } else {
                "imf_gadgets=info,tower_http=info".to_string()
            }
        });
        let json = env::var("GADGETS_LOG_FORMAT")
            .map(|f| f.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                environment,
            },
            storage: StorageConfig {
                database_path,
                max_connections,
            },
            authentication: AuthConfig {
                jwt_secret,
                token_ttl,
            },
            rate_limit: RateLimitConfig {
                enabled: rate_limit_enabled,
                max_requests,
                window: Duration::from_secs(window_secs),
            },
            gadgets: GadgetConfig {
                lock_terminal_status,
                codename_max_attempts,
            },
            logging: LoggingConfig { level, json },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> ApiResult<()> {
        if self.service.hostname.is_empty() {
            return Err(ApiError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.authentication.jwt_secret.len() < 32 {
            return Err(ApiError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.authentication.token_ttl.is_zero() {
            return Err(ApiError::Validation(
                "Token expiry must be greater than zero".to_string(),
            ));
        }

        if self.rate_limit.enabled && (self.rate_limit.max_requests == 0 || self.rate_limit.window.is_zero()) {
            return Err(ApiError::Validation(
                "Rate limit must allow at least one request per non-empty window".to_string(),
            ));
        }

        if self.gadgets.codename_max_attempts == 0 {
            return Err(ApiError::Validation(
                "Codename attempts must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    pub fn is_development(&self) -> bool {
        self.service.environment == "development"
    }
}

/// Parse `3600`, `90s`, `15m`, `12h` or `7d` into a duration
pub fn parse_duration(raw: &str) -> ApiResult<Duration> {
    let raw = raw.trim();
    let invalid = || ApiError::Validation(format!("Invalid duration: {}", raw));

    let (digits, unit) = match raw.char_indices().find(|(_, c)| !c.is_ascii_digit()) {
        Some((idx, _)) => raw.split_at(idx),
        None => (raw, "s"),
    };

    let value: u64 = digits.parse().map_err(|_| invalid())?;
    let multiplier = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86400,
        _ => return Err(invalid()),
    };

    value
        .checked_mul(multiplier)
        .map(Duration::from_secs)
        .ok_or_else(invalid)
}
