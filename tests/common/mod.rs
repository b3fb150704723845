#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    extract::ConnectInfo,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use imf_gadgets::{
    config::{
        AuthConfig, GadgetConfig, LoggingConfig, RateLimitConfig, ServerConfig, ServiceConfig,
        StorageConfig,
    },
    db, server, AppContext,
};
use serde_json::Value;
use std::{
    net::{Ipv4Addr, SocketAddr},
    path::PathBuf,
    time::Duration,
};
use tower::ServiceExt;

/// A distinct peer address per client number
pub fn client(n: u8) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::new(192, 0, 2, n), 40000))
}

pub fn test_config() -> ServerConfig {
    ServerConfig {
        service: ServiceConfig {
            hostname: "127.0.0.1".to_string(),
            port: 0,
            environment: "test".to_string(),
        },
        storage: StorageConfig {
            database_path: PathBuf::from(":memory:"),
            max_connections: 1,
        },
        authentication: AuthConfig {
            jwt_secret: "test-secret-key-for-testing-only-32b".to_string(),
            token_ttl: Duration::from_secs(3600),
        },
        rate_limit: RateLimitConfig {
            enabled: false,
            max_requests: 100,
            window: Duration::from_secs(900),
        },
        gadgets: GadgetConfig::default(),
        logging: LoggingConfig {
            level: "info".to_string(),
            json: false,
        },
    }
}

/// A router over a fresh in-memory database
pub struct TestApp {
    pub ctx: AppContext,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: ServerConfig) -> Self {
        let pool = db::create_memory_pool().await.unwrap();
        db::run_migrations(&pool).await.unwrap();
        Self {
            ctx: AppContext::from_pool(config, pool),
        }
    }

    pub fn router(&self) -> Router {
        server::build_router(self.ctx.clone())
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let (status, _, value) = self.request_from(client(1), method, uri, token, body).await;
        (status, value)
    }

    /// Send a request as if it arrived from `peer`, returning the headers too
    pub async fn request_from(
        &self,
        peer: SocketAddr,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, HeaderMap, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .extension(ConnectInfo(peer));
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };

        (status, headers, value)
    }

    /// Register a user with the given role and return a token for them
    pub async fn token_for(&self, username: &str, role: &str) -> String {
        self.ctx
            .user_manager
            .register(username, "correct-horse-battery", Some(role))
            .await
            .unwrap();
        self.ctx
            .user_manager
            .login(username, "correct-horse-battery")
            .await
            .unwrap()
            .token
    }

    pub async fn admin_token(&self) -> String {
        self.token_for("ethan", "admin").await
    }

    pub async fn agent_token(&self) -> String {
        self.token_for("benji", "agent").await
    }

    /// Create a gadget as an admin and return its data
    pub async fn create_gadget(&self, token: &str, name: &str) -> Value {
        let (status, body) = self
            .request(
                Method::POST,
                "/api/gadgets",
                Some(token),
                Some(serde_json::json!({ "name": name })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["data"].clone()
    }
}
