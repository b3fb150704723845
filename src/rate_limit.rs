/// Per-client request rate limiting
use crate::{config::RateLimitConfig, context::AppContext, error::ApiError};
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::{Clock, DefaultClock},
    middleware::StateInformationMiddleware,
    state::keyed::DefaultKeyedStateStore,
    Quota, RateLimiter as GovernorLimiter,
};
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    num::NonZeroU32,
    sync::Arc,
};

type KeyedLimiter = GovernorLimiter<
    IpAddr,
    DefaultKeyedStateStore<IpAddr>,
    DefaultClock,
    StateInformationMiddleware,
>;

/// Key used when the peer address is unknown (no `ConnectInfo`)
const UNKNOWN_CLIENT: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

/// Rate limiter manager
///
/// Each client IP gets its own bucket of `max_requests` per `window`, with a
/// burst equal to the full allowance, replenishing evenly across the window.
#[derive(Clone)]
pub struct RateLimiter {
    limiter: Option<Arc<KeyedLimiter>>,
    max_requests: u32,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let quota = NonZeroU32::new(config.max_requests).and_then(|burst| {
            Quota::with_period(config.window / burst.get()).map(|q| q.allow_burst(burst))
        });

        let limiter = match quota {
            Some(quota) if config.enabled => Some(Arc::new(
                GovernorLimiter::keyed(quota).with_middleware::<StateInformationMiddleware>(),
            )),
            Some(_) => None,
            None => {
                if config.enabled {
                    tracing::warn!(
                        max_requests = config.max_requests,
                        window = ?config.window,
                        "Rate limit quota is empty; limiting disabled"
                    );
                }
                None
            }
        };

        Self {
            limiter,
            max_requests: config.max_requests,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.limiter.is_some()
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Consume one request from the client's allowance.
    ///
    /// Returns the remaining allowance, or `None` when limiting is off.
    pub fn check(&self, client: IpAddr) -> Result<Option<u32>, ApiError> {
        let Some(limiter) = &self.limiter else {
            return Ok(None);
        };

        match limiter.check_key(&client) {
            Ok(snapshot) => Ok(Some(snapshot.remaining_burst_capacity())),
            Err(not_until) => Err(ApiError::RateLimitExceeded {
                retry_after: not_until.wait_time_from(limiter.clock().now()),
            }),
        }
    }

    /// Drop buckets that have fully replenished
    pub fn prune(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.retain_recent();
            limiter.shrink_to_fit();
        }
    }

    /// Number of clients currently tracked
    pub fn tracked_clients(&self) -> usize {
        self.limiter.as_ref().map_or(0, |l| l.len())
    }
}

fn client_ip(request: &Request) -> IpAddr {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(UNKNOWN_CLIENT)
}

fn insert_limit_headers(headers: &mut HeaderMap, limit: u32, remaining: u32) {
    headers.insert("RateLimit-Limit", HeaderValue::from(limit));
    headers.insert("RateLimit-Remaining", HeaderValue::from(remaining));
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(ctx): State<AppContext>,
    request: Request,
    next: Next,
) -> Response {
    let client = client_ip(&request);
    let limit = ctx.rate_limiter.max_requests();

    match ctx.rate_limiter.check(client) {
        Ok(remaining) => {
            let mut response = next.run(request).await;
            if let Some(remaining) = remaining {
                insert_limit_headers(response.headers_mut(), limit, remaining);
            }
            response
        }
        Err(e) => {
            tracing::warn!(client = %client, path = %request.uri().path(), "Rate limit exceeded");
            let mut response = e.into_response();
            insert_limit_headers(response.headers_mut(), limit, 0);
            response
        }
    }
}
