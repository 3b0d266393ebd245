//! API Server - HTTP server for the console API

use axum::{
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::api::handlers::{self, AppState};
use crate::api::{admin, mfa};
use crate::config::Config;
use crate::error::AuthError;
use crate::identity::{AccessToken, IdentityProvider};
use crate::session::AdminSession;

/// Rate limiter for tracking attempts per key (admin id)
pub struct RateLimiter {
    /// Map of key -> (request count, window start time)
    requests: RwLock<HashMap<String, (u32, Instant)>>,
    /// Maximum requests per window
    max_requests: u32,
    /// Window duration
    window_duration: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window_seconds: u64) -> Self {
        Self {
            requests: RwLock::new(HashMap::new()),
            max_requests,
            window_duration: Duration::from_secs(window_seconds),
        }
    }

    /// Check if a request should be allowed for the given key
    pub async fn check_rate_limit(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut requests = self.requests.write().await;

        let entry = requests.entry(key.to_string()).or_insert((0, now));

        // Reset if window has passed
        if now.duration_since(entry.1) > self.window_duration {
            entry.0 = 0;
            entry.1 = now;
        }

        if entry.0 >= self.max_requests {
            return false;
        }

        entry.0 += 1;
        true
    }

    /// Clean up old entries (call periodically)
    pub async fn cleanup(&self) {
        let now = Instant::now();
        let mut requests = self.requests.write().await;
        requests.retain(|_, (_, start)| now.duration_since(*start) <= self.window_duration * 2);
    }

    pub fn window(&self) -> Duration {
        self.window_duration
    }
}

/// API Server configuration
pub struct ApiServer {
    state: Arc<AppState>,
    addr: String,
}

impl ApiServer {
    pub fn new(provider: Arc<dyn IdentityProvider>, config: &Config) -> Self {
        Self {
            state: Arc::new(AppState::new(provider, config)),
            addr: config.server.listen_addr.clone(),
        }
    }

    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }

    /// Build the router with all routes
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        // Public routes (no auth required)
        let public_routes = Router::new().route("/health", get(handlers::health));

        // Protected routes (bearer session token required)
        let protected_routes = Router::new()
            .route("/invite", post(handlers::invite))
            .route("/api/mfa/status", get(mfa::get_status))
            .route(
                "/api/mfa/enroll",
                post(mfa::start_enrollment).delete(mfa::cancel_enrollment),
            )
            .route("/api/mfa/verify", post(mfa::confirm_enrollment))
            .route("/api/mfa/disable", post(mfa::disable))
            .route("/api/admin/invite", post(admin::send_invite))
            .route_layer(middleware::from_fn_with_state(
                self.state.clone(),
                auth_middleware,
            ));

        Router::new()
            .merge(public_routes)
            .merge(protected_routes)
            .layer(TraceLayer::new_for_http())
            .layer(cors)
            .with_state(self.state.clone())
    }

    /// Start the API server
    pub async fn run(&self) -> std::io::Result<()> {
        let router = self.router();

        let limiter_state = self.state.clone();
        tokio::spawn(async move {
            let period = limiter_state.rate_limiter.window().max(Duration::from_secs(1));
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                limiter_state.rate_limiter.cleanup().await;
            }
        });

        info!("Starting API server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(&self.addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}

/// Pull the token out of `Authorization: Bearer <token>`
pub fn bearer_token(header: Option<&str>) -> Option<AccessToken> {
    let token = header?.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(AccessToken::new(token))
}

/// Authentication middleware - resolves the session token with the provider
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = match bearer_token(header) {
        Some(token) => token,
        None => {
            warn!("Missing or invalid Authorization header");
            return AuthError::Unauthorized("Missing or invalid Authorization header".to_string())
                .into_response();
        }
    };

    match AdminSession::load(state.provider.as_ref(), token).await {
        Ok(session) => {
            // Store the session in request extensions for handlers
            req.extensions_mut().insert(session);
            next.run(req).await
        }
        Err(e) => {
            warn!("Session rejected: {}", e);
            e.into_response()
        }
    }
}

/// Extract the AdminSession from request (for handlers)
#[axum::async_trait]
impl<S> FromRequestParts<S> for AdminSession
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AdminSession>()
            .cloned()
            .ok_or_else(|| AuthError::Unauthorized("Not authenticated".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token() {
        assert_eq!(
            bearer_token(Some("Bearer abc")).map(|t| t.as_str().to_string()),
            Some("abc".to_string())
        );
        assert!(bearer_token(Some("Bearer ")).is_none());
        assert!(bearer_token(Some("Basic abc")).is_none());
        assert!(bearer_token(None).is_none());
    }

    #[tokio::test]
    async fn test_rate_limiter_blocks_after_max() {
        let limiter = RateLimiter::new(2, 60);
        assert!(limiter.check_rate_limit("admin").await);
        assert!(limiter.check_rate_limit("admin").await);
        assert!(!limiter.check_rate_limit("admin").await);
        assert!(limiter.check_rate_limit("other").await);
    }
}
