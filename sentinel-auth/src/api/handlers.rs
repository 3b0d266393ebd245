//! API request handlers

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, warn};

use super::server::RateLimiter;
use crate::config::Config;
use crate::error::{AuthError, Result};
use crate::identity::{IdentityProvider, Invitation};
use crate::invite::{InvitationGate, ProviderInviteDispatcher};
use crate::mfa::MfaController;
use crate::session::AdminSession;

/// Shared application state
pub struct AppState {
    pub provider: Arc<dyn IdentityProvider>,
    pub dispatcher: Arc<ProviderInviteDispatcher>,
    pub gate: InvitationGate,
    /// One controller per admin id, loaded on first use
    pub controllers: RwLock<HashMap<String, Arc<Mutex<MfaController>>>>,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    pub fn new(provider: Arc<dyn IdentityProvider>, config: &Config) -> Self {
        let dispatcher = Arc::new(ProviderInviteDispatcher::new(
            provider.clone(),
            config.invite.redirect_to.clone(),
        ));

        Self {
            gate: InvitationGate::new(provider.clone(), dispatcher.clone()),
            dispatcher,
            provider,
            controllers: RwLock::new(HashMap::new()),
            rate_limiter: RateLimiter::new(
                config.rate_limit.max_attempts,
                config.rate_limit.window_seconds,
            ),
        }
    }

    /// The admin's controller, loading it from the provider the first time
    pub async fn controller_for(&self, session: &AdminSession) -> Result<Arc<Mutex<MfaController>>> {
        if let Some(controller) = self.controllers.read().await.get(session.user_id()) {
            return Ok(controller.clone());
        }

        let loaded = MfaController::load(self.provider.clone(), session).await?;
        let mut controllers = self.controllers.write().await;
        Ok(controllers
            .entry(session.user_id().to_string())
            .or_insert_with(|| Arc::new(Mutex::new(loaded)))
            .clone())
    }

    /// Count one code submission against the admin's budget
    pub async fn check_attempt(&self, session: &AdminSession) -> Result<()> {
        if self.rate_limiter.check_rate_limit(session.user_id()).await {
            Ok(())
        } else {
            warn!("Rate limit exceeded for {}", session.user_id());
            Err(AuthError::RateLimited)
        }
    }
}

/// API error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
}

impl ApiError {
    pub fn new(msg: &str) -> Self {
        Self {
            error: msg.to_string(),
        }
    }
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AuthError::InvalidRequest(_) | AuthError::InvalidCode(_) | AuthError::Provider(_) => {
                StatusCode::BAD_REQUEST
            }
            AuthError::MfaNotEnabled => StatusCode::FORBIDDEN,
            AuthError::FactorNotFound(_) => StatusCode::NOT_FOUND,
            AuthError::AlreadyEnrolled | AuthError::NoPendingEnrollment(_) => StatusCode::CONFLICT,
            AuthError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AuthError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
            return (status, Json(ApiError::new("Internal server error"))).into_response();
        }
        (status, Json(ApiError::new(&self.to_string()))).into_response()
    }
}

/// Unwrap a JSON body, answering 400 instead of axum's default rejection
pub fn json_body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AuthError::InvalidRequest(rejection.body_text()))
}

/// Successful invite response
#[derive(Debug, Serialize, Deserialize)]
pub struct InviteResponse {
    pub data: Invitation,
}

/// Invite request body
#[derive(Debug, Deserialize)]
pub struct InviteRequest {
    #[serde(default)]
    pub email: Option<String>,
}

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "provider": state.provider.name(),
    }))
}

/// POST /invite - Forward an invite for an authenticated admin
pub async fn invite(
    State(state): State<Arc<AppState>>,
    session: AdminSession,
    payload: std::result::Result<Json<InviteRequest>, JsonRejection>,
) -> Result<Json<InviteResponse>> {
    let request = json_body(payload)?;
    let email = request
        .email
        .ok_or_else(|| AuthError::InvalidRequest("email is required".to_string()))?;

    let invitation = state.dispatcher.forward(session.user(), &email).await?;
    Ok(Json(InviteResponse { data: invitation }))
}
