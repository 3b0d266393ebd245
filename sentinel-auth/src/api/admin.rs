//! Admin API Handlers - MFA-gated invitations

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use super::handlers::{json_body, AppState, InviteResponse};
use crate::error::Result;
use crate::session::AdminSession;

/// Gated invite request
#[derive(Debug, Deserialize)]
pub struct SendInviteRequest {
    pub email: String,
    /// Current TOTP code of the requesting admin
    pub code: String,
}

/// POST /api/admin/invite - Invite an admin after a fresh MFA check
pub async fn send_invite(
    State(state): State<Arc<AppState>>,
    session: AdminSession,
    payload: std::result::Result<Json<SendInviteRequest>, JsonRejection>,
) -> Result<Json<InviteResponse>> {
    let request = json_body(payload)?;
    info!("Admin {}: invite requested", session.user_id());

    let controller = state.controller_for(&session).await?;
    let controller = controller.lock().await;
    if controller.is_enabled() {
        state.check_attempt(&session).await?;
    }

    let invitation = state
        .gate
        .send_invite(&controller, &session, &request.email, &request.code)
        .await?;
    Ok(Json(InviteResponse { data: invitation }))
}
