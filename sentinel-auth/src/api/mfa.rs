//! API endpoints for MFA management

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::api::handlers::{json_body, AppState};
use crate::error::Result;
use crate::mfa::{CodeSubmission, EnrollmentSession, MfaStatus};
use crate::session::AdminSession;

/// GET /api/mfa/status - Re-read factors and report MFA status
pub async fn get_status(
    State(state): State<Arc<AppState>>,
    session: AdminSession,
) -> Result<Json<MfaStatus>> {
    let controller = state.controller_for(&session).await?;
    let status = controller.lock().await.refresh(&session).await?;
    Ok(Json(status))
}

/// POST /api/mfa/enroll - Start MFA setup (secret and QR code)
pub async fn start_enrollment(
    State(state): State<Arc<AppState>>,
    session: AdminSession,
) -> Result<Json<EnrollmentSession>> {
    let controller = state.controller_for(&session).await?;
    let enrollment = controller.lock().await.start_enrollment(&session).await?;
    Ok(Json(enrollment))
}

/// DELETE /api/mfa/enroll - Abandon an unfinished setup
pub async fn cancel_enrollment(
    State(state): State<Arc<AppState>>,
    session: AdminSession,
) -> Result<StatusCode> {
    let controller = state.controller_for(&session).await?;
    let mut controller = controller.lock().await;
    controller.check_owner(&session)?;
    controller.cancel_enrollment();
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/mfa/verify - Verify the first code and enable MFA
pub async fn confirm_enrollment(
    State(state): State<Arc<AppState>>,
    session: AdminSession,
    payload: std::result::Result<Json<CodeSubmission>, JsonRejection>,
) -> Result<Json<MfaStatus>> {
    let submission = json_body(payload)?;
    state.check_attempt(&session).await?;

    let controller = state.controller_for(&session).await?;
    let mut controller = controller.lock().await;
    controller
        .confirm_enrollment(&session, &submission.factor_id, &submission.code)
        .await?;
    Ok(Json(controller.status()))
}

/// POST /api/mfa/disable - Disable MFA (requires current code)
pub async fn disable(
    State(state): State<Arc<AppState>>,
    session: AdminSession,
    payload: std::result::Result<Json<CodeSubmission>, JsonRejection>,
) -> Result<Json<MfaStatus>> {
    let submission = json_body(payload)?;
    state.check_attempt(&session).await?;

    let controller = state.controller_for(&session).await?;
    let mut controller = controller.lock().await;
    controller
        .disable(&session, &submission.factor_id, &submission.code)
        .await?;
    Ok(Json(controller.status()))
}
