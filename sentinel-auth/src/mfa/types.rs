//! MFA types and data structures

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::identity::{EnrollResult, Factor};

/// In-progress enrollment, held only in memory until verified or abandoned
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrollmentSession {
    pub factor_id: String,
    /// QR code as data URI
    pub qr_code: String,
    /// The secret in base32 format (for manual entry)
    pub secret: String,
    /// The provisioning URI for authenticator apps
    pub uri: String,
}

impl From<EnrollResult> for EnrollmentSession {
    fn from(result: EnrollResult) -> Self {
        Self {
            factor_id: result.factor_id,
            qr_code: result.qr_code,
            secret: result.secret,
            uri: result.uri,
        }
    }
}

/// Where an admin stands in the enrollment lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MfaState {
    NoFactor,
    Pending(EnrollmentSession),
    Enabled(Factor),
}

/// MFA status response
#[derive(Debug, Clone, Serialize)]
pub struct MfaStatus {
    /// Whether MFA is enabled
    pub is_enabled: bool,
    /// Factor awaiting its first verification
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_factor_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_factor: Option<Factor>,
}

impl From<&MfaState> for MfaStatus {
    fn from(state: &MfaState) -> Self {
        match state {
            MfaState::NoFactor => Self {
                is_enabled: false,
                pending_factor_id: None,
                active_factor: None,
            },
            MfaState::Pending(session) => Self {
                is_enabled: false,
                pending_factor_id: Some(session.factor_id.clone()),
                active_factor: None,
            },
            MfaState::Enabled(factor) => Self {
                is_enabled: true,
                pending_factor_id: None,
                active_factor: Some(factor.clone()),
            },
        }
    }
}

/// Factor id plus the code the admin typed
#[derive(Debug, Clone, Deserialize)]
pub struct CodeSubmission {
    pub factor_id: String,
    pub code: String,
}

/// Types of MFA events for audit logging
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MfaEventType {
    /// MFA setup initiated
    SetupStarted,
    /// MFA setup completed (enabled)
    SetupCompleted,
    /// Enrollment abandoned before verification
    SetupCancelled,
    VerifySuccess,
    VerifyFailed,
    Disabled,
    /// Invite dispatched after a fresh verification
    InviteSent,
    /// Invite refused before dispatch
    InviteBlocked,
}

impl std::fmt::Display for MfaEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MfaEventType::SetupStarted => write!(f, "setup_started"),
            MfaEventType::SetupCompleted => write!(f, "setup_completed"),
            MfaEventType::SetupCancelled => write!(f, "setup_cancelled"),
            MfaEventType::VerifySuccess => write!(f, "verify_success"),
            MfaEventType::VerifyFailed => write!(f, "verify_failed"),
            MfaEventType::Disabled => write!(f, "disabled"),
            MfaEventType::InviteSent => write!(f, "invite_sent"),
            MfaEventType::InviteBlocked => write!(f, "invite_blocked"),
        }
    }
}

/// Emit an audit event
pub fn audit(event: MfaEventType, user_id: &str) {
    info!(target: "sentinel_auth::audit", event = %event, user_id, "mfa audit");
}
