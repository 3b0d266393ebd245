//! Invitation gate

use std::sync::Arc;
use tracing::warn;

use super::{normalize_email, InviteDispatcher};
use crate::error::{AuthError, Result};
use crate::identity::{IdentityProvider, Invitation};
use crate::mfa::types::{audit, MfaEventType};
use crate::mfa::verification::verify_fresh;
use crate::mfa::MfaController;
use crate::session::AdminSession;

/// Lets an invite through only right after a fresh MFA verification
pub struct InvitationGate {
    provider: Arc<dyn IdentityProvider>,
    dispatcher: Arc<dyn InviteDispatcher>,
}

impl InvitationGate {
    pub fn new(provider: Arc<dyn IdentityProvider>, dispatcher: Arc<dyn InviteDispatcher>) -> Self {
        Self {
            provider,
            dispatcher,
        }
    }

    /// Send an invite on behalf of the session's admin.
    ///
    /// 1. MFA must be enabled, otherwise nothing is sent over the network.
    /// 2. `code` is checked against a new challenge for the admin's factor.
    /// 3. Only then is the dispatcher called.
    pub async fn send_invite(
        &self,
        controller: &MfaController,
        session: &AdminSession,
        email: &str,
        code: &str,
    ) -> Result<Invitation> {
        controller.check_owner(session)?;

        let factor = match controller.active_factor() {
            Some(factor) => factor,
            None => {
                warn!("Invite refused for {}: MFA not enabled", session.user_id());
                audit(MfaEventType::InviteBlocked, session.user_id());
                return Err(AuthError::MfaNotEnabled);
            }
        };
        let email = normalize_email(email)?;

        if let Err(e) = verify_fresh(self.provider.as_ref(), session, &factor.id, code).await {
            audit(MfaEventType::InviteBlocked, session.user_id());
            return Err(e);
        }

        let invitation = self.dispatcher.dispatch(session, &email).await?;
        audit(MfaEventType::InviteSent, session.user_id());
        Ok(invitation)
    }
}
