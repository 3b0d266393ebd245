//! MFA state controller
//!
//! Mediates the two transitions an admin can make:
//!
//! ```text
//! NoFactor --start_enrollment--> Pending --confirm_enrollment--> Enabled
//! Enabled  --disable-----------> NoFactor
//! ```
//!
//! A rejected code leaves the state untouched. A factor is only ever removed
//! right after a fresh challenge has been verified for it.

use std::sync::Arc;
use tracing::{info, warn};

use super::types::*;
use super::verification::verify_fresh;
use crate::error::{AuthError, Result};
use crate::identity::{active_factor, EnrollParams, Factor, IdentityProvider};
use crate::session::AdminSession;

/// MFA controller for one admin
pub struct MfaController {
    provider: Arc<dyn IdentityProvider>,
    owner: String,
    state: MfaState,
}

impl MfaController {
    /// Build the controller for the session's admin and read its factors once
    pub async fn load(provider: Arc<dyn IdentityProvider>, session: &AdminSession) -> Result<Self> {
        let mut controller = Self {
            provider,
            owner: session.user_id().to_string(),
            state: MfaState::NoFactor,
        };
        controller.refresh(session).await?;
        Ok(controller)
    }

    pub fn state(&self) -> &MfaState {
        &self.state
    }

    pub fn status(&self) -> MfaStatus {
        MfaStatus::from(&self.state)
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self.state, MfaState::Enabled(_))
    }

    pub fn active_factor(&self) -> Option<&Factor> {
        match &self.state {
            MfaState::Enabled(factor) => Some(factor),
            _ => None,
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Refuse sessions belonging to another admin
    pub fn check_owner(&self, session: &AdminSession) -> Result<()> {
        if session.user_id() != self.owner {
            warn!(
                "Session for {} used against MFA state of {}",
                session.user_id(),
                self.owner
            );
            return Err(AuthError::Unauthorized(
                "Session does not belong to this account".to_string(),
            ));
        }
        Ok(())
    }

    /// Re-read factors from the provider.
    ///
    /// Only verified TOTP factors count as enabled; unverified stubs left by
    /// abandoned enrollments are ignored. An in-progress enrollment survives
    /// a refresh as long as no verified factor exists.
    pub async fn refresh(&mut self, session: &AdminSession) -> Result<MfaStatus> {
        self.check_owner(session)?;
        let factors = self.provider.list_factors(session.token()).await?;

        self.state = match (active_factor(&factors), &self.state) {
            (Some(factor), _) => MfaState::Enabled(factor.clone()),
            (None, MfaState::Pending(pending)) => MfaState::Pending(pending.clone()),
            (None, _) => MfaState::NoFactor,
        };
        Ok(self.status())
    }

    /// Register a new TOTP factor and hold its provisioning material
    pub async fn start_enrollment(&mut self, session: &AdminSession) -> Result<EnrollmentSession> {
        self.start_named_enrollment(session, None).await
    }

    /// Same as `start_enrollment`, labelling the factor for authenticator lists
    pub async fn start_named_enrollment(
        &mut self,
        session: &AdminSession,
        friendly_name: Option<String>,
    ) -> Result<EnrollmentSession> {
        self.check_owner(session)?;
        if self.is_enabled() {
            return Err(AuthError::AlreadyEnrolled);
        }
        if let MfaState::Pending(previous) = &self.state {
            warn!(
                "Replacing unfinished enrollment {} for {}",
                previous.factor_id, self.owner
            );
        }

        let result = self
            .provider
            .enroll(session.token(), EnrollParams { friendly_name })
            .await?;
        let enrollment = EnrollmentSession::from(result);

        info!("MFA enrollment started for {}", self.owner);
        audit(MfaEventType::SetupStarted, &self.owner);

        self.state = MfaState::Pending(enrollment.clone());
        Ok(enrollment)
    }

    /// Verify the first code of a pending enrollment
    pub async fn confirm_enrollment(
        &mut self,
        session: &AdminSession,
        factor_id: &str,
        code: &str,
    ) -> Result<Factor> {
        self.check_owner(session)?;
        match &self.state {
            MfaState::Pending(pending) if pending.factor_id == factor_id => {}
            _ => return Err(AuthError::NoPendingEnrollment(factor_id.to_string())),
        }

        let token = verify_fresh(self.provider.as_ref(), session, factor_id, code).await?;

        // Cache the provider's copy of the factor, not a local guess
        let factor = self
            .provider
            .list_factors(&token)
            .await?
            .into_iter()
            .find(|f| f.id == factor_id && f.is_verified_totp())
            .ok_or_else(|| {
                AuthError::Provider(format!("Factor {} not reported as verified", factor_id))
            })?;

        info!("MFA enabled for {}", self.owner);
        audit(MfaEventType::SetupCompleted, &self.owner);

        self.state = MfaState::Enabled(factor.clone());
        Ok(factor)
    }

    /// Remove the active factor after a fresh verification.
    ///
    /// Fails closed: if the code is rejected, `unenroll` is never called.
    pub async fn disable(
        &mut self,
        session: &AdminSession,
        factor_id: &str,
        code: &str,
    ) -> Result<()> {
        self.check_owner(session)?;
        match self.active_factor() {
            Some(factor) if factor.id == factor_id => {}
            _ => return Err(AuthError::FactorNotFound(factor_id.to_string())),
        }

        let token = verify_fresh(self.provider.as_ref(), session, factor_id, code).await?;
        self.provider.unenroll(&token, factor_id).await?;

        info!("MFA disabled for {}", self.owner);
        audit(MfaEventType::Disabled, &self.owner);

        self.state = MfaState::NoFactor;
        Ok(())
    }

    /// Abandon the in-progress enrollment.
    ///
    /// The provider may keep an unverified stub, which never counts as
    /// enabled.
    pub fn cancel_enrollment(&mut self) -> Option<EnrollmentSession> {
        match std::mem::replace(&mut self.state, MfaState::NoFactor) {
            MfaState::Pending(pending) => {
                audit(MfaEventType::SetupCancelled, &self.owner);
                Some(pending)
            }
            other => {
                self.state = other;
                None
            }
        }
    }
}
