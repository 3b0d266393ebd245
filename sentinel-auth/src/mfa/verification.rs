//! Proof of possession: one fresh challenge, one verify

use tracing::{debug, warn};

use super::types::{audit, MfaEventType};
use crate::error::{AuthError, CodeRejection, Result};
use crate::identity::{AccessToken, IdentityProvider, VerifyOutcome};
use crate::session::AdminSession;

/// Number of digits in a TOTP code
const CODE_DIGITS: usize = 6;

/// Reject codes that cannot possibly be valid without spending a challenge
pub fn check_code_format(code: &str) -> Result<()> {
    if code.len() == CODE_DIGITS && code.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(AuthError::InvalidCode(CodeRejection::Malformed))
    }
}

/// Issue a new challenge for `factor_id` and verify `code` against it.
///
/// Every call requests its own challenge; a challenge id is never reused.
/// Returns the token to use for calls that need the verified assurance
/// level: the upgraded one if the provider issued it, else the session's.
pub async fn verify_fresh(
    provider: &dyn IdentityProvider,
    session: &AdminSession,
    factor_id: &str,
    code: &str,
) -> Result<AccessToken> {
    check_code_format(code)?;

    let challenge = provider.challenge(session.token(), factor_id).await?;
    debug!("Challenge {} issued for factor {}", challenge.id, factor_id);

    match provider
        .verify(session.token(), factor_id, &challenge.id, code)
        .await?
    {
        VerifyOutcome::Verified(upgraded) => {
            audit(MfaEventType::VerifySuccess, session.user_id());
            Ok(upgraded.unwrap_or_else(|| session.token().clone()))
        }
        VerifyOutcome::Rejected(reason) => {
            warn!(
                "Code rejected for factor {} ({}): {}",
                factor_id,
                session.user_id(),
                reason
            );
            audit(MfaEventType::VerifyFailed, session.user_id());
            Err(AuthError::InvalidCode(reason))
        }
    }
}
