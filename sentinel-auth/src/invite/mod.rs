//! Admin-to-admin invitations
//!
//! An invite may only leave the console after the requesting admin has
//! proven possession of their MFA factor with a code checked against a
//! fresh challenge ([`InvitationGate`]). The dispatch itself is pluggable
//! ([`InviteDispatcher`]).

pub mod dispatcher;
pub mod gate;

pub use dispatcher::{HttpInviteDispatcher, InviteDispatcher, ProviderInviteDispatcher};
pub use gate::InvitationGate;

use crate::error::{AuthError, Result};

/// Trim and lowercase an invite address, rejecting anything that is not
/// `local@domain`
pub fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return Err(AuthError::InvalidRequest("email is required".to_string()));
    }

    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };

    if !valid {
        return Err(AuthError::InvalidRequest(format!(
            "invalid email address: {}",
            email
        )));
    }
    Ok(email)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(
            normalize_email("  New.Admin@Example.COM ").unwrap(),
            "new.admin@example.com"
        );
        assert!(normalize_email("").is_err());
        assert!(normalize_email("   ").is_err());
        assert!(normalize_email("no-at-sign").is_err());
        assert!(normalize_email("@example.com").is_err());
        assert!(normalize_email("a@b@c").is_err());
        assert!(normalize_email("a b@example.com").is_err());
    }
}
