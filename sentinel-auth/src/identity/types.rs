//! Identity provider types and data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CodeRejection;

/// Session token issued by the identity provider
///
/// `Debug` never prints the token itself.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(..)")
    }
}

/// Authenticated account as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
}

/// Kind of authentication factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactorType {
    Totp,
}

/// Whether a factor has completed its first verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactorStatus {
    #[serde(alias = "enrolled")]
    Verified,
    Unverified,
}

/// A registered authentication method
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Factor {
    pub id: String,
    pub factor_type: FactorType,
    pub status: FactorStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Factor {
    pub fn is_verified_totp(&self) -> bool {
        self.factor_type == FactorType::Totp && self.status == FactorStatus::Verified
    }
}

/// Parameters for `enroll`
#[derive(Debug, Clone, Default)]
pub struct EnrollParams {
    pub friendly_name: Option<String>,
}

/// Result of a successful `enroll`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollResult {
    pub factor_id: String,
    /// QR code as an image data URI
    pub qr_code: String,
    /// Shared secret (base32) for manual entry
    pub secret: String,
    /// otpauth:// provisioning URI
    pub uri: String,
}

/// Single-use challenge issued for one verification attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub id: String,
    pub factor_id: String,
    pub expires_at: DateTime<Utc>,
}

/// Outcome of submitting a code against a challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Code accepted. Carries the upgraded (AAL2) session token when the
    /// provider issues one; later factor removal must use it.
    Verified(Option<AccessToken>),
    Rejected(CodeRejection),
}

/// Invitation created by invite-by-email
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invitation {
    /// Id of the (not yet confirmed) invited account
    pub user_id: String,
    pub email: String,
    pub invited_at: DateTime<Utc>,
}

/// First verified TOTP factor in list order, the one the console acts on
pub fn active_factor(factors: &[Factor]) -> Option<&Factor> {
    factors.iter().find(|f| f.is_verified_totp())
}
