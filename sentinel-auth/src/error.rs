//! Error types for sentinel-auth

use thiserror::Error;

/// Result type alias for MFA and invitation operations
pub type Result<T> = std::result::Result<T, AuthError>;

/// Why a one-time code was not accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeRejection {
    /// Code does not match the factor
    Mismatch,
    /// Challenge expired before the code was submitted
    Expired,
    /// Challenge was already consumed by an earlier attempt
    AlreadyUsed,
    /// Code is not a six digit number
    Malformed,
}

impl std::fmt::Display for CodeRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodeRejection::Mismatch => write!(f, "code does not match"),
            CodeRejection::Expired => write!(f, "challenge expired"),
            CodeRejection::AlreadyUsed => write!(f, "challenge already used"),
            CodeRejection::Malformed => write!(f, "code must be 6 digits"),
        }
    }
}

#[derive(Error, Debug)]
pub enum AuthError {
    /// Identity provider or network failure, surfaced verbatim
    #[error("Identity provider error: {0}")]
    Provider(String),

    #[error("Invalid verification code: {0}")]
    InvalidCode(CodeRejection),

    #[error("MFA is not enabled for this account")]
    MfaNotEnabled,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("MFA is already enabled for this account")]
    AlreadyEnrolled,

    #[error("No enrollment in progress for factor {0}")]
    NoPendingEnrollment(String),

    #[error("Factor not found: {0}")]
    FactorNotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Too many attempts. Please try again later.")]
    RateLimited,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        AuthError::Provider(err.to_string())
    }
}

impl From<config::ConfigError> for AuthError {
    fn from(err: config::ConfigError) -> Self {
        AuthError::Config(err.to_string())
    }
}
