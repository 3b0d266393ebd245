//! Identity provider abstraction
//!
//! All durable account state (users, sessions, factors, challenges,
//! invitations) lives in an external identity provider. The console only
//! sequences calls against it.

use async_trait::async_trait;

use crate::error::Result;

pub mod http;
pub mod memory;
pub mod token;
pub mod totp;
pub mod types;

pub use http::HttpIdentityProvider;
pub use memory::{InMemoryIdentityProvider, ProviderCall, ProviderOp};
pub use types::*;

/// Identity provider capabilities consumed by the console
///
/// Every user-scoped call carries the caller's session token; the provider
/// is expected to check that the factor or challenge belongs to that user.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve the session token to a user (`Unauthorized` if invalid)
    async fn get_user(&self, token: &AccessToken) -> Result<User>;

    /// All factors of the user, verified or not
    async fn list_factors(&self, token: &AccessToken) -> Result<Vec<Factor>>;

    /// Register a new, not yet verified, TOTP factor
    async fn enroll(&self, token: &AccessToken, params: EnrollParams) -> Result<EnrollResult>;

    /// Issue a single-use challenge for a factor
    async fn challenge(&self, token: &AccessToken, factor_id: &str) -> Result<Challenge>;

    /// Submit a code against a challenge
    async fn verify(
        &self,
        token: &AccessToken,
        factor_id: &str,
        challenge_id: &str,
        code: &str,
    ) -> Result<VerifyOutcome>;

    /// Remove a factor
    async fn unenroll(&self, token: &AccessToken, factor_id: &str) -> Result<()>;

    /// Privileged invite-by-email
    async fn invite_user_by_email(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> Result<Invitation>;

    /// Provider name (for logs and health checks)
    fn name(&self) -> &str;
}
