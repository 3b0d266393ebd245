//! Admin session
//!
//! Explicit session object handed to every operation instead of ambient
//! global state. Loaded once from the identity provider and reloaded only
//! on request.

use tracing::debug;

use crate::error::Result;
use crate::identity::{AccessToken, IdentityProvider, User};

#[derive(Debug, Clone)]
pub struct AdminSession {
    token: AccessToken,
    user: User,
}

impl AdminSession {
    /// Resolve a session token to its admin (`Unauthorized` if rejected)
    pub async fn load(provider: &dyn IdentityProvider, token: AccessToken) -> Result<Self> {
        let user = provider.get_user(&token).await?;
        debug!("Loaded session for {}", user.id);
        Ok(Self { token, user })
    }

    /// Re-read the user behind the current token
    pub async fn reload(&mut self, provider: &dyn IdentityProvider) -> Result<()> {
        self.user = provider.get_user(&self.token).await?;
        Ok(())
    }

    pub fn token(&self) -> &AccessToken {
        &self.token
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn user_id(&self) -> &str {
        &self.user.id
    }
}
