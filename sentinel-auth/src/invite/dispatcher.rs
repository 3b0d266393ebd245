//! Invite dispatchers
//!
//! The dispatcher is the last hop of an invite: it authenticates the caller
//! and forwards the address to the identity provider's invite-by-email.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use super::normalize_email;
use crate::error::{AuthError, Result};
use crate::identity::{AccessToken, IdentityProvider, Invitation, User};
use crate::session::AdminSession;

#[async_trait]
pub trait InviteDispatcher: Send + Sync {
    async fn dispatch(&self, session: &AdminSession, email: &str) -> Result<Invitation>;
}

/// In-process dispatcher, the logic behind `POST /invite`
pub struct ProviderInviteDispatcher {
    provider: Arc<dyn IdentityProvider>,
    redirect_to: Option<String>,
}

impl ProviderInviteDispatcher {
    pub fn new(provider: Arc<dyn IdentityProvider>, redirect_to: Option<String>) -> Self {
        Self {
            provider,
            redirect_to,
        }
    }

    /// Authenticate a raw bearer token, then invite
    pub async fn invite(&self, token: &AccessToken, email: &str) -> Result<Invitation> {
        let user = self.provider.get_user(token).await?;
        self.forward(&user, email).await
    }

    /// Invite on behalf of an already authenticated admin
    pub async fn forward(&self, user: &User, email: &str) -> Result<Invitation> {
        let email = normalize_email(email)?;

        let invitation = self
            .provider
            .invite_user_by_email(&email, self.redirect_to.as_deref())
            .await?;
        info!("Admin {} invited {}", user.id, invitation.email);
        Ok(invitation)
    }
}

#[async_trait]
impl InviteDispatcher for ProviderInviteDispatcher {
    async fn dispatch(&self, session: &AdminSession, email: &str) -> Result<Invitation> {
        self.invite(session.token(), email).await
    }
}

#[derive(Serialize)]
struct InviteBody<'a> {
    email: &'a str,
}

#[derive(Deserialize)]
struct InviteData {
    data: Invitation,
}

#[derive(Deserialize)]
struct InviteFailure {
    error: String,
}

/// Dispatcher calling a remote `POST /invite` endpoint
pub struct HttpInviteDispatcher {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpInviteDispatcher {
    pub fn new(endpoint: String) -> Self {
        Self {
            endpoint,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl InviteDispatcher for HttpInviteDispatcher {
    async fn dispatch(&self, session: &AdminSession, email: &str) -> Result<Invitation> {
        debug!("HttpInviteDispatcher: POST {}", self.endpoint);
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(session.token().as_str())
            .json(&InviteBody { email })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let body: InviteData = response.json().await?;
            return Ok(body.data);
        }

        let message = response
            .json::<InviteFailure>()
            .await
            .map(|f| f.error)
            .unwrap_or_else(|_| status.to_string());

        match status {
            reqwest::StatusCode::UNAUTHORIZED => Err(AuthError::Unauthorized(message)),
            _ => Err(AuthError::Provider(message)),
        }
    }
}
