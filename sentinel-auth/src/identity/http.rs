//! HTTP identity provider
//!
//! Talks to a GoTrue-style REST identity service:
//!
//! - `GET    /auth/v1/user`
//! - `POST   /auth/v1/factors`
//! - `POST   /auth/v1/factors/{id}/challenge`
//! - `POST   /auth/v1/factors/{id}/verify`
//! - `DELETE /auth/v1/factors/{id}`
//! - `POST   /auth/v1/invite` (service role key)

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::types::*;
use super::IdentityProvider;
use crate::config::ProviderConfig;
use crate::error::{AuthError, CodeRejection, Result};

pub struct HttpIdentityProvider {
    base_url: String,
    anon_key: String,
    service_role_key: Option<String>,
    client: reqwest::Client,
}

impl HttpIdentityProvider {
    pub fn new(base_url: String, anon_key: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key,
            service_role_key: None,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_service_role_key(mut self, key: String) -> Self {
        self.service_role_key = Some(key);
        self
    }

    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            service_role_key: config.service_role_key.clone(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/auth/v1{}", self.base_url, path)
    }

    fn user_request(
        &self,
        method: reqwest::Method,
        path: &str,
        token: &AccessToken,
    ) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.url(path))
            .header("apikey", &self.anon_key)
            .bearer_auth(token.as_str())
    }

    async fn fetch_user(&self, token: &AccessToken) -> Result<UserPayload> {
        debug!("HttpIdentityProvider: GET /user");
        let response = self
            .user_request(reqwest::Method::GET, "/user", token)
            .send()
            .await?;

        Ok(expect_success(response).await?.json().await?)
    }
}

/// Error body returned by the identity service
#[derive(Debug, Default, Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl ErrorPayload {
    fn message(&self) -> Option<&str> {
        self.msg
            .as_deref()
            .or(self.message.as_deref())
            .or(self.error_description.as_deref())
            .or(self.error.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct UserPayload {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    factors: Option<Vec<FactorPayload>>,
    #[serde(default)]
    invited_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct FactorPayload {
    id: String,
    factor_type: String,
    status: FactorStatus,
    #[serde(default)]
    friendly_name: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct EnrollRequest<'a> {
    factor_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    friendly_name: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EnrollPayload {
    id: String,
    totp: TotpPayload,
}

#[derive(Debug, Deserialize)]
struct TotpPayload {
    qr_code: String,
    secret: String,
    uri: String,
}

#[derive(Debug, Deserialize)]
struct ChallengePayload {
    id: String,
    expires_at: i64,
}

#[derive(Debug, Serialize)]
struct VerifyRequest<'a> {
    challenge_id: &'a str,
    code: &'a str,
}

/// Session returned by a successful verify
#[derive(Debug, Default, Deserialize)]
struct VerifyPayload {
    #[serde(default)]
    access_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct InviteRequest<'a> {
    email: &'a str,
}

/// Pass successful responses through, translate the rest into `AuthError`
async fn expect_success(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let payload: ErrorPayload = response.json().await.unwrap_or_default();
    let message = payload
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| status.to_string());
    warn!("HttpIdentityProvider: request failed with status {}: {}", status, message);

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(AuthError::Unauthorized(message));
    }
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(AuthError::FactorNotFound(message));
    }
    Err(AuthError::Provider(message))
}

/// Map a failed verify response onto a code rejection where it is one
fn classify_verify_failure(status: reqwest::StatusCode, payload: &ErrorPayload) -> Option<CodeRejection> {
    match payload.error_code.as_deref() {
        Some("mfa_verification_failed") => Some(CodeRejection::Mismatch),
        Some("mfa_challenge_expired") => Some(CodeRejection::Expired),
        Some("mfa_verification_rejected") => Some(CodeRejection::AlreadyUsed),
        Some(_) => None,
        None if status == reqwest::StatusCode::UNPROCESSABLE_ENTITY
            || status == reqwest::StatusCode::BAD_REQUEST =>
        {
            Some(CodeRejection::Mismatch)
        }
        None => None,
    }
}

impl FactorPayload {
    /// `None` for factor kinds the console does not manage (phone, webauthn)
    fn into_factor(self) -> Option<Factor> {
        let factor_type = match self.factor_type.as_str() {
            "totp" => FactorType::Totp,
            _ => return None,
        };
        Some(Factor {
            id: self.id,
            factor_type,
            status: self.status,
            friendly_name: self.friendly_name,
            created_at: self.created_at,
        })
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn get_user(&self, token: &AccessToken) -> Result<User> {
        let payload = self.fetch_user(token).await?;
        Ok(User {
            id: payload.id,
            email: payload.email.unwrap_or_default(),
        })
    }

    async fn list_factors(&self, token: &AccessToken) -> Result<Vec<Factor>> {
        let payload = self.fetch_user(token).await?;
        Ok(payload
            .factors
            .unwrap_or_default()
            .into_iter()
            .filter_map(FactorPayload::into_factor)
            .collect())
    }

    async fn enroll(&self, token: &AccessToken, params: EnrollParams) -> Result<EnrollResult> {
        debug!("HttpIdentityProvider: POST /factors");
        let response = self
            .user_request(reqwest::Method::POST, "/factors", token)
            .json(&EnrollRequest {
                factor_type: "totp",
                friendly_name: params.friendly_name.as_deref(),
            })
            .send()
            .await?;

        let payload: EnrollPayload = expect_success(response).await?.json().await?;
        Ok(EnrollResult {
            factor_id: payload.id,
            qr_code: payload.totp.qr_code,
            secret: payload.totp.secret,
            uri: payload.totp.uri,
        })
    }

    async fn challenge(&self, token: &AccessToken, factor_id: &str) -> Result<Challenge> {
        debug!("HttpIdentityProvider: POST /factors/{}/challenge", factor_id);
        let response = self
            .user_request(
                reqwest::Method::POST,
                &format!("/factors/{}/challenge", factor_id),
                token,
            )
            .send()
            .await?;

        let payload: ChallengePayload = expect_success(response).await?.json().await?;
        let expires_at = Utc
            .timestamp_opt(payload.expires_at, 0)
            .single()
            .ok_or_else(|| AuthError::Provider("Invalid challenge expiry".to_string()))?;

        Ok(Challenge {
            id: payload.id,
            factor_id: factor_id.to_string(),
            expires_at,
        })
    }

    async fn verify(
        &self,
        token: &AccessToken,
        factor_id: &str,
        challenge_id: &str,
        code: &str,
    ) -> Result<VerifyOutcome> {
        debug!("HttpIdentityProvider: POST /factors/{}/verify", factor_id);
        let response = self
            .user_request(
                reqwest::Method::POST,
                &format!("/factors/{}/verify", factor_id),
                token,
            )
            .json(&VerifyRequest { challenge_id, code })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let payload: VerifyPayload = response.json().await.unwrap_or_default();
            return Ok(VerifyOutcome::Verified(
                payload.access_token.map(AccessToken::new),
            ));
        }
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(AuthError::Unauthorized("Invalid or expired token".to_string()));
        }

        let payload: ErrorPayload = response.json().await.unwrap_or_default();
        match classify_verify_failure(status, &payload) {
            Some(rejection) => Ok(VerifyOutcome::Rejected(rejection)),
            None => Err(AuthError::Provider(
                payload
                    .message()
                    .map(str::to_string)
                    .unwrap_or_else(|| status.to_string()),
            )),
        }
    }

    async fn unenroll(&self, token: &AccessToken, factor_id: &str) -> Result<()> {
        debug!("HttpIdentityProvider: DELETE /factors/{}", factor_id);
        let response = self
            .user_request(
                reqwest::Method::DELETE,
                &format!("/factors/{}", factor_id),
                token,
            )
            .send()
            .await?;

        expect_success(response).await?;
        Ok(())
    }

    async fn invite_user_by_email(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> Result<Invitation> {
        let key = self.service_role_key.as_deref().ok_or_else(|| {
            AuthError::Config("provider.service_role_key is required to send invites".to_string())
        })?;

        debug!("HttpIdentityProvider: POST /invite");
        let mut request = self
            .client
            .post(self.url("/invite"))
            .header("apikey", key)
            .bearer_auth(key)
            .json(&InviteRequest { email });
        if let Some(redirect_to) = redirect_to {
            request = request.query(&[("redirect_to", redirect_to)]);
        }

        let payload: UserPayload = expect_success(request.send().await?).await?.json().await?;
        Ok(Invitation {
            user_id: payload.id,
            email: payload.email.unwrap_or_else(|| email.to_string()),
            invited_at: payload.invited_at.unwrap_or_else(Utc::now),
        })
    }

    fn name(&self) -> &str {
        "http"
    }
}
