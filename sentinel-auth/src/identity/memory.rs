//! In-memory identity provider
//!
//! Self-contained stand-in for the hosted identity service, used for local
//! development and tests. It keeps users, factors, single-use challenges and
//! invitations in memory, records every call it receives and can be told to
//! fail a given operation.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::token::TokenIssuer;
use super::totp::{TotpConfig, TotpService};
use super::types::*;
use super::IdentityProvider;
use crate::config::ProviderConfig;
use crate::error::{AuthError, CodeRejection, Result};

/// Provider operations, for failure injection and call filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderOp {
    GetUser,
    ListFactors,
    Enroll,
    Challenge,
    Verify,
    Unenroll,
    Invite,
}

/// A call received by the provider, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    GetUser,
    ListFactors,
    Enroll,
    Challenge {
        factor_id: String,
    },
    Verify {
        factor_id: String,
        challenge_id: String,
        verified: bool,
    },
    Unenroll {
        factor_id: String,
    },
    Invite {
        email: String,
    },
}

impl ProviderCall {
    pub fn op(&self) -> ProviderOp {
        match self {
            ProviderCall::GetUser => ProviderOp::GetUser,
            ProviderCall::ListFactors => ProviderOp::ListFactors,
            ProviderCall::Enroll => ProviderOp::Enroll,
            ProviderCall::Challenge { .. } => ProviderOp::Challenge,
            ProviderCall::Verify { .. } => ProviderOp::Verify,
            ProviderCall::Unenroll { .. } => ProviderOp::Unenroll,
            ProviderCall::Invite { .. } => ProviderOp::Invite,
        }
    }
}

/// Tunables for the in-memory provider
#[derive(Debug, Clone)]
pub struct MemorySettings {
    pub token_secret: String,
    pub token_ttl_hours: u64,
    pub challenge_ttl: Duration,
    pub max_factors: usize,
    pub issuer: String,
    pub call_log_limit: usize,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self::from(&ProviderConfig::default())
    }
}

impl From<&ProviderConfig> for MemorySettings {
    fn from(config: &ProviderConfig) -> Self {
        Self {
            token_secret: config.token_secret.clone(),
            token_ttl_hours: config.token_ttl_hours,
            challenge_ttl: Duration::seconds(config.challenge_ttl_seconds as i64),
            max_factors: config.max_factors,
            issuer: config.issuer.clone(),
            call_log_limit: config.call_log_limit,
        }
    }
}

struct StoredFactor {
    factor: Factor,
    secret: String,
}

struct UserRecord {
    user: User,
    factors: Vec<StoredFactor>,
}

struct StoredChallenge {
    user_id: String,
    factor_id: String,
    expires_at: chrono::DateTime<Utc>,
    consumed: bool,
}

#[derive(Default)]
struct MemoryState {
    users: HashMap<String, UserRecord>,
    challenges: HashMap<String, StoredChallenge>,
    invitations: Vec<Invitation>,
    calls: Vec<ProviderCall>,
    call_log_limit: usize,
    failing: HashSet<ProviderOp>,
}

impl MemoryState {
    /// Record a call, failing it if the operation was marked as failing.
    /// Only the newest `call_log_limit` calls are kept.
    fn record(&mut self, call: ProviderCall) -> Result<()> {
        let op = call.op();
        self.calls.push(call);
        if self.calls.len() > self.call_log_limit {
            let excess = self.calls.len() - self.call_log_limit;
            self.calls.drain(..excess);
        }
        if self.failing.contains(&op) {
            return Err(AuthError::Provider(format!("{:?} is unavailable", op)));
        }
        Ok(())
    }

    fn user_mut(&mut self, user_id: &str) -> Result<&mut UserRecord> {
        self.users
            .get_mut(user_id)
            .ok_or_else(|| AuthError::Unauthorized("User not found".to_string()))
    }
}

pub struct InMemoryIdentityProvider {
    tokens: TokenIssuer,
    totp: TotpService,
    settings: MemorySettings,
    state: Mutex<MemoryState>,
}

impl InMemoryIdentityProvider {
    pub fn new(settings: MemorySettings) -> Self {
        let totp = TotpService::with_config(TotpConfig {
            issuer: settings.issuer.clone(),
            ..TotpConfig::default()
        });

        Self {
            tokens: TokenIssuer::new(settings.token_secret.clone(), settings.token_ttl_hours),
            totp,
            state: Mutex::new(MemoryState {
                call_log_limit: settings.call_log_limit,
                ..MemoryState::default()
            }),
            settings,
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Self {
        Self::new(MemorySettings::from(config))
    }

    /// Create the account if needed and issue a session token for it
    pub async fn sign_in(&self, email: &str) -> Result<(User, AccessToken)> {
        let email = email.trim().to_lowercase();
        let mut state = self.state.lock().await;

        let existing = state
            .users
            .values()
            .find(|r| r.user.email == email)
            .map(|r| r.user.clone());

        let user = match existing {
            Some(user) => user,
            None => {
                let user = User {
                    id: Uuid::new_v4().to_string(),
                    email: email.clone(),
                };
                state.users.insert(
                    user.id.clone(),
                    UserRecord {
                        user: user.clone(),
                        factors: Vec::new(),
                    },
                );
                user
            }
        };

        let token = self
            .tokens
            .issue(&user)
            .map_err(|e| AuthError::Provider(format!("Failed to issue token: {}", e)))?;

        Ok((user, token))
    }

    /// Code an authenticator app would currently show for a factor
    pub async fn current_code(&self, factor_id: &str) -> Result<String> {
        let secret = self.secret_of(factor_id).await?;
        self.totp.current(&secret)
    }

    /// Well-formed code that stays wrong for this factor even if the clock
    /// moves on by a step before it is submitted
    pub async fn rejected_code(&self, factor_id: &str) -> Result<String> {
        let secret = self.secret_of(factor_id).await?;
        let nearby = self.totp.codes_around(&secret, 2)?;

        Ok((0..10)
            .map(|digit: u32| digit.to_string().repeat(6))
            .find(|candidate| !nearby.contains(candidate))
            .unwrap_or_else(|| "000000".to_string()))
    }

    async fn secret_of(&self, factor_id: &str) -> Result<String> {
        let state = self.state.lock().await;
        state
            .users
            .values()
            .flat_map(|r| r.factors.iter())
            .find(|f| f.factor.id == factor_id)
            .map(|f| f.secret.clone())
            .ok_or_else(|| AuthError::FactorNotFound(factor_id.to_string()))
    }

    /// Make every subsequent call of `op` fail with a provider error
    pub async fn fail_on(&self, op: ProviderOp) {
        self.state.lock().await.failing.insert(op);
    }

    pub async fn clear_failures(&self) {
        self.state.lock().await.failing.clear();
    }

    pub async fn calls(&self) -> Vec<ProviderCall> {
        self.state.lock().await.calls.clone()
    }

    pub async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }

    pub async fn invitations(&self) -> Vec<Invitation> {
        self.state.lock().await.invitations.clone()
    }

    fn authenticate(&self, state: &MemoryState, token: &AccessToken) -> Result<String> {
        let claims = self
            .tokens
            .validate(token)
            .map_err(|_| AuthError::Unauthorized("Invalid or expired token".to_string()))?;

        if !state.users.contains_key(&claims.sub) {
            return Err(AuthError::Unauthorized("User not found".to_string()));
        }
        Ok(claims.sub)
    }
}

impl Default for InMemoryIdentityProvider {
    fn default() -> Self {
        Self::new(MemorySettings::default())
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn get_user(&self, token: &AccessToken) -> Result<User> {
        let mut state = self.state.lock().await;
        state.record(ProviderCall::GetUser)?;

        let user_id = self.authenticate(&state, token)?;
        Ok(state.user_mut(&user_id)?.user.clone())
    }

    async fn list_factors(&self, token: &AccessToken) -> Result<Vec<Factor>> {
        let mut state = self.state.lock().await;
        state.record(ProviderCall::ListFactors)?;

        let user_id = self.authenticate(&state, token)?;
        let record = state.user_mut(&user_id)?;
        Ok(record.factors.iter().map(|f| f.factor.clone()).collect())
    }

    async fn enroll(&self, token: &AccessToken, params: EnrollParams) -> Result<EnrollResult> {
        let mut state = self.state.lock().await;
        state.record(ProviderCall::Enroll)?;

        let user_id = self.authenticate(&state, token)?;
        let max_factors = self.settings.max_factors;
        let record = state.user_mut(&user_id)?;

        if record.factors.len() >= max_factors {
            return Err(AuthError::Provider(format!(
                "Maximum number of enrolled factors reached ({})",
                max_factors
            )));
        }

        let provisioning = self.totp.provision(&record.user.email)?;
        let factor = Factor {
            id: Uuid::new_v4().to_string(),
            factor_type: FactorType::Totp,
            status: FactorStatus::Unverified,
            friendly_name: params.friendly_name,
            created_at: Utc::now(),
        };
        debug!("Enrolled unverified factor {} for {}", factor.id, user_id);

        let result = EnrollResult {
            factor_id: factor.id.clone(),
            qr_code: provisioning.qr_code,
            secret: provisioning.secret.clone(),
            uri: provisioning.uri,
        };
        record.factors.push(StoredFactor {
            factor,
            secret: provisioning.secret,
        });

        Ok(result)
    }

    async fn challenge(&self, token: &AccessToken, factor_id: &str) -> Result<Challenge> {
        let mut state = self.state.lock().await;
        state.record(ProviderCall::Challenge {
            factor_id: factor_id.to_string(),
        })?;

        let user_id = self.authenticate(&state, token)?;
        let owns_factor = state
            .user_mut(&user_id)?
            .factors
            .iter()
            .any(|f| f.factor.id == factor_id);
        if !owns_factor {
            return Err(AuthError::FactorNotFound(factor_id.to_string()));
        }

        // Spent and expired challenges stay answerable for one more lifetime
        let now = Utc::now();
        let grace = self.settings.challenge_ttl.max(Duration::zero());
        state.challenges.retain(|_, c| c.expires_at + grace > now);

        let challenge = Challenge {
            id: Uuid::new_v4().to_string(),
            factor_id: factor_id.to_string(),
            expires_at: now + self.settings.challenge_ttl,
        };
        state.challenges.insert(
            challenge.id.clone(),
            StoredChallenge {
                user_id,
                factor_id: factor_id.to_string(),
                expires_at: challenge.expires_at,
                consumed: false,
            },
        );

        Ok(challenge)
    }

    async fn verify(
        &self,
        token: &AccessToken,
        factor_id: &str,
        challenge_id: &str,
        code: &str,
    ) -> Result<VerifyOutcome> {
        let mut state = self.state.lock().await;
        state.record(ProviderCall::Verify {
            factor_id: factor_id.to_string(),
            challenge_id: challenge_id.to_string(),
            verified: false,
        })?;

        let user_id = self.authenticate(&state, token)?;

        let challenge = state
            .challenges
            .get_mut(challenge_id)
            .ok_or_else(|| AuthError::Provider("Challenge not found".to_string()))?;
        if challenge.user_id != user_id || challenge.factor_id != factor_id {
            return Err(AuthError::Provider(
                "Challenge does not belong to this factor".to_string(),
            ));
        }
        if challenge.consumed {
            return Ok(VerifyOutcome::Rejected(CodeRejection::AlreadyUsed));
        }
        challenge.consumed = true;
        if Utc::now() > challenge.expires_at {
            return Ok(VerifyOutcome::Rejected(CodeRejection::Expired));
        }

        let record = state.user_mut(&user_id)?;
        let stored = record
            .factors
            .iter_mut()
            .find(|f| f.factor.id == factor_id)
            .ok_or_else(|| AuthError::FactorNotFound(factor_id.to_string()))?;

        if !self.totp.check(&stored.secret, code)? {
            return Ok(VerifyOutcome::Rejected(CodeRejection::Mismatch));
        }
        stored.factor.status = FactorStatus::Verified;

        // The state lock is held, so the newest call is this one
        if let Some(ProviderCall::Verify { verified, .. }) = state.calls.last_mut() {
            *verified = true;
        }
        Ok(VerifyOutcome::Verified(None))
    }

    async fn unenroll(&self, token: &AccessToken, factor_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record(ProviderCall::Unenroll {
            factor_id: factor_id.to_string(),
        })?;

        let user_id = self.authenticate(&state, token)?;
        let record = state.user_mut(&user_id)?;
        let before = record.factors.len();
        record.factors.retain(|f| f.factor.id != factor_id);
        if record.factors.len() == before {
            return Err(AuthError::FactorNotFound(factor_id.to_string()));
        }

        state.challenges.retain(|_, c| c.factor_id != factor_id);
        Ok(())
    }

    async fn invite_user_by_email(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> Result<Invitation> {
        let mut state = self.state.lock().await;
        state.record(ProviderCall::Invite {
            email: email.to_string(),
        })?;

        let email = email.trim().to_lowercase();
        if state.users.values().any(|r| r.user.email == email) {
            return Err(AuthError::Provider(
                "A user with this email address has already been registered".to_string(),
            ));
        }

        let user = User {
            id: Uuid::new_v4().to_string(),
            email,
        };
        let invitation = Invitation {
            user_id: user.id.clone(),
            email: user.email.clone(),
            invited_at: Utc::now(),
        };
        debug!("Invited {} (redirect: {:?})", invitation.email, redirect_to);

        state.users.insert(
            user.id.clone(),
            UserRecord {
                user,
                factors: Vec::new(),
            },
        );
        state.invitations.push(invitation.clone());

        Ok(invitation)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_challenge_is_single_use() {
        let provider = InMemoryIdentityProvider::default();
        let (_, token) = provider.sign_in("admin@example.com").await.unwrap();

        let enrolled = provider.enroll(&token, EnrollParams::default()).await.unwrap();
        let challenge = provider.challenge(&token, &enrolled.factor_id).await.unwrap();
        let code = provider.current_code(&enrolled.factor_id).await.unwrap();

        let first = provider
            .verify(&token, &enrolled.factor_id, &challenge.id, &code)
            .await
            .unwrap();
        let replay = provider
            .verify(&token, &enrolled.factor_id, &challenge.id, &code)
            .await
            .unwrap();

        assert_eq!(first, VerifyOutcome::Verified(None));
        assert_eq!(replay, VerifyOutcome::Rejected(CodeRejection::AlreadyUsed));
    }

    #[tokio::test]
    async fn test_wrong_code_consumes_challenge() {
        let provider = InMemoryIdentityProvider::default();
        let (_, token) = provider.sign_in("admin@example.com").await.unwrap();

        let enrolled = provider.enroll(&token, EnrollParams::default()).await.unwrap();
        let challenge = provider.challenge(&token, &enrolled.factor_id).await.unwrap();
        let code = provider.current_code(&enrolled.factor_id).await.unwrap();
        let wrong = provider.rejected_code(&enrolled.factor_id).await.unwrap();

        let rejected = provider
            .verify(&token, &enrolled.factor_id, &challenge.id, &wrong)
            .await
            .unwrap();
        let retried = provider
            .verify(&token, &enrolled.factor_id, &challenge.id, &code)
            .await
            .unwrap();

        assert_eq!(rejected, VerifyOutcome::Rejected(CodeRejection::Mismatch));
        assert_eq!(retried, VerifyOutcome::Rejected(CodeRejection::AlreadyUsed));
    }

    #[tokio::test]
    async fn test_expired_challenge_rejected() {
        let provider = InMemoryIdentityProvider::new(MemorySettings {
            challenge_ttl: Duration::seconds(-1),
            ..MemorySettings::default()
        });
        let (_, token) = provider.sign_in("admin@example.com").await.unwrap();

        let enrolled = provider.enroll(&token, EnrollParams::default()).await.unwrap();
        let challenge = provider.challenge(&token, &enrolled.factor_id).await.unwrap();
        let code = provider.current_code(&enrolled.factor_id).await.unwrap();

        let outcome = provider
            .verify(&token, &enrolled.factor_id, &challenge.id, &code)
            .await
            .unwrap();
        assert_eq!(outcome, VerifyOutcome::Rejected(CodeRejection::Expired));
    }

    #[tokio::test]
    async fn test_factor_of_other_user_not_found() {
        let provider = InMemoryIdentityProvider::default();
        let (_, alice) = provider.sign_in("alice@example.com").await.unwrap();
        let (_, bob) = provider.sign_in("bob@example.com").await.unwrap();

        let enrolled = provider.enroll(&alice, EnrollParams::default()).await.unwrap();

        let result = provider.challenge(&bob, &enrolled.factor_id).await;
        assert!(matches!(result, Err(AuthError::FactorNotFound(_))));
        let result = provider.unenroll(&bob, &enrolled.factor_id).await;
        assert!(matches!(result, Err(AuthError::FactorNotFound(_))));
    }

    #[tokio::test]
    async fn test_factor_limit() {
        let provider = InMemoryIdentityProvider::new(MemorySettings {
            max_factors: 1,
            ..MemorySettings::default()
        });
        let (_, token) = provider.sign_in("admin@example.com").await.unwrap();

        provider.enroll(&token, EnrollParams::default()).await.unwrap();
        let result = provider.enroll(&token, EnrollParams::default()).await;
        assert!(matches!(result, Err(AuthError::Provider(_))));
    }

    #[tokio::test]
    async fn test_invalid_token_unauthorized() {
        let provider = InMemoryIdentityProvider::default();
        let result = provider.get_user(&AccessToken::new("garbage")).await;
        assert!(matches!(result, Err(AuthError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_failure_injection_records_call() {
        let provider = InMemoryIdentityProvider::default();
        let (_, token) = provider.sign_in("admin@example.com").await.unwrap();
        provider.fail_on(ProviderOp::ListFactors).await;

        assert!(provider.list_factors(&token).await.is_err());
        assert_eq!(provider.calls().await, vec![ProviderCall::ListFactors]);

        provider.clear_failures().await;
        assert!(provider.list_factors(&token).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invite_existing_email_rejected() {
        let provider = InMemoryIdentityProvider::default();
        provider.sign_in("admin@example.com").await.unwrap();

        let result = provider.invite_user_by_email("admin@example.com", None).await;
        assert!(matches!(result, Err(AuthError::Provider(_))));

        let invitation = provider
            .invite_user_by_email("new@example.com", None)
            .await
            .unwrap();
        assert_eq!(invitation.email, "new@example.com");
        assert_eq!(provider.invitations().await.len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_code_never_verifies() {
        let provider = InMemoryIdentityProvider::default();
        let (_, token) = provider.sign_in("admin@example.com").await.unwrap();
        let enrolled = provider.enroll(&token, EnrollParams::default()).await.unwrap();

        let wrong = provider.rejected_code(&enrolled.factor_id).await.unwrap();
        let secret = provider.secret_of(&enrolled.factor_id).await.unwrap();
        assert_eq!(wrong.len(), 6);
        assert!(!provider.totp.check(&secret, &wrong).unwrap());
    }

    #[tokio::test]
    async fn test_challenges_and_call_log_stay_bounded() {
        let provider = InMemoryIdentityProvider::new(MemorySettings {
            challenge_ttl: Duration::zero(),
            call_log_limit: 10,
            ..MemorySettings::default()
        });
        let (_, token) = provider.sign_in("admin@example.com").await.unwrap();
        let enrolled = provider.enroll(&token, EnrollParams::default()).await.unwrap();

        for _ in 0..100 {
            let challenge = provider.challenge(&token, &enrolled.factor_id).await.unwrap();
            let code = provider.current_code(&enrolled.factor_id).await.unwrap();
            provider
                .verify(&token, &enrolled.factor_id, &challenge.id, &code)
                .await
                .unwrap();
        }

        assert!(provider.state.lock().await.challenges.len() <= 1);
        let calls = provider.calls().await;
        assert_eq!(calls.len(), 10);
        assert!(matches!(calls.last(), Some(ProviderCall::Verify { .. })));
    }

    #[tokio::test]
    async fn test_spent_challenge_kept_within_lifetime() {
        let provider = InMemoryIdentityProvider::default();
        let (_, token) = provider.sign_in("admin@example.com").await.unwrap();
        let enrolled = provider.enroll(&token, EnrollParams::default()).await.unwrap();

        let first = provider.challenge(&token, &enrolled.factor_id).await.unwrap();
        let code = provider.current_code(&enrolled.factor_id).await.unwrap();
        provider
            .verify(&token, &enrolled.factor_id, &first.id, &code)
            .await
            .unwrap();
        provider.challenge(&token, &enrolled.factor_id).await.unwrap();

        let replay = provider
            .verify(&token, &enrolled.factor_id, &first.id, &code)
            .await
            .unwrap();
        assert_eq!(replay, VerifyOutcome::Rejected(CodeRejection::AlreadyUsed));
    }

    #[tokio::test]
    async fn test_emails_compared_case_insensitively() {
        let provider = InMemoryIdentityProvider::default();
        let (first, _) = provider.sign_in(" Admin@Example.com").await.unwrap();
        let (second, _) = provider.sign_in("admin@example.com").await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.email, "admin@example.com");

        let result = provider.invite_user_by_email("ADMIN@example.com", None).await;
        assert!(matches!(result, Err(AuthError::Provider(_))));
        assert!(provider.invitations().await.is_empty());
    }
}
