//! Configuration for sentinel-auth
//!
//! Loaded from an optional TOML file, then overridden by environment
//! variables of the form `SENTINEL__<SECTION>__<KEY>`
//! (e.g. `SENTINEL__PROVIDER__BASE_URL`).

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

/// Main service configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub provider: ProviderConfig,
    pub invite: InviteConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address for the HTTP API (e.g., "0.0.0.0:8080")
    pub listen_addr: String,
}

/// Which identity provider backs the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Self-contained provider, state lost on restart
    Memory,
    /// GoTrue-style REST identity service
    Http,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// Base URL of the identity service (http provider)
    pub base_url: String,
    /// Public API key sent with every request (http provider)
    pub anon_key: String,
    /// Privileged key used for invite-by-email (http provider)
    pub service_role_key: Option<String>,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// Secret used to sign session tokens (memory provider)
    pub token_secret: String,
    /// Session token lifetime in hours (memory provider)
    pub token_ttl_hours: u64,
    /// Challenge lifetime in seconds (memory provider)
    pub challenge_ttl_seconds: u64,
    /// Maximum factors per user, verified or not (memory provider)
    pub max_factors: usize,
    /// Issuer shown in authenticator apps (memory provider)
    pub issuer: String,
    /// Most recent provider calls kept for inspection (memory provider)
    pub call_log_limit: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InviteConfig {
    /// Where invited admins land after accepting
    pub redirect_to: Option<String>,
    /// `POST /invite` endpoint used by remote clients (CLI)
    pub endpoint_url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Code submissions allowed per admin per window
    pub max_attempts: u32,
    pub window_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// "pretty" or "json"
    pub format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Memory,
            base_url: "http://localhost:54321".to_string(),
            anon_key: String::new(),
            service_role_key: None,
            timeout_seconds: 10,
            token_secret: "change-me-in-production".to_string(),
            token_ttl_hours: 24,
            challenge_ttl_seconds: 300,
            max_factors: 10,
            issuer: "Sentinel".to_string(),
            call_log_limit: 1000,
        }
    }
}

impl Default for InviteConfig {
    fn default() -> Self {
        Self {
            redirect_to: None,
            endpoint_url: "http://127.0.0.1:8080/invite".to_string(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            window_seconds: 60,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file plus environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("SENTINEL")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize::<Config>()?;

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text (no environment overrides)
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(content, config::FileFormat::Toml))
            .build()?
            .try_deserialize::<Config>()?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        use crate::error::AuthError;

        if self.provider.kind == ProviderKind::Http && self.provider.base_url.is_empty() {
            return Err(AuthError::Config(
                "provider.base_url is required for the http provider".to_string(),
            ));
        }
        if self.rate_limit.max_attempts == 0 {
            return Err(AuthError::Config(
                "rate_limit.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
