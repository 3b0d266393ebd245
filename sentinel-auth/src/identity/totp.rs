//! TOTP service backing the in-memory identity provider
//!
//! Code generation and checking are delegated to `totp-rs` (RFC 6238).

use chrono::Utc;
use totp_rs::{Algorithm, Secret, TOTP};

use crate::error::{AuthError, Result};

/// TOTP service configuration
pub struct TotpConfig {
    /// Issuer name (shown in authenticator apps)
    pub issuer: String,
    /// Number of digits in the TOTP code
    pub digits: usize,
    /// Time step in seconds (default: 30)
    pub step: u64,
    /// Algorithm to use
    pub algorithm: Algorithm,
}

impl Default for TotpConfig {
    fn default() -> Self {
        Self {
            issuer: "Sentinel".to_string(),
            digits: 6,
            step: 30,
            algorithm: Algorithm::SHA1,
        }
    }
}

/// Provisioning material for a new factor
pub struct TotpProvisioning {
    /// Base32 secret
    pub secret: String,
    /// QR code as data URI (base64 PNG)
    pub qr_code: String,
    pub uri: String,
}

pub struct TotpService {
    config: TotpConfig,
}

impl TotpService {
    pub fn new() -> Self {
        Self {
            config: TotpConfig::default(),
        }
    }

    pub fn with_config(config: TotpConfig) -> Self {
        Self { config }
    }

    /// Generate a fresh secret with its QR code and provisioning URI
    pub fn provision(&self, account: &str) -> Result<TotpProvisioning> {
        let secret = Secret::generate_secret().to_encoded().to_string();
        let totp = self.build(&secret, account)?;

        let qr_code = totp
            .get_qr_base64()
            .map_err(|e| AuthError::Provider(format!("Failed to generate QR code: {}", e)))?;

        Ok(TotpProvisioning {
            uri: totp.get_url(),
            qr_code: format!("data:image/png;base64,{}", qr_code),
            secret,
        })
    }

    /// Check a code against a base32 secret (one step of skew either way)
    pub fn check(&self, secret_base32: &str, code: &str) -> Result<bool> {
        let totp = self.build(secret_base32, "")?;
        Ok(totp.check_current(code).unwrap_or(false))
    }

    /// Current code for a secret (development tooling and tests)
    pub fn current(&self, secret_base32: &str) -> Result<String> {
        self.build(secret_base32, "")?
            .generate_current()
            .map_err(|e| AuthError::Provider(format!("Failed to generate code: {}", e)))
    }

    /// Codes of every time step within `radius` steps of now, oldest first
    pub fn codes_around(&self, secret_base32: &str, radius: u64) -> Result<Vec<String>> {
        let totp = self.build(secret_base32, "")?;
        let step = self.config.step;
        let start = (Utc::now().timestamp().max(0) as u64).saturating_sub(radius * step);

        Ok((0..=2 * radius)
            .map(|i| totp.generate(start + i * step))
            .collect())
    }

    fn build(&self, secret_base32: &str, account: &str) -> Result<TOTP> {
        let bytes = Secret::Encoded(secret_base32.to_string())
            .to_bytes()
            .map_err(|e| AuthError::Provider(format!("Invalid secret: {:?}", e)))?;

        TOTP::new(
            self.config.algorithm,
            self.config.digits,
            1,
            self.config.step,
            bytes,
            Some(self.config.issuer.clone()),
            account.to_string(),
        )
        .map_err(|e| AuthError::Provider(format!("Failed to create TOTP: {:?}", e)))
    }
}

impl Default for TotpService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provision_generates_qr() {
        let service = TotpService::new();
        let provisioning = service.provision("admin@example.com").unwrap();

        assert!(!provisioning.secret.is_empty());
        assert!(provisioning.qr_code.starts_with("data:image/png;base64,"));
        assert!(provisioning.uri.starts_with("otpauth://totp/"));
    }

    #[test]
    fn test_current_code_checks() {
        let service = TotpService::new();
        let secret = service.provision("admin@example.com").unwrap().secret;

        let code = service.current(&secret).unwrap();
        assert!(service.check(&secret, &code).unwrap());
    }

    #[test]
    fn test_codes_around_include_current() {
        let service = TotpService::new();
        let secret = service.provision("admin@example.com").unwrap().secret;

        let codes = service.codes_around(&secret, 2).unwrap();
        let current = service.current(&secret).unwrap();
        assert_eq!(codes.len(), 5);
        assert!(codes.contains(&current));
    }

    #[test]
    fn test_wrong_length_rejected() {
        let service = TotpService::new();
        let secret = service.provision("admin@example.com").unwrap().secret;

        assert!(!service.check(&secret, "12345").unwrap());
        assert!(!service.check(&secret, "1234567").unwrap());
    }
}
