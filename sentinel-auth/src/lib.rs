//! sentinel-auth: MFA enrollment and MFA-gated admin invitations
//!
//! Security core of the Sentinel monitoring console. All account state lives
//! in an external identity provider; this crate sequences calls against it so
//! that:
//!
//! - a TOTP factor only becomes active after its first code is verified,
//! - a factor is only removed right after a fresh verification, and
//! - an admin invite is only dispatched right after a fresh verification of
//!   the requesting admin's own factor.
//!
//! # Example
//!
//! ```no_run
//! use sentinel_auth::identity::InMemoryIdentityProvider;
//! use sentinel_auth::invite::{InvitationGate, ProviderInviteDispatcher};
//! use sentinel_auth::mfa::MfaController;
//! use sentinel_auth::session::AdminSession;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = Arc::new(InMemoryIdentityProvider::default());
//! let (_, token) = provider.sign_in("admin@example.com").await?;
//! let session = AdminSession::load(provider.as_ref(), token).await?;
//!
//! let mut controller = MfaController::load(provider.clone(), &session).await?;
//! let enrollment = controller.start_enrollment(&session).await?;
//! let code = provider.current_code(&enrollment.factor_id).await?;
//! controller
//!     .confirm_enrollment(&session, &enrollment.factor_id, &code)
//!     .await?;
//!
//! let dispatcher = Arc::new(ProviderInviteDispatcher::new(provider.clone(), None));
//! let gate = InvitationGate::new(provider.clone(), dispatcher);
//! let code = provider.current_code(&enrollment.factor_id).await?;
//! gate.send_invite(&controller, &session, "new-admin@example.com", &code)
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`identity`]: identity provider trait and implementations
//! - [`session`]: explicit admin session
//! - [`mfa`]: MFA state controller
//! - [`invite`]: invitation gate and dispatchers
//! - [`api`]: HTTP API
//! - [`config`]: configuration management
//! - [`error`]: error types and handling

pub mod api;
pub mod config;
pub mod error;
pub mod identity;
pub mod invite;
pub mod logging;
pub mod mfa;
pub mod session;

// Re-export commonly used types
pub use config::Config;
pub use error::{AuthError, Result};
