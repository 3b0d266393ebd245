//! Multi-Factor Authentication (MFA) module
//!
//! TOTP enrollment, verification and disablement on top of the identity
//! provider's factor primitives.

pub mod controller;
pub mod types;
pub mod verification;

pub use controller::MfaController;
pub use types::*;
