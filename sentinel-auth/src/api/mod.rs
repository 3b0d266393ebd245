//! REST API module for sentinel-auth
//!
//! Hosts the `POST /invite` dispatcher endpoint and the console endpoints
//! that drive the MFA controller and invitation gate for browser clients.

pub mod admin;
pub mod handlers;
pub mod mfa;
pub mod server;

pub use handlers::AppState;
pub use server::ApiServer;
