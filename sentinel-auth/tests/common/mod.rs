//! Shared helpers for integration tests

#![allow(dead_code)]

use sentinel_auth::api::ApiServer;
use sentinel_auth::config::Config;
use sentinel_auth::identity::{IdentityProvider, InMemoryIdentityProvider, ProviderCall};
use sentinel_auth::mfa::MfaController;
use sentinel_auth::session::AdminSession;
use std::sync::Arc;

/// Sign an admin in and load their session
pub async fn admin(provider: &Arc<InMemoryIdentityProvider>, email: &str) -> AdminSession {
    let (_, token) = provider.sign_in(email).await.unwrap();
    AdminSession::load(provider.as_ref(), token).await.unwrap()
}

/// Admin with a verified TOTP factor; returns the factor id
pub async fn enabled_admin(
    provider: &Arc<InMemoryIdentityProvider>,
    email: &str,
) -> (AdminSession, MfaController, String) {
    let session = admin(provider, email).await;
    let mut controller = MfaController::load(provider.clone(), &session).await.unwrap();

    let enrollment = controller.start_enrollment(&session).await.unwrap();
    let code = provider.current_code(&enrollment.factor_id).await.unwrap();
    controller
        .confirm_enrollment(&session, &enrollment.factor_id, &code)
        .await
        .unwrap();

    (session, controller, enrollment.factor_id)
}

/// Every unenroll must directly follow a successful verify of the same factor
pub fn assert_unenroll_follows_verify(calls: &[ProviderCall]) {
    for (i, call) in calls.iter().enumerate() {
        if let ProviderCall::Unenroll { factor_id } = call {
            assert!(i > 0, "unenroll without preceding verify");
            match &calls[i - 1] {
                ProviderCall::Verify {
                    factor_id: verified_factor,
                    verified: true,
                    ..
                } => assert_eq!(verified_factor, factor_id),
                other => panic!("unenroll preceded by {:?}", other),
            }
        }
    }
}

/// Start an API server on a random port and return its base URL
pub async fn spawn_server(provider: Arc<dyn IdentityProvider>, config: Config) -> String {
    let server = ApiServer::new(provider, &config);
    let router = server.router();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });

    format!("http://{}", addr)
}
