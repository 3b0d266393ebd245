//! Integration tests for the MFA enrollment lifecycle

mod common;

use common::{admin, assert_unenroll_follows_verify, enabled_admin};
use sentinel_auth::error::{AuthError, CodeRejection};
use sentinel_auth::identity::{IdentityProvider, InMemoryIdentityProvider, ProviderCall, ProviderOp};
use sentinel_auth::mfa::{MfaController, MfaState};
use std::sync::Arc;

#[tokio::test]
async fn test_wrong_code_keeps_enrollment_pending() {
    let provider = Arc::new(InMemoryIdentityProvider::default());
    let session = admin(&provider, "admin@example.com").await;
    let mut controller = MfaController::load(provider.clone(), &session).await.unwrap();

    let enrollment = controller.start_enrollment(&session).await.unwrap();
    let wrong = provider.rejected_code(&enrollment.factor_id).await.unwrap();

    let result = controller
        .confirm_enrollment(&session, &enrollment.factor_id, &wrong)
        .await;

    assert!(matches!(
        result,
        Err(AuthError::InvalidCode(CodeRejection::Mismatch))
    ));
    assert_eq!(controller.state(), &MfaState::Pending(enrollment));
    assert!(!controller.is_enabled());
    assert!(!controller.refresh(&session).await.unwrap().is_enabled);
}

#[tokio::test]
async fn test_retry_after_wrong_code_uses_new_challenge() {
    let provider = Arc::new(InMemoryIdentityProvider::default());
    let session = admin(&provider, "admin@example.com").await;
    let mut controller = MfaController::load(provider.clone(), &session).await.unwrap();

    let enrollment = controller.start_enrollment(&session).await.unwrap();
    let wrong = provider.rejected_code(&enrollment.factor_id).await.unwrap();

    let _ = controller
        .confirm_enrollment(&session, &enrollment.factor_id, &wrong)
        .await;
    let code = provider.current_code(&enrollment.factor_id).await.unwrap();
    controller
        .confirm_enrollment(&session, &enrollment.factor_id, &code)
        .await
        .unwrap();

    let challenge_ids: Vec<String> = provider
        .calls()
        .await
        .into_iter()
        .filter_map(|call| match call {
            ProviderCall::Verify { challenge_id, .. } => Some(challenge_id),
            _ => None,
        })
        .collect();
    assert_eq!(challenge_ids.len(), 2);
    assert_ne!(challenge_ids[0], challenge_ids[1]);
    assert!(controller.is_enabled());
}

#[tokio::test]
async fn test_valid_code_enables_mfa() {
    let provider = Arc::new(InMemoryIdentityProvider::default());
    let (session, mut controller, factor_id) = enabled_admin(&provider, "admin@example.com").await;

    assert!(controller.is_enabled());
    assert_eq!(controller.active_factor().unwrap().id, factor_id);

    let factors = provider.list_factors(session.token()).await.unwrap();
    assert_eq!(factors.len(), 1);
    assert_eq!(factors[0].id, factor_id);

    let status = controller.refresh(&session).await.unwrap();
    assert!(status.is_enabled);
}

#[tokio::test]
async fn test_is_enabled_stable_across_refreshes() {
    let provider = Arc::new(InMemoryIdentityProvider::default());
    let (session, mut controller, _) = enabled_admin(&provider, "admin@example.com").await;

    for _ in 0..3 {
        assert!(controller.refresh(&session).await.unwrap().is_enabled);
    }

    let fresh = admin(&provider, "fresh@example.com").await;
    let mut other = MfaController::load(provider.clone(), &fresh).await.unwrap();
    for _ in 0..3 {
        assert!(!other.refresh(&fresh).await.unwrap().is_enabled);
    }
}

#[tokio::test]
async fn test_disable_then_disable_again() {
    let provider = Arc::new(InMemoryIdentityProvider::default());
    let (session, mut controller, factor_id) = enabled_admin(&provider, "admin@example.com").await;

    let code = provider.current_code(&factor_id).await.unwrap();
    controller.disable(&session, &factor_id, &code).await.unwrap();

    assert_eq!(controller.state(), &MfaState::NoFactor);
    assert!(provider.list_factors(session.token()).await.unwrap().is_empty());

    let result = controller.disable(&session, &factor_id, "123456").await;
    assert!(matches!(result, Err(AuthError::FactorNotFound(_))));

    assert_unenroll_follows_verify(&provider.calls().await);
}

#[tokio::test]
async fn test_disable_with_wrong_code_never_unenrolls() {
    let provider = Arc::new(InMemoryIdentityProvider::default());
    let (session, mut controller, factor_id) = enabled_admin(&provider, "admin@example.com").await;

    let wrong = provider.rejected_code(&factor_id).await.unwrap();
    let result = controller.disable(&session, &factor_id, &wrong).await;

    assert!(matches!(result, Err(AuthError::InvalidCode(_))));
    assert!(controller.is_enabled());
    assert!(!provider
        .calls()
        .await
        .iter()
        .any(|c| c.op() == ProviderOp::Unenroll));
    assert_eq!(provider.list_factors(session.token()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_disable_unknown_factor_makes_no_calls() {
    let provider = Arc::new(InMemoryIdentityProvider::default());
    let (session, mut controller, _) = enabled_admin(&provider, "admin@example.com").await;
    provider.clear_calls().await;

    let result = controller.disable(&session, "not-my-factor", "123456").await;

    assert!(matches!(result, Err(AuthError::FactorNotFound(_))));
    assert!(provider.calls().await.is_empty());
}

#[tokio::test]
async fn test_unenroll_failure_keeps_mfa_enabled() {
    let provider = Arc::new(InMemoryIdentityProvider::default());
    let (session, mut controller, factor_id) = enabled_admin(&provider, "admin@example.com").await;
    provider.fail_on(ProviderOp::Unenroll).await;

    let code = provider.current_code(&factor_id).await.unwrap();
    let result = controller.disable(&session, &factor_id, &code).await;

    assert!(matches!(result, Err(AuthError::Provider(_))));
    assert!(controller.is_enabled());

    provider.clear_failures().await;
    assert!(controller.refresh(&session).await.unwrap().is_enabled);
    assert_unenroll_follows_verify(&provider.calls().await);
}

#[tokio::test]
async fn test_enroll_provider_failure_surfaces() {
    let provider = Arc::new(InMemoryIdentityProvider::default());
    let session = admin(&provider, "admin@example.com").await;
    let mut controller = MfaController::load(provider.clone(), &session).await.unwrap();
    provider.fail_on(ProviderOp::Enroll).await;

    let result = controller.start_enrollment(&session).await;

    assert!(matches!(result, Err(AuthError::Provider(_))));
    assert_eq!(controller.state(), &MfaState::NoFactor);
}

#[tokio::test]
async fn test_abandoned_enrollment_not_counted() {
    let provider = Arc::new(InMemoryIdentityProvider::default());
    let session = admin(&provider, "admin@example.com").await;

    {
        let mut controller = MfaController::load(provider.clone(), &session).await.unwrap();
        controller.start_enrollment(&session).await.unwrap();
        // controller dropped: the enrollment session is lost
    }

    let mut controller = MfaController::load(provider.clone(), &session).await.unwrap();
    assert_eq!(controller.state(), &MfaState::NoFactor);
    assert!(!controller.refresh(&session).await.unwrap().is_enabled);

    let enrollment = controller.start_enrollment(&session).await.unwrap();
    let code = provider.current_code(&enrollment.factor_id).await.unwrap();
    controller
        .confirm_enrollment(&session, &enrollment.factor_id, &code)
        .await
        .unwrap();
    assert!(controller.is_enabled());
}

#[tokio::test]
async fn test_enabled_factor_matches_provider_copy() {
    let provider = Arc::new(InMemoryIdentityProvider::default());
    let session = admin(&provider, "admin@example.com").await;
    let mut controller = MfaController::load(provider.clone(), &session).await.unwrap();

    let enrollment = controller
        .start_named_enrollment(&session, Some("laptop".to_string()))
        .await
        .unwrap();
    let code = provider.current_code(&enrollment.factor_id).await.unwrap();
    let confirmed = controller
        .confirm_enrollment(&session, &enrollment.factor_id, &code)
        .await
        .unwrap();

    let stored = provider.list_factors(session.token()).await.unwrap();
    assert_eq!(stored, vec![confirmed.clone()]);
    assert_eq!(controller.active_factor(), Some(&confirmed));
    assert_eq!(confirmed.friendly_name.as_deref(), Some("laptop"));

    let cached = controller.status().active_factor;
    let refreshed = controller.refresh(&session).await.unwrap().active_factor;
    assert_eq!(cached, refreshed);
}
