//! Integration tests for the session cache and the sign-in services.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use destiny_client::credentials::keys;
use destiny_client::services::AuthError;
use destiny_client::{ApiClient, AuthService, ClientConfig, Credentials, MemoryStore, ProfileService, SessionCache};
use destiny_core::ProfileUpdate;
use destiny_integration_tests::{FakeBackend, REJECTED_CODE, TEST_TOKEN, TOKENLESS_EMAIL, unreachable_base_url};

fn session_for(api: &ApiClient, credentials: Credentials) -> SessionCache {
    SessionCache::new(Arc::new(api.clone()), credentials)
}

#[tokio::test]
async fn test_concurrent_loads_issue_one_request() {
    let backend = FakeBackend::start().await;
    let (api, credentials) = backend.signed_in_client();
    let session = session_for(&api, credentials);

    let (a, b, c) = tokio::join!(
        session.load_user_profile(false),
        session.load_user_profile(false),
        session.load_user_profile(false),
    );

    assert_eq!(backend.requests_to("/user_profile/v1").len(), 1);
    let a = a.unwrap();
    assert_eq!(Some(&a), b.as_ref());
    assert_eq!(Some(&a), c.as_ref());
    assert!(a.is_complete());

    // Cached now; no further request.
    session.load_user_profile(false).await.unwrap();
    assert_eq!(backend.requests_to("/user_profile/v1").len(), 1);
}

#[tokio::test]
async fn test_invalid_token_signs_out() {
    let backend = FakeBackend::start().await;
    let store = Arc::new(MemoryStore::with_entries([
        (keys::AUTH_TOKEN, "stale-token"),
        (keys::USER_ID, "u-1"),
        (keys::USER_EMAIL, "star@example.com"),
    ]));
    let credentials = Credentials::new(store);
    let api = ApiClient::new(&backend.config(), credentials.clone()).unwrap();
    let session = session_for(&api, credentials.clone());

    assert_eq!(session.load_user_profile(false).await, None);

    assert!(!session.is_authenticated());
    assert!(credentials.token().is_none());
    assert!(credentials.stored_profile().is_none());
    assert_eq!(session.current_user(), None);
}

#[tokio::test]
async fn test_unreachable_backend_keeps_token() {
    let config = ClientConfig::new(&unreachable_base_url()).unwrap();
    let credentials = Credentials::new(Arc::new(MemoryStore::with_entries([(
        keys::AUTH_TOKEN,
        TEST_TOKEN,
    )])));
    let api = ApiClient::new(&config, credentials.clone()).unwrap();
    let session = session_for(&api, credentials.clone());

    assert_eq!(session.load_user_profile(false).await, None);

    assert!(session.is_authenticated());
    assert_eq!(credentials.token().unwrap().expose(), TEST_TOKEN);
    assert_eq!(session.current_user(), None);
}

#[tokio::test]
async fn test_otp_sign_in_populates_session() {
    let backend = FakeBackend::start().await;
    let (api, credentials) = backend.client();
    let session = session_for(&api, credentials.clone());
    let auth = AuthService::new(api, session.clone());

    let sent_to = auth.send_otp("  Star@Example.com ").await.unwrap();
    assert_eq!(sent_to.as_str(), "star@example.com");

    let profile = auth.verify_otp("star@example.com", "123456").await.unwrap();

    assert_eq!(session.current_user(), Some(profile.clone()));
    assert_eq!(credentials.stored_profile(), Some(profile));
    assert!(session.is_authenticated());
    // Already cached: loading does not hit the profile endpoint.
    session.load_user_profile(false).await.unwrap();
    assert!(backend.requests_to("/user_profile/v1").is_empty());
}

#[tokio::test]
async fn test_rejected_code_leaves_session_empty() {
    let backend = FakeBackend::start().await;
    let (api, _) = backend.client();
    let session = session_for(&api, api.credentials().clone());
    let auth = AuthService::new(api, session.clone());

    let err = auth
        .verify_otp("star@example.com", REJECTED_CODE)
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::Api(_)));
    assert_eq!(
        err.user_message(),
        "That code is not valid. Please check it and try again."
    );
    assert_eq!(session.current_user(), None);
}

#[tokio::test]
async fn test_sign_in_without_token_is_refused() {
    let backend = FakeBackend::start().await;
    let (api, _) = backend.client();
    let session = session_for(&api, api.credentials().clone());
    let auth = AuthService::new(api, session.clone());

    let err = auth.verify_otp(TOKENLESS_EMAIL, "123456").await.unwrap_err();

    assert!(matches!(err, AuthError::MissingToken));
    assert_eq!(session.current_user(), None);
}

#[tokio::test]
async fn test_leftover_token_does_not_complete_tokenless_sign_in() {
    let backend = FakeBackend::start().await;
    let store = Arc::new(MemoryStore::with_entries([(
        keys::AUTH_TOKEN,
        "stale-old-token",
    )]));
    let credentials = Credentials::new(store);
    let api = ApiClient::new(&backend.config(), credentials.clone()).unwrap();
    let session = session_for(&api, credentials.clone());
    let auth = AuthService::new(api, session.clone());

    let err = auth.verify_otp(TOKENLESS_EMAIL, "123456").await.unwrap_err();

    assert!(matches!(err, AuthError::MissingToken));
    assert_eq!(session.current_user(), None);
    assert!(credentials.stored_profile().is_none());
    assert_eq!(credentials.token().unwrap().expose(), "stale-old-token");
}

#[tokio::test]
async fn test_logout_clears_everything() {
    let backend = FakeBackend::start().await;
    let (api, credentials) = backend.client();
    let session = session_for(&api, credentials.clone());
    let auth = AuthService::new(api, session.clone());
    auth.verify_otp("star@example.com", "123456").await.unwrap();

    auth.logout();

    assert_eq!(session.current_user(), None);
    assert!(!session.is_authenticated());
    assert!(credentials.stored_profile().is_none());
    assert_eq!(session.load_user_profile(true).await, None);
    assert!(backend.requests_to("/user_profile/v1").is_empty());
}

#[tokio::test]
async fn test_profile_update_merges_into_session() {
    let backend = FakeBackend::start().await;
    let (api, credentials) = backend.signed_in_client();
    let session = session_for(&api, credentials.clone());
    let profiles = ProfileService::new(api, session.clone());
    session.load_user_profile(false).await.unwrap();

    let saved = profiles
        .update_profile(&ProfileUpdate {
            nickname: Some("Moonchild".to_string()),
            birth_city: Some("Porto".to_string()),
            ..ProfileUpdate::default()
        })
        .await
        .unwrap();

    assert_eq!(saved.birth_city.as_deref(), Some("Porto"));
    let current = session.current_user().unwrap();
    assert_eq!(current.nickname.as_deref(), Some("Moonchild"));
    assert_eq!(current.birth_city.as_deref(), Some("Porto"));
    assert_eq!(current.first_name.as_deref(), Some("Luna"));
    assert_eq!(
        credentials.stored_profile().unwrap().birth_city.as_deref(),
        Some("Porto")
    );

    let update = &backend.requests_to("/user_profile/v1/update_user_profile")[0];
    assert_eq!(update.method, "PUT");
}

#[tokio::test]
async fn test_session_keeps_the_value_the_backend_saved() {
    let backend = FakeBackend::start().await;
    let (api, credentials) = backend.signed_in_client();
    let session = session_for(&api, credentials.clone());
    let profiles = ProfileService::new(api, session.clone());
    session.load_user_profile(false).await.unwrap();

    let saved = profiles
        .update_profile(&ProfileUpdate {
            birth_city: Some(" porto ".to_string()),
            ..ProfileUpdate::default()
        })
        .await
        .unwrap();

    assert_eq!(saved.birth_city.as_deref(), Some("Porto"));
    assert_eq!(session.current_user(), Some(saved.clone()));
    assert_eq!(
        credentials.stored_profile().unwrap().birth_city.as_deref(),
        Some("Porto")
    );
}

#[tokio::test]
async fn test_failed_update_leaves_session_alone() {
    let backend = FakeBackend::start().await;
    let (api, credentials) = backend.signed_in_client();
    let session = session_for(&api, credentials);
    session.load_user_profile(false).await.unwrap();

    // A client without the token: the backend refuses the update.
    let (anonymous, _) = backend.client();
    let profiles = ProfileService::new(anonymous, session.clone());
    let err = profiles
        .update_profile(&ProfileUpdate {
            nickname: Some("Moonchild".to_string()),
            ..ProfileUpdate::default()
        })
        .await
        .unwrap_err();

    assert_eq!(err.code(), Some("TOKEN_INVALID"));
    assert_eq!(session.current_user().unwrap().nickname, None);
}
