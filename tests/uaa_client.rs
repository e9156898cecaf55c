//! UAA client and client registration against the mock UAA.

use std::sync::Arc;

use uaa_authcode_proxy::lifecycle::register_proxy_client;
use uaa_authcode_proxy::oauth::{OAuthClient, OAuthConfig, OAuthError, Token, UaaClient};

mod common;

fn client(uaa: std::net::SocketAddr, secret: &str) -> UaaClient {
    let config = OAuthConfig::for_uaa(
        &format!("http://{uaa}").parse().unwrap(),
        "proxy",
        secret,
        "http://localhost:8080/auth/callback".parse().unwrap(),
    );
    UaaClient::new(Arc::new(config), reqwest::Client::builder().no_proxy().build().unwrap())
}

#[tokio::test]
async fn test_code_exchange_and_refresh() {
    let (addr, uaa) = common::start_mock_uaa().await;
    let client = client(addr, "proxy-secret");

    let token = client.exchange(common::GOOD_CODE).await.unwrap();
    assert_eq!(token.access_token, "access-1");
    assert_eq!(token.refresh_token.as_deref(), Some("refresh-1"));
    assert!(token.is_valid());

    // a valid token is returned without contacting UAA
    let same = client.token(token.clone()).await.unwrap();
    assert_eq!(same, token);
    assert_eq!(uaa.token_calls(), 1);

    let expired = Token { expiry: Some(1), ..token };
    let refreshed = client.token(expired).await.unwrap();
    assert_eq!(refreshed.access_token, "access-refreshed");
    assert_eq!(uaa.grants(), vec!["authorization_code", "refresh_token"]);
}

#[tokio::test]
async fn test_rejected_code_surfaces_endpoint_error() {
    let (addr, _uaa) = common::start_mock_uaa().await;
    let err = client(addr, "proxy-secret").exchange("bogus").await.unwrap_err();
    match err {
        OAuthError::Endpoint { status, body } => {
            assert_eq!(status.as_u16(), 400);
            assert!(body.contains("invalid_grant"));
        }
        other => panic!("expected endpoint error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_expired_token_without_refresh_token() {
    let (addr, uaa) = common::start_mock_uaa().await;
    let token = Token {
        access_token: "old".into(),
        token_type: "bearer".into(),
        refresh_token: None,
        expiry: Some(1),
        scope: None,
    };
    assert!(matches!(
        client(addr, "proxy-secret").token(token).await,
        Err(OAuthError::Expired)
    ));
    assert_eq!(uaa.token_calls(), 0);
}

#[tokio::test]
async fn test_startup_registration() {
    let (addr, uaa) = common::start_mock_uaa().await;
    let mut config = common::proxy_config("http://127.0.0.1:9", addr);
    config.uaa.registration.enabled = true;
    config.uaa.registration.admin_client_id = "admin".into();
    config.uaa.registration.admin_client_secret = "admin-secret".into();
    config.uaa.registration.client_name = "Test Proxy".into();

    let http = reqwest::Client::builder().no_proxy().build().unwrap();
    register_proxy_client(&config, &http).await;

    let registered = uaa.registered.lock().unwrap().clone();
    assert_eq!(registered.len(), 1);
    let client = &registered[0];
    assert_eq!(client["client_id"], "proxy");
    assert_eq!(client["name"], "Test Proxy");
    assert_eq!(client["scope"], serde_json::json!(["openid", "app.read"]));
    assert_eq!(client["redirect_uri"], serde_json::json!(["http://localhost:8080/auth/callback"]));
    assert_eq!(uaa.grants(), vec!["client_credentials"]);
}

#[tokio::test]
async fn test_registration_disabled_does_nothing() {
    let (addr, uaa) = common::start_mock_uaa().await;
    let config = common::proxy_config("http://127.0.0.1:9", addr);
    register_proxy_client(&config, &reqwest::Client::new()).await;
    assert_eq!(uaa.token_calls(), 0);
    assert!(uaa.registered.lock().unwrap().is_empty());
}
