//! Forwarding, mount path and redirect normalization through a running proxy.

use axum::http::StatusCode;
use reqwest::header::{COOKIE, LOCATION};

mod common;

#[tokio::test]
async fn test_mount_path_is_replaced_by_backend_path() {
    let backend = common::start_echo_backend().await;
    let (uaa_addr, _uaa) = common::start_mock_uaa().await;
    let mut config = common::proxy_config(&format!("http://{backend}/svc?tenant=a"), uaa_addr);
    config.listener.mount_path = "/app".into();
    let proxy = common::start_proxy(config).await;
    let client = common::http_client();
    let cookie = common::authenticated_cookie(&proxy).await;

    let response = client
        .get(proxy.url("/app/items?page=2"))
        .header(COOKIE, &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["path"], "/svc/items");
    assert_eq!(body["query"], "tenant=a&page=2");
    assert_eq!(body["host"], backend.to_string());
    assert_eq!(body["forwarded_for"], "127.0.0.1");

    let response = client
        .get(proxy.url("/elsewhere"))
        .header(COOKIE, &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unreachable_backend_is_bad_gateway() {
    let backend = common::closed_port().await;
    let (uaa_addr, _uaa) = common::start_mock_uaa().await;
    let proxy = common::start_proxy(common::proxy_config(&format!("http://{backend}"), uaa_addr)).await;
    let cookie = common::authenticated_cookie(&proxy).await;

    let response = common::http_client()
        .get(proxy.url("/"))
        .header(COOKIE, cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_unauthenticated_xhr_is_unauthorized() {
    let (uaa_addr, _uaa) = common::start_mock_uaa().await;
    let proxy = common::start_proxy(common::proxy_config("http://127.0.0.1:9", uaa_addr)).await;

    let response = common::http_client()
        .get(proxy.url("/api/data"))
        .header("X-Requested-With", "XMLHttpRequest")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(LOCATION).is_none());
}

#[tokio::test]
async fn test_forwarded_headers_trigger_permanent_redirects() {
    let (uaa_addr, _uaa) = common::start_mock_uaa().await;
    let mut config = common::proxy_config("http://127.0.0.1:9", uaa_addr);
    config.redirect.proto = Some("https".into());
    config.redirect.port = Some("8443".into());
    let proxy = common::start_proxy(config).await;
    let client = common::http_client();

    let response = client
        .get(proxy.url("/page?q=1"))
        .header("Host", "app.example.com")
        .header("X-Forwarded-Proto", "http")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(response.headers()[LOCATION], "https://app.example.com/page?q=1");

    let response = client
        .get(proxy.url("/page"))
        .header("Host", "app.example.com:80")
        .header("X-Forwarded-Proto", "https")
        .header("X-Forwarded-Port", "80")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(response.headers()[LOCATION], "//app.example.com:8443/page");

    // matching headers fall through to the login redirect
    let response = client
        .get(proxy.url("/page"))
        .header("X-Forwarded-Proto", "https")
        .header("X-Forwarded-Port", "8443")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
}

#[tokio::test]
async fn test_graceful_shutdown_stops_listener() {
    let (uaa_addr, _uaa) = common::start_mock_uaa().await;
    let proxy = common::start_proxy(common::proxy_config("http://127.0.0.1:9", uaa_addr)).await;
    let client = common::http_client();
    assert!(client.get(proxy.url("/")).send().await.is_ok());

    proxy.shutdown.trigger();
    let mut stopped = false;
    for _ in 0..50 {
        if tokio::net::TcpStream::connect(proxy.addr).await.is_err() {
            stopped = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert!(stopped, "proxy still accepting after shutdown");
}
