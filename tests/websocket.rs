//! Websocket tunneling through the proxy.

use axum::http::StatusCode;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

mod common;

fn ws_request(
    proxy: &common::TestProxy,
    path: &str,
    cookie: Option<&str>,
) -> tokio_tungstenite::tungstenite::handshake::client::Request {
    let mut request = format!("ws://{}{}", proxy.addr, path)
        .into_client_request()
        .unwrap();
    if let Some(cookie) = cookie {
        request.headers_mut().insert("cookie", cookie.parse().unwrap());
    }
    request
}

#[tokio::test]
async fn test_authenticated_websocket_is_tunneled() {
    let backend = common::start_ws_echo_backend().await;
    let (uaa_addr, _uaa) = common::start_mock_uaa().await;
    let proxy = common::start_proxy(common::proxy_config(&format!("http://{backend}/base"), uaa_addr)).await;
    let cookie = common::authenticated_cookie(&proxy).await;

    let (mut ws, response) = tokio_tungstenite::connect_async(ws_request(&proxy, "/live?room=7", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);

    // the backend reports the path it was asked for
    let first = ws.next().await.unwrap().unwrap();
    assert_eq!(first.to_text().unwrap(), "/base/live?room=7");

    ws.send(Message::Text("hello".into())).await.unwrap();
    assert_eq!(ws.next().await.unwrap().unwrap().to_text().unwrap(), "hello");

    ws.send(Message::Binary(vec![0u8, 1, 2, 255].into())).await.unwrap();
    assert_eq!(ws.next().await.unwrap().unwrap().into_data().as_ref(), &[0u8, 1, 2, 255]);

    ws.close(None).await.unwrap();
}

#[tokio::test]
async fn test_unauthenticated_websocket_is_rejected() {
    let backend = common::start_ws_echo_backend().await;
    let (uaa_addr, _uaa) = common::start_mock_uaa().await;
    let proxy = common::start_proxy(common::proxy_config(&format!("http://{backend}"), uaa_addr)).await;

    let err = tokio_tungstenite::connect_async(ws_request(&proxy, "/live", None))
        .await
        .unwrap_err();
    match err {
        WsError::Http(response) => assert_eq!(response.status(), StatusCode::UNAUTHORIZED),
        other => panic!("expected HTTP rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unreachable_websocket_backend_is_internal_error() {
    let backend = common::closed_port().await;
    let (uaa_addr, _uaa) = common::start_mock_uaa().await;
    let proxy = common::start_proxy(common::proxy_config(&format!("http://{backend}"), uaa_addr)).await;
    let cookie = common::authenticated_cookie(&proxy).await;

    let err = tokio_tungstenite::connect_async(ws_request(&proxy, "/live", Some(&cookie)))
        .await
        .unwrap_err();
    match err {
        WsError::Http(response) => assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR),
        other => panic!("expected HTTP rejection, got {other:?}"),
    }
}
