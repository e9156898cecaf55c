//! Shared utilities for integration testing.
//!
//! Every server binds `127.0.0.1:0`, so tests can run in parallel.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode, Uri},
    response::IntoResponse,
    routing::post,
    Form, Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

use uaa_authcode_proxy::config::{ProxyConfig, SessionStoreKind};
use uaa_authcode_proxy::lifecycle::{Components, Shutdown};
use uaa_authcode_proxy::oauth::UaaClient;
use uaa_authcode_proxy::random::RandomSource;
use uaa_authcode_proxy::session::SessionStore;
use uaa_authcode_proxy::HttpServer;

/// Code the mock UAA exchanges for a token with every scope.
pub const GOOD_CODE: &str = "good-code";
/// Code the mock UAA exchanges for a token with only `openid`.
pub const NARROW_CODE: &str = "narrow-code";
pub const REQUIRED_SCOPES: &str = "openid app.read";

/// reqwest client that never uses environment proxies and never follows
/// redirects, so tests see the proxy's own responses.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

/// Backend answering every request with a JSON description of it.
pub async fn start_echo_backend() -> SocketAddr {
    async fn echo(uri: Uri, headers: HeaderMap) -> impl IntoResponse {
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_owned);
        Json(json!({
            "path": uri.path(),
            "query": uri.query(),
            "host": header("host"),
            "forwarded_for": header("x-forwarded-for"),
            "cookie": header("cookie"),
        }))
    }
    serve(Router::new().fallback(echo)).await
}

/// Websocket backend: sends the request path as its first message, then
/// echoes everything it receives.
pub async fn start_ws_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut path = String::new();
                let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
                    path = request.uri().to_string();
                    Ok(response)
                };
                let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
                    return;
                };
                if ws.send(path.into()).await.is_err() {
                    return;
                }
                while let Some(Ok(message)) = ws.next().await {
                    if (message.is_text() || message.is_binary()) && ws.send(message).await.is_err() {
                        break;
                    }
                }
            });
        }
    });
    addr
}

/// Mock UAA with token and client registration endpoints.
#[derive(Default)]
pub struct MockUaa {
    pub token_calls: AtomicUsize,
    pub grants: Mutex<Vec<String>>,
    pub registered: Mutex<Vec<serde_json::Value>>,
}

impl MockUaa {
    pub fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }

    pub fn grants(&self) -> Vec<String> {
        self.grants.lock().unwrap().clone()
    }
}

pub async fn start_mock_uaa() -> (SocketAddr, Arc<MockUaa>) {
    let uaa = Arc::new(MockUaa::default());
    let router = Router::new()
        .route("/oauth/token", post(token_endpoint))
        .route("/oauth/clients", post(clients_endpoint))
        .with_state(uaa.clone());
    (serve(router).await, uaa)
}

async fn token_endpoint(
    State(uaa): State<Arc<MockUaa>>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> axum::response::Response {
    uaa.token_calls.fetch_add(1, Ordering::SeqCst);
    if !headers.contains_key(AUTHORIZATION) {
        return (StatusCode::UNAUTHORIZED, "client authentication required").into_response();
    }

    let grant = form.get("grant_type").cloned().unwrap_or_default();
    uaa.grants.lock().unwrap().push(grant.clone());

    let (access, scope) = match (grant.as_str(), form.get("code").map(String::as_str)) {
        ("authorization_code", Some(GOOD_CODE)) => ("access-1", REQUIRED_SCOPES),
        ("authorization_code", Some(NARROW_CODE)) => ("access-narrow", "openid"),
        ("refresh_token", _) if form.get("refresh_token").map(String::as_str) == Some("refresh-1") => {
            ("access-refreshed", REQUIRED_SCOPES)
        }
        ("client_credentials", _) => ("admin-token", "clients.write"),
        _ => return (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid_grant"}))).into_response(),
    };

    Json(json!({
        "access_token": access,
        "token_type": "bearer",
        "refresh_token": "refresh-1",
        "expires_in": 3600,
        "scope": scope,
    }))
    .into_response()
}

async fn clients_endpoint(
    State(uaa): State<Arc<MockUaa>>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> StatusCode {
    let bearer = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    if bearer != Some("Bearer admin-token") {
        return StatusCode::UNAUTHORIZED;
    }
    uaa.registered.lock().unwrap().push(body);
    StatusCode::CREATED
}

/// Config pointing at the given backend and UAA, with in-memory sessions.
pub fn proxy_config(backend: &str, uaa: SocketAddr) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.backend.url = backend.to_string();
    config.uaa.url = format!("http://{uaa}");
    config.uaa.client_id = "proxy".into();
    config.uaa.client_secret = "proxy-secret".into();
    config.uaa.required_scopes = REQUIRED_SCOPES.split(' ').map(String::from).collect();
    config.session.store = SessionStoreKind::Memory;
    config.session.auth_key = "integration signing key".into();
    config.session.encrypt_key = "0123456789abcdef".into();
    config
}

pub struct TestProxy {
    pub addr: SocketAddr,
    pub sessions: Arc<SessionStore>,
    pub shutdown: Shutdown,
}

impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

pub async fn start_proxy(config: ProxyConfig) -> TestProxy {
    let mut components = Components::with_rng(&config, Arc::new(RandomSource::seeded(42))).unwrap();
    components.oauth = Arc::new(UaaClient::new(
        components.oauth_config.clone(),
        reqwest::Client::builder().no_proxy().build().unwrap(),
    ));

    let server = HttpServer::new(&config, &components).unwrap();
    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let stopped = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, stopped).await;
    });

    TestProxy {
        addr,
        sessions: components.sessions,
        shutdown,
    }
}

/// Turn a response's `Set-Cookie` headers into a `Cookie` header value.
pub fn cookies_of(response: &reqwest::Response) -> String {
    response
        .headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Value of a query parameter in a `Location` header.
pub fn location_param(response: &reqwest::Response, name: &str) -> Option<String> {
    let location = response.headers().get(reqwest::header::LOCATION)?.to_str().ok()?;
    let url = url::Url::parse(location).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

/// Store a valid token with every required scope and return the matching
/// `Cookie` header value.
pub async fn authenticated_cookie(proxy: &TestProxy) -> String {
    use uaa_authcode_proxy::oauth::Token;
    use uaa_authcode_proxy::session::{cookie_header_from, Session};

    let mut session = Session::new();
    session.set_token(Token {
        access_token: "access-1".into(),
        token_type: "bearer".into(),
        refresh_token: Some("refresh-1".into()),
        expiry: None,
        scope: Some(REQUIRED_SCOPES.into()),
    });
    let mut headers = HeaderMap::new();
    proxy.sessions.save(&mut session, &mut headers).await.unwrap();
    cookie_header_from(&headers).unwrap().to_str().unwrap().to_string()
}

/// An address nothing is listening on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}
