//! Reverse proxy stage: plain HTTP forwarding and websocket tunneling.
//!
//! # Path composition
//! The request path, relative to the mount path, is joined onto the backend
//! base path with exactly one slash, and the backend's own query string is
//! merged in front of the request's.
//!
//! ```text
//! mount /api, backend http://svc:8080/svc/?v=1
//! GET /api/x?y=2  →  GET http://svc:8080/svc/x?v=1&y=2
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::header::HOST;
use axum::http::uri::Authority;
use axum::http::{HeaderMap, HeaderValue, Request, StatusCode, Uri, Version};
use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use url::Url;

use crate::http::headers::{append_forwarded_for, is_websocket_request, strip_hop_by_hop};
use crate::http::pipeline::{Flow, Stage};
use crate::http::websocket;
use crate::observability::metrics;

#[derive(Debug, thiserror::Error)]
pub enum ProxyTargetError {
    #[error("backend URL must use http, got {0:?}")]
    UnsupportedScheme(String),
    #[error("backend URL has no host")]
    MissingHost,
    #[error("backend URL has no usable port")]
    MissingPort,
    #[error("invalid backend authority: {0}")]
    Authority(#[from] axum::http::uri::InvalidUri),
}

/// URL prefix the proxy serves application traffic under.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MountPath(String);

impl MountPath {
    /// `"/"`, `""` and `"/api/"` normalize to `""`, `""` and `"/api"`.
    pub fn new(path: &str) -> Self {
        let trimmed = path.trim().trim_matches('/');
        if trimmed.is_empty() {
            Self(String::new())
        } else {
            Self(format!("/{trimmed}"))
        }
    }

    pub fn as_str(&self) -> &str {
        if self.0.is_empty() {
            "/"
        } else {
            &self.0
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.0.is_empty()
            || path
                .strip_prefix(self.0.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    }

    /// Path relative to the mount point. Only meaningful when
    /// [`contains`](Self::contains) holds.
    pub fn strip<'p>(&self, path: &'p str) -> &'p str {
        path.strip_prefix(self.0.as_str()).unwrap_or(path)
    }
}

/// Join two paths with exactly one slash between them.
pub fn single_joining_slash(a: &str, b: &str) -> String {
    match (a.ends_with('/'), b.starts_with('/')) {
        (true, true) => format!("{a}{}", &b[1..]),
        (false, false) => format!("{a}/{b}"),
        _ => format!("{a}{b}"),
    }
}

/// `a&b`, leaving out empty sides.
pub fn combined_query(a: &str, b: &str) -> String {
    match (a.is_empty(), b.is_empty()) {
        (true, _) => b.to_string(),
        (_, true) => a.to_string(),
        _ => format!("{a}&{b}"),
    }
}

/// The backend the proxy forwards to.
#[derive(Debug, Clone)]
pub struct ProxyTarget {
    base: Url,
    authority: Authority,
    dial_addr: String,
}

impl ProxyTarget {
    pub fn new(base: &Url) -> Result<Self, ProxyTargetError> {
        if base.scheme() != "http" {
            return Err(ProxyTargetError::UnsupportedScheme(base.scheme().to_string()));
        }
        let host = base.host_str().ok_or(ProxyTargetError::MissingHost)?;
        let port = base.port_or_known_default().ok_or(ProxyTargetError::MissingPort)?;
        let authority = match base.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        Ok(Self {
            base: base.clone(),
            authority: authority.parse()?,
            dial_addr: format!("{host}:{port}"),
        })
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// `host:port` for raw TCP connections.
    pub fn dial_addr(&self) -> &str {
        &self.dial_addr
    }

    /// Backend path and query for a request path (already relative to the
    /// mount point) and request query.
    pub fn path_and_query(&self, path: &str, query: Option<&str>) -> String {
        let path = single_joining_slash(self.base.path(), path);
        let query = combined_query(self.base.query().unwrap_or_default(), query.unwrap_or_default());
        if query.is_empty() {
            path
        } else {
            format!("{path}?{query}")
        }
    }

    /// Absolute backend URI for the plain HTTP client.
    pub fn uri(&self, path_and_query: &str) -> Result<Uri, ProxyTargetError> {
        Ok(format!("http://{}{}", self.authority, path_and_query).parse()?)
    }
}

/// Final pipeline stage: forwards to the backend and always answers.
pub struct ReverseProxy {
    target: Arc<ProxyTarget>,
    mount: MountPath,
    client: Client<HttpConnector, Body>,
    proxy_websockets: bool,
}

impl ReverseProxy {
    pub fn new(target: Arc<ProxyTarget>, mount: MountPath, proxy_websockets: bool) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            target,
            mount,
            client,
            proxy_websockets,
        }
    }

    pub fn target(&self) -> &ProxyTarget {
        &self.target
    }

    fn backend_path_and_query(&self, uri: &Uri) -> String {
        let relative = self.mount.strip(uri.path());
        self.target.path_and_query(relative, uri.query())
    }

    async fn forward(&self, request: Request<Body>) -> Response {
        let started = Instant::now();
        let client_ip = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        let (parts, body) = request.into_parts();
        let path = parts.uri.path().to_string();

        let uri = match self.target.uri(&self.backend_path_and_query(&parts.uri)) {
            Ok(uri) => uri,
            Err(e) => {
                tracing::error!(path = %path, error = %e, "Cannot build backend URI");
                return (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response();
            }
        };

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        if let Ok(host) = HeaderValue::from_str(self.target.authority.as_str()) {
            headers.insert(HOST, host);
        }
        if let Some(ip) = client_ip {
            append_forwarded_for(&mut headers, ip);
        }

        let mut upstream = Request::new(body);
        *upstream.method_mut() = parts.method;
        *upstream.uri_mut() = uri;
        *upstream.version_mut() = Version::HTTP_11;
        *upstream.headers_mut() = headers;

        match self.client.request(upstream).await {
            Ok(response) => {
                let (mut parts, body) = response.into_parts();
                strip_hop_by_hop(&mut parts.headers);
                metrics::record_upstream(parts.status.as_u16(), started);
                Response::from_parts(parts, Body::new(body))
            }
            Err(e) => {
                tracing::error!(path = %path, backend = %self.target.authority, error = %e, "Upstream error");
                metrics::record_upstream(StatusCode::BAD_GATEWAY.as_u16(), started);
                (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
            }
        }
    }
}

impl Stage for ReverseProxy {
    fn name(&self) -> &'static str {
        "proxy"
    }

    fn handle<'a>(&'a self, request: Request<Body>, _: &'a mut HeaderMap) -> BoxFuture<'a, Flow> {
        Box::pin(async move {
            if self.proxy_websockets && is_websocket_request(request.headers()) {
                let path_and_query = self.backend_path_and_query(request.uri());
                return Flow::Respond(websocket::tunnel(&self.target, request, &path_and_query).await);
            }
            Flow::Respond(self.forward(request).await)
        })
    }
}
