//! Redirects driven by `X-Forwarded-Proto` / `X-Forwarded-Port`.
//!
//! A load balancer in front of the proxy reports the scheme and port the
//! client used. When that differs from the configured one the client is sent
//! a 301 to the same URL with that component replaced. Requests without the
//! header pass through untouched.

use axum::body::Body;
use axum::http::header::{HOST, LOCATION};
use axum::http::{HeaderMap, HeaderValue, Request, StatusCode};
use axum::response::IntoResponse;
use futures_util::future::BoxFuture;

use crate::http::headers::{X_FORWARDED_PORT, X_FORWARDED_PROTO};
use crate::http::pipeline::{Flow, Stage};

/// Requires the forwarded scheme to equal `proto`.
#[derive(Debug, Clone)]
pub struct ForwardedProtoRedirect {
    proto: String,
}

impl ForwardedProtoRedirect {
    pub fn new(proto: impl Into<String>) -> Self {
        Self { proto: proto.into() }
    }

    fn location(&self, request: &Request<Body>) -> Option<String> {
        let forwarded = forwarded_value(request.headers(), X_FORWARDED_PROTO)?;
        if forwarded == self.proto {
            return None;
        }
        let host = request_host(request)?;
        Some(format!("{}://{}{}", self.proto, host, path_and_query(request)))
    }
}

impl Stage for ForwardedProtoRedirect {
    fn name(&self) -> &'static str {
        "redirect_proto"
    }

    fn handle<'a>(&'a self, request: Request<Body>, _: &'a mut HeaderMap) -> BoxFuture<'a, Flow> {
        Box::pin(async move {
            match self.location(&request) {
                Some(location) => permanent_redirect(&request, location),
                None => Flow::Continue(request),
            }
        })
    }
}

/// Requires the forwarded port to equal `port`.
#[derive(Debug, Clone)]
pub struct ForwardedPortRedirect {
    port: String,
}

impl ForwardedPortRedirect {
    pub fn new(port: impl Into<String>) -> Self {
        Self { port: port.into() }
    }

    /// Scheme-relative, so the client keeps whatever scheme it used.
    fn location(&self, request: &Request<Body>) -> Option<String> {
        let forwarded = forwarded_value(request.headers(), X_FORWARDED_PORT)?;
        if forwarded == self.port {
            return None;
        }
        let host = strip_port(request_host(request)?);
        Some(format!("//{}:{}{}", host, self.port, path_and_query(request)))
    }
}

impl Stage for ForwardedPortRedirect {
    fn name(&self) -> &'static str {
        "redirect_port"
    }

    fn handle<'a>(&'a self, request: Request<Body>, _: &'a mut HeaderMap) -> BoxFuture<'a, Flow> {
        Box::pin(async move {
            match self.location(&request) {
                Some(location) => permanent_redirect(&request, location),
                None => Flow::Continue(request),
            }
        })
    }
}

fn permanent_redirect(request: &Request<Body>, location: String) -> Flow {
    match HeaderValue::from_str(&location) {
        Ok(value) => {
            tracing::debug!(path = %request.uri().path(), location = %location, "Redirecting to canonical URL");
            Flow::Respond((StatusCode::MOVED_PERMANENTLY, [(LOCATION, value)]).into_response())
        }
        Err(_) => {
            tracing::warn!(path = %request.uri().path(), "Redirect location is not a valid header value");
            Flow::Respond(StatusCode::BAD_REQUEST.into_response())
        }
    }
}

fn forwarded_value<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// `Host` header, or the URI authority for HTTP/2 requests.
fn request_host(request: &Request<Body>) -> Option<&str> {
    request
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| request.uri().authority().map(|a| a.as_str()))
        .filter(|h| !h.is_empty())
}

/// Host without its port; IPv6 literals keep their brackets.
fn strip_port(host: &str) -> &str {
    if let Some(end) = host.rfind(']') {
        return &host[..=end];
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}

fn path_and_query(request: &Request<Body>) -> &str {
    request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/")
}
