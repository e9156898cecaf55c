//! Raw websocket tunneling.
//!
//! # Data Flow
//! ```text
//! client ── upgrade request ──▶ proxy ── same request ──▶ backend (TCP dial)
//! client ◀── 101 + backend headers ── proxy ◀── 101 ── backend
//! client ◀════ raw bytes, both directions, two copy tasks ════▶ backend
//! ```
//!
//! Frames are not interpreted. The first copy task to finish (EOF or error)
//! ends the tunnel and both connections are dropped.

use std::io;

use axum::body::Body;
use axum::http::{Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::http::proxy::ProxyTarget;
use crate::observability::metrics;

#[derive(Debug, Clone, Copy)]
enum Direction {
    ClientToBackend,
    BackendToClient,
}

/// Open a tunnel for an upgrade request. `path_and_query` is the backend
/// request target.
pub async fn tunnel(target: &ProxyTarget, request: Request<Body>, path_and_query: &str) -> Response {
    let (mut parts, _) = request.into_parts();
    let path = parts.uri.path().to_string();

    let Some(client_upgrade) = parts.extensions.remove::<OnUpgrade>() else {
        tracing::error!(path = %path, "Connection does not support upgrades");
        return (StatusCode::INTERNAL_SERVER_ERROR, "Connection cannot be upgraded").into_response();
    };

    let stream = match TcpStream::connect(target.dial_addr()).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!(backend = %target.dial_addr(), error = %e, "Error dialing websocket backend");
            return backend_unreachable();
        }
    };

    let (mut sender, connection) = match hyper::client::conn::http1::handshake::<_, Body>(TokioIo::new(stream)).await {
        Ok(pair) => pair,
        Err(e) => {
            tracing::error!(backend = %target.dial_addr(), error = %e, "Websocket backend handshake failed");
            return backend_unreachable();
        }
    };
    tokio::spawn(async move {
        if let Err(e) = connection.with_upgrades().await {
            tracing::debug!(error = %e, "Websocket backend connection ended");
        }
    });

    parts.uri = match path_and_query.parse::<Uri>() {
        Ok(uri) => uri,
        Err(e) => {
            tracing::error!(path = %path, error = %e, "Cannot build websocket backend URI");
            return backend_unreachable();
        }
    };
    let upstream = Request::from_parts(parts, Body::empty());

    let mut response = match sender.send_request(upstream).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(backend = %target.dial_addr(), error = %e, "Error writing upgrade request to backend");
            return backend_unreachable();
        }
    };

    if response.status() != StatusCode::SWITCHING_PROTOCOLS {
        tracing::debug!(path = %path, status = %response.status(), "Backend declined websocket upgrade");
        let (parts, body) = response.into_parts();
        return Response::from_parts(parts, Body::new(body));
    }

    let backend_upgrade = hyper::upgrade::on(&mut response);
    tokio::spawn(splice(client_upgrade, backend_upgrade, path));

    let (parts, _) = response.into_parts();
    Response::from_parts(parts, Body::empty())
}

fn backend_unreachable() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "Error contacting backend server.").into_response()
}

/// Copy bytes both ways until one direction finishes.
async fn splice(client: OnUpgrade, backend: OnUpgrade, path: String) {
    let (client, backend) = match tokio::try_join!(client, backend) {
        Ok(pair) => pair,
        Err(e) => {
            tracing::warn!(path = %path, error = %e, "Websocket upgrade did not complete");
            return;
        }
    };

    let (mut client_read, mut client_write) = tokio::io::split(TokioIo::new(client));
    let (mut backend_read, mut backend_write) = tokio::io::split(TokioIo::new(backend));
    let (done_tx, mut done_rx) = mpsc::channel::<(Direction, io::Result<u64>)>(2);

    let tx = done_tx.clone();
    let upstream = tokio::spawn(async move {
        let result = tokio::io::copy(&mut client_read, &mut backend_write).await;
        let _ = backend_write.shutdown().await;
        let _ = tx.send((Direction::ClientToBackend, result)).await;
    });

    let tx = done_tx;
    let downstream = tokio::spawn(async move {
        let result = tokio::io::copy(&mut backend_read, &mut client_write).await;
        let _ = client_write.shutdown().await;
        let _ = tx.send((Direction::BackendToClient, result)).await;
    });

    metrics::record_tunnel_opened();
    tracing::debug!(path = %path, "Websocket tunnel established");

    match done_rx.recv().await {
        Some((direction, Ok(bytes))) => {
            tracing::debug!(path = %path, ?direction, bytes, "Websocket tunnel closed");
        }
        Some((direction, Err(e))) => {
            tracing::warn!(path = %path, ?direction, error = %e, "Error handling websocket tunnel");
        }
        None => {}
    }

    upstream.abort();
    downstream.abort();
    metrics::record_tunnel_closed();
}
