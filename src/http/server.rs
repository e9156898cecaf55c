//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router: the OAuth callback route plus a fallback that
//!   feeds everything under the mount path through the pipeline
//! - Wire up middleware (tracing, request id, optional timeout)
//! - Serve with client addresses attached and graceful shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::auth::{Callback, CallbackParams};
use crate::config::ProxyConfig;
use crate::http::pipeline::Pipeline;
use crate::http::proxy::MountPath;
use crate::lifecycle::shutdown;
use crate::lifecycle::startup::{build_pipeline, post_login, Components, StartupError};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub callback: Arc<Callback>,
    pub mount: MountPath,
}

/// HTTP server for the proxy.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(config: &ProxyConfig, components: &Components) -> Result<Self, StartupError> {
        let pipeline = Arc::new(build_pipeline(config, components)?);
        let callback = Arc::new(Callback::new(
            components.oauth.clone(),
            components.oauth_config.clone(),
            components.sessions.clone(),
            post_login(&config.uaa),
        ));
        let state = AppState {
            pipeline,
            callback,
            mount: MountPath::new(&config.listener.mount_path),
        };

        let router = Self::build_router(config, state);
        Ok(Self { router })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        let callback_path = state.callback.path().to_string();
        tracing::debug!(callback = %callback_path, mount = %state.mount.as_str(), "Building router");

        let mut router = Router::new()
            .route(&callback_path, any(callback_handler))
            .fallback(proxy_entry)
            .with_state(state);

        if let Some(secs) = config.timeouts.request_secs {
            router = router.layer(TimeoutLayer::new(Duration::from_secs(secs)));
        }

        router
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown::wait(shutdown))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn callback_handler(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> Response {
    state
        .callback
        .handle(&headers, CallbackParams::from_pairs(pairs))
        .await
}

/// Everything that is not the callback.
async fn proxy_entry(State(state): State<AppState>, request: Request<Body>) -> Response {
    if !state.mount.contains(request.uri().path()) {
        tracing::debug!(path = %request.uri().path(), "Request outside mount path");
        return StatusCode::NOT_FOUND.into_response();
    }
    state.pipeline.handle(request).await
}
