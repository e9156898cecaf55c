//! Ordered request pipeline.
//!
//! Each [`Stage`] either hands the request on or answers it. Headers a stage
//! wants on whatever response is finally sent (session cookies, mostly) go
//! into the shared response header map, which the pipeline merges into the
//! response.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;

use crate::observability::metrics;

/// Outcome of a single stage.
pub enum Flow {
    /// Pass the (possibly modified) request to the next stage.
    Continue(Request<Body>),
    /// Stop here and send this response.
    Respond(Response),
}

pub trait Stage: Send + Sync {
    /// Short label used in logs and metrics.
    fn name(&self) -> &'static str;

    fn handle<'a>(
        &'a self,
        request: Request<Body>,
        response_headers: &'a mut HeaderMap,
    ) -> BoxFuture<'a, Flow>;
}

#[derive(Clone, Default)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage; stages run in the order they were added.
    #[must_use]
    pub fn stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub async fn handle(&self, mut request: Request<Body>) -> Response {
        let started = Instant::now();
        let method = request.method().to_string();
        let mut response_headers = HeaderMap::new();

        for stage in &self.stages {
            match stage.handle(request, &mut response_headers).await {
                Flow::Continue(next) => request = next,
                Flow::Respond(mut response) => {
                    for (name, value) in &response_headers {
                        response.headers_mut().append(name.clone(), value.clone());
                    }
                    metrics::record_request(&method, response.status().as_u16(), stage.name(), started);
                    return response;
                }
            }
        }

        tracing::warn!(path = %request.uri().path(), "No stage answered the request");
        metrics::record_request(&method, 404, "none", started);
        StatusCode::NOT_FOUND.into_response()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish()
    }
}
