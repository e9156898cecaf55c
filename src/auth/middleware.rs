//! Authorization stage.
//!
//! Lets a request through only when the session holds a valid token carrying
//! every required scope. Expired tokens are refreshed; a refreshed token with
//! a new access token is scope-checked before it is stored.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, Request, Uri};
use axum::response::{IntoResponse, Redirect};
use futures_util::future::BoxFuture;

use crate::auth::error::AuthError;
use crate::auth::PostLogin;
use crate::http::headers::{is_websocket_request, is_xhr_request};
use crate::http::pipeline::{Flow, Stage};
use crate::oauth::{OAuthClient, OAuthConfig};
use crate::observability::metrics;
use crate::random::RandomSource;
use crate::session::{Session, SessionStore};

/// Length of the anti-forgery state sent to the IdP.
pub const STATE_LEN: usize = 64;

pub struct Authorize {
    oauth: Arc<dyn OAuthClient>,
    config: Arc<OAuthConfig>,
    sessions: Arc<SessionStore>,
    rng: Arc<RandomSource>,
    post_login: PostLogin,
}

impl Authorize {
    pub fn new(
        oauth: Arc<dyn OAuthClient>,
        config: Arc<OAuthConfig>,
        sessions: Arc<SessionStore>,
        rng: Arc<RandomSource>,
        post_login: PostLogin,
    ) -> Self {
        Self {
            oauth,
            config,
            sessions,
            rng,
            post_login,
        }
    }

    async fn authorize(&self, request: Request<Body>, response_headers: &mut HeaderMap) -> Flow {
        let mut session = self.sessions.load(request.headers()).await;

        let Some(current) = session.token().cloned() else {
            return self
                .start_login(request.headers(), request.uri(), &mut session, response_headers)
                .await;
        };

        let token = match self.oauth.token(current.clone()).await {
            Ok(token) => token,
            Err(e) => {
                tracing::info!(path = %request.uri().path(), error = %e, "Session token unusable, restarting login");
                metrics::record_refresh("failed");
                return self
                    .start_login(request.headers(), request.uri(), &mut session, response_headers)
                    .await;
            }
        };

        if token.access_token != current.access_token {
            if !token.has_scopes(self.config.scopes()) {
                tracing::warn!(path = %request.uri().path(), "Refreshed token lacks required scopes");
                metrics::record_refresh("scope_insufficient");
                return Flow::Respond(AuthError::ScopeInsufficient.into_response());
            }

            session.set_token(token);
            if let Err(e) = self.sessions.save(&mut session, response_headers).await {
                tracing::warn!(path = %request.uri().path(), error = %e, "Failed to store refreshed token");
            }
            metrics::record_refresh("refreshed");
        }

        Flow::Continue(request)
    }

    /// Send the browser to the IdP, or answer 401 to clients that cannot
    /// follow the redirect.
    async fn start_login(
        &self,
        headers: &HeaderMap,
        uri: &Uri,
        session: &mut Session,
        response_headers: &mut HeaderMap,
    ) -> Flow {
        if is_websocket_request(headers) || is_xhr_request(headers) {
            tracing::debug!(path = %uri.path(), "Unauthenticated script or websocket request");
            return Flow::Respond(AuthError::AuthenticationRequired.into_response());
        }

        let state = self.rng.alphanumeric(STATE_LEN);
        session.set_state(state.clone());
        if self.post_login.resume_original {
            if let Some(path_and_query) = uri.path_and_query() {
                session.set_redirect(path_and_query.as_str());
            }
        }
        if let Err(e) = self.sessions.save(session, response_headers).await {
            tracing::error!(path = %uri.path(), error = %e, "Failed to store login state");
        }

        tracing::debug!(path = %uri.path(), "Redirecting to authorization server");
        let url = self.config.auth_code_url(&state);
        Flow::Respond(Redirect::temporary(url.as_str()).into_response())
    }
}

impl Stage for Authorize {
    fn name(&self) -> &'static str {
        "authorize"
    }

    fn handle<'a>(
        &'a self,
        request: Request<Body>,
        response_headers: &'a mut HeaderMap,
    ) -> BoxFuture<'a, Flow> {
        Box::pin(self.authorize(request, response_headers))
    }
}
