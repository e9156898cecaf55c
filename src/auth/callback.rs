//! OAuth2 redirect target.

use std::sync::Arc;

use axum::http::HeaderMap;
use axum::response::{IntoResponse, Redirect, Response};

use crate::auth::error::AuthError;
use crate::auth::PostLogin;
use crate::oauth::{OAuthClient, OAuthConfig};
use crate::observability::metrics;
use crate::session::{SessionKey, SessionStore};

/// Query parameters the IdP sends back.
#[derive(Debug, Default)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

impl CallbackParams {
    /// Build from decoded query pairs. A repeated key keeps its first value.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut params = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_ref() {
                "code" => &mut params.code,
                "state" => &mut params.state,
                "error" => &mut params.error,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into());
            }
        }
        params
    }
}

pub struct Callback {
    oauth: Arc<dyn OAuthClient>,
    config: Arc<OAuthConfig>,
    sessions: Arc<SessionStore>,
    post_login: PostLogin,
}

impl Callback {
    pub fn new(
        oauth: Arc<dyn OAuthClient>,
        config: Arc<OAuthConfig>,
        sessions: Arc<SessionStore>,
        post_login: PostLogin,
    ) -> Self {
        Self {
            oauth,
            config,
            sessions,
            post_login,
        }
    }

    pub fn path(&self) -> &str {
        self.config.callback_path()
    }

    pub async fn handle(&self, headers: &HeaderMap, params: CallbackParams) -> Response {
        let mut response_headers = HeaderMap::new();
        match self.complete(headers, params, &mut response_headers).await {
            Ok(target) => {
                metrics::record_callback("success");
                (response_headers, Redirect::temporary(&target)).into_response()
            }
            Err(e) => {
                metrics::record_callback(e.kind());
                e.into_response()
            }
        }
    }

    async fn complete(
        &self,
        headers: &HeaderMap,
        params: CallbackParams,
        response_headers: &mut HeaderMap,
    ) -> Result<String, AuthError> {
        let mut session = self.sessions.load(headers).await;

        let Some(expected) = session.state().map(str::to_owned) else {
            tracing::warn!("Callback without login state in session");
            return Err(AuthError::MissingState);
        };
        if params.state.as_deref() != Some(expected.as_str()) {
            tracing::warn!("Callback state does not match session state");
            return Err(AuthError::StateMismatch);
        }

        if let Some(error) = params.error {
            tracing::warn!(idp_error = %error, "Authorization server returned an error");
            return Err(AuthError::Denied(error));
        }
        let code = params
            .code
            .filter(|code| !code.is_empty())
            .ok_or(AuthError::MissingCode)?;

        let token = self.oauth.exchange(&code).await.map_err(|e| {
            tracing::error!(error = %e, "Error exchanging authorization code");
            AuthError::Exchange
        })?;

        if !token.has_scopes(self.config.scopes()) {
            tracing::warn!("Token from code exchange lacks required scopes");
            return Err(AuthError::ScopeInsufficient);
        }

        let target = self.post_login.target(session.redirect()).to_string();
        session.set_token(token);
        session.remove(SessionKey::State);
        session.remove(SessionKey::Redirect);
        if let Err(e) = self.sessions.save(&mut session, response_headers).await {
            tracing::error!(error = %e, "Error storing token in session");
        }

        tracing::info!(redirect_to = %target, "Login completed");
        Ok(target)
    }
}
