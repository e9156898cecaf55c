//! OAuth2 calls against the UAA token endpoint.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use reqwest::StatusCode;

use crate::oauth::config::OAuthConfig;
use crate::oauth::token::{Token, TokenResponse};
use crate::session::codec::unix_now;

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("token endpoint unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("token endpoint answered {status}: {body}")]
    Endpoint { status: StatusCode, body: String },
    #[error("token expired and cannot be refreshed")]
    Expired,
    #[error("token endpoint returned no access token")]
    InvalidResponse,
}

/// The OAuth2 capability the authorization stages depend on.
pub trait OAuthClient: Send + Sync {
    /// Exchange an authorization code for a token.
    fn exchange<'a>(&'a self, code: &'a str) -> BoxFuture<'a, Result<Token, OAuthError>>;

    /// Return `token` unchanged while it is valid, otherwise refresh it.
    fn token(&self, token: Token) -> BoxFuture<'_, Result<Token, OAuthError>>;
}

/// [`OAuthClient`] backed by a UAA server.
#[derive(Debug, Clone)]
pub struct UaaClient {
    config: Arc<OAuthConfig>,
    http: reqwest::Client,
}

impl UaaClient {
    pub fn new(config: Arc<OAuthConfig>, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    pub async fn exchange_code(&self, code: &str) -> Result<Token, OAuthError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_url.as_str()),
        ];
        self.request_token(&params).await
    }

    /// Refresh an expired token. A refresh response without a refresh token
    /// keeps the previous one.
    pub async fn refresh(&self, token: &Token) -> Result<Token, OAuthError> {
        let Some(refresh_token) = token.refresh_token.as_deref() else {
            return Err(OAuthError::Expired);
        };
        let params = [("grant_type", "refresh_token"), ("refresh_token", refresh_token)];

        let mut refreshed = self.request_token(&params).await?;
        if refreshed.refresh_token.is_none() {
            refreshed.refresh_token = Some(refresh_token.to_string());
        }
        Ok(refreshed)
    }

    async fn request_token(&self, params: &[(&str, &str)]) -> Result<Token, OAuthError> {
        let started = std::time::Instant::now();
        let response = self
            .http
            .post(self.config.token_url.clone())
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .header(reqwest::header::ACCEPT, "application/json")
            .form(params)
            .send()
            .await?;

        let response = ensure_success(response).await?;
        let body: TokenResponse = response.json().await?;
        crate::observability::metrics::record_token_endpoint(started);
        if body.access_token.is_empty() {
            return Err(OAuthError::InvalidResponse);
        }
        Ok(body.into_token(unix_now()))
    }
}

impl OAuthClient for UaaClient {
    fn exchange<'a>(&'a self, code: &'a str) -> BoxFuture<'a, Result<Token, OAuthError>> {
        Box::pin(self.exchange_code(code))
    }

    fn token(&self, token: Token) -> BoxFuture<'_, Result<Token, OAuthError>> {
        Box::pin(async move {
            if token.is_valid() {
                return Ok(token);
            }
            self.refresh(&token).await
        })
    }
}

/// Pass successful responses through; turn anything else into an error
/// carrying the endpoint's body.
pub(crate) async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, OAuthError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(OAuthError::Endpoint { status, body })
}


#[cfg(test)]
mod tests {
    use super::*;

    fn client(token_url: &str) -> UaaClient {
        let config = OAuthConfig::for_uaa(
            &token_url.parse().unwrap(),
            "id",
            "secret",
            "http://localhost/auth/callback".parse().unwrap(),
        );
        let http = reqwest::Client::builder().no_proxy().build().unwrap();
        UaaClient::new(Arc::new(config), http)
    }

    #[tokio::test]
    async fn valid_token_is_returned_without_calling_endpoint() {
        // Nothing listens on port 9; any HTTP call would fail.
        let uaa = client("http://127.0.0.1:9");
        let token = testing::token("still-good", "openid");
        assert_eq!(uaa.token(token.clone()).await.unwrap(), token);
    }

    #[tokio::test]
    async fn expired_token_without_refresh_token_is_an_error() {
        let uaa = client("http://127.0.0.1:9");
        let mut token = testing::token("old", "openid");
        token.refresh_token = None;
        token.expiry = Some(1);
        assert!(matches!(uaa.token(token).await, Err(OAuthError::Expired)));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        let uaa = client("http://127.0.0.1:9");
        assert!(matches!(uaa.exchange("code").await, Err(OAuthError::Transport(_))));
    }
}
