//! Registration of the proxy's own OAuth client with UAA.
//!
//! Uses an admin client's credentials: fetch a token via the
//! client-credentials grant, then `POST /oauth/clients`.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::oauth::client::{ensure_success, OAuthError};

/// Client description sent to `POST /oauth/clients`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRegistration {
    pub client_id: String,
    pub client_secret: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub authorized_grant_types: Vec<String>,
    pub scope: Vec<String>,
    pub authorities: Vec<String>,
    pub access_token_validity: u64,
    pub redirect_uri: Vec<String>,
}

impl ClientRegistration {
    /// Registration for an authorization-code proxy client.
    pub fn proxy_client(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        scopes: Vec<String>,
        redirect_url: &Url,
        token_ttl_secs: u64,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            name: None,
            authorized_grant_types: vec!["authorization_code".into(), "refresh_token".into()],
            scope: scopes,
            authorities: vec!["uaa.resource".into()],
            access_token_validity: token_ttl_secs,
            redirect_uri: vec![redirect_url.to_string()],
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.name = (!name.is_empty()).then_some(name);
        self
    }
}

#[derive(Debug, Deserialize)]
struct AdminToken {
    access_token: String,
}

/// Registers clients using an admin client's credentials.
#[derive(Debug, Clone)]
pub struct Registrar {
    uaa_url: Url,
    admin_client_id: String,
    admin_client_secret: String,
    http: reqwest::Client,
}

impl Registrar {
    pub fn new(
        uaa_url: Url,
        admin_client_id: impl Into<String>,
        admin_client_secret: impl Into<String>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            uaa_url,
            admin_client_id: admin_client_id.into(),
            admin_client_secret: admin_client_secret.into(),
            http,
        }
    }

    pub async fn register(&self, client: &ClientRegistration) -> Result<(), OAuthError> {
        let token = self.admin_token().await?;
        let response = self
            .http
            .post(self.endpoint("oauth/clients"))
            .bearer_auth(&token)
            .json(client)
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn admin_token(&self) -> Result<String, OAuthError> {
        let response = self
            .http
            .post(self.endpoint("oauth/token"))
            .basic_auth(&self.admin_client_id, Some(&self.admin_client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;
        let token: AdminToken = ensure_success(response).await?.json().await?;
        if token.access_token.is_empty() {
            return Err(OAuthError::InvalidResponse);
        }
        Ok(token.access_token)
    }

    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.uaa_url.clone();
        let joined = format!("{}/{}", self.uaa_url.path().trim_end_matches('/'), path);
        url.set_path(&joined);
        url
    }
}
