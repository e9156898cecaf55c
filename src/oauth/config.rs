//! OAuth2 client configuration for a UAA server.

use url::Url;

/// Immutable per-process OAuth2 configuration.
///
/// ```rust,ignore
/// let config = OAuthConfig::for_uaa(
///     &"https://uaa.example.com".parse()?,
///     "proxy",
///     "secret",
///     "http://localhost:8080/auth/callback".parse()?,
/// )
/// .with_scopes(vec!["openid".into()]);
/// ```
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub(crate) client_id: String,
    pub(crate) client_secret: String,
    pub(crate) auth_url: Url,
    pub(crate) token_url: Url,
    pub(crate) redirect_url: Url,
    pub(crate) scopes: Vec<String>,
}

impl OAuthConfig {
    /// Endpoints derived from a UAA base URL: `/oauth/authorize` and
    /// `/oauth/token` below it.
    pub fn for_uaa(
        uaa_url: &Url,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_url: Url,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            auth_url: endpoint(uaa_url, "oauth/authorize"),
            token_url: endpoint(uaa_url, "oauth/token"),
            redirect_url,
            scopes: Vec::new(),
        }
    }

    /// Send token requests to a different UAA base URL, e.g. one only
    /// reachable from inside the deployment. Browsers are still sent to the
    /// public authorize endpoint.
    #[must_use]
    pub fn with_internal_url(mut self, internal_url: &Url) -> Self {
        self.token_url = endpoint(internal_url, "oauth/token");
        self
    }

    /// Scopes requested at login and required on every token.
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    pub fn auth_url(&self) -> &Url {
        &self.auth_url
    }

    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    pub fn redirect_url(&self) -> &Url {
        &self.redirect_url
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Path the callback handler is mounted on.
    pub fn callback_path(&self) -> &str {
        self.redirect_url.path()
    }

    /// Browser redirect target for starting a login with `state`.
    pub fn auth_code_url(&self, state: &str) -> Url {
        let mut url = self.auth_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("access_type", "online")
                .append_pair("client_id", &self.client_id)
                .append_pair("redirect_uri", self.redirect_url.as_str())
                .append_pair("response_type", "code");
            if !self.scopes.is_empty() {
                query.append_pair("scope", &self.scopes.join(" "));
            }
            query.append_pair("state", state);
        }
        url
    }
}

fn endpoint(base: &Url, path: &str) -> Url {
    let mut url = base.clone();
    let joined = format!("{}/{}", base.path().trim_end_matches('/'), path);
    url.set_path(&joined);
    url.set_query(None);
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> OAuthConfig {
        OAuthConfig::for_uaa(
            &"https://uaa.example.com".parse().unwrap(),
            "proxy-client",
            "s3cret",
            "http://localhost:8080/auth/callback".parse().unwrap(),
        )
    }

    #[test]
    fn endpoints_hang_off_uaa_url() {
        let c = config();
        assert_eq!(c.auth_url().as_str(), "https://uaa.example.com/oauth/authorize");
        assert_eq!(c.token_url().as_str(), "https://uaa.example.com/oauth/token");

        let nested = OAuthConfig::for_uaa(
            &"https://login.example.com/uaa/".parse().unwrap(),
            "id",
            "secret",
            "http://localhost/cb".parse().unwrap(),
        );
        assert_eq!(nested.token_url().as_str(), "https://login.example.com/uaa/oauth/token");
    }

    #[test]
    fn internal_url_only_moves_token_endpoint() {
        let c = config().with_internal_url(&"http://uaa.internal:8080".parse().unwrap());
        assert_eq!(c.auth_url().as_str(), "https://uaa.example.com/oauth/authorize");
        assert_eq!(c.token_url().as_str(), "http://uaa.internal:8080/oauth/token");
    }

    #[test]
    fn auth_code_url_carries_client_and_state() {
        let c = config().with_scopes(vec!["openid".into(), "cloud_controller.read".into()]);
        let url = c.auth_code_url("abc123");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let keys: Vec<&str> = pairs.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            keys,
            ["access_type", "client_id", "redirect_uri", "response_type", "scope", "state"]
        );
        assert!(pairs.contains(&("client_id".into(), "proxy-client".into())));
        assert!(pairs.contains(&("redirect_uri".into(), "http://localhost:8080/auth/callback".into())));
        assert!(pairs.contains(&("scope".into(), "openid cloud_controller.read".into())));
        assert!(pairs.contains(&("state".into(), "abc123".into())));
    }

    #[test]
    fn callback_path_comes_from_redirect_url() {
        assert_eq!(config().callback_path(), "/auth/callback");
    }
}
