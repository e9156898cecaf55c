//! Startup orchestration.
//!
//! Turns a validated [`ProxyConfig`] into the shared components the server
//! runs on. Any error here is fatal; nothing is listening yet.

use std::path::PathBuf;
use std::sync::Arc;

use url::Url;

use crate::auth::{Authorize, PostLogin};
use crate::config::schema::{PostLoginMode, ProxyConfig, SessionStoreKind, UaaConfig};
use crate::http::pipeline::Pipeline;
use crate::http::proxy::{MountPath, ProxyTarget, ProxyTargetError, ReverseProxy};
use crate::http::redirect::{ForwardedPortRedirect, ForwardedProtoRedirect};
use crate::oauth::{ClientRegistration, OAuthClient, OAuthConfig, Registrar, UaaClient};
use crate::random::RandomSource;
use crate::session::{
    FilesystemBackend, MemoryBackend, SessionBackend, SessionError, SessionOptions, SessionStore,
};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("error reading UAA CA cert {path}: {source}")]
    CaCert {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("error building UAA HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("invalid {field}: {source}")]
    Url {
        field: &'static str,
        source: url::ParseError,
    },

    #[error("session store: {0}")]
    Session(#[from] SessionError),

    #[error("backend: {0}")]
    Backend(#[from] ProxyTargetError),
}

fn parse_url(field: &'static str, value: &str) -> Result<Url, StartupError> {
    Url::parse(value).map_err(|source| StartupError::Url { field, source })
}

/// HTTP client for token and registration calls, honouring the configured
/// CA certificate and TLS verification setting.
pub fn build_http_client(uaa: &UaaConfig) -> Result<reqwest::Client, StartupError> {
    let mut builder = reqwest::Client::builder();

    if let Some(path) = &uaa.ca_cert {
        let pem = std::fs::read(path).map_err(|source| StartupError::CaCert {
            path: path.clone(),
            source,
        })?;
        builder = builder.add_root_certificate(reqwest::Certificate::from_pem(&pem)?);
        tracing::info!(path = %path.display(), "Loaded UAA CA certificate");
    }

    if uaa.skip_tls_validation {
        tracing::warn!("TLS certificate validation for UAA is disabled");
        builder = builder.danger_accept_invalid_certs(true);
    }

    Ok(builder.build()?)
}

pub fn post_login(uaa: &UaaConfig) -> PostLogin {
    match uaa.post_login {
        PostLoginMode::Fixed => PostLogin::fixed(uaa.post_login_path.clone()),
        PostLoginMode::Original => PostLogin::resume_original(uaa.post_login_path.clone()),
    }
}

/// Shared state built once at startup.
#[derive(Clone)]
pub struct Components {
    pub oauth_config: Arc<OAuthConfig>,
    pub oauth: Arc<dyn OAuthClient>,
    pub sessions: Arc<SessionStore>,
    pub rng: Arc<RandomSource>,
    pub http: reqwest::Client,
}

impl Components {
    pub fn from_config(config: &ProxyConfig) -> Result<Self, StartupError> {
        Self::with_rng(config, Arc::new(RandomSource::from_entropy()))
    }

    /// Build with a caller-supplied random source (seeded in tests).
    pub fn with_rng(config: &ProxyConfig, rng: Arc<RandomSource>) -> Result<Self, StartupError> {
        let uaa = &config.uaa;
        let uaa_url = parse_url("uaa.url", &uaa.url)?;
        let redirect_url = parse_url("uaa.redirect_url", &uaa.redirect_url)?;

        let mut oauth_config =
            OAuthConfig::for_uaa(&uaa_url, &uaa.client_id, &uaa.client_secret, redirect_url)
                .with_scopes(uaa.required_scopes.clone());
        if let Some(internal) = &uaa.internal_url {
            oauth_config = oauth_config.with_internal_url(&parse_url("uaa.internal_url", internal)?);
        }
        let oauth_config = Arc::new(oauth_config);

        let http = build_http_client(uaa)?;
        let oauth: Arc<dyn OAuthClient> = Arc::new(UaaClient::new(oauth_config.clone(), http.clone()));

        let backend: Arc<dyn SessionBackend> = match config.session.store {
            SessionStoreKind::Memory => Arc::new(MemoryBackend::new()),
            SessionStoreKind::Filesystem => {
                let directory = config
                    .session
                    .directory
                    .clone()
                    .unwrap_or_else(std::env::temp_dir);
                tracing::info!(directory = %directory.display(), "Using filesystem session store");
                Arc::new(FilesystemBackend::new(directory))
            }
        };

        let options = SessionOptions {
            name: config.session.name.clone(),
            auth_key: config.session.auth_key.as_bytes().to_vec(),
            encrypt_key: config.session.encrypt_key.as_bytes().to_vec(),
            max_length: config.session.max_length,
            max_age: std::time::Duration::from_secs(config.session.max_age_secs),
            secure_cookies: config.session.secure_cookies,
        };
        let sessions = Arc::new(SessionStore::new(options, backend, rng.clone())?);

        Ok(Self {
            oauth_config,
            oauth,
            sessions,
            rng,
            http,
        })
    }
}

/// Stages in order: scheme redirect, port redirect, authorization, proxy.
pub fn build_pipeline(config: &ProxyConfig, components: &Components) -> Result<Pipeline, StartupError> {
    let backend_url = parse_url("backend.url", &config.backend.url)?;
    let target = Arc::new(ProxyTarget::new(&backend_url)?);
    let mut pipeline = Pipeline::new();

    if let Some(proto) = &config.redirect.proto {
        pipeline = pipeline.stage(Arc::new(ForwardedProtoRedirect::new(proto.clone())));
    }
    if let Some(port) = &config.redirect.port {
        pipeline = pipeline.stage(Arc::new(ForwardedPortRedirect::new(port.clone())));
    }

    let pipeline = pipeline
        .stage(Arc::new(Authorize::new(
            components.oauth.clone(),
            components.oauth_config.clone(),
            components.sessions.clone(),
            components.rng.clone(),
            post_login(&config.uaa),
        )))
        .stage(Arc::new(ReverseProxy::new(
            target,
            MountPath::new(&config.listener.mount_path),
            config.backend.proxy_websockets,
        )));

    tracing::debug!(stages = ?pipeline.stage_names(), "Request pipeline assembled");
    Ok(pipeline)
}

/// Register the proxy's OAuth client with UAA. Failure is logged only; the
/// client may already exist.
pub async fn register_proxy_client(config: &ProxyConfig, http: &reqwest::Client) {
    let uaa = &config.uaa;
    if !uaa.registration.enabled {
        return;
    }

    let base = uaa.internal_url.as_deref().unwrap_or(&uaa.url);
    let (base, redirect_url) = match (Url::parse(base), Url::parse(&uaa.redirect_url)) {
        (Ok(base), Ok(redirect)) => (base, redirect),
        _ => {
            tracing::error!("Cannot register UAA client: invalid UAA or redirect URL");
            return;
        }
    };

    tracing::info!(client_id = %uaa.client_id, "Registering UAA client for proxy");
    let registrar = Registrar::new(
        base,
        &uaa.registration.admin_client_id,
        &uaa.registration.admin_client_secret,
        http.clone(),
    );
    let client = ClientRegistration::proxy_client(
        &uaa.client_id,
        &uaa.client_secret,
        uaa.required_scopes.clone(),
        &redirect_url,
        uaa.registration.token_ttl_secs,
    )
    .with_name(&uaa.registration.client_name);

    match registrar.register(&client).await {
        Ok(()) => tracing::info!(client_id = %uaa.client_id, "UAA client registered"),
        Err(e) => tracing::error!(client_id = %uaa.client_id, error = %e, "Error registering UAA client for proxy"),
    }
}
