//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files, and
//! every field has a default so a minimal file only names the backend and UAA.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, mount path).
    pub listener: ListenerConfig,

    /// The protected backend.
    pub backend: BackendConfig,

    /// Forwarded-header redirect normalization.
    pub redirect: RedirectConfig,

    /// UAA / OAuth2 client settings.
    pub uaa: UaaConfig,

    /// Session cookie and storage settings.
    pub session: SessionConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// URL prefix application traffic is served under. Requests outside it get 404.
    pub mount_path: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            mount_path: "/".to_string(),
        }
    }
}

/// Backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Backend base URL (e.g., "http://127.0.0.1:3000/app"). Required.
    pub url: String,

    /// Tunnel websocket upgrades to the backend.
    pub proxy_websockets: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            proxy_websockets: true,
        }
    }
}

/// Redirect clients whose forwarded port or scheme differs from these.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RedirectConfig {
    /// Required `X-Forwarded-Port`.
    pub port: Option<String>,

    /// Required `X-Forwarded-Proto` ("http" or "https").
    pub proto: Option<String>,
}

/// Where to send the browser after login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PostLoginMode {
    /// Always `post_login_path`.
    #[default]
    Fixed,
    /// The URL that triggered the login, falling back to `post_login_path`.
    Original,
}

/// UAA settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UaaConfig {
    /// Public UAA base URL; browsers are redirected to `<url>/oauth/authorize`.
    pub url: String,

    /// UAA base URL used for token calls, when different from `url`.
    pub internal_url: Option<String>,

    /// OAuth client id of the proxy.
    pub client_id: String,

    /// OAuth client secret of the proxy.
    pub client_secret: String,

    /// Redirect URL registered with UAA. Its path is the callback route.
    pub redirect_url: String,

    /// Scopes every token must carry.
    pub required_scopes: Vec<String>,

    /// PEM file with additional CA certificates for UAA.
    pub ca_cert: Option<PathBuf>,

    /// Accept any TLS certificate from UAA.
    pub skip_tls_validation: bool,

    pub post_login: PostLoginMode,

    pub post_login_path: String,

    /// Register the proxy's client with UAA at startup.
    pub registration: RegistrationConfig,
}

impl Default for UaaConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            internal_url: None,
            client_id: String::new(),
            client_secret: String::new(),
            redirect_url: "http://localhost:8080/auth/callback".to_string(),
            required_scopes: Vec::new(),
            ca_cert: None,
            skip_tls_validation: false,
            post_login: PostLoginMode::Fixed,
            post_login_path: "/".to_string(),
            registration: RegistrationConfig::default(),
        }
    }
}

/// Client registration using an admin client.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistrationConfig {
    pub enabled: bool,

    pub admin_client_id: String,

    pub admin_client_secret: String,

    /// Display name of the registered client.
    pub client_name: String,

    /// Access token validity of the registered client.
    pub token_ttl_secs: u64,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            admin_client_id: String::new(),
            admin_client_secret: String::new(),
            client_name: String::new(),
            token_ttl_secs: 120,
        }
    }
}

/// Session persistence backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStoreKind {
    #[default]
    Filesystem,
    Memory,
}

/// Session configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Cookie name.
    pub name: String,

    /// HMAC key for session values. Generated at startup if empty.
    pub auth_key: String,

    /// AES key for session values. Coerced to 16/24/32 bytes; generated if
    /// shorter than 16.
    pub encrypt_key: String,

    pub store: SessionStoreKind,

    /// Directory for the filesystem store (default: OS temp dir).
    pub directory: Option<PathBuf>,

    /// Maximum encoded session size in bytes.
    pub max_length: usize,

    /// Cookie and record lifetime in seconds.
    pub max_age_secs: u64,

    /// Mark the cookie `Secure`.
    pub secure_cookies: bool,

    /// Seconds between sweeps of expired records; zero disables sweeping.
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: "uaa_proxy_new".to_string(),
            auth_key: String::new(),
            encrypt_key: String::new(),
            store: SessionStoreKind::Filesystem,
            directory: None,
            max_length: 8096,
            max_age_secs: 86400 * 30,
            secure_cookies: false,
            sweep_interval_secs: 600,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Whole-request timeout in seconds. Unset means no timeout, which
    /// long-lived websocket tunnels need.
    pub request_secs: Option<u64>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
