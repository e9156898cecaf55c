//! Configuration validation.
//!
//! Semantic checks only; serde handles syntax. Every problem is collected so
//! an operator sees them all at once.

use std::net::SocketAddr;

use url::Url;

use crate::config::schema::{ProxyConfig, SessionConfig};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("listener.bind_address {0:?} is not a socket address")]
    InvalidListenAddress(String),

    #[error("listener.mount_path {0:?} must start with '/'")]
    InvalidMountPath(String),

    #[error("backend.url is required")]
    MissingBackend,

    #[error("{field} {value:?} is not a valid URL: {reason}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("backend.url must use http, got {0:?}")]
    UnsupportedBackendScheme(String),

    #[error("redirect.port {0:?} is not a port number")]
    InvalidRedirectPort(String),

    #[error("redirect.proto must be \"http\" or \"https\", got {0:?}")]
    InvalidRedirectProto(String),

    #[error("uaa.url is required")]
    MissingUaaUrl,

    #[error("uaa.client_id is required")]
    MissingClientId,

    #[error("uaa.post_login_path {0:?} must be a local path")]
    InvalidPostLoginPath(String),

    #[error("uaa.registration needs admin_client_id and admin_client_secret")]
    MissingRegistrationCredentials,

    #[error("session.name {0:?} is not a valid cookie name")]
    InvalidSessionName(String),

    #[error("session.max_age_secs must be greater than zero")]
    ZeroSessionMaxAge,

    #[error("timeouts.request_secs must be greater than zero")]
    ZeroRequestTimeout,

    #[error("observability.metrics_address {0:?} is not a socket address")]
    InvalidMetricsAddress(String),
}

/// Validate a loaded configuration, returning every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidListenAddress(
            config.listener.bind_address.clone(),
        ));
    }
    if !config.listener.mount_path.starts_with('/') {
        errors.push(ValidationError::InvalidMountPath(config.listener.mount_path.clone()));
    }

    if config.backend.url.is_empty() {
        errors.push(ValidationError::MissingBackend);
    } else if let Some(url) = check_url(&mut errors, "backend.url", &config.backend.url) {
        if url.scheme() != "http" {
            errors.push(ValidationError::UnsupportedBackendScheme(url.scheme().to_string()));
        }
    }

    if let Some(port) = &config.redirect.port {
        if port.parse::<u16>().map_or(true, |p| p == 0) {
            errors.push(ValidationError::InvalidRedirectPort(port.clone()));
        }
    }
    if let Some(proto) = &config.redirect.proto {
        if proto != "http" && proto != "https" {
            errors.push(ValidationError::InvalidRedirectProto(proto.clone()));
        }
    }

    let uaa = &config.uaa;
    if uaa.url.is_empty() {
        errors.push(ValidationError::MissingUaaUrl);
    } else {
        check_url(&mut errors, "uaa.url", &uaa.url);
    }
    if let Some(internal) = &uaa.internal_url {
        check_url(&mut errors, "uaa.internal_url", internal);
    }
    check_url(&mut errors, "uaa.redirect_url", &uaa.redirect_url);
    if uaa.client_id.is_empty() {
        errors.push(ValidationError::MissingClientId);
    }
    if !uaa.post_login_path.starts_with('/') || uaa.post_login_path.starts_with("//") {
        errors.push(ValidationError::InvalidPostLoginPath(uaa.post_login_path.clone()));
    }
    if uaa.registration.enabled
        && (uaa.registration.admin_client_id.is_empty()
            || uaa.registration.admin_client_secret.is_empty())
    {
        errors.push(ValidationError::MissingRegistrationCredentials);
    }

    validate_session(&config.session, &mut errors);

    if config.timeouts.request_secs == Some(0) {
        errors.push(ValidationError::ZeroRequestTimeout);
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_session(session: &SessionConfig, errors: &mut Vec<ValidationError>) {
    let valid_name = !session.name.is_empty()
        && session
            .name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b));
    if !valid_name {
        errors.push(ValidationError::InvalidSessionName(session.name.clone()));
    }
    if session.max_age_secs == 0 {
        errors.push(ValidationError::ZeroSessionMaxAge);
    }
}

fn check_url(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) -> Option<Url> {
    match Url::parse(value) {
        Ok(url) => Some(url),
        Err(e) => {
            errors.push(ValidationError::InvalidUrl {
                field,
                value: value.to_string(),
                reason: e.to_string(),
            });
            None
        }
    }
}
