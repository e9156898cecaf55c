//! Configuration loading from disk.
//!
//! Precedence, lowest first: built-in defaults, the TOML file, then
//! command-line/environment overrides. Validation runs on the merged result.

use std::fs;
use std::path::Path;

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Values given on the command line or in the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub listen: Option<String>,
    pub backend: Option<String>,
    pub uaa_url: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub session_auth_key: Option<String>,
    pub session_encrypt_key: Option<String>,
    pub register_client: bool,
}

impl ConfigOverrides {
    fn apply(&self, config: &mut ProxyConfig) {
        if let Some(listen) = &self.listen {
            config.listener.bind_address = listen.clone();
        }
        if let Some(backend) = &self.backend {
            config.backend.url = backend.clone();
        }
        if let Some(url) = &self.uaa_url {
            config.uaa.url = url.clone();
        }
        if let Some(id) = &self.client_id {
            config.uaa.client_id = id.clone();
        }
        if let Some(secret) = &self.client_secret {
            config.uaa.client_secret = secret.clone();
        }
        if let Some(key) = &self.session_auth_key {
            config.session.auth_key = key.clone();
        }
        if let Some(key) = &self.session_encrypt_key {
            config.session.encrypt_key = key.clone();
        }
        if self.register_client {
            config.uaa.registration.enabled = true;
        }
    }
}

/// Parse a TOML document without validating it.
pub fn parse_config(content: &str) -> Result<ProxyConfig, ConfigError> {
    toml::from_str(content).map_err(ConfigError::Parse)
}

/// Load the optional config file, apply overrides, and validate.
pub fn load_config(
    path: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<ProxyConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
            parse_config(&content)?
        }
        None => ProxyConfig::default(),
    };

    overrides.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}
