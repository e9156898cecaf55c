//! OAuth2 authorization-code capability for UAA.

pub mod client;
pub mod config;
pub mod register;
pub mod token;

pub use client::{OAuthClient, OAuthError, UaaClient};
pub use config::OAuthConfig;
pub use register::{ClientRegistration, Registrar};
pub use token::{Token, TokenResponse};
