//! UAA authorization-code proxy library.
//!
//! Puts an OAuth2 login in front of a single HTTP backend: browsers without a
//! valid session are sent through UAA's authorization-code flow, and
//! authenticated traffic (websockets included) is forwarded to the backend.

pub mod auth;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod oauth;
pub mod observability;
pub mod random;
pub mod session;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::{Components, Shutdown};
