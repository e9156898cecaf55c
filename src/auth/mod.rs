//! Authorization-code login around the proxied application.
//!
//! # Flow
//! ```text
//! GET /app (no token)      → Authorize: state S into session, 307 to IdP
//! IdP → GET /callback?code&state=S
//!                          → Callback: check S, exchange code, check scopes,
//!                            token into session, 307 to post-login target
//! GET /app (token)         → Authorize: refresh if expired, re-check scopes
//!                            on a new access token, continue to the proxy
//! ```

pub mod callback;
pub mod error;
pub mod middleware;

pub use callback::{Callback, CallbackParams};
pub use error::AuthError;
pub use middleware::Authorize;

/// Where the browser goes after a successful callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostLogin {
    /// Stash the original path and query at login and return there.
    pub resume_original: bool,
    /// Target when nothing usable was stashed.
    pub default_path: String,
}

impl PostLogin {
    pub fn fixed(path: impl Into<String>) -> Self {
        Self {
            resume_original: false,
            default_path: path.into(),
        }
    }

    pub fn resume_original(fallback: impl Into<String>) -> Self {
        Self {
            resume_original: true,
            default_path: fallback.into(),
        }
    }

    /// Redirect target given the value stashed in the session, if any.
    /// Only local paths are honoured.
    pub fn target<'a>(&'a self, stashed: Option<&'a str>) -> &'a str {
        match stashed {
            Some(path) if self.resume_original && is_local_path(path) => path,
            _ => &self.default_path,
        }
    }
}

impl Default for PostLogin {
    fn default() -> Self {
        Self::fixed("/")
    }
}

fn is_local_path(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//") && !path.starts_with("/\\")
}
