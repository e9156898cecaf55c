//! Token records and token endpoint responses.

use serde::{Deserialize, Serialize};

use crate::session::codec::unix_now;

/// Tokens are treated as expired this many seconds before their real expiry,
/// so a token is never forwarded moments before the backend would reject it.
pub const EXPIRY_DELTA_SECS: u64 = 10;

/// An OAuth2 token as held in the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,

    #[serde(default)]
    pub token_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Absolute expiry in unix seconds. `None` means the token does not expire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<u64>,

    /// Granted scopes, space separated, as returned by the token endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl Token {
    /// Granted scopes. Empty segments are ignored.
    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.scope
            .as_deref()
            .unwrap_or_default()
            .split(' ')
            .filter(|s| !s.is_empty())
    }

    /// Whether every required scope was granted. Matching is exact and
    /// case-sensitive.
    pub fn has_scopes(&self, required: &[String]) -> bool {
        required
            .iter()
            .all(|wanted| self.scopes().any(|granted| granted == wanted))
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(unix_now())
    }

    pub fn is_valid_at(&self, now: u64) -> bool {
        if self.access_token.is_empty() {
            return false;
        }
        match self.expiry {
            Some(expiry) => expiry >= now.saturating_add(EXPIRY_DELTA_SECS),
            None => true,
        }
    }
}

/// JSON body of a successful token endpoint call.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Convert into a stored token, anchoring `expires_in` at `now`.
    pub fn into_token(self, now: u64) -> Token {
        Token {
            access_token: self.access_token,
            token_type: self.token_type,
            refresh_token: self.refresh_token,
            expiry: self
                .expires_in
                .filter(|secs| *secs > 0)
                .map(|secs| now.saturating_add(secs)),
            scope: self.scope,
        }
    }
}
