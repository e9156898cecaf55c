//! Cookie-addressed session records.
//!
//! The cookie named after the session carries the session id, signed and
//! encrypted by the codec. The record itself is a JSON map of well-known keys,
//! encoded the same way and kept in a [`SessionBackend`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use cookie::{Cookie, SameSite};
use serde::{Deserialize, Serialize};

use crate::oauth::Token;
use crate::random::RandomSource;
use crate::session::backend::SessionBackend;
use crate::session::cipher::BlockCipher;
use crate::session::codec::SecureCodec;
use crate::session::keys::{prepare_block_key, prepare_hash_key, KeyOrigin};
use crate::session::SessionError;

/// Length of a generated session id.
const SESSION_ID_LEN: usize = 52;

/// Keys a session may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKey {
    Token,
    State,
    Redirect,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum SessionValue {
    Token(Token),
    Text(String),
}

/// A loaded session. Changes are only persisted by [`SessionStore::save`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    id: Option<String>,
    values: BTreeMap<SessionKey, SessionValue>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_id(id: String) -> Self {
        Self {
            id: Some(id),
            values: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// True until the session has been saved once.
    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }

    pub fn get(&self, key: SessionKey) -> Option<&SessionValue> {
        self.values.get(&key)
    }

    pub fn insert(&mut self, key: SessionKey, value: SessionValue) {
        self.values.insert(key, value);
    }

    pub fn remove(&mut self, key: SessionKey) -> Option<SessionValue> {
        self.values.remove(&key)
    }

    pub fn token(&self) -> Option<&Token> {
        match self.get(SessionKey::Token)? {
            SessionValue::Token(token) => Some(token),
            SessionValue::Text(_) => None,
        }
    }

    pub fn set_token(&mut self, token: Token) {
        self.insert(SessionKey::Token, SessionValue::Token(token));
    }

    pub fn state(&self) -> Option<&str> {
        self.text(SessionKey::State)
    }

    pub fn set_state(&mut self, state: impl Into<String>) {
        self.insert(SessionKey::State, SessionValue::Text(state.into()));
    }

    pub fn redirect(&self) -> Option<&str> {
        self.text(SessionKey::Redirect)
    }

    pub fn set_redirect(&mut self, target: impl Into<String>) {
        self.insert(SessionKey::Redirect, SessionValue::Text(target.into()));
    }

    fn text(&self, key: SessionKey) -> Option<&str> {
        match self.get(key)? {
            SessionValue::Text(text) => Some(text),
            SessionValue::Token(_) => None,
        }
    }
}

/// Settings for building a [`SessionStore`].
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub name: String,
    /// HMAC key. Empty means generate one at startup.
    pub auth_key: Vec<u8>,
    /// AES key, coerced to 16/24/32 bytes. Empty means generate one.
    pub encrypt_key: Vec<u8>,
    /// Cap on each encoded value; zero disables it.
    pub max_length: usize,
    pub max_age: Duration,
    pub secure_cookies: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            name: "uaa_proxy_new".to_string(),
            auth_key: Vec::new(),
            encrypt_key: Vec::new(),
            max_length: 8096,
            max_age: Duration::from_secs(86400 * 30),
            secure_cookies: false,
        }
    }
}

pub struct SessionStore {
    name: String,
    codec: SecureCodec,
    backend: Arc<dyn SessionBackend>,
    rng: Arc<RandomSource>,
    secure_cookies: bool,
    max_age: Duration,
}

impl SessionStore {
    pub fn new(
        options: SessionOptions,
        backend: Arc<dyn SessionBackend>,
        rng: Arc<RandomSource>,
    ) -> Result<Self, SessionError> {
        let (hash_key, hash_origin) = prepare_hash_key(&options.auth_key, &rng);
        if hash_origin == KeyOrigin::Generated {
            tracing::warn!(
                session = %options.name,
                "No session signing key configured, generated one; sessions will not survive a restart"
            );
        }

        let (block_key, block_origin) = prepare_block_key(&options.encrypt_key, &rng);
        match block_origin {
            KeyOrigin::Generated => tracing::warn!(
                session = %options.name,
                "No session encryption key configured, generated one"
            ),
            KeyOrigin::Discarded { len } => tracing::warn!(
                session = %options.name,
                supplied_len = len,
                "Session encryption key shorter than 16 bytes was discarded and replaced by a generated key"
            ),
            KeyOrigin::Truncated { from, to } => tracing::warn!(
                session = %options.name,
                supplied_len = from,
                used_len = to,
                "Session encryption key truncated to a valid AES key length"
            ),
            KeyOrigin::Supplied => {}
        }

        let cipher = BlockCipher::new(&block_key)?;
        let codec = SecureCodec::new(hash_key, Some(cipher))?
            .with_max_length(options.max_length)
            .with_max_age(options.max_age);

        Ok(Self {
            name: options.name,
            codec,
            backend,
            rng,
            secure_cookies: options.secure_cookies,
            max_age: options.max_age,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Drop backend records older than the session max age. Their cookies
    /// would fail the codec's age check anyway.
    pub async fn purge_expired(&self) -> Result<usize, SessionError> {
        let cutoff = SystemTime::now()
            .checked_sub(self.max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        self.backend.purge_older_than(cutoff).await
    }

    /// Load the session addressed by the request cookies.
    ///
    /// Never fails: a missing, forged or expired cookie yields a fresh
    /// session, and a record that cannot be read yields an empty session
    /// that keeps its verified id.
    pub async fn load(&self, headers: &HeaderMap) -> Session {
        let Some(raw) = cookie_value(headers, &self.name) else {
            return Session::new();
        };

        let id = match self
            .codec
            .decode(&self.name, &raw)
            .map_err(SessionError::from)
            .and_then(|bytes| String::from_utf8(bytes).map_err(|_| SessionError::InvalidId))
        {
            Ok(id) => id,
            Err(e) => {
                tracing::debug!(session = %self.name, error = %e, "Ignoring invalid session cookie");
                return Session::new();
            }
        };

        let record = match self.backend.load(&id).await {
            Ok(Some(record)) => record,
            Ok(None) => return Session::with_id(id),
            Err(e) => {
                tracing::warn!(session = %self.name, error = %e, "Failed to read session record");
                return Session::with_id(id);
            }
        };

        match self.decode_values(&record) {
            Ok(values) => Session { id: Some(id), values },
            Err(e) => {
                tracing::warn!(session = %self.name, error = %e, "Discarding unreadable session record");
                Session::with_id(id)
            }
        }
    }

    /// Persist the session and append its cookie to `response_headers`.
    pub async fn save(
        &self,
        session: &mut Session,
        response_headers: &mut HeaderMap,
    ) -> Result<(), SessionError> {
        let id = session
            .id
            .get_or_insert_with(|| self.rng.alphanumeric(SESSION_ID_LEN))
            .clone();

        let values = serde_json::to_vec(&session.values)?;
        let record = self.codec.encode(&self.name, &values, &self.rng)?;
        self.backend.save(&id, record).await?;

        let value = self.codec.encode(&self.name, id.as_bytes(), &self.rng)?;
        let max_age = i64::try_from(self.max_age.as_secs()).unwrap_or(i64::MAX);
        let cookie = Cookie::build((self.name.clone(), value))
            .path("/")
            .http_only(true)
            .secure(self.secure_cookies)
            .same_site(SameSite::Lax)
            .max_age(cookie::time::Duration::seconds(max_age))
            .build();
        let header = HeaderValue::from_str(&cookie.to_string()).map_err(|_| SessionError::Header)?;
        response_headers.append(SET_COOKIE, header);
        Ok(())
    }

    /// Read a single value from the request's session.
    pub async fn get(&self, request_headers: &HeaderMap, key: SessionKey) -> Option<SessionValue> {
        self.load(request_headers).await.get(key).cloned()
    }

    /// Write a single value into the request's session and persist it.
    pub async fn set(
        &self,
        response_headers: &mut HeaderMap,
        request_headers: &HeaderMap,
        key: SessionKey,
        value: SessionValue,
    ) -> Result<(), SessionError> {
        let mut session = self.load(request_headers).await;
        session.insert(key, value);
        self.save(&mut session, response_headers).await
    }

    fn decode_values(&self, record: &str) -> Result<BTreeMap<SessionKey, SessionValue>, SessionError> {
        let bytes = self.codec.decode(&self.name, record)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("name", &self.name)
            .field("secure_cookies", &self.secure_cookies)
            .field("max_age", &self.max_age)
            .finish_non_exhaustive()
    }
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value().to_string())
}

/// Turn the `Set-Cookie` headers of a response into a `Cookie` request header.
pub fn cookie_header_from(response_headers: &HeaderMap) -> Option<HeaderValue> {
    let pairs: Vec<String> = response_headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| Cookie::parse(value).ok())
        .map(|cookie| format!("{}={}", cookie.name(), cookie.value()))
        .collect();
    if pairs.is_empty() {
        return None;
    }
    HeaderValue::from_str(&pairs.join("; ")).ok()
}
