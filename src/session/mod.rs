//! Server-side sessions addressed by a signed, encrypted cookie.
//!
//! # Data Flow
//! ```text
//! request Cookie header
//!     → store.rs (find cookie by session name)
//!     → codec.rs (verify HMAC, decrypt) → session id
//!     → backend.rs (read record) → codec.rs → Session values
//!
//! Session::set_* then SessionStore::save
//!     → codec.rs (encrypt, sign) → backend.rs (write record)
//!     → Set-Cookie on the response
//! ```
//!
//! Records older than the max age are removed by [`SessionSweeper`].
//!
//! Concurrent requests for one browser session are not coordinated; the last
//! save wins.

pub mod backend;
pub mod cipher;
pub mod codec;
pub mod keys;
pub mod store;
pub mod sweeper;

pub use backend::{FilesystemBackend, MemoryBackend, SessionBackend};
pub use codec::CodecError;
pub use store::{cookie_header_from, Session, SessionKey, SessionOptions, SessionStore, SessionValue};
pub use sweeper::SessionSweeper;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session codec: {0}")]
    Codec(#[from] CodecError),
    #[error("session serialization: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("session storage: {0}")]
    Io(std::io::Error),
    #[error("invalid session id")]
    InvalidId,
    #[error("session cookie is not a valid header value")]
    Header,
}
