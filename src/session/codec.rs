//! Signed, optionally encrypted value encoding.
//!
//! Encoded form: `<timestamp>.<payload>.<mac>`, each part URL-safe base64
//! (timestamp is decimal). The MAC is HMAC-SHA256 over
//! `name|timestamp|payload`, so a value encoded for one cookie name never
//! verifies under another. When a cipher is configured the payload is sealed
//! with AES-GCM before signing.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::random::RandomSource;
use crate::session::cipher::BlockCipher;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("invalid AES key length {0}, expected 16, 24 or 32 bytes")]
    KeyLength(usize),
    #[error("invalid signing key")]
    HashKey,
    #[error("encoded value is {len} bytes, limit is {max}")]
    TooLong { len: usize, max: usize },
    #[error("malformed encoded value")]
    Malformed,
    #[error("signature mismatch")]
    InvalidMac,
    #[error("value expired")]
    Expired,
    #[error("encryption failed")]
    Encrypt,
    #[error("decryption failed")]
    Decrypt,
}

#[derive(Debug)]
pub struct SecureCodec {
    hash_key: Vec<u8>,
    cipher: Option<BlockCipher>,
    /// Upper bound on the encoded length; zero disables the check.
    max_length: usize,
    /// Maximum age of an encoded value; zero disables the check.
    max_age: Duration,
}

impl SecureCodec {
    pub fn new(hash_key: Vec<u8>, cipher: Option<BlockCipher>) -> Result<Self, CodecError> {
        if hash_key.is_empty() {
            return Err(CodecError::HashKey);
        }
        Ok(Self {
            hash_key,
            cipher,
            max_length: 4096,
            max_age: Duration::from_secs(86400 * 30),
        })
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn is_encrypting(&self) -> bool {
        self.cipher.is_some()
    }

    pub fn encode(&self, name: &str, value: &[u8], rng: &RandomSource) -> Result<String, CodecError> {
        self.encode_at(name, value, rng, unix_now())
    }

    pub fn decode(&self, name: &str, encoded: &str) -> Result<Vec<u8>, CodecError> {
        self.decode_at(name, encoded, unix_now())
    }

    fn encode_at(
        &self,
        name: &str,
        value: &[u8],
        rng: &RandomSource,
        timestamp: u64,
    ) -> Result<String, CodecError> {
        let sealed = match &self.cipher {
            Some(cipher) => cipher.seal(value, rng)?,
            None => value.to_vec(),
        };
        let payload = URL_SAFE_NO_PAD.encode(sealed);
        let timestamp = timestamp.to_string();
        let mac = self.mac(name, &timestamp, &payload)?.finalize().into_bytes();

        let encoded = format!("{timestamp}.{payload}.{}", URL_SAFE_NO_PAD.encode(mac));
        if self.max_length != 0 && encoded.len() > self.max_length {
            return Err(CodecError::TooLong {
                len: encoded.len(),
                max: self.max_length,
            });
        }
        Ok(encoded)
    }

    fn decode_at(&self, name: &str, encoded: &str, now: u64) -> Result<Vec<u8>, CodecError> {
        if self.max_length != 0 && encoded.len() > self.max_length {
            return Err(CodecError::TooLong {
                len: encoded.len(),
                max: self.max_length,
            });
        }

        let mut parts = encoded.splitn(3, '.');
        let (Some(timestamp), Some(payload), Some(mac)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(CodecError::Malformed);
        };

        let mac = URL_SAFE_NO_PAD.decode(mac).map_err(|_| CodecError::Malformed)?;
        self.mac(name, timestamp, payload)?
            .verify_slice(&mac)
            .map_err(|_| CodecError::InvalidMac)?;

        let issued: u64 = timestamp.parse().map_err(|_| CodecError::Malformed)?;
        let max_age = self.max_age.as_secs();
        if max_age != 0 && issued.saturating_add(max_age) < now {
            return Err(CodecError::Expired);
        }

        let sealed = URL_SAFE_NO_PAD.decode(payload).map_err(|_| CodecError::Malformed)?;
        match &self.cipher {
            Some(cipher) => cipher.open(&sealed),
            None => Ok(sealed),
        }
    }

    fn mac(&self, name: &str, timestamp: &str, payload: &str) -> Result<HmacSha256, CodecError> {
        let mut mac =
            <HmacSha256 as Mac>::new_from_slice(&self.hash_key).map_err(|_| CodecError::HashKey)?;
        mac.update(name.as_bytes());
        mac.update(b"|");
        mac.update(timestamp.as_bytes());
        mac.update(b"|");
        mac.update(payload.as_bytes());
        Ok(mac)
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
