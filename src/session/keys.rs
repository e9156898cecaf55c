//! Session key preparation.
//!
//! Signing and encryption keys are independent. A missing signing key is
//! generated at startup; an encryption key is coerced to a valid AES length
//! or replaced when it is too short to be used at all.

use crate::random::RandomSource;

/// Length of a generated HMAC signing key.
pub const GENERATED_HASH_KEY_LEN: usize = 64;
/// Length of a generated AES key.
pub const GENERATED_BLOCK_KEY_LEN: usize = 32;

/// What happened to a configured key during preparation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOrigin {
    /// Used as supplied.
    Supplied,
    /// Supplied key was cut down to the nearest valid length.
    Truncated { from: usize, to: usize },
    /// Nothing usable was supplied and a random key was generated.
    Generated,
    /// A non-empty key was supplied but was too short and has been discarded.
    Discarded { len: usize },
}

/// Signing key: used as-is unless empty, in which case one is generated.
pub fn prepare_hash_key(key: &[u8], rng: &RandomSource) -> (Vec<u8>, KeyOrigin) {
    if key.is_empty() {
        return (rng.bytes(GENERATED_HASH_KEY_LEN), KeyOrigin::Generated);
    }
    (key.to_vec(), KeyOrigin::Supplied)
}

/// Encryption key: truncated to 32, 24 or 16 bytes, whichever is the largest
/// that fits; keys shorter than 16 bytes are replaced by a random 32-byte key.
pub fn prepare_block_key(key: &[u8], rng: &RandomSource) -> (Vec<u8>, KeyOrigin) {
    let len = key.len();
    let target = match len {
        n if n >= 32 => 32,
        n if n >= 24 => 24,
        n if n >= 16 => 16,
        0 => return (rng.bytes(GENERATED_BLOCK_KEY_LEN), KeyOrigin::Generated),
        n => return (rng.bytes(GENERATED_BLOCK_KEY_LEN), KeyOrigin::Discarded { len: n }),
    };

    let origin = if target == len {
        KeyOrigin::Supplied
    } else {
        KeyOrigin::Truncated { from: len, to: target }
    };
    (key[..target].to_vec(), origin)
}
