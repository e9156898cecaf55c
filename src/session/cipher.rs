//! AES-GCM sealing for session payloads.
//!
//! The key length selects the variant: 16, 24 or 32 bytes give AES-128,
//! AES-192 or AES-256. Sealed output is `nonce || ciphertext || tag`.

use aes_gcm::aead::consts::U12;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes192;
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm, Nonce};

use crate::random::RandomSource;
use crate::session::codec::CodecError;

type Aes192Gcm = AesGcm<Aes192, U12>;

const NONCE_LEN: usize = 12;

pub enum BlockCipher {
    Aes128(Aes128Gcm),
    Aes192(Aes192Gcm),
    Aes256(Aes256Gcm),
}

impl BlockCipher {
    /// Build a cipher from a key that is exactly 16, 24 or 32 bytes long.
    pub fn new(key: &[u8]) -> Result<Self, CodecError> {
        let invalid = |_| CodecError::KeyLength(key.len());
        match key.len() {
            16 => Aes128Gcm::new_from_slice(key).map(Self::Aes128).map_err(invalid),
            24 => Aes192Gcm::new_from_slice(key).map(Self::Aes192).map_err(invalid),
            32 => Aes256Gcm::new_from_slice(key).map(Self::Aes256).map_err(invalid),
            n => Err(CodecError::KeyLength(n)),
        }
    }

    /// Key size in bytes.
    pub fn key_len(&self) -> usize {
        match self {
            Self::Aes128(_) => 16,
            Self::Aes192(_) => 24,
            Self::Aes256(_) => 32,
        }
    }

    pub fn seal(&self, plaintext: &[u8], rng: &RandomSource) -> Result<Vec<u8>, CodecError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rng.fill(&mut nonce_bytes);
        let nonce = Nonce::<U12>::from_slice(&nonce_bytes);

        let ciphertext = match self {
            Self::Aes128(c) => c.encrypt(nonce, plaintext),
            Self::Aes192(c) => c.encrypt(nonce, plaintext),
            Self::Aes256(c) => c.encrypt(nonce, plaintext),
        }
        .map_err(|_| CodecError::Encrypt)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, CodecError> {
        if sealed.len() < NONCE_LEN {
            return Err(CodecError::Decrypt);
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let nonce = Nonce::<U12>::from_slice(nonce_bytes);

        match self {
            Self::Aes128(c) => c.decrypt(nonce, ciphertext),
            Self::Aes192(c) => c.decrypt(nonce, ciphertext),
            Self::Aes256(c) => c.decrypt(nonce, ciphertext),
        }
        .map_err(|_| CodecError::Decrypt)
    }
}

impl std::fmt::Debug for BlockCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BlockCipher(AES-{})", self.key_len() * 8)
    }
}
