//! Injected randomness.
//!
//! Every component that needs random material (anti-forgery state, session
//! ids, generated keys, AEAD nonces) receives a shared [`RandomSource`]
//! instead of reaching for a process-wide generator. Production code seeds it
//! from the OS; tests seed it deterministically.

use std::sync::{Mutex, PoisonError};

use rand::distributions::{Alphanumeric, Distribution};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

/// A lockable random generator shared between request tasks.
pub struct RandomSource {
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl RandomSource {
    /// Wrap an arbitrary generator.
    pub fn new(rng: impl RngCore + Send + 'static) -> Self {
        Self {
            rng: Mutex::new(Box::new(rng)),
        }
    }

    /// Cryptographically secure generator seeded from the operating system.
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }

    /// Deterministic generator, for tests and reproducible runs.
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    /// Random string of `len` characters drawn from `[A-Za-z0-9]`.
    pub fn alphanumeric(&self, len: usize) -> String {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        (0..len)
            .map(|_| char::from(Alphanumeric.sample(&mut *rng)))
            .collect()
    }

    /// `len` random bytes.
    pub fn bytes(&self, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        self.fill(&mut buf);
        buf
    }

    pub fn fill(&self, buf: &mut [u8]) {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        rng.fill_bytes(buf);
    }
}

impl std::fmt::Debug for RandomSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RandomSource").finish_non_exhaustive()
    }
}
