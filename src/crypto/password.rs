use super::{CryptoError, CryptoResult};
use crate::config::CryptoConfig;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;

/// Argon2id password hashing with a configurable cost.
///
/// Hashes are PHC strings carrying their own salt and parameters, so raising
/// the cost later does not invalidate existing hashes.
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    params: Params,
}

impl PasswordHasher {
    pub fn new(memory_kib: u32, iterations: u32, parallelism: u32) -> CryptoResult<Self> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|e| CryptoError::PasswordHash(e.to_string()))?;
        Ok(Self { params })
    }

    pub fn from_config(config: &CryptoConfig) -> CryptoResult<Self> {
        Self::new(
            config.password_memory_kib,
            config.password_iterations,
            config.password_parallelism,
        )
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a plaintext password with a fresh random salt.
    pub fn hash_password(&self, plaintext: &str) -> CryptoResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2()
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| CryptoError::PasswordHash(e.to_string()))
    }

    /// Check a plaintext password against a stored hash.
    ///
    /// An unparseable stored hash never verifies.
    pub fn verify_password(&self, plaintext: &str, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return false;
        };
        self.argon2()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok()
    }
}
