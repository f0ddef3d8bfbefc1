//! Cryptographic primitives for link tokens and secret passwords.
//!
//! Uses:
//! - ChaCha20-Poly1305 to turn internal link ids into opaque, tamper-evident
//!   tokens (fresh random nonce per token)
//! - Argon2id for one-way, salted password hashes

pub mod password;
pub mod token;

use thiserror::Error;

pub use password::PasswordHasher;
pub use token::TokenCipher;

/// Cryptographic errors
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid base64 encoding: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Invalid key - expected 32 bytes")]
    InvalidKey,

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed - invalid ciphertext or wrong key")]
    DecryptionFailed,

    #[error("Malformed token")]
    MalformedToken,

    #[error("Password hashing failed: {0}")]
    PasswordHash(String),
}

/// Result type for crypto operations
pub type CryptoResult<T> = Result<T, CryptoError>;
