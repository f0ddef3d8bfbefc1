//! Link token encryption.
//!
//! Token layout before encoding: `nonce (12) || ciphertext (16) || tag (16)`,
//! encoded as URL-safe base64 without padding so it fits in a path segment.

use super::{CryptoError, CryptoResult};
use base64::{
    engine::general_purpose::{STANDARD as BASE64, URL_SAFE_NO_PAD},
    Engine,
};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use uuid::Uuid;
use zeroize::Zeroizing;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const TOKEN_LEN: usize = NONCE_LEN + 16 + TAG_LEN;

/// Encrypts link ids into shareable tokens and back.
///
/// The key is fixed at construction; there is no way to swap it afterwards.
#[derive(Clone)]
pub struct TokenCipher {
    cipher: ChaCha20Poly1305,
}

impl TokenCipher {
    pub fn new(key: &[u8; KEY_LEN]) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(key.into()),
        }
    }

    /// Build from a base64 encoded 32-byte key as found in configuration.
    pub fn from_base64_key(encoded: &str) -> CryptoResult<Self> {
        let encoded = encoded.trim();
        if encoded.is_empty() {
            return Err(CryptoError::InvalidKey);
        }
        let bytes = Zeroizing::new(BASE64.decode(encoded)?);
        let cipher =
            ChaCha20Poly1305::new_from_slice(&bytes).map_err(|_| CryptoError::InvalidKey)?;
        Ok(Self { cipher })
    }

    /// Generate a fresh random key, base64 encoded.
    pub fn generate_key() -> String {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        OsRng.fill_bytes(&mut key[..]);
        BASE64.encode(&key[..])
    }

    /// Encrypt a link id. Every call draws a new nonce, so the same id never
    /// yields the same token twice.
    pub fn encrypt_identifier(&self, id: &Uuid) -> CryptoResult<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, id.as_bytes().as_ref())
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut token = Vec::with_capacity(TOKEN_LEN);
        token.extend_from_slice(&nonce_bytes);
        token.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(token))
    }

    /// Decrypt a token back into the link id it was minted for.
    pub fn decrypt_identifier(&self, token: &str) -> CryptoResult<Uuid> {
        let raw = URL_SAFE_NO_PAD.decode(token)?;
        if raw.len() != TOKEN_LEN {
            return Err(CryptoError::MalformedToken);
        }

        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)?;

        Uuid::from_slice(&plaintext).map_err(|_| CryptoError::MalformedToken)
    }
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCipher").finish_non_exhaustive()
    }
}
