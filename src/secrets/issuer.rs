use crate::clock::SharedClock;
use crate::crypto::TokenCipher;
use crate::db::{Link, LinkRepo, SecretRepo};
use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::debug;
use uuid::Uuid;

/// Mints the link for a secret and the token that encodes it.
#[derive(Clone)]
pub struct LinkIssuer {
    cipher: TokenCipher,
    clock: SharedClock,
}

impl LinkIssuer {
    pub fn new(cipher: TokenCipher, clock: SharedClock) -> Self {
        Self { cipher, clock }
    }

    /// Create the link for `secret_id` and return it with its shareable token.
    ///
    /// The token is the only value that may leave the process; link and
    /// secret ids stay internal.
    pub async fn issue(
        &self,
        conn: &mut SqliteConnection,
        secret_id: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<(Link, String)> {
        if SecretRepo::get(&mut *conn, secret_id).await?.is_none() {
            return Err(AppError::NotFound);
        }

        let id = Uuid::new_v4();
        let link = Link {
            id: id.to_string(),
            secret_id: secret_id.to_string(),
            expires_at,
            created_at: self.clock.now(),
        };
        LinkRepo::insert(&mut *conn, &link).await?;
        let token = self.cipher.encrypt_identifier(&id)?;

        debug!(secret_id = %secret_id, "Link issued");
        Ok((link, token))
    }

    /// Keep the live link's expiry consistent after the secret was edited.
    pub async fn reissue_expiry(
        &self,
        conn: &mut SqliteConnection,
        secret_id: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<()> {
        if !LinkRepo::update_expiry(&mut *conn, secret_id, expires_at).await? {
            return Err(AppError::NotFound);
        }
        Ok(())
    }
}
