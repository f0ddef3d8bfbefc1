use crate::clock::SharedClock;
use crate::crypto::TokenCipher;
use crate::db::{LinkRepo, LinkedSecret};
use crate::error::{AppError, AppResult};
use secretlink_types::LinkMetadata;
use sqlx::SqliteConnection;
use tracing::debug;

/// Turns a token into link metadata without ever touching content.
#[derive(Clone)]
pub struct LinkResolver {
    cipher: TokenCipher,
    clock: SharedClock,
}

impl LinkResolver {
    pub fn new(cipher: TokenCipher, clock: SharedClock) -> Self {
        Self { cipher, clock }
    }

    /// Decrypt, load and check a token against the current time.
    ///
    /// Errors, in order of evaluation: `InvalidToken`, `NotFound`, `Expired`,
    /// `AlreadyConsumed`. Expiry is evaluated on every call.
    pub async fn resolve(
        &self,
        conn: &mut SqliteConnection,
        token: &str,
    ) -> AppResult<LinkedSecret> {
        let link_id = self
            .cipher
            .decrypt_identifier(token)
            .map_err(|e| {
                debug!(error = %e, "Rejected link token");
                AppError::InvalidToken
            })?
            .to_string();

        let linked = match LinkRepo::get_with_secret(&mut *conn, &link_id).await? {
            Some(linked) => linked,
            // A consumed link is gone from the live table; its tombstone only
            // ever resolves to Expired or AlreadyConsumed below.
            None => LinkRepo::get_consumed_with_secret(&mut *conn, &link_id)
                .await?
                .ok_or(AppError::NotFound)?,
        };

        if linked.link_expires_at < self.clock.now() {
            return Err(AppError::Expired);
        }
        if linked.secret.is_consumed() {
            return Err(AppError::AlreadyConsumed);
        }

        Ok(linked)
    }

    /// Metadata for a token; content is withheld.
    pub async fn resolve_metadata(
        &self,
        conn: &mut SqliteConnection,
        token: &str,
    ) -> AppResult<LinkMetadata> {
        Ok(self.resolve(conn, token).await?.metadata())
    }
}
