//! Durable secret records.
//!
//! Owns input validation and password hashing; plaintext passwords never
//! reach the database. Hashing happens in [`SecretStore::prepare`], before
//! any connection is checked out.

use crate::clock::SharedClock;
use crate::crypto::PasswordHasher;
use crate::db::{LinkRepo, NewSecret, PreparedSecret, Secret, SecretRepo};
use crate::error::{AppError, AppResult};
use chrono::{DateTime, Duration, Utc};
use sqlx::SqliteConnection;
use tracing::debug;

#[derive(Clone)]
pub struct SecretStore {
    hasher: PasswordHasher,
    clock: SharedClock,
    default_ttl: Duration,
    max_content_length: usize,
}

impl SecretStore {
    pub fn new(
        hasher: PasswordHasher,
        clock: SharedClock,
        default_ttl: Duration,
        max_content_length: usize,
    ) -> Self {
        Self {
            hasher,
            clock,
            default_ttl,
            max_content_length,
        }
    }

    /// Expiry given to secrets created without one
    pub fn default_expiry(&self) -> AppResult<DateTime<Utc>> {
        self.clock
            .now()
            .checked_add_signed(self.default_ttl)
            .ok_or_else(|| AppError::internal("default expiry out of range"))
    }

    /// Validate input and hash its password.
    pub async fn prepare(&self, new: NewSecret) -> AppResult<PreparedSecret> {
        new.validate(self.max_content_length)?;
        let password_hash = self.hash_optional(new.password.as_deref()).await?;
        Ok(PreparedSecret {
            content: new.content,
            one_time: new.one_time,
            password_hash,
            expires_at: new.expires_at,
        })
    }

    pub async fn create(
        &self,
        conn: &mut SqliteConnection,
        prepared: PreparedSecret,
    ) -> AppResult<Secret> {
        let expires_at = match prepared.expires_at {
            Some(expires_at) => expires_at,
            None => self.default_expiry()?,
        };

        let now = self.clock.now();
        let secret = Secret {
            id: Secret::generate_id(),
            content: prepared.content,
            one_time: prepared.one_time,
            password_hash: prepared.password_hash,
            expires_at,
            viewed: false,
            created_at: now,
            updated_at: now,
        };
        SecretRepo::insert(&mut *conn, &secret).await?;

        debug!(secret_id = %secret.id, one_time = secret.one_time, "Secret stored");
        Ok(secret)
    }

    /// Fully replace a secret's content and settings. A missing expiry keeps
    /// the stored one.
    ///
    /// A consumed one-time secret cannot be edited back into an active one
    /// and fails with [`AppError::AlreadyConsumed`].
    pub async fn update(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
        prepared: &PreparedSecret,
    ) -> AppResult<Secret> {
        let updated = SecretRepo::replace(&mut *conn, id, prepared, self.clock.now()).await?;
        let secret = SecretRepo::get(&mut *conn, id).await?.ok_or(AppError::NotFound)?;
        if !updated {
            // The row exists, so the conditional update refused a consumed secret.
            return Err(AppError::AlreadyConsumed);
        }

        debug!(secret_id = %id, "Secret replaced");
        Ok(secret)
    }

    /// Delete a secret together with its link and any consumed-link records.
    pub async fn delete(&self, conn: &mut SqliteConnection, id: &str) -> AppResult<()> {
        LinkRepo::delete_for_secret(&mut *conn, id).await?;
        LinkRepo::delete_consumed_for_secret(&mut *conn, id).await?;
        if !SecretRepo::delete(&mut *conn, id).await? {
            return Err(AppError::NotFound);
        }

        debug!(secret_id = %id, "Secret deleted");
        Ok(())
    }

    /// All secrets, newest first
    pub async fn list(&self, conn: &mut SqliteConnection) -> AppResult<Vec<Secret>> {
        SecretRepo::list(&mut *conn).await
    }

    pub async fn get(&self, conn: &mut SqliteConnection, id: &str) -> AppResult<Secret> {
        SecretRepo::get(&mut *conn, id)
            .await?
            .ok_or(AppError::NotFound)
    }

    async fn hash_optional(&self, password: Option<&str>) -> AppResult<Option<String>> {
        let Some(password) = password else {
            return Ok(None);
        };
        let hasher = self.hasher.clone();
        let password = zeroize::Zeroizing::new(password.to_string());
        let hash = tokio::task::spawn_blocking(move || hasher.hash_password(&password))
            .await
            .map_err(|e| AppError::internal(format!("password hashing task failed: {}", e)))??;
        Ok(Some(hash))
    }
}
