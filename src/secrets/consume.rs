//! The reveal step.
//!
//! A one-time secret is handed out by a single conditional write
//! (`viewed: false -> true`) followed by removal of its link, both inside one
//! transaction. The write also re-checks expiry and the password hash that
//! was verified, and returns the content as stored at that moment, so an
//! owner edit landing during password verification is never overridden.
//! Whoever loses the compare-and-set gets the error matching the secret's
//! current state; there is no retry.

use crate::clock::SharedClock;
use crate::crypto::PasswordHasher;
use crate::db::{DbPool, LinkRepo, LinkedSecret, Secret, SecretRepo};
use crate::error::{AppError, AppResult};
use crate::secrets::LinkResolver;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

#[derive(Clone)]
pub struct ConsumptionEngine {
    resolver: LinkResolver,
    hasher: PasswordHasher,
    clock: SharedClock,
}

impl ConsumptionEngine {
    pub fn new(resolver: LinkResolver, hasher: PasswordHasher, clock: SharedClock) -> Self {
        Self {
            resolver,
            hasher,
            clock,
        }
    }

    /// Reveal the content behind `token`.
    pub async fn consume(
        &self,
        pool: &DbPool,
        token: &str,
        password: Option<&str>,
    ) -> AppResult<String> {
        // Resolve again even if the caller just fetched metadata: the state
        // may have moved since.
        let linked = {
            let mut conn = pool.acquire().await?;
            self.resolver.resolve(&mut conn, token).await?
        };

        self.check_password(&linked.secret, password).await?;
        self.reveal(pool, &linked).await
    }

    async fn check_password(&self, secret: &Secret, password: Option<&str>) -> AppResult<()> {
        let Some(hash) = secret.password_hash.clone() else {
            return Ok(());
        };
        let Some(password) = password else {
            debug!(secret_id = %secret.id, "Password required but not supplied");
            return Err(AppError::Unauthorized);
        };
        if !self.verify(password, hash).await? {
            warn!(secret_id = %secret.id, "Wrong password for secret");
            return Err(AppError::Unauthorized);
        }
        Ok(())
    }

    /// Hand out the content of a resolved link whose password, if any, has
    /// been verified against `linked.secret.password_hash`.
    async fn reveal(&self, pool: &DbPool, linked: &LinkedSecret) -> AppResult<String> {
        let secret = &linked.secret;
        let seen_hash = secret.password_hash.as_deref();
        let now = self.clock.now();

        if !secret.one_time {
            let mut conn = pool.acquire().await?;
            let current = SecretRepo::get(&mut *conn, &secret.id)
                .await?
                .ok_or(AppError::NotFound)?;
            still_revealable(&current, seen_hash, now)?;
            if !current.one_time {
                debug!(secret_id = %secret.id, "Repeatable secret revealed");
                return Ok(current.content);
            }
            // Made one-time after it was resolved; consume it like any other.
        }

        let mut tx = pool.begin().await?;
        // The conditional write must be the first statement so SQLite takes
        // the write lock before anything else is read.
        let taken = SecretRepo::take_one_time(&mut *tx, &secret.id, seen_hash, now).await?;
        let Some(content) = taken else {
            let current = SecretRepo::get(&mut *tx, &secret.id)
                .await?
                .ok_or(AppError::NotFound)?;
            still_revealable(&current, seen_hash, now)?;
            if current.one_time {
                debug!(secret_id = %secret.id, "Conditional write matched nothing");
                return Err(AppError::AlreadyConsumed);
            }
            debug!(secret_id = %secret.id, "Secret made repeatable before reveal");
            return Ok(current.content);
        };
        LinkRepo::tombstone(&mut *tx, &linked.link_id, now).await?;
        LinkRepo::delete(&mut *tx, &linked.link_id).await?;
        tx.commit().await?;

        info!(secret_id = %secret.id, "One-time secret consumed");
        Ok(content)
    }

    async fn verify(&self, password: &str, hash: String) -> AppResult<bool> {
        let hasher = self.hasher.clone();
        let password = Zeroizing::new(password.to_string());
        tokio::task::spawn_blocking(move || hasher.verify_password(&password, &hash))
            .await
            .map_err(|e| AppError::internal(format!("password verification task failed: {}", e)))
    }
}

/// Re-check a freshly loaded secret against what was resolved and verified.
fn still_revealable(
    current: &Secret,
    seen_hash: Option<&str>,
    now: DateTime<Utc>,
) -> AppResult<()> {
    if current.is_expired(now) {
        return Err(AppError::Expired);
    }
    if current.is_consumed() {
        info!(secret_id = %current.id, "Lost consumption race");
        return Err(AppError::AlreadyConsumed);
    }
    if current.password_hash.as_deref() != seen_hash {
        debug!(secret_id = %current.id, "Password changed during reveal");
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::crypto::TokenCipher;
    use crate::db::{setup_test_db, Link, PreparedSecret};
    use chrono::{Duration, Utc};
    use std::sync::Arc;
    use uuid::Uuid;

    struct Fixture {
        pool: DbPool,
        clock: Arc<ManualClock>,
        cipher: TokenCipher,
        hasher: PasswordHasher,
        engine: ConsumptionEngine,
    }

    async fn fixture() -> Fixture {
        let pool = setup_test_db().await;
        let clock = Arc::new(ManualClock::default());
        let cipher = TokenCipher::new(&[9u8; 32]);
        let hasher = PasswordHasher::new(8, 1, 1).unwrap();
        let resolver = LinkResolver::new(cipher.clone(), clock.clone());
        let engine = ConsumptionEngine::new(resolver, hasher.clone(), clock.clone());
        Fixture {
            pool,
            clock,
            cipher,
            hasher,
            engine,
        }
    }

    impl Fixture {
        async fn insert(&self, one_time: bool, password: Option<&str>) -> (String, String) {
            let now = self.clock.now();
            let secret = Secret {
                id: Secret::generate_id(),
                content: "hi".to_string(),
                one_time,
                password_hash: password.map(|p| self.hasher.hash_password(p).unwrap()),
                expires_at: now + Duration::hours(1),
                viewed: false,
                created_at: now,
                updated_at: now,
            };
            SecretRepo::insert(&self.pool, &secret).await.unwrap();
            let id = Uuid::new_v4();
            let link = Link {
                id: id.to_string(),
                secret_id: secret.id.clone(),
                expires_at: secret.expires_at,
                created_at: now,
            };
            LinkRepo::insert(&self.pool, &link).await.unwrap();
            (secret.id, self.cipher.encrypt_identifier(&id).unwrap())
        }

        /// First half of a reveal: resolve only.
        async fn resolve(&self, token: &str) -> LinkedSecret {
            let mut conn = self.pool.acquire().await.unwrap();
            self.engine.resolver.resolve(&mut conn, token).await.unwrap()
        }

        /// Owner replaces the secret in between resolve and reveal.
        async fn edit(
            &self,
            secret_id: &str,
            one_time: bool,
            password_hash: Option<String>,
            expires_at: Option<DateTime<Utc>>,
        ) {
            let edited = PreparedSecret {
                content: "v2".to_string(),
                one_time,
                password_hash,
                expires_at,
            };
            assert!(SecretRepo::replace(&self.pool, secret_id, &edited, self.clock.now())
                .await
                .unwrap());
        }

        async fn viewed(&self, secret_id: &str) -> bool {
            SecretRepo::get(&self.pool, secret_id)
                .await
                .unwrap()
                .unwrap()
                .viewed
        }
    }

    #[tokio::test]
    async fn test_one_time_consumed_once() {
        let f = fixture().await;
        let (secret_id, token) = f.insert(true, None).await;

        assert_eq!(f.engine.consume(&f.pool, &token, None).await.unwrap(), "hi");
        assert!(f.viewed(&secret_id).await);
        assert!(matches!(
            f.engine.consume(&f.pool, &token, None).await,
            Err(AppError::AlreadyConsumed)
        ));
    }

    #[tokio::test]
    async fn test_one_time_link_removed() {
        let f = fixture().await;
        let (secret_id, token) = f.insert(true, None).await;

        f.engine.consume(&f.pool, &token, None).await.unwrap();
        assert!(LinkRepo::get_by_secret_id(&f.pool, &secret_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_repeatable_never_mutates() {
        let f = fixture().await;
        let (secret_id, token) = f.insert(false, None).await;

        for _ in 0..3 {
            assert_eq!(f.engine.consume(&f.pool, &token, None).await.unwrap(), "hi");
        }
        assert!(!f.viewed(&secret_id).await);
    }

    #[tokio::test]
    async fn test_password_checked_before_mutation() {
        let f = fixture().await;
        let (secret_id, token) = f.insert(true, Some("pw1")).await;

        assert!(matches!(
            f.engine.consume(&f.pool, &token, None).await,
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            f.engine.consume(&f.pool, &token, Some("wrong")).await,
            Err(AppError::Unauthorized)
        ));
        assert!(!f.viewed(&secret_id).await);

        assert_eq!(
            f.engine.consume(&f.pool, &token, Some("pw1")).await.unwrap(),
            "hi"
        );
        assert!(f.viewed(&secret_id).await);
    }

    #[tokio::test]
    async fn test_expired_not_consumed() {
        let f = fixture().await;
        let (secret_id, token) = f.insert(true, None).await;
        f.clock.advance(Duration::hours(2));

        assert!(matches!(
            f.engine.consume(&f.pool, &token, None).await,
            Err(AppError::Expired)
        ));
        assert!(!f.viewed(&secret_id).await);
    }

    #[tokio::test]
    async fn test_consumed_token_reports_expired_after_expiry() {
        let f = fixture().await;
        let (_, token) = f.insert(true, None).await;
        f.engine.consume(&f.pool, &token, None).await.unwrap();
        f.clock.set(Utc::now() + Duration::days(1));

        assert!(matches!(
            f.engine.consume(&f.pool, &token, None).await,
            Err(AppError::Expired)
        ));
    }

    #[tokio::test]
    async fn test_expired_while_revealing_stays_unviewed() {
        let f = fixture().await;
        let (secret_id, token) = f.insert(true, None).await;
        let linked = f.resolve(&token).await;

        f.edit(&secret_id, true, None, Some(f.clock.now() - Duration::seconds(1)))
            .await;

        assert!(matches!(
            f.engine.reveal(&f.pool, &linked).await,
            Err(AppError::Expired)
        ));
        assert!(!f.viewed(&secret_id).await);
        assert!(LinkRepo::get_by_secret_id(&f.pool, &secret_id)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_password_changed_while_revealing() {
        let f = fixture().await;
        let (secret_id, token) = f.insert(true, Some("pw1")).await;
        let linked = f.resolve(&token).await;

        // Protection dropped after the old hash was verified
        f.edit(&secret_id, true, None, None).await;

        assert!(matches!(
            f.engine.reveal(&f.pool, &linked).await,
            Err(AppError::Unauthorized)
        ));
        assert!(!f.viewed(&secret_id).await);
        assert_eq!(f.engine.consume(&f.pool, &token, None).await.unwrap(), "v2");
    }

    #[tokio::test]
    async fn test_reveal_returns_content_as_committed() {
        let f = fixture().await;
        let (secret_id, token) = f.insert(true, None).await;
        let linked = f.resolve(&token).await;

        f.edit(&secret_id, true, None, None).await;

        assert_eq!(f.engine.reveal(&f.pool, &linked).await.unwrap(), "v2");
        assert!(f.viewed(&secret_id).await);
    }

    #[tokio::test]
    async fn test_made_repeatable_while_revealing() {
        let f = fixture().await;
        let (secret_id, token) = f.insert(true, None).await;
        let linked = f.resolve(&token).await;

        f.edit(&secret_id, false, None, None).await;

        assert_eq!(f.engine.reveal(&f.pool, &linked).await.unwrap(), "v2");
        assert!(!f.viewed(&secret_id).await);
        assert_eq!(f.engine.consume(&f.pool, &token, None).await.unwrap(), "v2");
    }

    #[tokio::test]
    async fn test_made_one_time_while_revealing() {
        let f = fixture().await;
        let (secret_id, token) = f.insert(false, None).await;
        let linked = f.resolve(&token).await;

        f.edit(&secret_id, true, None, None).await;

        assert_eq!(f.engine.reveal(&f.pool, &linked).await.unwrap(), "v2");
        assert!(f.viewed(&secret_id).await);
        assert!(matches!(
            f.engine.consume(&f.pool, &token, None).await,
            Err(AppError::AlreadyConsumed)
        ));
    }

    #[tokio::test]
    async fn test_repeatable_expired_while_revealing() {
        let f = fixture().await;
        let (secret_id, token) = f.insert(false, None).await;
        let linked = f.resolve(&token).await;

        f.edit(&secret_id, false, None, Some(f.clock.now() - Duration::seconds(1)))
            .await;

        assert!(matches!(
            f.engine.reveal(&f.pool, &linked).await,
            Err(AppError::Expired)
        ));
    }

    #[tokio::test]
    async fn test_deleted_while_revealing() {
        let f = fixture().await;
        let (secret_id, token) = f.insert(true, None).await;
        let linked = f.resolve(&token).await;

        LinkRepo::delete_for_secret(&f.pool, &secret_id).await.unwrap();
        SecretRepo::delete(&f.pool, &secret_id).await.unwrap();

        assert!(matches!(
            f.engine.reveal(&f.pool, &linked).await,
            Err(AppError::NotFound)
        ));
    }
}
