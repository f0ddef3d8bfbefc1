use crate::db::models::*;
use crate::error::AppResult;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite, SqliteExecutor};
use tracing::info;

pub type DbPool = Pool<Sqlite>;

/// Database operations for secrets
pub struct SecretRepo;

impl SecretRepo {
    /// Get secret by id
    pub async fn get(conn: impl SqliteExecutor<'_>, id: &str) -> AppResult<Option<Secret>> {
        let secret = sqlx::query_as::<_, Secret>("SELECT * FROM secrets WHERE id = ?")
            .bind(id)
            .fetch_optional(conn)
            .await?;

        Ok(secret)
    }

    /// All secrets, newest first
    pub async fn list(conn: impl SqliteExecutor<'_>) -> AppResult<Vec<Secret>> {
        let secrets = sqlx::query_as::<_, Secret>(
            "SELECT * FROM secrets ORDER BY created_at DESC, rowid DESC",
        )
        .fetch_all(conn)
        .await?;

        Ok(secrets)
    }

    /// Insert a new secret
    pub async fn insert(conn: impl SqliteExecutor<'_>, secret: &Secret) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO secrets (id, content, one_time, password_hash, expires_at, viewed, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&secret.id)
        .bind(&secret.content)
        .bind(secret.one_time)
        .bind(&secret.password_hash)
        .bind(secret.expires_at)
        .bind(secret.viewed)
        .bind(secret.created_at)
        .bind(secret.updated_at)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Replace the mutable fields of a secret. A `None` expiry keeps the
    /// stored one.
    ///
    /// Consumed one-time secrets are left untouched. Returns whether a row
    /// was updated.
    pub async fn replace(
        conn: impl SqliteExecutor<'_>,
        id: &str,
        new: &PreparedSecret,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE secrets
            SET content = ?, one_time = ?, password_hash = ?,
                expires_at = COALESCE(?, expires_at), updated_at = ?
            WHERE id = ? AND NOT (one_time = 1 AND viewed = 1)
            "#,
        )
        .bind(&new.content)
        .bind(new.one_time)
        .bind(&new.password_hash)
        .bind(new.expires_at)
        .bind(now)
        .bind(id)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Consume a one-time secret and return its content in one statement.
    ///
    /// Matches only while the secret is unconsumed, unexpired at `now` and
    /// still carries exactly the `password_hash` the caller verified against.
    /// Returns `None` once any of those stops holding.
    pub async fn take_one_time(
        conn: impl SqliteExecutor<'_>,
        id: &str,
        password_hash: Option<&str>,
        now: DateTime<Utc>,
    ) -> AppResult<Option<String>> {
        let content = sqlx::query_scalar::<_, String>(
            r#"
            UPDATE secrets
            SET viewed = 1, updated_at = ?
            WHERE id = ? AND one_time = 1 AND viewed = 0
              AND expires_at >= ? AND password_hash IS ?
            RETURNING content
            "#,
        )
        .bind(now)
        .bind(id)
        .bind(now)
        .bind(password_hash)
        .fetch_optional(conn)
        .await?;

        Ok(content)
    }

    /// Delete a secret row. Returns whether it existed.
    pub async fn delete(conn: impl SqliteExecutor<'_>, id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM secrets WHERE id = ?")
            .bind(id)
            .execute(conn)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}

/// Database operations for links
pub struct LinkRepo;

impl LinkRepo {
    /// Insert a new link
    pub async fn insert(conn: impl SqliteExecutor<'_>, link: &Link) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO links (id, secret_id, expires_at, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&link.id)
        .bind(&link.secret_id)
        .bind(link.expires_at)
        .bind(link.created_at)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Get the live link for a secret
    pub async fn get_by_secret_id(
        conn: impl SqliteExecutor<'_>,
        secret_id: &str,
    ) -> AppResult<Option<Link>> {
        let link = sqlx::query_as::<_, Link>("SELECT * FROM links WHERE secret_id = ?")
            .bind(secret_id)
            .fetch_optional(conn)
            .await?;

        Ok(link)
    }

    /// Load a live link together with its secret
    pub async fn get_with_secret(
        conn: impl SqliteExecutor<'_>,
        link_id: &str,
    ) -> AppResult<Option<LinkedSecret>> {
        let row = sqlx::query_as::<_, LinkedSecret>(
            r#"
            SELECT l.id AS link_id, l.expires_at AS link_expires_at, s.*
            FROM links l
            JOIN secrets s ON s.id = l.secret_id
            WHERE l.id = ?
            "#,
        )
        .bind(link_id)
        .fetch_optional(conn)
        .await?;

        Ok(row)
    }

    /// Load a consumed link's tombstone together with its secret
    pub async fn get_consumed_with_secret(
        conn: impl SqliteExecutor<'_>,
        link_id: &str,
    ) -> AppResult<Option<LinkedSecret>> {
        let row = sqlx::query_as::<_, LinkedSecret>(
            r#"
            SELECT c.id AS link_id, s.expires_at AS link_expires_at, s.*
            FROM consumed_links c
            JOIN secrets s ON s.id = c.secret_id
            WHERE c.id = ?
            "#,
        )
        .bind(link_id)
        .fetch_optional(conn)
        .await?;

        Ok(row)
    }

    /// Keep a link's expiry in step with its secret. Returns whether a live
    /// link was found.
    pub async fn update_expiry(
        conn: impl SqliteExecutor<'_>,
        secret_id: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let result = sqlx::query("UPDATE links SET expires_at = ? WHERE secret_id = ?")
            .bind(expires_at)
            .bind(secret_id)
            .execute(conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record that a link has been consumed
    pub async fn tombstone(
        conn: impl SqliteExecutor<'_>,
        link_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO consumed_links (id, secret_id, consumed_at)
            SELECT id, secret_id, ? FROM links WHERE id = ?
            "#,
        )
        .bind(now)
        .bind(link_id)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Delete a live link. Returns whether it existed.
    pub async fn delete(conn: impl SqliteExecutor<'_>, link_id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM links WHERE id = ?")
            .bind(link_id)
            .execute(conn)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Delete the live link of a secret
    pub async fn delete_for_secret(
        conn: impl SqliteExecutor<'_>,
        secret_id: &str,
    ) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM links WHERE secret_id = ?")
            .bind(secret_id)
            .execute(conn)
            .await?;

        Ok(result.rows_affected())
    }

    /// Delete the tombstones of a secret
    pub async fn delete_consumed_for_secret(
        conn: impl SqliteExecutor<'_>,
        secret_id: &str,
    ) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM consumed_links WHERE secret_id = ?")
            .bind(secret_id)
            .execute(conn)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
pub async fn setup_test_db() -> DbPool {
    use sqlx::sqlite::SqlitePoolOptions;
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");
    init_db(&pool).await.expect("Failed to init database");
    pool
}

/// Initialize database with migrations
pub async fn init_db(pool: &DbPool) -> AppResult<()> {
    info!("Running database migrations");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS secrets (
            id TEXT PRIMARY KEY NOT NULL,
            content TEXT NOT NULL,
            one_time BOOLEAN NOT NULL DEFAULT true,
            password_hash TEXT,
            expires_at DATETIME NOT NULL,
            viewed BOOLEAN NOT NULL DEFAULT false,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS links (
            id TEXT PRIMARY KEY NOT NULL,
            secret_id TEXT UNIQUE NOT NULL REFERENCES secrets(id) ON DELETE CASCADE,
            expires_at DATETIME NOT NULL,
            created_at DATETIME NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS consumed_links (
            id TEXT PRIMARY KEY NOT NULL,
            secret_id TEXT NOT NULL REFERENCES secrets(id) ON DELETE CASCADE,
            consumed_at DATETIME NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_secrets_created_at ON secrets(created_at)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_consumed_links_secret ON consumed_links(secret_id)")
        .execute(pool)
        .await?;

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_secret(one_time: bool, created_at: DateTime<Utc>) -> Secret {
        Secret {
            id: Secret::generate_id(),
            content: "hi".to_string(),
            one_time,
            password_hash: None,
            expires_at: created_at + Duration::hours(1),
            viewed: false,
            created_at,
            updated_at: created_at,
        }
    }

    fn sample_prepared(content: &str) -> PreparedSecret {
        PreparedSecret {
            content: content.to_string(),
            one_time: false,
            password_hash: None,
            expires_at: None,
        }
    }

    fn sample_link(secret: &Secret) -> Link {
        Link {
            id: Secret::generate_id(),
            secret_id: secret.id.clone(),
            expires_at: secret.expires_at,
            created_at: secret.created_at,
        }
    }

    // --- SecretRepo tests ---

    #[tokio::test]
    async fn test_secret_insert_and_get() {
        let pool = setup_test_db().await;
        let secret = sample_secret(true, Utc::now());
        SecretRepo::insert(&pool, &secret).await.unwrap();

        let loaded = SecretRepo::get(&pool, &secret.id).await.unwrap().unwrap();
        assert_eq!(loaded.content, "hi");
        assert!(loaded.one_time);
        assert!(!loaded.viewed);
        assert_eq!(loaded.expires_at, secret.expires_at);
    }

    #[tokio::test]
    async fn test_secret_get_nonexistent_returns_none() {
        let pool = setup_test_db().await;
        assert!(SecretRepo::get(&pool, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_secret_list_newest_first() {
        let pool = setup_test_db().await;
        let now = Utc::now();
        let older = sample_secret(true, now - Duration::minutes(5));
        let newer = sample_secret(true, now);
        SecretRepo::insert(&pool, &older).await.unwrap();
        SecretRepo::insert(&pool, &newer).await.unwrap();

        let ids: Vec<String> = SecretRepo::list(&pool)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }

    #[tokio::test]
    async fn test_take_one_time_is_compare_and_set() {
        let pool = setup_test_db().await;
        let secret = sample_secret(true, Utc::now());
        SecretRepo::insert(&pool, &secret).await.unwrap();

        let first = SecretRepo::take_one_time(&pool, &secret.id, None, Utc::now())
            .await
            .unwrap();
        assert_eq!(first.as_deref(), Some("hi"));
        let second = SecretRepo::take_one_time(&pool, &secret.id, None, Utc::now())
            .await
            .unwrap();
        assert!(second.is_none());
        assert!(SecretRepo::get(&pool, &secret.id).await.unwrap().unwrap().viewed);
    }

    #[tokio::test]
    async fn test_take_one_time_ignores_repeatable_secrets() {
        let pool = setup_test_db().await;
        let secret = sample_secret(false, Utc::now());
        SecretRepo::insert(&pool, &secret).await.unwrap();

        let taken = SecretRepo::take_one_time(&pool, &secret.id, None, Utc::now())
            .await
            .unwrap();
        assert!(taken.is_none());
        assert!(!SecretRepo::get(&pool, &secret.id).await.unwrap().unwrap().viewed);
    }

    #[tokio::test]
    async fn test_take_one_time_refuses_expired_secret() {
        let pool = setup_test_db().await;
        let secret = sample_secret(true, Utc::now());
        SecretRepo::insert(&pool, &secret).await.unwrap();

        let later = secret.expires_at + Duration::seconds(1);
        let taken = SecretRepo::take_one_time(&pool, &secret.id, None, later)
            .await
            .unwrap();
        assert!(taken.is_none());
        assert!(!SecretRepo::get(&pool, &secret.id).await.unwrap().unwrap().viewed);

        let at_expiry = SecretRepo::take_one_time(&pool, &secret.id, None, secret.expires_at)
            .await
            .unwrap();
        assert_eq!(at_expiry.as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn test_take_one_time_requires_verified_hash() {
        let pool = setup_test_db().await;
        let mut secret = sample_secret(true, Utc::now());
        secret.password_hash = Some("hash-a".to_string());
        SecretRepo::insert(&pool, &secret).await.unwrap();

        for seen in [None, Some("hash-b")] {
            let taken = SecretRepo::take_one_time(&pool, &secret.id, seen, Utc::now())
                .await
                .unwrap();
            assert!(taken.is_none());
        }
        let taken = SecretRepo::take_one_time(&pool, &secret.id, Some("hash-a"), Utc::now())
            .await
            .unwrap();
        assert_eq!(taken.as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn test_replace_keeps_expiry_when_omitted() {
        let pool = setup_test_db().await;
        let secret = sample_secret(false, Utc::now());
        SecretRepo::insert(&pool, &secret).await.unwrap();

        let mut new = sample_prepared("changed");
        assert!(SecretRepo::replace(&pool, &secret.id, &new, Utc::now()).await.unwrap());
        let loaded = SecretRepo::get(&pool, &secret.id).await.unwrap().unwrap();
        assert_eq!(loaded.content, "changed");
        assert_eq!(loaded.expires_at, secret.expires_at);

        let later = secret.expires_at + Duration::hours(3);
        new.expires_at = Some(later);
        assert!(SecretRepo::replace(&pool, &secret.id, &new, Utc::now()).await.unwrap());
        let loaded = SecretRepo::get(&pool, &secret.id).await.unwrap().unwrap();
        assert_eq!(loaded.expires_at, later);
    }

    #[tokio::test]
    async fn test_replace_skips_consumed_secret() {
        let pool = setup_test_db().await;
        let secret = sample_secret(true, Utc::now());
        SecretRepo::insert(&pool, &secret).await.unwrap();
        SecretRepo::take_one_time(&pool, &secret.id, None, Utc::now())
            .await
            .unwrap();

        let new = sample_prepared("changed");
        assert!(!SecretRepo::replace(&pool, &secret.id, &new, Utc::now()).await.unwrap());
        let loaded = SecretRepo::get(&pool, &secret.id).await.unwrap().unwrap();
        assert_eq!(loaded.content, "hi");
        assert!(loaded.one_time);
    }

    // --- LinkRepo tests ---

    #[tokio::test]
    async fn test_link_join_and_expiry_update() {
        let pool = setup_test_db().await;
        let secret = sample_secret(true, Utc::now());
        SecretRepo::insert(&pool, &secret).await.unwrap();
        let link = sample_link(&secret);
        LinkRepo::insert(&pool, &link).await.unwrap();

        let joined = LinkRepo::get_with_secret(&pool, &link.id).await.unwrap().unwrap();
        assert_eq!(joined.link_id, link.id);
        assert_eq!(joined.secret.id, secret.id);

        let later = secret.expires_at + Duration::hours(2);
        assert!(LinkRepo::update_expiry(&pool, &secret.id, later).await.unwrap());
        let reloaded = LinkRepo::get_by_secret_id(&pool, &secret.id).await.unwrap().unwrap();
        assert_eq!(reloaded.expires_at, later);
    }

    #[tokio::test]
    async fn test_one_live_link_per_secret() {
        let pool = setup_test_db().await;
        let secret = sample_secret(true, Utc::now());
        SecretRepo::insert(&pool, &secret).await.unwrap();
        LinkRepo::insert(&pool, &sample_link(&secret)).await.unwrap();

        assert!(LinkRepo::insert(&pool, &sample_link(&secret)).await.is_err());
    }

    #[tokio::test]
    async fn test_tombstone_then_delete() {
        let pool = setup_test_db().await;
        let secret = sample_secret(true, Utc::now());
        SecretRepo::insert(&pool, &secret).await.unwrap();
        let link = sample_link(&secret);
        LinkRepo::insert(&pool, &link).await.unwrap();

        LinkRepo::tombstone(&pool, &link.id, Utc::now()).await.unwrap();
        assert!(LinkRepo::delete(&pool, &link.id).await.unwrap());

        assert!(LinkRepo::get_with_secret(&pool, &link.id).await.unwrap().is_none());
        let consumed = LinkRepo::get_consumed_with_secret(&pool, &link.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(consumed.secret.id, secret.id);
        assert_eq!(consumed.link_expires_at, secret.expires_at);
    }

    #[tokio::test]
    async fn test_update_expiry_without_link() {
        let pool = setup_test_db().await;
        assert!(!LinkRepo::update_expiry(&pool, "missing", Utc::now()).await.unwrap());
    }
}
