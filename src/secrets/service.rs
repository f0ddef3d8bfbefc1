use crate::clock::SharedClock;
use crate::config::AppConfig;
use crate::crypto::{PasswordHasher, TokenCipher};
use crate::db::{DbPool, NewSecret, Secret};
use crate::error::AppResult;
use crate::secrets::{ConsumptionEngine, LinkIssuer, LinkResolver, SecretStore};
use chrono::{DateTime, Duration, Utc};
use secretlink_types::LinkMetadata;
use tracing::info;

/// A freshly created secret and the token to share it by.
#[derive(Debug, Clone)]
pub struct CreatedSecret {
    pub secret: Secret,
    pub token: String,
}

/// Entry point for everything the transport layer needs.
///
/// Owns the transaction boundaries: a secret and its link are written
/// together or not at all.
#[derive(Clone)]
pub struct SecretService {
    pool: DbPool,
    store: SecretStore,
    issuer: LinkIssuer,
    resolver: LinkResolver,
    engine: ConsumptionEngine,
    clock: SharedClock,
}

impl SecretService {
    pub fn new(
        pool: DbPool,
        cipher: TokenCipher,
        hasher: PasswordHasher,
        clock: SharedClock,
        default_ttl: Duration,
        max_content_length: usize,
    ) -> Self {
        let store = SecretStore::new(
            hasher.clone(),
            clock.clone(),
            default_ttl,
            max_content_length,
        );
        let issuer = LinkIssuer::new(cipher.clone(), clock.clone());
        let resolver = LinkResolver::new(cipher, clock.clone());
        let engine = ConsumptionEngine::new(resolver.clone(), hasher, clock.clone());
        Self {
            pool,
            store,
            issuer,
            resolver,
            engine,
            clock,
        }
    }

    /// Build the service from loaded configuration.
    ///
    /// Fails if the token key, hash parameters or default TTL are unusable.
    pub fn from_config(pool: DbPool, config: &AppConfig, clock: SharedClock) -> AppResult<Self> {
        let cipher = TokenCipher::from_base64_key(&config.crypto.token_key)?;
        let hasher = PasswordHasher::from_config(&config.crypto)?;
        Ok(Self::new(
            pool,
            cipher,
            hasher,
            clock,
            config.secrets.default_ttl()?,
            config.secrets.max_content_length,
        ))
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Expiry used when a request does not carry one
    pub fn default_expiry(&self) -> AppResult<DateTime<Utc>> {
        self.store.default_expiry()
    }

    pub async fn create_secret(&self, new: NewSecret) -> AppResult<CreatedSecret> {
        let prepared = self.store.prepare(new).await?;
        let mut tx = self.pool.begin().await?;
        let secret = self.store.create(&mut tx, prepared).await?;
        let (_, token) = self
            .issuer
            .issue(&mut tx, &secret.id, secret.expires_at)
            .await?;
        tx.commit().await?;

        info!(
            secret_id = %secret.id,
            one_time = secret.one_time,
            password = secret.requires_password(),
            "Secret created"
        );
        Ok(CreatedSecret { secret, token })
    }

    /// Replace a secret. `new.expires_at = None` keeps the current expiry.
    pub async fn update_secret(&self, id: &str, new: NewSecret) -> AppResult<Secret> {
        let prepared = self.store.prepare(new).await?;
        let mut tx = self.pool.begin().await?;
        let secret = self.store.update(&mut tx, id, &prepared).await?;
        self.issuer
            .reissue_expiry(&mut tx, id, secret.expires_at)
            .await?;
        tx.commit().await?;

        info!(secret_id = %id, "Secret updated");
        Ok(secret)
    }

    pub async fn delete_secret(&self, id: &str) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        self.store.delete(&mut tx, id).await?;
        tx.commit().await?;

        info!(secret_id = %id, "Secret deleted");
        Ok(())
    }

    /// All secrets, newest first
    pub async fn list_secrets(&self) -> AppResult<Vec<Secret>> {
        let mut conn = self.pool.acquire().await?;
        self.store.list(&mut conn).await
    }

    pub async fn get_secret(&self, id: &str) -> AppResult<Secret> {
        let mut conn = self.pool.acquire().await?;
        self.store.get(&mut conn, id).await
    }

    pub async fn get_link_metadata(&self, token: &str) -> AppResult<LinkMetadata> {
        let mut conn = self.pool.acquire().await?;
        self.resolver.resolve_metadata(&mut conn, token).await
    }

    pub async fn view_link(&self, token: &str, password: Option<&str>) -> AppResult<String> {
        self.engine.consume(&self.pool, token, password).await
    }
}
