use chrono::Duration;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Web server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    #[serde(default = "default_web_host")]
    pub host: String,
    #[serde(default = "default_web_port")]
    pub port: u16,
    /// Base URL that share links are built from, e.g. `https://secrets.example.com`
    pub public_url: String,
    /// Render every "secret unavailable" outcome on link routes as the same
    /// 404 so that callers cannot tell expired, consumed and unknown apart.
    #[serde(default = "default_mask_unavailable")]
    pub mask_unavailable: bool,
}

fn default_web_host() -> String {
    "0.0.0.0".to_string()
}

fn default_web_port() -> u16 {
    8080
}

fn default_mask_unavailable() -> bool {
    true
}

/// Database configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Link encryption and password hashing settings
#[derive(Deserialize, Clone)]
pub struct CryptoConfig {
    /// 32-byte ChaCha20-Poly1305 key, base64 encoded
    pub token_key: String,
    /// Argon2id memory cost in KiB
    #[serde(default = "default_password_memory_kib")]
    pub password_memory_kib: u32,
    /// Argon2id time cost
    #[serde(default = "default_password_iterations")]
    pub password_iterations: u32,
    /// Argon2id lanes
    #[serde(default = "default_password_parallelism")]
    pub password_parallelism: u32,
}

fn default_password_memory_kib() -> u32 {
    19 * 1024
}

fn default_password_iterations() -> u32 {
    2
}

fn default_password_parallelism() -> u32 {
    1
}

impl std::fmt::Debug for CryptoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoConfig")
            .field("token_key", &"<redacted>")
            .field("password_memory_kib", &self.password_memory_kib)
            .field("password_iterations", &self.password_iterations)
            .field("password_parallelism", &self.password_parallelism)
            .finish()
    }
}

/// Secret lifecycle settings
#[derive(Debug, Deserialize, Clone)]
pub struct SecretsConfig {
    /// Expiry applied when a create request does not carry one
    #[serde(default = "default_ttl_hours")]
    pub default_ttl_hours: u64,
    /// Maximum content size in bytes
    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,
}

fn default_ttl_hours() -> u64 {
    24
}

fn default_max_content_length() -> usize {
    64 * 1024
}

impl SecretsConfig {
    /// `default_ttl_hours` as a duration; rejects values chrono cannot represent.
    pub fn default_ttl(&self) -> Result<Duration, ConfigError> {
        i64::try_from(self.default_ttl_hours)
            .ok()
            .and_then(Duration::try_hours)
            .ok_or_else(|| {
                ConfigError::Message(format!(
                    "secrets.default_ttl_hours out of range: {}",
                    self.default_ttl_hours
                ))
            })
    }
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            default_ttl_hours: default_ttl_hours(),
            max_content_length: default_max_content_length(),
        }
    }
}

/// Root application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub web: WebConfig,
    pub database: DatabaseConfig,
    pub crypto: CryptoConfig,
    #[serde(default)]
    pub secrets: SecretsConfig,
}

impl AppConfig {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Start with default config file
            .add_source(File::with_name("config/default").required(false))
            // Override with local config if present
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (prefix: SECRETLINK_)
            // e.g., SECRETLINK_CRYPTO__TOKEN_KEY, SECRETLINK_WEB__PORT
            .add_source(
                Environment::with_prefix("SECRETLINK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.secrets.default_ttl()?;
        Ok(config)
    }
}

impl WebConfig {
    /// Public URL of the reveal page for a token
    pub fn share_url(&self, token: &str) -> String {
        let base = self.public_url.trim_end_matches('/');
        format!("{}/s/{}", base, token)
    }
}
