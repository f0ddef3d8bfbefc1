//! Wire types for the SecretLink HTTP API.
//!
//! These are plain serde structs so that clients can depend on them without
//! pulling in the server's database and crypto stack.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body of `POST /api/secrets` and `PUT /api/secrets/:id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretRequest {
    pub content: String,
    #[serde(default = "default_one_time")]
    pub one_time: bool,
    #[serde(default)]
    pub password: Option<String>,
    /// Falls back to the server's default TTL when omitted.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

fn default_one_time() -> bool {
    true
}

/// Returned once, at creation. The token is the only shareable artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSecretResponse {
    pub id: String,
    pub token: String,
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Lifecycle state of a secret as seen by its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretStatus {
    Active,
    Consumed,
    Expired,
}

/// Owner-facing listing row. Carries a short preview, never the full content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretSummary {
    pub id: String,
    pub preview: String,
    pub one_time: bool,
    pub viewed: bool,
    pub require_password: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub status: SecretStatus,
}

/// What a token holder may learn before revealing the content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkMetadata {
    pub expires_at: DateTime<Utc>,
    pub one_time: bool,
    pub require_password: bool,
    pub viewed: bool,
}

/// Body of `POST /api/links/:token/view`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViewRequest {
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewResponse {
    pub content: String,
}
