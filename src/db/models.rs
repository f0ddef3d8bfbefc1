use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use secretlink_types::{LinkMetadata, SecretRequest, SecretStatus, SecretSummary};
use sqlx::FromRow;
use uuid::Uuid;

/// Number of characters shown in owner-facing listings
pub const PREVIEW_CHARS: usize = 30;

/// Stored secret
#[derive(Clone, FromRow)]
pub struct Secret {
    pub id: String,
    pub content: String,
    pub one_time: bool,
    pub password_hash: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub viewed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Secret {
    pub fn generate_id() -> String {
        Uuid::new_v4().to_string()
    }

    pub fn requires_password(&self) -> bool {
        self.password_hash.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    /// A one-time secret whose content has been revealed. Terminal.
    pub fn is_consumed(&self) -> bool {
        self.one_time && self.viewed
    }

    pub fn status(&self, now: DateTime<Utc>) -> SecretStatus {
        if self.is_expired(now) {
            SecretStatus::Expired
        } else if self.is_consumed() {
            SecretStatus::Consumed
        } else {
            SecretStatus::Active
        }
    }

    pub fn preview(&self) -> String {
        let mut chars = self.content.chars();
        let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
        if chars.next().is_some() {
            format!("{}...", head)
        } else {
            head
        }
    }

    pub fn summary(&self, now: DateTime<Utc>) -> SecretSummary {
        SecretSummary {
            id: self.id.clone(),
            preview: self.preview(),
            one_time: self.one_time,
            viewed: self.viewed,
            require_password: self.requires_password(),
            expires_at: self.expires_at,
            created_at: self.created_at,
            status: self.status(now),
        }
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secret")
            .field("id", &self.id)
            .field("content", &"<redacted>")
            .field("one_time", &self.one_time)
            .field("requires_password", &self.requires_password())
            .field("expires_at", &self.expires_at)
            .field("viewed", &self.viewed)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Capability record binding a token to one secret
#[derive(Debug, Clone, FromRow)]
pub struct Link {
    pub id: String,
    pub secret_id: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// A link row joined with the secret it points at
#[derive(Debug, Clone, FromRow)]
pub struct LinkedSecret {
    pub link_id: String,
    pub link_expires_at: DateTime<Utc>,
    #[sqlx(flatten)]
    pub secret: Secret,
}

impl LinkedSecret {
    /// What a token holder may see before revealing content
    pub fn metadata(&self) -> LinkMetadata {
        LinkMetadata {
            expires_at: self.link_expires_at,
            one_time: self.secret.one_time,
            require_password: self.secret.requires_password(),
            viewed: self.secret.viewed,
        }
    }
}

/// Input for creating or fully replacing a secret
#[derive(Clone)]
pub struct NewSecret {
    pub content: String,
    pub one_time: bool,
    pub password: Option<String>,
    /// `None` means the default TTL on create and the current expiry on update
    pub expires_at: Option<DateTime<Utc>>,
}

impl NewSecret {
    pub fn from_request(req: SecretRequest) -> Self {
        Self {
            content: req.content,
            one_time: req.one_time,
            password: req.password,
            expires_at: req.expires_at,
        }
    }

    /// Reject malformed input before it reaches the store.
    ///
    /// Past expiry timestamps are accepted: an already-expired secret is a
    /// legal, inert state.
    pub fn validate(&self, max_content_length: usize) -> AppResult<()> {
        if self.content.trim().is_empty() {
            return Err(AppError::validation("content must not be empty"));
        }
        if self.content.len() > max_content_length {
            return Err(AppError::validation(format!(
                "content exceeds {} bytes",
                max_content_length
            )));
        }
        if matches!(self.password.as_deref(), Some("")) {
            return Err(AppError::validation("password must not be empty"));
        }
        Ok(())
    }
}

impl std::fmt::Debug for NewSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewSecret")
            .field("content", &"<redacted>")
            .field("one_time", &self.one_time)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// A validated secret whose password has already been hashed
#[derive(Clone)]
pub struct PreparedSecret {
    pub content: String,
    pub one_time: bool,
    pub password_hash: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for PreparedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedSecret")
            .field("content", &"<redacted>")
            .field("one_time", &self.one_time)
            .field("requires_password", &self.password_hash.is_some())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
