//! Mailbox change-log abstraction.
//!
//! The sync controller only needs four things from a mail provider: the
//! message ids added since a saved position, the full content of a message,
//! the latest matching message (to seed a position), and the current head
//! of the change log. [`Mailbox`] captures exactly that, so the controller
//! can be driven by Gmail in production and by fakes in tests.

use async_trait::async_trait;

use crate::models::RawMessage;

/// Failures reported by a [`Mailbox`].
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    /// The saved position is older than the provider's retention window.
    #[error("change-log position {0} is no longer retained by the provider")]
    PositionExpired(String),

    #[error("message {0} not found")]
    NotFound(String),

    /// Credentials were rejected; a token refresh may fix it.
    #[error("mailbox authentication expired")]
    AuthExpired,

    /// Network, timeout, rate limit, or unexpected provider response.
    #[error("transient mailbox error: {0}")]
    Transient(String),
}

impl MailboxError {
    pub fn transient(err: impl std::fmt::Display) -> Self {
        MailboxError::Transient(err.to_string())
    }
}

/// New message ids since a position, plus the log head at query time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageDelta {
    /// Ids in arrival order.
    pub ids: Vec<String>,
    pub current_position: Option<String>,
}

#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Ids of messages added after `since`.
    ///
    /// Fails with [`MailboxError::PositionExpired`] when `since` has aged out.
    async fn list_new_message_ids(&self, since: &str) -> Result<MessageDelta, MailboxError>;

    /// Id of the most recent message from the configured sender, if any.
    async fn latest_message_id(&self) -> Result<Option<String>, MailboxError>;

    async fn get_message_detail(&self, id: &str) -> Result<RawMessage, MailboxError>;

    /// Current head of the change log.
    async fn current_position(&self) -> Result<String, MailboxError>;

    /// Re-authenticate after [`MailboxError::AuthExpired`].
    async fn refresh_auth(&self) -> Result<(), MailboxError> {
        Ok(())
    }
}

/// Precision filter for candidate messages: sender address plus a keyword
/// heuristic over subject and body. Not a security boundary.
#[derive(Debug, Clone)]
pub struct MessageFilter {
    sender: String,
    keywords: Vec<String>,
}

/// Keywords that mark a message as a banking notification.
pub const DEFAULT_KEYWORDS: [&str; 7] = [
    "giao dịch",
    "chuyển tiền",
    "tài khoản",
    "số tiền",
    "ngân hàng",
    "transaction",
    "banking",
];

impl MessageFilter {
    /// `sender` is matched case-insensitively as a substring of the `From`
    /// header, so either a full address or a bare domain works. An empty
    /// sender accepts any address.
    pub fn new<I, S>(sender: impl Into<String>, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sender: sender.into().trim().to_lowercase(),
            keywords: keywords
                .into_iter()
                .map(|k| k.into().to_lowercase())
                .filter(|k| !k.trim().is_empty())
                .collect(),
        }
    }

    pub fn matches_sender(&self, message: &RawMessage) -> bool {
        self.sender.is_empty() || message.sender.to_lowercase().contains(&self.sender)
    }

    pub fn matches_keywords(&self, message: &RawMessage) -> bool {
        let content = format!("{} {}", message.subject, message.body_markup).to_lowercase();
        self.keywords.iter().any(|k| content.contains(k.as_str()))
    }

    pub fn accepts(&self, message: &RawMessage) -> bool {
        self.matches_sender(message) && self.matches_keywords(message)
    }
}

impl Default for MessageFilter {
    fn default() -> Self {
        Self::new("no-reply@cake.vn", DEFAULT_KEYWORDS)
    }
}
