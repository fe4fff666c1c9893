//! Durable per-session chat history
//!
//! Two interchangeable backends persist the same logical record: a remote
//! document store keyed by `(session_id, user_id)` and a local
//! file-per-session fallback. Every mutation is a full read-modify-write of
//! the session's durable record; that is an accepted scaling tradeoff for
//! chat-sized histories, not an optimization target.
//!
//! Tail truncation always goes through the [`truncate`] invariant engine.

use crate::error::Result;
use crate::message::ChatMessage;
use crate::models::ConversationMetadata;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod file;
pub mod remote;
pub mod truncate;

pub use file::FileChatHistory;
pub use remote::{RemoteChatHistory, RemoteDocumentStore};

/// Persisted record layout, identical for both backends
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct SessionRecord {
    /// The session identifier
    pub id: String,
    /// The owning user identifier
    pub user_id: String,
    /// Conversation metadata, present once the first message is stored
    #[serde(default)]
    pub metadata: Option<ConversationMetadata>,
    /// The ordered message log
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    /// When the record was last written
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

/// Capability set shared by the history backends
///
/// Implementations load the session on construction; an absent record is an
/// empty session, never an error. Write failures are fatal to the operation.
#[async_trait]
pub trait ChatHistory: Send {
    /// The session identifier this history belongs to
    fn session_id(&self) -> &str;

    /// The loaded message log, oldest first
    fn messages(&self) -> &[ChatMessage];

    /// Metadata persisted with the session, if any
    fn metadata(&self) -> Option<&ConversationMetadata>;

    /// Appends a message and persists the full record
    async fn add_message(&mut self, message: ChatMessage) -> Result<()>;

    /// Clears all messages and removes the persisted record
    async fn clear(&mut self) -> Result<()>;

    /// Removes `pairs` human/AI exchanges from the tail
    ///
    /// Delegates to [`truncate::truncate_pairs`]; persists only when the
    /// result differs in length from the input, so a mid-turn no-op never
    /// triggers a redundant write.
    async fn delete(&mut self, pairs: i64) -> Result<()>;
}

/// Maps a truncation failure onto the service error taxonomy
pub(crate) fn truncate_error_for(
    error: truncate::TruncateError,
    session_id: &str,
) -> crate::error::ParleyError {
    use crate::error::ParleyError;
    match error {
        truncate::TruncateError::EmptyHistory => {
            ParleyError::NoConversation(session_id.to_string())
        }
        other => ParleyError::InvalidParams(other.to_string()),
    }
}
