//! File-backed chat history
//!
//! One JSON file per session under a configured directory, created lazily on
//! first write. Unreadable or missing files load as an empty session with a
//! logged warning; only directory-creation failures propagate.

use crate::error::{ParleyError, Result};
use crate::history::{truncate, truncate_error_for, ChatHistory, SessionRecord};
use crate::message::ChatMessage;
use crate::models::ConversationMetadata;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Chat history stored as one JSON file per session
pub struct FileChatHistory {
    session_id: String,
    user_id: String,
    metadata: Option<ConversationMetadata>,
    messages: Vec<ChatMessage>,
    file_path: PathBuf,
}

impl FileChatHistory {
    /// Loads (or lazily initializes) the history for a session
    ///
    /// # Errors
    ///
    /// Returns an error when the history directory cannot be created.
    pub async fn load(
        dir: impl AsRef<Path>,
        session_id: &str,
        user_id: &str,
        metadata: Option<ConversationMetadata>,
    ) -> Result<Self> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| ParleyError::Storage(format!("failed to create {}: {e}", dir.display())))?;

        let file_path = dir.join(format!("{session_id}.json"));
        let mut history = Self {
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            metadata,
            messages: Vec::new(),
            file_path,
        };
        history.load_messages().await;
        debug!(
            "FileChatHistory in use for session {} with user {}. Messages saved to {}",
            history.session_id,
            history.user_id,
            history.file_path.display()
        );
        Ok(history)
    }

    async fn load_messages(&mut self) {
        let raw = match tokio::fs::read_to_string(&self.file_path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                warn!("Error loading messages: {e}");
                return;
            }
        };
        match serde_json::from_str::<SessionRecord>(&raw) {
            Ok(record) => {
                self.messages = record.messages;
                if record.metadata.is_some() {
                    self.metadata = record.metadata;
                }
            }
            Err(e) => warn!("Error loading messages: {e}"),
        }
    }

    async fn upsert_messages(&self) -> Result<()> {
        let record = SessionRecord {
            id: self.session_id.clone(),
            user_id: self.user_id.clone(),
            metadata: self.metadata.clone(),
            messages: self.messages.clone(),
            updated_at: chrono::Utc::now(),
        };
        let data = serde_json::to_string_pretty(&record)?;
        tokio::fs::write(&self.file_path, data).await.map_err(|e| {
            ParleyError::Storage(format!(
                "failed to write {}: {e}",
                self.file_path.display()
            ))
        })?;
        debug!(
            "Chat history and metadata updated for session {}",
            self.session_id
        );
        Ok(())
    }
}

#[async_trait]
impl ChatHistory for FileChatHistory {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    fn metadata(&self) -> Option<&ConversationMetadata> {
        self.metadata.as_ref()
    }

    async fn add_message(&mut self, message: ChatMessage) -> Result<()> {
        self.messages.push(message);
        self.upsert_messages().await
    }

    async fn clear(&mut self) -> Result<()> {
        self.messages.clear();
        match tokio::fs::remove_file(&self.file_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    "Chat history file not found for session {}, nothing to delete.",
                    self.session_id
                );
                Ok(())
            }
            Err(e) => Err(ParleyError::Storage(format!("failed to delete chat file: {e}")).into()),
        }
    }

    async fn delete(&mut self, pairs: i64) -> Result<()> {
        debug!(
            "Deleting {pairs} entry pairs from conversation {}",
            self.session_id
        );
        let remaining = truncate::truncate_pairs(&self.messages, pairs)
            .map_err(|e| truncate_error_for(e, &self.session_id))?;
        if remaining.len() != self.messages.len() {
            self.messages = remaining;
            self.upsert_messages().await?;
        }
        Ok(())
    }
}
