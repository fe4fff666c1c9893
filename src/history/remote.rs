//! Remote document-store chat history
//!
//! Each conversation is one document keyed by `(session_id, user_id)`, where
//! the user id doubles as the partition key and is lowercased before use so
//! lookups are stable regardless of caller casing. A missing document reads
//! as an empty session; any other read or write failure is fatal to the
//! operation and surfaces as a storage error.

use crate::error::{ParleyError, Result};
use crate::history::{truncate, truncate_error_for, ChatHistory, SessionRecord};
use crate::message::ChatMessage;
use crate::models::ConversationMetadata;
use crate::settings::RemoteStoreSettings;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use tracing::debug;

/// HTTP client for the document store holding conversation records
///
/// Documents live at `{endpoint}/{database}/{container}/{partition}/{id}`;
/// the access key is sent with every request.
#[derive(Debug)]
pub struct RemoteDocumentStore {
    client: Client,
    endpoint: String,
    key: String,
    database: String,
    container: String,
}

impl RemoteDocumentStore {
    /// Creates a store client from connection settings
    pub fn new(settings: &RemoteStoreSettings) -> Self {
        Self {
            client: Client::new(),
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            key: settings.key.clone(),
            database: settings.database.clone(),
            container: settings.container.clone(),
        }
    }

    fn document_url(&self, partition_key: &str, id: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.endpoint, self.database, self.container, partition_key, id
        )
    }

    /// Reads a conversation record; `None` when the document does not exist
    pub(crate) async fn read_item(
        &self,
        id: &str,
        partition_key: &str,
    ) -> Result<Option<SessionRecord>> {
        let response = self
            .client
            .get(self.document_url(partition_key, id))
            .header("x-api-key", &self.key)
            .send()
            .await
            .map_err(|e| ParleyError::Storage(format!("read failed for {id}: {e}")))?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("No conversation found for {id}");
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(
                ParleyError::Storage(format!("read failed for {id}: {}", response.status()))
                    .into(),
            );
        }
        let record = response
            .json::<SessionRecord>()
            .await
            .map_err(|e| ParleyError::Storage(format!("malformed record for {id}: {e}")))?;
        Ok(Some(record))
    }

    /// Inserts or replaces a conversation record
    pub(crate) async fn upsert_item(&self, record: &SessionRecord) -> Result<()> {
        let response = self
            .client
            .put(self.document_url(&record.user_id, &record.id))
            .header("x-api-key", &self.key)
            .json(record)
            .send()
            .await
            .map_err(|e| ParleyError::Storage(format!("write failed for {}: {e}", record.id)))?;

        if !response.status().is_success() {
            return Err(ParleyError::Storage(format!(
                "write failed for {}: {}",
                record.id,
                response.status()
            ))
            .into());
        }
        Ok(())
    }

    /// Deletes a conversation record; a missing document is tolerated
    pub(crate) async fn delete_item(&self, id: &str, partition_key: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.document_url(partition_key, id))
            .header("x-api-key", &self.key)
            .send()
            .await
            .map_err(|e| ParleyError::Storage(format!("delete failed for {id}: {e}")))?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("No conversation to delete for {id}");
            return Ok(());
        }
        if !response.status().is_success() {
            return Err(
                ParleyError::Storage(format!("delete failed for {id}: {}", response.status()))
                    .into(),
            );
        }
        Ok(())
    }
}

/// Chat history backed by the remote document store
#[derive(Debug)]
pub struct RemoteChatHistory {
    store: Arc<RemoteDocumentStore>,
    session_id: String,
    user_id: String,
    metadata: Option<ConversationMetadata>,
    messages: Vec<ChatMessage>,
}

impl RemoteChatHistory {
    /// Loads the history for a session from the store
    ///
    /// The user id is lowercased before use as the partition key.
    ///
    /// # Errors
    ///
    /// Propagates store failures other than "not found".
    pub async fn load(
        store: Arc<RemoteDocumentStore>,
        session_id: &str,
        user_id: &str,
        metadata: Option<ConversationMetadata>,
    ) -> Result<Self> {
        let user_id = user_id.to_lowercase();
        let mut history = Self {
            store,
            session_id: session_id.to_string(),
            user_id,
            metadata,
            messages: Vec::new(),
        };
        if let Some(record) = history
            .store
            .read_item(&history.session_id, &history.user_id)
            .await?
        {
            history.messages = record.messages;
            if record.metadata.is_some() {
                history.metadata = record.metadata;
            }
        }
        Ok(history)
    }

    async fn upsert_messages(&self) -> Result<()> {
        let record = SessionRecord {
            id: self.session_id.clone(),
            user_id: self.user_id.clone(),
            metadata: self.metadata.clone(),
            messages: self.messages.clone(),
            updated_at: chrono::Utc::now(),
        };
        self.store.upsert_item(&record).await
    }
}

#[async_trait]
impl ChatHistory for RemoteChatHistory {
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
        debug!("Deleting conversation {}", self.session_id);
        self.store
            .delete_item(&self.session_id, &self.user_id)
            .await
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
