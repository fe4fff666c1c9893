//! Chat message types shared by the history stores and the session manager
//!
//! Messages are the unit of persisted conversation state. Serialization must
//! round-trip role and content exactly, including structured multi-part
//! content (text plus image parts), because both history backends store the
//! serialized form verbatim.

use serde::{Deserialize, Serialize};

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A caller-supplied message
    Human,
    /// A model-generated message
    Ai,
    /// An instruction message prepended to the conversation
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Human => write!(f, "human"),
            Self::Ai => write!(f, "ai"),
            Self::System => write!(f, "system"),
        }
    }
}

/// One part of a structured message body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text segment
    Text {
        /// The text of this segment
        text: String,
    },
    /// Image reference, typically a base64 data URL
    ImageUrl {
        /// Image location or data URL
        image_url: ImageUrl,
    },
}

/// Wrapper for an image URL, matching the wire shape used by vision models
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    /// The URL or base64 data URL of the image
    pub url: String,
}

impl ImageUrl {
    /// Builds a base64 data URL from raw image bytes
    ///
    /// # Examples
    ///
    /// ```
    /// use parley::message::ImageUrl;
    ///
    /// let image = ImageUrl::from_bytes("image/png", &[0x89, 0x50]);
    /// assert!(image.url.starts_with("data:image/png;base64,"));
    /// ```
    pub fn from_bytes(media_type: &str, data: &[u8]) -> Self {
        use base64::Engine as _;
        let encoded = base64::engine::general_purpose::STANDARD.encode(data);
        Self {
            url: format!("data:{media_type};base64,{encoded}"),
        }
    }
}

/// Message body: either a plain string or a list of structured parts
///
/// The untagged representation keeps plain-text messages stored as bare JSON
/// strings, which is what both history backends persisted historically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain text content
    Text(String),
    /// Structured multi-part content (e.g. text plus an image)
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Returns the textual content, concatenating text parts for
    /// structured bodies. Image parts contribute nothing.
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

impl Default for MessageContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// A single message in a conversation
///
/// Ordering within a session is significant; the log is append-only except
/// for tail truncation handled by [`crate::history::truncate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message author
    pub role: Role,
    /// Message body
    pub content: MessageContent,
}

impl ChatMessage {
    /// Creates a new human message
    ///
    /// # Examples
    ///
    /// ```
    /// use parley::message::{ChatMessage, Role};
    ///
    /// let msg = ChatMessage::human("Hello!");
    /// assert_eq!(msg.role, Role::Human);
    /// ```
    pub fn human(content: impl Into<MessageContent>) -> Self {
        Self {
            role: Role::Human,
            content: content.into(),
        }
    }

    /// Creates a new AI message
    pub fn ai(content: impl Into<MessageContent>) -> Self {
        Self {
            role: Role::Ai,
            content: content.into(),
        }
    }

    /// Creates a new system message
    pub fn system(content: impl Into<MessageContent>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}
