//! Error types for Parley
//!
//! This module defines all error types used throughout the conversation core,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for Parley operations
///
/// This enum encompasses all possible errors that can occur while
/// orchestrating a conversation: session lookup, history validation,
/// model resolution, prompt resolution, provider calls, and storage.
#[derive(Error, Debug)]
pub enum ParleyError {
    /// Session absent or empty where presence was required
    #[error("No conversation found for {0}")]
    NoConversation(String),

    /// Structurally invalid request (bad truncation count, malformed log)
    #[error("{0}")]
    InvalidParams(String),

    /// Requested provider/model combination is not configured
    #[error("Invalid model key {0}")]
    ModelKey(String),

    /// Unresolved prompt template identifier
    #[error("No prompt found for {0}")]
    PromptNotFound(String),

    /// Provider-related errors (token producer failures, bad responses)
    #[error("Provider error: {0}")]
    Provider(String),

    /// Conversation storage errors (durable backend unavailable)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for Parley operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_conversation_error_display() {
        let error = ParleyError::NoConversation("abc-123".to_string());
        assert_eq!(error.to_string(), "No conversation found for abc-123");
    }

    #[test]
    fn test_invalid_params_error_display() {
        let error = ParleyError::InvalidParams("count must be greater than 0".to_string());
        assert_eq!(error.to_string(), "count must be greater than 0");
    }

    #[test]
    fn test_model_key_error_display() {
        let error = ParleyError::ModelKey("NOPE".to_string());
        assert_eq!(error.to_string(), "Invalid model key NOPE");
    }

    #[test]
    fn test_prompt_not_found_error_display() {
        let error = ParleyError::PromptNotFound("limerick".to_string());
        assert_eq!(error.to_string(), "No prompt found for limerick");
    }

    #[test]
    fn test_provider_error_display() {
        let error = ParleyError::Provider("API timeout".to_string());
        assert_eq!(error.to_string(), "Provider error: API timeout");
    }

    #[test]
    fn test_storage_error_display() {
        let error = ParleyError::Storage("document store unavailable".to_string());
        assert_eq!(
            error.to_string(),
            "Storage error: document store unavailable"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: ParleyError = io_error.into();
        assert!(matches!(error, ParleyError::Io(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_str = "{invalid json}";
        let json_error = serde_json::from_str::<serde_json::Value>(json_str).unwrap_err();
        let error: ParleyError = json_error.into();
        assert!(matches!(error, ParleyError::Serialization(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ParleyError>();
    }
}
