//! Token producer boundary
//!
//! The token producer is the opaque external component that generates model
//! output incrementally. Instead of callback hooks attached to the provider
//! client, the producer yields explicit events: content deltas followed by a
//! single terminal [`CompletionSignal`] carrying the lifecycle metadata the
//! safety classifier and metrics collector need.
//!
//! The stream is lazy, finite, and non-restartable, and may fail with a
//! [`ProviderError`] at any point mid-sequence.

use crate::error::Result;
use crate::message::ChatMessage;
use crate::models::Model;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// One element of a token producer stream
#[derive(Debug, Clone, PartialEq)]
pub enum ProducerEvent {
    /// An incremental content fragment
    Delta(String),
    /// Terminal event carrying provider-reported lifecycle metadata
    Completed(CompletionSignal),
}

/// Provider-reported metadata emitted once at the end of a successful stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionSignal {
    /// Per-choice finish reason on the terminal response chunk, if any
    #[serde(default)]
    pub finish_reason: Option<String>,

    /// Per-rating safety annotations on the response, if any
    #[serde(default)]
    pub safety_ratings: Vec<SafetyRating>,

    /// Response fragments as the provider reports them at completion; some
    /// providers emit one terminal aggregate rather than incremental counts
    #[serde(default)]
    pub output: Vec<String>,
}

/// One safety annotation attached to a response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SafetyRating {
    /// Provider-specific rating category
    #[serde(default)]
    pub category: String,
    /// Whether this rating blocked the response
    #[serde(default)]
    pub blocked: bool,
}

/// Error raised by a token producer
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ProviderError {
    /// Provider-specific error code, when one is extractable
    pub code: Option<String>,
    /// Human-readable error message
    pub message: String,
}

impl ProviderError {
    /// Creates an error with a message and no code
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    /// Creates an error with a provider error code
    pub fn coded(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }
}

/// A lazy, finite, non-restartable sequence of producer events
pub type TokenStream = BoxStream<'static, std::result::Result<ProducerEvent, ProviderError>>;

/// The opaque asynchronous token producer
///
/// Implemented by the provider wiring outside this core. Given the message
/// payload for one turn and the model definition, it returns the event
/// stream for that invocation.
#[async_trait]
pub trait TokenProducer: Send + Sync {
    /// Starts one invocation and returns its event stream
    async fn produce(&self, messages: &[ChatMessage], model: &Model) -> Result<TokenStream>;
}
