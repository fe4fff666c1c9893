//! Parley - Conversation orchestration core for LLM chat services
//!
//! This library provides the provider-agnostic core of a chat backend:
//! session lifecycle, per-session durable history, prompt templating, safety
//! signal classification, usage metrics, and status-aware response streaming.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `session`: Conversation lifecycle and invocation driving
//! - `stream`: Status negotiation for incrementally produced responses
//! - `history`: Durable chat history (file and remote document store)
//! - `producer`: The token producer boundary implemented by provider wiring
//! - `safety`: Provider-specific content-filter signal classification
//! - `metrics`: Per-invocation token/latency counters and metric emission
//! - `prompts`: Prompt templates with named placeholders
//! - `models`: Model definitions, the registry, and conversation metadata
//! - `message`: Chat message types shared across the crate
//! - `settings`: YAML settings with environment overrides
//! - `logging`: Structured logging setup
//! - `error`: Error types and result aliases
//!
//! # Example
//!
//! ```no_run
//! use parley::{ConversationCall, ConversationService};
//! use parley::message::MessageContent;
//! use parley::models::ModelRegistry;
//! use parley::prompts::PromptLibrary;
//! use parley::settings::Settings;
//! use parley::stream::negotiate;
//! use std::collections::HashMap;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let service = ConversationService::new(
//!         Settings::from_env(),
//!         ModelRegistry::default(),
//!         HashMap::new(), // one token producer per configured provider
//!         PromptLibrary::default(),
//!     );
//!
//!     let invocation = service
//!         .start(ConversationCall {
//!             business_user: "analyst".to_string(),
//!             input: MessageContent::Text("What is the DVLA?".to_string()),
//!             ..Default::default()
//!         })
//!         .await?;
//!
//!     let reply = negotiate(invocation.stream_reply()).await;
//!     println!("committed status: {}", reply.status);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod history;
pub mod logging;
pub mod message;
pub mod metrics;
pub mod models;
pub mod producer;
pub mod prompts;
pub mod safety;
pub mod session;
pub mod settings;
pub mod stream;

// Re-export commonly used types
pub use error::{ParleyError, Result};
pub use message::{ChatMessage, MessageContent, Role};
pub use models::{ConversationMetadata, Model, ModelRegistry};
pub use producer::{ProducerEvent, TokenProducer, TokenStream};
pub use session::{ConversationCall, ConversationService, Invocation};
pub use stream::{negotiate, Negotiated, StreamedReply};
