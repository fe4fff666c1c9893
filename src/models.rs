//! Model definitions, the model registry, and conversation metadata
//!
//! The registry is an explicitly constructed, immutable map of configured
//! model definitions. It is built once at startup and handed to the
//! [`crate::session::ConversationService`] at construction time; nothing in
//! the core mutates it afterwards.

use crate::error::{ParleyError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Model key used when a caller does not specify one
pub const DEFAULT_MODEL_KEY: &str = "AZUREGPTGENERAL";

/// Represents different model providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ModelProvider {
    Azure,
    Bedrock,
    Vertex,
    Huggingface,
}

impl std::fmt::Display for ModelProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Azure => write!(f, "AZURE"),
            Self::Bedrock => write!(f, "BEDROCK"),
            Self::Vertex => write!(f, "VERTEX"),
            Self::Huggingface => write!(f, "HUGGINGFACE"),
        }
    }
}

/// Represents different model variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ModelVariant {
    General,
    Advanced,
    Multimodal,
    Experimental,
}

impl std::fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::General => write!(f, "GENERAL"),
            Self::Advanced => write!(f, "ADVANCED"),
            Self::Multimodal => write!(f, "MULTIMODAL"),
            Self::Experimental => write!(f, "EXPERIMENTAL"),
        }
    }
}

/// Represents the different model families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ModelFamily {
    Gpt,
    Claude,
    Gemini,
    Mixtral,
    Unspecified,
}

impl Default for ModelFamily {
    fn default() -> Self {
        Self::Unspecified
    }
}

impl std::fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gpt => write!(f, "GPT"),
            Self::Claude => write!(f, "CLAUDE"),
            Self::Gemini => write!(f, "GEMINI"),
            Self::Mixtral => write!(f, "MIXTRAL"),
            Self::Unspecified => write!(f, "UNSPECIFIED"),
        }
    }
}

/// A configured model definition
///
/// One entry in the registry, keyed by a model key such as
/// `AZUREGPTADVANCED`. The `identifier` is the provider-side deployment or
/// model name and is never exposed to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    /// The model provider
    pub provider: ModelProvider,
    /// The variant of the model
    pub variant: ModelVariant,
    /// The family of the model
    #[serde(default)]
    pub family: ModelFamily,
    /// Human-readable description
    #[serde(default)]
    pub description: Option<String>,
    /// Geographic location where the model runs
    pub location: String,
    /// Provider-side model or deployment identifier
    #[serde(skip_serializing)]
    pub identifier: String,
}

/// Immutable registry of configured models, keyed by model key
///
/// # Examples
///
/// ```
/// use parley::models::{Model, ModelFamily, ModelProvider, ModelRegistry, ModelVariant};
///
/// let registry = ModelRegistry::new(vec![(
///     "AZUREGPTGENERAL".to_string(),
///     Model {
///         provider: ModelProvider::Azure,
///         variant: ModelVariant::General,
///         family: ModelFamily::Gpt,
///         description: None,
///         location: "uksouth".to_string(),
///         identifier: "gpt-4o-mini".to_string(),
///     },
/// )]);
/// assert!(registry.get("AZUREGPTGENERAL").is_ok());
/// assert!(registry.get("MISSING").is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: HashMap<String, Model>,
}

impl ModelRegistry {
    /// Builds a registry from `(model_key, model)` pairs
    pub fn new(entries: impl IntoIterator<Item = (String, Model)>) -> Self {
        Self {
            models: entries.into_iter().collect(),
        }
    }

    /// Looks up a model definition by key
    ///
    /// # Errors
    ///
    /// Returns [`ParleyError::ModelKey`] for unknown keys.
    pub fn get(&self, model_key: &str) -> Result<&Model> {
        self.models
            .get(model_key)
            .ok_or_else(|| ParleyError::ModelKey(model_key.to_string()).into())
    }

    /// Returns all configured model keys
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    /// Returns the number of configured models
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Returns true if no models are configured
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// Metadata identifying which provider/model served a conversation
///
/// Immutable once a session starts; re-derived from the model registry on
/// the first message and persisted alongside the message log. The serde
/// field names match the persisted record layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMetadata {
    /// The model provider used for the conversation
    pub provider: ModelProvider,
    /// The model variant used for the conversation
    pub variant: ModelVariant,
    /// The model family used for the conversation
    pub family: ModelFamily,
    /// The model key used with the conversation
    #[serde(rename = "modelKey")]
    pub model_key: String,
    /// Business user associated with the conversation
    pub business_user: String,
}

impl ConversationMetadata {
    /// Derives metadata for a model key from the registry
    ///
    /// # Errors
    ///
    /// Returns [`ParleyError::ModelKey`] if the key is not configured.
    pub fn for_model(
        registry: &ModelRegistry,
        model_key: &str,
        business_user: &str,
    ) -> Result<Self> {
        let model = registry.get(model_key)?;
        Ok(Self {
            provider: model.provider,
            variant: model.variant,
            family: model.family,
            model_key: model_key.to_string(),
            business_user: business_user.to_string(),
        })
    }
}
