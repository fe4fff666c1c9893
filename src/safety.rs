//! Safety signal classification
//!
//! Each provider reports content-filter rejections differently: Azure puts a
//! sentinel finish reason on the terminal chunk (or an error code on a bad
//! request), Vertex attaches per-rating safety annotations, and the rest
//! report nothing this core can interpret. The classifier normalizes all of
//! that to a single monotonic `blocked` flag per invocation.

use crate::models::ModelProvider;
use crate::producer::{CompletionSignal, ProviderError};

/// Finish reason / error code Azure uses for content-policy rejections
const AZURE_CONTENT_FILTER_REASON: &str = "content_filter";

/// Which classification rules apply, chosen from the provider identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClassifierKind {
    /// Inspects the finish reason and provider error codes
    Azure,
    /// Inspects per-rating safety annotations
    Vertex,
    /// Never reports blocked; the conservative default
    Passive,
}

/// Per-invocation classifier converting raw completion and error signals
/// into a boolean "blocked" flag
///
/// Allocated fresh for every invocation and never shared. Once an
/// observation sets the flag, no later observation clears it.
///
/// # Examples
///
/// ```
/// use parley::models::ModelProvider;
/// use parley::producer::CompletionSignal;
/// use parley::safety::SafetyClassifier;
///
/// let mut classifier = SafetyClassifier::for_provider(ModelProvider::Azure);
/// classifier.observe_end(&CompletionSignal {
///     finish_reason: Some("content_filter".to_string()),
///     ..Default::default()
/// });
/// assert!(classifier.is_blocked());
/// ```
#[derive(Debug, Clone)]
pub struct SafetyClassifier {
    kind: ClassifierKind,
    blocked: bool,
}

impl SafetyClassifier {
    /// Selects the classification rules for a provider
    pub fn for_provider(provider: ModelProvider) -> Self {
        let kind = match provider {
            ModelProvider::Azure => ClassifierKind::Azure,
            ModelProvider::Vertex => ClassifierKind::Vertex,
            ModelProvider::Bedrock | ModelProvider::Huggingface => ClassifierKind::Passive,
        };
        Self {
            kind,
            blocked: false,
        }
    }

    /// Observes the terminal completion signal of an invocation
    pub fn observe_end(&mut self, signal: &CompletionSignal) {
        match self.kind {
            ClassifierKind::Azure => {
                if signal.finish_reason.as_deref() == Some(AZURE_CONTENT_FILTER_REASON) {
                    self.blocked = true;
                }
            }
            ClassifierKind::Vertex => {
                if signal.safety_ratings.iter().any(|rating| rating.blocked) {
                    self.blocked = true;
                }
            }
            ClassifierKind::Passive => {}
        }
    }

    /// Observes a provider error raised during an invocation
    pub fn observe_error(&mut self, error: &ProviderError) {
        if self.kind == ClassifierKind::Azure
            && error.code.as_deref() == Some(AZURE_CONTENT_FILTER_REASON)
        {
            self.blocked = true;
        }
    }

    /// Returns whether this invocation has been classified as blocked
    pub fn is_blocked(&self) -> bool {
        self.blocked
    }
}
