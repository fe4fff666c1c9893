//! Usage metrics for LLM invocations
//!
//! Two pieces live here: the per-invocation [`LlmMetricsCounter`], which
//! accumulates token counts and latency for exactly one token producer call,
//! and the [`MetricsService`], which emits counters and histograms through
//! the `metrics` facade with the standard conversation dimensions.
//!
//! Token counting uses a chars/4 heuristic. It is approximate but
//! deterministic for a fixed input, which is all the contract requires.

use crate::models::ConversationMetadata;
use metrics::{histogram, increment_counter};
use std::time::{Duration, Instant};
use tracing::debug;

/// Metric names emitted by the conversation core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    /// Counter of chat requests started or resumed
    ChatRequests,
    /// Histogram of prompt tokens per invocation
    PromptTokens,
    /// Histogram of completion tokens per invocation
    CompletionTokens,
    /// Counter of provider/stream errors
    Errors,
    /// Counter of content-filtered invocations
    ContentFiltered,
    /// Histogram of invocation duration in seconds
    LlmRequestTimer,
}

impl Metric {
    /// Returns the exported metric name
    pub fn name(&self) -> &'static str {
        match self {
            Self::ChatRequests => "chat_requests_counter",
            Self::PromptTokens => "prompt_tokens_counter",
            Self::CompletionTokens => "completion_tokens_counter",
            Self::Errors => "error_code_counter",
            Self::ContentFiltered => "content_filtered_counter",
            Self::LlmRequestTimer => "llm_request_timer",
        }
    }
}

/// Estimates token count for a string using a simple heuristic
///
/// Uses characters / 4, which approximates GPT tokenization for English
/// text. Provider- and model-specific tokenizers can be substituted outside
/// this core; determinism is the only requirement here.
pub fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() + 3) / 4
}

/// Accumulates token counts and latency for one LLM invocation
///
/// Allocated fresh per invocation and never shared. `on_start` records the
/// start timestamp and tokenizes the prompts; `on_end` tokenizes the
/// response fragments and fixes the duration.
///
/// # Examples
///
/// ```
/// use parley::metrics::LlmMetricsCounter;
///
/// let mut counter = LlmMetricsCounter::new();
/// counter.on_start(&["What is the DVLA?".to_string()]);
/// counter.on_end(&["The Driver and Vehicle Licensing Agency.".to_string()]);
/// assert!(counter.input_tokens() > 0);
/// assert!(counter.output_tokens() > 0);
/// ```
#[derive(Debug, Clone)]
pub struct LlmMetricsCounter {
    input_tokens: usize,
    output_tokens: usize,
    start: Instant,
    duration: Option<Duration>,
}

impl Default for LlmMetricsCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl LlmMetricsCounter {
    /// Creates an empty counter
    pub fn new() -> Self {
        Self {
            input_tokens: 0,
            output_tokens: 0,
            start: Instant::now(),
            duration: None,
        }
    }

    /// Records the invocation start: timestamps it and counts prompt tokens
    pub fn on_start(&mut self, prompts: &[String]) {
        for prompt in prompts {
            self.input_tokens += estimate_tokens(prompt);
        }
        self.start = Instant::now();
    }

    /// Records the invocation end: counts completion tokens and fixes the
    /// duration
    ///
    /// Output tokens use last-write semantics per fragment because some
    /// providers emit a single terminal aggregate rather than incremental
    /// counts.
    pub fn on_end(&mut self, fragments: &[String]) {
        for fragment in fragments {
            self.output_tokens = estimate_tokens(fragment);
        }
        let duration = self.start.elapsed();
        self.duration = Some(duration);
        debug!("Request took {} seconds.", duration.as_secs_f64());
    }

    /// Returns the accumulated prompt token count
    pub fn input_tokens(&self) -> usize {
        self.input_tokens
    }

    /// Returns the completion token count
    pub fn output_tokens(&self) -> usize {
        self.output_tokens
    }

    /// Returns the invocation duration in seconds, zero if never ended
    pub fn duration_seconds(&self) -> f64 {
        self.duration.unwrap_or(Duration::ZERO).as_secs_f64()
    }
}

/// Emits conversation metrics with the standard dimensions
///
/// Every record carries `{business_user, environment, provider, family,
/// variant}`. The export backend is whatever recorder the embedding process
/// installs; this core only produces the records.
#[derive(Debug, Clone)]
pub struct MetricsService {
    environment: String,
}

impl MetricsService {
    /// Creates a service tagging records with the given environment name
    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
        }
    }

    /// Increments a counter metric by one
    pub fn increment(&self, metric: Metric, meta: &ConversationMetadata) {
        increment_counter!(
            metric.name(),
            "business_user" => meta.business_user.clone(),
            "environment" => self.environment.clone(),
            "provider" => meta.provider.to_string(),
            "family" => meta.family.to_string(),
            "variant" => meta.variant.to_string()
        );
    }

    /// Records a value on a histogram metric
    pub fn record(&self, metric: Metric, meta: &ConversationMetadata, value: f64) {
        histogram!(
            metric.name(),
            value,
            "business_user" => meta.business_user.clone(),
            "environment" => self.environment.clone(),
            "provider" => meta.provider.to_string(),
            "family" => meta.family.to_string(),
            "variant" => meta.variant.to_string()
        );
    }

    /// Records the token counts and latency of one finished invocation
    pub fn record_llm_metrics(&self, counter: &LlmMetricsCounter, meta: &ConversationMetadata) {
        self.record(Metric::PromptTokens, meta, counter.input_tokens() as f64);
        self.record(
            Metric::CompletionTokens,
            meta,
            counter.output_tokens() as f64,
        );
        self.record(Metric::LlmRequestTimer, meta, counter.duration_seconds());
    }
}

/// Initializes the metrics exporter for Prometheus
///
/// When the `prometheus` feature is enabled, this installs the Prometheus
/// exporter; otherwise it is a no-op and still safe to call.
pub fn init_metrics_exporter() {
    #[cfg(feature = "prometheus")]
    {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let builder = PrometheusBuilder::new();
        let _ = builder.install().map_err(|e| {
            tracing::warn!("Failed to install Prometheus exporter: {}", e);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ModelFamily, ModelProvider, ModelVariant};

    fn meta() -> ConversationMetadata {
        ConversationMetadata {
            provider: ModelProvider::Azure,
            variant: ModelVariant::General,
            family: ModelFamily::Gpt,
            model_key: "AZUREGPTGENERAL".to_string(),
            business_user: "tester".to_string(),
        }
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens("test"), 1);
        assert_eq!(estimate_tokens("hello world"), 3);
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn test_estimate_tokens_deterministic() {
        let text = "the same text every time";
        assert_eq!(estimate_tokens(text), estimate_tokens(text));
    }

    #[test]
    fn test_counter_accumulates_input_tokens() {
        let mut counter = LlmMetricsCounter::new();
        counter.on_start(&["first prompt".to_string(), "second prompt".to_string()]);
        assert_eq!(
            counter.input_tokens(),
            estimate_tokens("first prompt") + estimate_tokens("second prompt")
        );
    }

    #[test]
    fn test_counter_output_tokens_last_write() {
        let mut counter = LlmMetricsCounter::new();
        counter.on_end(&[
            "short".to_string(),
            "a much longer aggregate response fragment".to_string(),
        ]);
        assert_eq!(
            counter.output_tokens(),
            estimate_tokens("a much longer aggregate response fragment")
        );
    }

    #[test]
    fn test_counter_duration_fixed_at_end() {
        let mut counter = LlmMetricsCounter::new();
        counter.on_start(&[]);
        assert_eq!(counter.duration_seconds(), 0.0);
        counter.on_end(&[]);
        assert!(counter.duration_seconds() >= 0.0);
        let fixed = counter.duration_seconds();
        assert_eq!(counter.duration_seconds(), fixed);
    }

    #[test]
    fn test_metric_names() {
        assert_eq!(Metric::ChatRequests.name(), "chat_requests_counter");
        assert_eq!(Metric::Errors.name(), "error_code_counter");
        assert_eq!(Metric::ContentFiltered.name(), "content_filtered_counter");
        assert_eq!(Metric::LlmRequestTimer.name(), "llm_request_timer");
    }

    #[test]
    fn test_metrics_service_emits_without_recorder() {
        // With no recorder installed the macros are no-ops; nothing panics.
        let service = MetricsService::new("test");
        let meta = meta();
        service.increment(Metric::ChatRequests, &meta);
        service.record(Metric::PromptTokens, &meta, 12.0);

        let mut counter = LlmMetricsCounter::new();
        counter.on_start(&["hello".to_string()]);
        counter.on_end(&["world".to_string()]);
        service.record_llm_metrics(&counter, &meta);
    }

    #[test]
    fn test_init_metrics_exporter() {
        init_metrics_exporter();
    }
}
