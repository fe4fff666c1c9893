//! Conversation lifecycle and invocation driving
//!
//! [`ConversationService`] owns the model registry, the prompt library, the
//! configured token producers, and the choice of history backend. Starting or
//! resuming a conversation binds all of those into an [`Invocation`]: a fully
//! prepared, not-yet-run turn. Driving the invocation yields the
//! `(content, status)` stream the [`crate::stream`] multiplexer negotiates
//! into one committed response.

use crate::error::{ParleyError, Result};
use crate::history::{ChatHistory, FileChatHistory, RemoteChatHistory, RemoteDocumentStore};
use crate::message::{ChatMessage, MessageContent};
use crate::metrics::{LlmMetricsCounter, Metric, MetricsService};
use crate::models::{ConversationMetadata, Model, ModelProvider, ModelRegistry, DEFAULT_MODEL_KEY};
use crate::producer::{ProducerEvent, TokenProducer};
use crate::prompts::{PromptLibrary, DEFAULT_PROMPT_ID, INPUT_VARIABLE};
use crate::safety::SafetyClassifier;
use crate::settings::Settings;
use futures::stream::{BoxStream, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Instruction prepended to every new conversation
pub const SYSTEM_MESSAGE: &str = "You are a helpful AI bot, gifted at answering questions.";

/// Body returned when an invocation is classified as blocked
pub const BLOCKED_CONTENT_RESPONSE: &str =
    "Your request was blocked due to content filtering. Please modify your prompt and retry.";

/// One turn's worth of caller input
#[derive(Debug, Clone, Default)]
pub struct ConversationCall {
    /// Business user the conversation belongs to
    pub business_user: String,
    /// Model key; [`DEFAULT_MODEL_KEY`] when absent
    pub model_key: Option<String>,
    /// Prompt id; the reserved id `default` when absent
    pub prompt_id: Option<String>,
    /// Values for the prompt's placeholders
    pub variables: HashMap<String, String>,
    /// The caller's message for this turn
    pub input: MessageContent,
}

/// Orchestrates conversations across providers and history backends
///
/// Built once at startup from settings, the model registry, one token
/// producer per configured provider, and the prompt library. All state that
/// varies per invocation lives in the [`Invocation`] it hands out.
pub struct ConversationService {
    settings: Settings,
    registry: ModelRegistry,
    producers: HashMap<ModelProvider, Arc<dyn TokenProducer>>,
    prompts: PromptLibrary,
    metrics: MetricsService,
    store: Option<Arc<RemoteDocumentStore>>,
}

impl ConversationService {
    /// Creates the service from its configured collaborators
    pub fn new(
        settings: Settings,
        registry: ModelRegistry,
        producers: HashMap<ModelProvider, Arc<dyn TokenProducer>>,
        prompts: PromptLibrary,
    ) -> Self {
        let metrics = MetricsService::new(settings.environment.clone());
        let store = settings
            .remote
            .as_ref()
            .map(|remote| Arc::new(RemoteDocumentStore::new(remote)));
        if store.is_some() {
            info!("Using remote document store for chat history");
        } else {
            info!(
                "Using file chat history under {}",
                settings.chat_history_dir.display()
            );
        }
        Self {
            settings,
            registry,
            producers,
            prompts,
            metrics,
            store,
        }
    }

    /// Derives conversation metadata for a caller-supplied model key
    ///
    /// # Errors
    ///
    /// Returns [`ParleyError::ModelKey`] for an unconfigured key.
    pub fn metadata_for(
        &self,
        model_key: Option<&str>,
        business_user: &str,
    ) -> Result<ConversationMetadata> {
        let model_key = model_key.unwrap_or(DEFAULT_MODEL_KEY);
        ConversationMetadata::for_model(&self.registry, model_key, business_user)
    }

    /// Starts a new conversation and binds its first turn
    ///
    /// Allocates a fresh conversation id, resolves the model and prompt, and
    /// prepares the payload: the system message followed by the rendered
    /// caller input.
    ///
    /// # Errors
    ///
    /// Fails on an unknown model key, an unknown prompt id, a missing prompt
    /// variable, an unconfigured provider, or a history backend failure.
    pub async fn start(&self, call: ConversationCall) -> Result<Invocation> {
        let conversation_id = Uuid::new_v4().to_string();
        debug!("Starting conversation {conversation_id}");

        let metadata = self.metadata_for(call.model_key.as_deref(), &call.business_user)?;
        let model = self.registry.get(&metadata.model_key)?.clone();
        let producer = self.producer_for(metadata.provider)?;
        let human = self.render_input(&call)?;
        let history = self
            .history_for(&conversation_id, &call.business_user, Some(metadata.clone()))
            .await?;

        self.metrics.increment(Metric::ChatRequests, &metadata);

        let payload = vec![ChatMessage::system(SYSTEM_MESSAGE), human.clone()];
        Ok(Invocation {
            conversation_id,
            metadata,
            model,
            producer,
            payload,
            human,
            history,
            metrics: self.metrics.clone(),
        })
    }

    /// Resumes an existing conversation and binds its next turn
    ///
    /// Metadata stored with the conversation wins over the caller's model
    /// key, so a session never silently switches providers mid-flight. The
    /// payload replays the full stored log between the system message and
    /// the new caller input.
    ///
    /// # Errors
    ///
    /// Returns [`ParleyError::NoConversation`] when no messages are stored
    /// for the id.
    pub async fn resume(&self, conversation_id: &str, call: ConversationCall) -> Result<Invocation> {
        debug!("Resuming conversation {conversation_id}");
        let history = self
            .history_for(conversation_id, &call.business_user, None)
            .await?;
        if history.messages().is_empty() {
            return Err(ParleyError::NoConversation(conversation_id.to_string()).into());
        }

        let metadata = match history.metadata() {
            Some(metadata) => metadata.clone(),
            None => self.metadata_for(call.model_key.as_deref(), &call.business_user)?,
        };
        let model = self.registry.get(&metadata.model_key)?.clone();
        let producer = self.producer_for(metadata.provider)?;
        let human = self.render_input(&call)?;

        self.metrics.increment(Metric::ChatRequests, &metadata);

        let mut payload = Vec::with_capacity(history.messages().len() + 2);
        payload.push(ChatMessage::system(SYSTEM_MESSAGE));
        payload.extend_from_slice(history.messages());
        payload.push(human.clone());

        Ok(Invocation {
            conversation_id: conversation_id.to_string(),
            metadata,
            model,
            producer,
            payload,
            human,
            history,
            metrics: self.metrics.clone(),
        })
    }

    /// Returns the stored message log for a conversation
    ///
    /// # Errors
    ///
    /// Returns [`ParleyError::NoConversation`] when nothing is stored.
    pub async fn history(
        &self,
        conversation_id: &str,
        business_user: &str,
    ) -> Result<Vec<ChatMessage>> {
        let history = self
            .history_for(conversation_id, business_user, None)
            .await?;
        if history.messages().is_empty() {
            return Err(ParleyError::NoConversation(conversation_id.to_string()).into());
        }
        Ok(history.messages().to_vec())
    }

    /// Ends a conversation, removing its stored record
    ///
    /// # Errors
    ///
    /// Returns [`ParleyError::NoConversation`] when nothing is stored.
    pub async fn end(&self, conversation_id: &str, business_user: &str) -> Result<()> {
        let mut history = self
            .history_for(conversation_id, business_user, None)
            .await?;
        if history.messages().is_empty() {
            return Err(ParleyError::NoConversation(conversation_id.to_string()).into());
        }
        history.clear().await
    }

    /// Removes `pairs` human/AI exchanges from the tail of a conversation
    ///
    /// # Errors
    ///
    /// Returns [`ParleyError::NoConversation`] for an empty conversation and
    /// [`ParleyError::InvalidParams`] for an out-of-range pair count or a
    /// malformed log.
    pub async fn delete_history(
        &self,
        conversation_id: &str,
        business_user: &str,
        pairs: i64,
    ) -> Result<()> {
        let mut history = self
            .history_for(conversation_id, business_user, None)
            .await?;
        history.delete(pairs).await
    }

    /// Lists the input variables of every configured prompt
    pub fn describe_prompts(&self) -> HashMap<String, Vec<String>> {
        self.prompts.describe()
    }

    fn producer_for(&self, provider: ModelProvider) -> Result<Arc<dyn TokenProducer>> {
        self.producers.get(&provider).cloned().ok_or_else(|| {
            ParleyError::Provider(format!("No token producer configured for {provider}")).into()
        })
    }

    fn render_input(&self, call: &ConversationCall) -> Result<ChatMessage> {
        let prompt_id = call.prompt_id.as_deref().unwrap_or(DEFAULT_PROMPT_ID);
        match self.prompts.resolve(prompt_id)? {
            Some(template) => {
                let mut variables = call.variables.clone();
                variables.insert(INPUT_VARIABLE.to_string(), call.input.as_text());
                Ok(ChatMessage::human(template.render(&variables)?))
            }
            None => Ok(ChatMessage::human(call.input.clone())),
        }
    }

    async fn history_for(
        &self,
        conversation_id: &str,
        business_user: &str,
        metadata: Option<ConversationMetadata>,
    ) -> Result<Box<dyn ChatHistory>> {
        match &self.store {
            Some(store) => Ok(Box::new(
                RemoteChatHistory::load(store.clone(), conversation_id, business_user, metadata)
                    .await?,
            )),
            None => Ok(Box::new(
                FileChatHistory::load(
                    &self.settings.chat_history_dir,
                    conversation_id,
                    business_user,
                    metadata,
                )
                .await?,
            )),
        }
    }
}

/// A fully bound, not-yet-run conversation turn
///
/// Owns everything one invocation needs: the producer, the message payload,
/// the history handle, and fresh per-invocation safety and metrics state.
/// [`Invocation::stream_reply`] consumes it.
pub struct Invocation {
    conversation_id: String,
    metadata: ConversationMetadata,
    model: Model,
    producer: Arc<dyn TokenProducer>,
    payload: Vec<ChatMessage>,
    human: ChatMessage,
    history: Box<dyn ChatHistory>,
    metrics: MetricsService,
}

impl std::fmt::Debug for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invocation")
            .field("conversation_id", &self.conversation_id)
            .field("metadata", &self.metadata)
            .field("model", &self.model)
            .field("payload", &self.payload)
            .field("human", &self.human)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl Invocation {
    /// The id of the conversation this turn belongs to
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Metadata identifying the provider/model serving this turn
    pub fn metadata(&self) -> &ConversationMetadata {
        &self.metadata
    }

    /// Runs the invocation, yielding `(content, status)` elements
    ///
    /// Content deltas arrive with status 200. A provider error terminates
    /// the sequence with a single element: the blocked-content body with 400
    /// when the safety classifier attributes the error to content filtering,
    /// otherwise the error message with 500. On success the human/AI
    /// exchange is appended to the history and usage metrics are recorded;
    /// a persistence failure after streaming surfaces as a final 500
    /// element, which the status negotiation turns into body truncation.
    ///
    /// Dropping the returned stream cancels the invocation; a cancelled or
    /// failed turn is never persisted.
    pub fn stream_reply(self) -> BoxStream<'static, (String, u16)> {
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(self.drive(tx));
        ReceiverStream::new(rx).boxed()
    }

    async fn drive(mut self, tx: mpsc::Sender<(String, u16)>) {
        let mut counter = LlmMetricsCounter::new();
        let mut classifier = SafetyClassifier::for_provider(self.metadata.provider);

        let prompts: Vec<String> = self
            .payload
            .iter()
            .map(|message| message.content.as_text())
            .collect();
        counter.on_start(&prompts);

        let mut events = match self.producer.produce(&self.payload, &self.model).await {
            Ok(events) => events,
            Err(e) => {
                error!("Failed to start invocation for {}: {e}", self.conversation_id);
                self.metrics.increment(Metric::Errors, &self.metadata);
                let _ = tx.send((e.to_string(), 500)).await;
                return;
            }
        };

        let mut response = String::new();
        while let Some(event) = events.next().await {
            match event {
                Ok(ProducerEvent::Delta(content)) => {
                    response.push_str(&content);
                    if tx.send((content, 200)).await.is_err() {
                        // Receiver dropped: cancelled, nothing is persisted.
                        debug!("Invocation for {} cancelled", self.conversation_id);
                        return;
                    }
                }
                Ok(ProducerEvent::Completed(signal)) => {
                    classifier.observe_end(&signal);
                    let fragments = if signal.output.is_empty() {
                        vec![response.clone()]
                    } else {
                        signal.output
                    };
                    counter.on_end(&fragments);
                }
                Err(e) => {
                    classifier.observe_error(&e);
                    if classifier.is_blocked() {
                        info!(
                            "Invocation for {} blocked by content filtering",
                            self.conversation_id
                        );
                        self.metrics
                            .increment(Metric::ContentFiltered, &self.metadata);
                        let _ = tx.send((BLOCKED_CONTENT_RESPONSE.to_string(), 400)).await;
                    } else {
                        error!("Invocation for {} failed: {e}", self.conversation_id);
                        self.metrics.increment(Metric::Errors, &self.metadata);
                        let _ = tx.send((e.to_string(), 500)).await;
                    }
                    self.metrics.record_llm_metrics(&counter, &self.metadata);
                    return;
                }
            }
        }

        if classifier.is_blocked() {
            info!(
                "Invocation for {} blocked by content filtering",
                self.conversation_id
            );
            self.metrics
                .increment(Metric::ContentFiltered, &self.metadata);
            let _ = tx.send((BLOCKED_CONTENT_RESPONSE.to_string(), 400)).await;
            self.metrics.record_llm_metrics(&counter, &self.metadata);
            return;
        }

        let ai = ChatMessage::ai(response);
        let persisted = async {
            self.history.add_message(self.human.clone()).await?;
            self.history.add_message(ai).await
        }
        .await;
        if let Err(e) = persisted {
            error!(
                "Failed to persist conversation {}: {e}",
                self.conversation_id
            );
            self.metrics.increment(Metric::Errors, &self.metadata);
            let _ = tx.send((e.to_string(), 500)).await;
        }

        self.metrics.record_llm_metrics(&counter, &self.metadata);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ModelFamily, ModelVariant};
    use crate::producer::{CompletionSignal, ProviderError, TokenStream};
    use crate::prompts::PromptTemplate;
    use async_trait::async_trait;
    use futures::stream;
    use tempfile::TempDir;

    /// Producer that replays a scripted event sequence
    struct ScriptedProducer {
        script: Vec<std::result::Result<ProducerEvent, ProviderError>>,
    }

    #[async_trait]
    impl TokenProducer for ScriptedProducer {
        async fn produce(&self, _messages: &[ChatMessage], _model: &Model) -> Result<TokenStream> {
            Ok(stream::iter(self.script.clone()).boxed())
        }
    }

    fn registry() -> ModelRegistry {
        ModelRegistry::new(vec![(
            "AZUREGPTGENERAL".to_string(),
            Model {
                provider: ModelProvider::Azure,
                variant: ModelVariant::General,
                family: ModelFamily::Gpt,
                description: None,
                location: "uksouth".to_string(),
                identifier: "gpt-4o-mini".to_string(),
            },
        )])
    }

    fn service(
        dir: &TempDir,
        script: Vec<std::result::Result<ProducerEvent, ProviderError>>,
    ) -> ConversationService {
        let settings = Settings {
            environment: "test".to_string(),
            chat_history_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let mut producers: HashMap<ModelProvider, Arc<dyn TokenProducer>> = HashMap::new();
        producers.insert(ModelProvider::Azure, Arc::new(ScriptedProducer { script }));
        let prompts = PromptLibrary::new(vec![(
            "joke".to_string(),
            PromptTemplate::new("Tell me a {joke_type} joke about {input}"),
        )]);
        ConversationService::new(settings, registry(), producers, prompts)
    }

    fn call(input: &str) -> ConversationCall {
        ConversationCall {
            business_user: "tester".to_string(),
            input: MessageContent::Text(input.to_string()),
            ..Default::default()
        }
    }

    fn success_script(chunks: &[&str]) -> Vec<std::result::Result<ProducerEvent, ProviderError>> {
        let mut script: Vec<_> = chunks
            .iter()
            .map(|c| Ok(ProducerEvent::Delta(c.to_string())))
            .collect();
        script.push(Ok(ProducerEvent::Completed(CompletionSignal {
            finish_reason: Some("stop".to_string()),
            ..Default::default()
        })));
        script
    }

    async fn collect(invocation: Invocation) -> Vec<(String, u16)> {
        invocation.stream_reply().collect().await
    }

    #[tokio::test]
    async fn test_start_prepends_system_message() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, success_script(&["hi"]));
        let invocation = service.start(call("hello")).await.unwrap();
        assert_eq!(invocation.payload.len(), 2);
        assert_eq!(
            invocation.payload[0],
            ChatMessage::system(SYSTEM_MESSAGE)
        );
        assert_eq!(invocation.payload[1], ChatMessage::human("hello"));
    }

    #[tokio::test]
    async fn test_start_renders_prompt_template() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, success_script(&["ha"]));
        let mut call = call("Birds");
        call.prompt_id = Some("joke".to_string());
        call.variables
            .insert("joke_type".to_string(), "Dad".to_string());
        let invocation = service.start(call).await.unwrap();
        assert_eq!(
            invocation.payload[1],
            ChatMessage::human("Tell me a Dad joke about Birds")
        );
    }

    #[tokio::test]
    async fn test_start_unknown_prompt_fails() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, success_script(&[]));
        let mut call = call("hello");
        call.prompt_id = Some("limerick".to_string());
        let err = service.start(call).await.unwrap_err();
        assert_eq!(err.to_string(), "No prompt found for limerick");
    }

    #[tokio::test]
    async fn test_start_unknown_model_key_fails() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, success_script(&[]));
        let mut call = call("hello");
        call.model_key = Some("NOPE".to_string());
        let err = service.start(call).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid model key NOPE");
    }

    #[tokio::test]
    async fn test_successful_turn_streams_and_persists() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, success_script(&["Hello", " there"]));
        let invocation = service.start(call("hi")).await.unwrap();
        let conversation_id = invocation.conversation_id().to_string();

        let elements = collect(invocation).await;
        assert_eq!(
            elements,
            vec![("Hello".to_string(), 200), (" there".to_string(), 200)]
        );

        let stored = service.history(&conversation_id, "tester").await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0], ChatMessage::human("hi"));
        assert_eq!(stored[1], ChatMessage::ai("Hello there"));
    }

    #[tokio::test]
    async fn test_provider_error_yields_500_and_skips_persist() {
        let dir = TempDir::new().unwrap();
        let service = service(
            &dir,
            vec![Err(ProviderError::message("connection reset"))],
        );
        let invocation = service.start(call("hi")).await.unwrap();
        let conversation_id = invocation.conversation_id().to_string();

        let elements = collect(invocation).await;
        assert_eq!(elements, vec![("connection reset".to_string(), 500)]);

        let err = service.history(&conversation_id, "tester").await.unwrap_err();
        assert!(err.to_string().contains("No conversation found"));
    }

    #[tokio::test]
    async fn test_content_filter_error_yields_400() {
        let dir = TempDir::new().unwrap();
        let service = service(
            &dir,
            vec![Err(ProviderError::coded("content_filter", "filtered"))],
        );
        let invocation = service.start(call("hi")).await.unwrap();
        let elements = collect(invocation).await;
        assert_eq!(
            elements,
            vec![(BLOCKED_CONTENT_RESPONSE.to_string(), 400)]
        );
    }

    #[tokio::test]
    async fn test_blocked_finish_reason_yields_400_and_skips_persist() {
        let dir = TempDir::new().unwrap();
        let service = service(
            &dir,
            vec![Ok(ProducerEvent::Completed(CompletionSignal {
                finish_reason: Some("content_filter".to_string()),
                ..Default::default()
            }))],
        );
        let invocation = service.start(call("hi")).await.unwrap();
        let conversation_id = invocation.conversation_id().to_string();

        let elements = collect(invocation).await;
        assert_eq!(
            elements,
            vec![(BLOCKED_CONTENT_RESPONSE.to_string(), 400)]
        );
        assert!(service.history(&conversation_id, "tester").await.is_err());
    }

    #[tokio::test]
    async fn test_resume_replays_stored_log() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, success_script(&["second answer"]));
        let invocation = service.start(call("first question")).await.unwrap();
        let conversation_id = invocation.conversation_id().to_string();
        let _ = collect(invocation).await;

        let resumed = service
            .resume(&conversation_id, call("second question"))
            .await
            .unwrap();
        // System, stored human/AI pair, and the new human message.
        assert_eq!(resumed.payload.len(), 4);
        assert_eq!(
            resumed.payload.last(),
            Some(&ChatMessage::human("second question"))
        );
        assert_eq!(resumed.metadata().model_key, "AZUREGPTGENERAL");
    }

    #[tokio::test]
    async fn test_resume_unknown_conversation_fails() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, success_script(&[]));
        let err = service
            .resume("missing-id", call("hello"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No conversation found for missing-id");
    }

    #[tokio::test]
    async fn test_end_removes_conversation() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, success_script(&["answer"]));
        let invocation = service.start(call("question")).await.unwrap();
        let conversation_id = invocation.conversation_id().to_string();
        let _ = collect(invocation).await;

        service.end(&conversation_id, "tester").await.unwrap();
        assert!(service.history(&conversation_id, "tester").await.is_err());
    }

    #[tokio::test]
    async fn test_delete_history_trims_pairs() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, success_script(&["a1"]));
        let invocation = service.start(call("q1")).await.unwrap();
        let conversation_id = invocation.conversation_id().to_string();
        let _ = collect(invocation).await;

        let invocation = service
            .resume(&conversation_id, call("q2"))
            .await
            .unwrap();
        let _ = collect(invocation).await;

        let stored = service.history(&conversation_id, "tester").await.unwrap();
        assert_eq!(stored.len(), 4);

        service
            .delete_history(&conversation_id, "tester", 1)
            .await
            .unwrap();
        let stored = service.history(&conversation_id, "tester").await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0], ChatMessage::human("q1"));
    }

    #[tokio::test]
    async fn test_end_unknown_conversation_fails() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, success_script(&[]));
        let err = service.end("missing-id", "tester").await.unwrap_err();
        assert_eq!(err.to_string(), "No conversation found for missing-id");
    }

    #[tokio::test]
    async fn test_metadata_for_default_key() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, success_script(&[]));
        let metadata = service.metadata_for(None, "tester").unwrap();
        assert_eq!(metadata.model_key, DEFAULT_MODEL_KEY);
        assert_eq!(metadata.provider, ModelProvider::Azure);
    }
}
