//! Chat engine: submission, verification, and the exchange driver
//!
//! The engine owns the conversation store and the session-scoped
//! verification state, and exposes the only four mutation entry points:
//! `submit`, `select_conversation`, `new_conversation`, and
//! `confirm_verification`. One exchange is driven at a time per
//! conversation; the presentation layer is expected to hold new submissions
//! while one is in flight.

use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use uuid::Uuid;

use crate::config::prompts::messages;
use crate::config::{Config, ModeId, DEFAULT_MODE};
use crate::conversation::{derive_title, Conversation, Message};
use crate::core::gate::{is_restricted, VerificationState};
use crate::core::reducer::{PartialResult, StreamReducer};
use crate::core::request::build_request;
use crate::core::store::{ConversationStore, ConversationSummary, StoreError};
use crate::providers::{ModelBackend, PartialResultStream};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What happened to a submitted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// The exchange ran to completion (including terminal stream errors,
    /// which land in the transcript rather than here).
    Completed,
    /// The message was deferred pending license verification; nothing was
    /// sent. The collaborator should present the verification prompt.
    VerificationRequired,
}

pub struct ChatEngine {
    config: Config,
    backend: Arc<dyn ModelBackend>,
    store: ConversationStore,
    verification: Mutex<VerificationState>,
    active: Mutex<Option<Uuid>>,
}

impl ChatEngine {
    pub fn new(config: Config, backend: Arc<dyn ModelBackend>) -> Self {
        Self {
            config,
            backend,
            store: ConversationStore::new(),
            verification: Mutex::new(VerificationState::new()),
            active: Mutex::new(None),
        }
    }

    pub async fn new_conversation(&self, mode: Option<ModeId>) -> Conversation {
        let conversation = self.store.create(mode.unwrap_or(DEFAULT_MODE)).await;
        *self.active.lock().await = Some(conversation.id);
        tracing::info!(conversation_id = %conversation.id, "new conversation");
        conversation
    }

    pub async fn select_conversation(&self, id: Uuid) -> Result<(), EngineError> {
        if !self.store.contains(id).await {
            return Err(StoreError::UnknownConversation(id).into());
        }
        *self.active.lock().await = Some(id);
        Ok(())
    }

    /// Read-only sidebar snapshot.
    pub async fn conversations(&self) -> Vec<ConversationSummary> {
        self.store.list().await
    }

    /// Read-only snapshot of one conversation's transcript.
    pub async fn conversation(&self, id: Uuid) -> Result<Conversation, EngineError> {
        Ok(self.store.get(id).await?)
    }

    pub fn revision(&self) -> u64 {
        self.store.revision()
    }

    /// Full-state change notifications, one tick per transcript mutation.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.store.subscribe()
    }

    pub async fn is_verified(&self) -> bool {
        self.verification.lock().await.is_verified()
    }

    /// Submit user text against the active conversation, creating one if
    /// none is active. Restricted text from an unverified user is deferred;
    /// everything else runs a full exchange before returning.
    pub async fn submit(&self, text: &str) -> Result<SubmitOutcome, EngineError> {
        {
            let mut verification = self.verification.lock().await;
            if is_restricted(text) && !verification.is_verified() {
                verification.defer(text);
                tracing::info!("restricted message deferred pending license verification");
                return Ok(SubmitOutcome::VerificationRequired);
            }
        }

        let conversation_id = self.active_or_new().await;
        self.run_exchange(conversation_id, text).await?;
        Ok(SubmitOutcome::Completed)
    }

    /// Confirm license verification. The flag never reverts. A deferred
    /// message, if any, is redispatched exactly once through the internal
    /// dispatch path so the gate cannot re-defer it.
    pub async fn confirm_verification(&self) -> Result<Option<SubmitOutcome>, EngineError> {
        let pending = {
            let mut verification = self.verification.lock().await;
            verification.confirm();
            verification.take_pending()
        };

        match pending {
            Some(text) => {
                tracing::info!("license verified; redispatching deferred message");
                let conversation_id = self.active_or_new().await;
                self.run_exchange(conversation_id, &text).await?;
                Ok(Some(SubmitOutcome::Completed))
            }
            None => Ok(None),
        }
    }

    async fn active_or_new(&self) -> Uuid {
        let mut active = self.active.lock().await;
        if let Some(id) = *active {
            if self.store.contains(id).await {
                return id;
            }
        }
        let conversation = self.store.create(DEFAULT_MODE).await;
        *active = Some(conversation.id);
        conversation.id
    }

    /// Run one exchange end to end. This is the outermost catch: any fault
    /// that escapes the stream's own error channel becomes a final AI
    /// message with the generic apology and never propagates further.
    async fn run_exchange(&self, conversation_id: Uuid, text: &str) -> Result<(), EngineError> {
        if let Err(error) = self.drive_exchange(conversation_id, text).await {
            tracing::error!(%conversation_id, %error, "exchange failed");
            self.store
                .append_message(conversation_id, Message::ai(messages::GENERIC_APOLOGY))
                .await?;
        }
        Ok(())
    }

    async fn drive_exchange(&self, conversation_id: Uuid, text: &str) -> Result<(), StoreError> {
        let conversation = self.store.get(conversation_id).await?;

        if conversation.has_default_title() && !text.is_empty() {
            self.store
                .set_title(conversation_id, derive_title(text))
                .await?;
        }

        // History is the transcript before this submission.
        let history = conversation.messages;
        self.store
            .append_message(conversation_id, Message::user(text))
            .await?;

        let mut stream = self.open_stream(&history, text, conversation.mode).await;

        let mut reducer = StreamReducer::new();
        let mut inflight: Option<Uuid> = None;

        while let Some(result) = stream.next().await {
            let Some(step) = reducer.apply(result) else {
                continue;
            };
            let message_id = match inflight {
                Some(id) => id,
                None => {
                    // First partial result of any kind: append the
                    // placeholder AI message.
                    let placeholder = Message::ai(messages::LOADING_MARKER);
                    let id = placeholder.id;
                    self.store.append_message(conversation_id, placeholder).await?;
                    inflight = Some(id);
                    id
                }
            };
            self.store
                .patch_message(conversation_id, message_id, step.patch)
                .await?;
            if step.done {
                // Remaining stream elements are never consumed.
                break;
            }
        }

        if let Some(message_id) = inflight {
            if let Some(patch) = reducer.finish() {
                self.store
                    .patch_message(conversation_id, message_id, patch)
                    .await?;
            }
        }

        Ok(())
    }

    /// Open the partial-result stream for one exchange. The pre-flight
    /// re-check of the gate guards any path that bypassed the submission
    /// gate; a transport failure at open degrades to a one-element error
    /// stream so the reducer handles every failure shape the same way.
    async fn open_stream(
        &self,
        history: &[Message],
        text: &str,
        mode: ModeId,
    ) -> PartialResultStream {
        if is_restricted(text) && !self.verification.lock().await.is_verified() {
            tracing::warn!("restricted message reached dispatch unverified; refusing call");
            return futures::stream::iter(vec![PartialResult::Error(
                messages::VERIFICATION_REQUIRED.to_string(),
            )])
            .boxed();
        }

        let request = build_request(&self.config.model, history, text, mode, &self.config.language);
        match self.backend.generate_stream(request).await {
            Ok(stream) => stream,
            Err(error) => {
                tracing::warn!(%error, "model call failed");
                futures::stream::iter(vec![PartialResult::Error(
                    messages::TRANSPORT_FAILURE.to_string(),
                )])
                .boxed()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{Citation, Sender, StructuredPayload};
    use crate::providers::{PartialResultStream, ProviderError};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockBackend {
        script: Mutex<VecDeque<Vec<PartialResult>>>,
        calls: AtomicUsize,
    }

    impl MockBackend {
        fn new(script: Vec<Vec<PartialResult>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ModelBackend for MockBackend {
        async fn generate_stream(
            &self,
            _request: crate::core::request::ModelRequest,
        ) -> Result<PartialResultStream, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let events = self.script.lock().await.pop_front().unwrap_or_default();
            Ok(futures::stream::iter(events).boxed())
        }
    }

    struct FailingBackend;

    #[async_trait]
    impl ModelBackend for FailingBackend {
        async fn generate_stream(
            &self,
            _request: crate::core::request::ModelRequest,
        ) -> Result<PartialResultStream, ProviderError> {
            Err(ProviderError::NotConfigured("no key".into()))
        }
    }

    fn test_config() -> Config {
        Config {
            host: "127.0.0.1".into(),
            port: 0,
            gemini_api_key: None,
            gemini_base_url: "http://localhost".into(),
            model: "gemini-2.5-flash".into(),
            language: "English".into(),
        }
    }

    fn chunk(text: &str) -> PartialResult {
        PartialResult::TextChunk(text.to_string())
    }

    #[tokio::test]
    async fn test_exchange_streams_chunks_into_transcript() {
        let backend = MockBackend::new(vec![vec![chunk("Hel"), chunk("lo"), chunk(" world")]]);
        let engine = ChatEngine::new(test_config(), backend.clone());

        let outcome = engine.submit("first case").await.unwrap();
        assert_eq!(outcome, SubmitOutcome::Completed);
        assert_eq!(backend.calls(), 1);

        let conversations = engine.conversations().await;
        assert_eq!(conversations.len(), 1);
        let conversation = engine.conversation(conversations[0].id).await.unwrap();
        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(conversation.messages[0].sender, Sender::User);
        assert_eq!(conversation.messages[1].sender, Sender::Ai);
        assert_eq!(conversation.messages[1].text, "Hello world");
    }

    #[tokio::test]
    async fn test_transcript_is_written_at_least_once_per_chunk() {
        let backend = MockBackend::new(vec![vec![chunk("a"), chunk("b"), chunk("c")]]);
        let engine = ChatEngine::new(test_config(), backend);

        let before = engine.revision();
        engine.submit("case").await.unwrap();
        // conversation + title + user message + placeholder + 3 chunk patches
        assert!(engine.revision() - before >= 7);
    }

    #[tokio::test]
    async fn test_restricted_text_is_deferred_without_a_network_call() {
        let backend = MockBackend::new(vec![vec![chunk("ok")]]);
        let engine = ChatEngine::new(test_config(), backend.clone());

        let outcome = engine.submit("morphine dosage for adults").await.unwrap();
        assert_eq!(outcome, SubmitOutcome::VerificationRequired);
        assert_eq!(backend.calls(), 0);
        assert!(engine.conversations().await.is_empty());
    }

    #[tokio::test]
    async fn test_verification_redispatches_deferred_text_exactly_once() {
        let backend = MockBackend::new(vec![vec![chunk("dosage guidance")]]);
        let engine = ChatEngine::new(test_config(), backend.clone());

        engine.submit("morphine dosage for adults").await.unwrap();
        let outcome = engine.confirm_verification().await.unwrap();
        assert_eq!(outcome, Some(SubmitOutcome::Completed));
        assert_eq!(backend.calls(), 1);

        let conversations = engine.conversations().await;
        let conversation = engine.conversation(conversations[0].id).await.unwrap();
        // The exact deferred text was dispatched.
        assert_eq!(conversation.messages[0].text, "morphine dosage for adults");

        // The pending slot is empty: confirming again redispatches nothing.
        let again = engine.confirm_verification().await.unwrap();
        assert_eq!(again, None);
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_verified_user_is_not_gated() {
        let backend = MockBackend::new(vec![vec![chunk("answer")]]);
        let engine = ChatEngine::new(test_config(), backend.clone());

        engine.confirm_verification().await.unwrap();
        let outcome = engine.submit("fentanyl titration").await.unwrap();
        assert_eq!(outcome, SubmitOutcome::Completed);
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_error_mid_stream_replaces_text_and_stops() {
        let backend = MockBackend::new(vec![vec![
            chunk("some "),
            chunk("text"),
            PartialResult::Error("service unavailable".into()),
            chunk("never consumed"),
        ]]);
        let engine = ChatEngine::new(test_config(), backend);

        engine.submit("case").await.unwrap();
        let conversations = engine.conversations().await;
        let conversation = engine.conversation(conversations[0].id).await.unwrap();
        assert_eq!(conversation.messages[1].text, "service unavailable");
    }

    #[tokio::test]
    async fn test_structured_payload_sets_summary_text() {
        let payload = StructuredPayload::Soap {
            summary: "X".into(),
            subjective: "s".into(),
            objective: "o".into(),
            assessment: "a".into(),
            plan: "p".into(),
        };
        let backend = MockBackend::new(vec![vec![PartialResult::StructuredData(payload.clone())]]);
        let engine = ChatEngine::new(test_config(), backend);

        engine.submit("raw notes").await.unwrap();
        let conversations = engine.conversations().await;
        let conversation = engine.conversation(conversations[0].id).await.unwrap();
        assert_eq!(conversation.messages[1].text, "X");
        assert_eq!(conversation.messages[1].structured, Some(payload));
    }

    #[tokio::test]
    async fn test_late_citations_survive_the_final_write() {
        let sources = vec![Citation {
            uri: "https://mohfw.gov.in".into(),
            title: "MoHFW".into(),
        }];
        let backend = MockBackend::new(vec![vec![
            chunk("Answer"),
            PartialResult::Citations(sources.clone()),
        ]]);
        let engine = ChatEngine::new(test_config(), backend);

        engine.submit("public health question").await.unwrap();
        let conversations = engine.conversations().await;
        let conversation = engine.conversation(conversations[0].id).await.unwrap();
        assert_eq!(conversation.messages[1].text, "Answer");
        assert_eq!(conversation.messages[1].citations, Some(sources));
    }

    #[tokio::test]
    async fn test_transport_failure_becomes_apology_message() {
        let engine = ChatEngine::new(test_config(), Arc::new(FailingBackend));

        let outcome = engine.submit("hello").await.unwrap();
        assert_eq!(outcome, SubmitOutcome::Completed);

        let conversations = engine.conversations().await;
        let conversation = engine.conversation(conversations[0].id).await.unwrap();
        assert_eq!(conversation.messages[1].text, messages::TRANSPORT_FAILURE);

        // The conversation stays usable afterwards.
        assert_eq!(conversation.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_title_derived_from_first_message_only() {
        let backend = MockBackend::new(vec![vec![chunk("a")], vec![chunk("b")]]);
        let engine = ChatEngine::new(test_config(), backend);

        let long = "x".repeat(41);
        engine.submit(&long).await.unwrap();
        let conversations = engine.conversations().await;
        assert_eq!(conversations[0].title, format!("{}...", "x".repeat(40)));

        // Second message leaves the title alone.
        engine.submit("a different question").await.unwrap();
        let conversations = engine.conversations().await;
        assert_eq!(conversations[0].title, format!("{}...", "x".repeat(40)));
    }

    #[tokio::test]
    async fn test_select_conversation_switches_the_active_transcript() {
        let backend = MockBackend::new(vec![vec![chunk("a")], vec![chunk("b")]]);
        let engine = ChatEngine::new(test_config(), backend);

        let first = engine.new_conversation(None).await;
        engine.submit("first question").await.unwrap();

        engine.new_conversation(None).await;
        engine.select_conversation(first.id).await.unwrap();
        engine.submit("second question").await.unwrap();

        let conversation = engine.conversation(first.id).await.unwrap();
        assert_eq!(conversation.messages.len(), 4);

        let missing = engine.select_conversation(Uuid::new_v4()).await;
        assert!(missing.is_err());
    }

    #[tokio::test]
    async fn test_empty_stream_leaves_no_placeholder() {
        let backend = MockBackend::new(vec![vec![]]);
        let engine = ChatEngine::new(test_config(), backend);

        engine.submit("case").await.unwrap();
        let conversations = engine.conversations().await;
        let conversation = engine.conversation(conversations[0].id).await.unwrap();
        // Only the user message; no dangling "..." message.
        assert_eq!(conversation.messages.len(), 1);
    }
}
