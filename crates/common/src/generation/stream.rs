//! Streaming generator
//!
//! Opens a provider stream lazily on the first pull and hands increments
//! to the caller one at a time. Every pull is a suspension point bounded
//! by the idle timeout; there are no retries.

use super::provider::{ChatRequest, ChatStreamProvider, EventStream, StreamEvent};
use super::session::GenerationSession;
use crate::config::GenerationConfig;
use crate::context::Prompt;
use crate::errors::{AppError, Result, StreamFailure};
use crate::limiter::ModelRateLimiter;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Factory for generation streams sharing one provider and limiter
#[derive(Clone)]
pub struct StreamingGenerator {
    provider: Arc<dyn ChatStreamProvider>,
    limiter: ModelRateLimiter,
    config: GenerationConfig,
    idle_timeout: Duration,
}

impl StreamingGenerator {
    pub fn new(
        provider: Arc<dyn ChatStreamProvider>,
        limiter: ModelRateLimiter,
        config: GenerationConfig,
    ) -> Self {
        let idle_timeout = config.idle_timeout();
        Self {
            provider,
            limiter,
            config,
            idle_timeout,
        }
    }

    /// Override the idle timeout from config
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Start a generation; nothing is sent until the first `next_delta`
    pub fn generate(&self, query_id: Uuid, prompt: &Prompt) -> GenerationStream {
        GenerationStream {
            session: GenerationSession::new(query_id, self.config.model.clone()),
            provider: Arc::clone(&self.provider),
            limiter: self.limiter.clone(),
            request: ChatRequest::for_prompt(prompt, &self.config),
            idle_timeout: self.idle_timeout,
            inner: None,
        }
    }
}

/// One in-flight generation; finite and not restartable
pub struct GenerationStream {
    session: GenerationSession,
    provider: Arc<dyn ChatStreamProvider>,
    limiter: ModelRateLimiter,
    request: ChatRequest,
    idle_timeout: Duration,
    inner: Option<EventStream>,
}

impl GenerationStream {
    pub fn session(&self) -> &GenerationSession {
        &self.session
    }

    /// Next text increment.
    ///
    /// `Ok(None)` once the usage signal completed the session (or the
    /// session is already terminal). A failure drops the connection and
    /// carries the text delivered so far.
    pub async fn next_delta(&mut self) -> Result<Option<String>> {
        if self.session.status().is_terminal() {
            return Ok(None);
        }

        if self.inner.is_none() {
            self.limiter.until_ready().await;
            self.session.restart_clock();
            let opened =
                tokio::time::timeout(self.idle_timeout, self.provider.open_stream(&self.request)).await;
            match opened {
                Ok(Ok(events)) => self.inner = Some(events),
                Ok(Err(failure)) => return Err(self.fail(failure)),
                Err(_) => return Err(self.fail(StreamFailure::IdleTimeout(self.idle_timeout))),
            }
        }

        let Some(events) = self.inner.as_mut() else {
            return Ok(None);
        };

        let next = tokio::time::timeout(self.idle_timeout, events.next()).await;
        match next {
            Err(_) => Err(self.fail(StreamFailure::IdleTimeout(self.idle_timeout))),
            Ok(None) | Ok(Some(Ok(StreamEvent::Done))) => Err(self.fail(StreamFailure::Truncated)),
            Ok(Some(Err(failure))) => Err(self.fail(failure)),
            Ok(Some(Ok(StreamEvent::Delta(text)))) => {
                self.session.record_delta(&text);
                Ok(Some(text))
            }
            Ok(Some(Ok(StreamEvent::Usage(usage)))) => {
                self.session.complete(usage);
                self.inner = None;
                tracing::debug!(
                    query_id = %self.session.query_id(),
                    chunks = self.session.chunk_count(),
                    input_tokens = usage.input_tokens,
                    output_tokens = usage.output_tokens,
                    "Generation completed"
                );
                Ok(None)
            }
        }
    }

    /// Stop consuming; releases the connection and marks the session cancelled
    pub fn cancel(mut self) -> GenerationSession {
        self.inner = None;
        if self.session.cancel() {
            tracing::debug!(
                query_id = %self.session.query_id(),
                chunks = self.session.chunk_count(),
                "Generation cancelled"
            );
        }
        self.session
    }

    /// Finished session; a session that never reached a terminal state is cancelled
    pub fn into_session(self) -> GenerationSession {
        self.cancel()
    }

    fn fail(&mut self, failure: StreamFailure) -> AppError {
        self.inner = None;
        self.session.fail(failure.clone());
        tracing::warn!(
            query_id = %self.session.query_id(),
            chunks = self.session.chunk_count(),
            error = %failure,
            "Generation stream failed"
        );
        AppError::Stream {
            kind: failure,
            partial_text: self.session.text().to_string(),
            chunks: self.session.chunk_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextSet, PromptBuilder, PromptMode};
    use crate::generation::provider::{MockChatProvider, MockStep, StreamResult, TokenUsage};
    use crate::generation::session::SessionStatus;

    fn prompt() -> Prompt {
        PromptBuilder::new().build(PromptMode::Baseline, "What do users say?", &ContextSet::default())
    }

    fn generator(provider: MockChatProvider) -> StreamingGenerator {
        StreamingGenerator::new(
            Arc::new(provider),
            ModelRateLimiter::disabled(),
            GenerationConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_stream_to_completion() {
        let gen = generator(MockChatProvider::from_chunks(&["Users ", "report ", "crashes."], TokenUsage::new(50, 3)));
        let mut stream = gen.generate(Uuid::new_v4(), &prompt());

        let mut deltas = Vec::new();
        while let Some(delta) = stream.next_delta().await.unwrap() {
            deltas.push(delta);
        }
        let session = stream.into_session();

        assert_eq!(deltas, vec!["Users ", "report ", "crashes."]);
        assert_eq!(session.status(), SessionStatus::Completed);
        assert_eq!(session.text(), "Users report crashes.");
        assert_eq!(session.usage(), Some(TokenUsage::new(50, 3)));
        assert!(session.time_to_first_token() <= session.total_time());
    }

    #[tokio::test]
    async fn test_cancel_after_second_increment() {
        let gen = generator(MockChatProvider::from_chunks(&["one ", "two ", "three ", "four"], TokenUsage::new(50, 4)));
        let mut stream = gen.generate(Uuid::new_v4(), &prompt());

        let mut deltas = Vec::new();
        while let Some(delta) = stream.next_delta().await.unwrap() {
            deltas.push(delta);
            if deltas.len() == 2 {
                break;
            }
        }
        let session = stream.cancel();

        assert_eq!(deltas, vec!["one ", "two "]);
        assert_eq!(session.status(), SessionStatus::Cancelled);
        assert_eq!(session.text(), "one two ");
        assert!(session.usage().is_none());
        assert!(session.total_time().is_none());
    }

    #[tokio::test]
    async fn test_provider_error_keeps_partial_text() {
        let provider = MockChatProvider::scripted(vec![
            MockStep::Event(StreamEvent::Delta("Users ".to_string())),
            MockStep::Fail(StreamFailure::Transport("connection reset".to_string())),
        ]);
        let gen = generator(provider);
        let mut stream = gen.generate(Uuid::new_v4(), &prompt());

        assert_eq!(stream.next_delta().await.unwrap().as_deref(), Some("Users "));
        let err = stream.next_delta().await.unwrap_err();
        assert_eq!(err.partial_text(), Some("Users "));
        assert!(matches!(err, AppError::Stream { chunks: 1, .. }));

        // Terminal: no more increments, state unchanged
        assert_eq!(stream.next_delta().await.unwrap(), None);
        let session = stream.into_session();
        assert_eq!(session.status(), SessionStatus::Failed);
        assert!(session.usage().is_none());
    }

    #[tokio::test]
    async fn test_stream_without_usage_is_truncated() {
        let provider = MockChatProvider::scripted(vec![
            MockStep::Event(StreamEvent::Delta("half".to_string())),
            MockStep::Event(StreamEvent::Done),
        ]);
        let mut stream = generator(provider).generate(Uuid::new_v4(), &prompt());

        stream.next_delta().await.unwrap();
        let err = stream.next_delta().await.unwrap_err();
        assert!(matches!(err, AppError::Stream { kind: StreamFailure::Truncated, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_stream_times_out() {
        let provider = MockChatProvider::scripted(vec![
            MockStep::Event(StreamEvent::Delta("first".to_string())),
            MockStep::Stall,
        ]);
        let gen = generator(provider).with_idle_timeout(Duration::from_secs(5));
        let mut stream = gen.generate(Uuid::new_v4(), &prompt());

        stream.next_delta().await.unwrap();
        let err = stream.next_delta().await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Stream { kind: StreamFailure::IdleTimeout(_), .. }
        ));
        assert_eq!(stream.session().status(), SessionStatus::Failed);
    }

    /// Provider whose stream never opens
    struct HangingProvider;

    #[async_trait::async_trait]
    impl ChatStreamProvider for HangingProvider {
        async fn open_stream(&self, _request: &ChatRequest) -> StreamResult<EventStream> {
            futures::future::pending().await
        }

        fn name(&self) -> &str {
            "hanging"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_that_never_opens_times_out() {
        let gen = StreamingGenerator::new(
            Arc::new(HangingProvider),
            ModelRateLimiter::disabled(),
            GenerationConfig::default(),
        )
        .with_idle_timeout(Duration::from_secs(5));
        let mut stream = gen.generate(Uuid::new_v4(), &prompt());

        let err = stream.next_delta().await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Stream { kind: StreamFailure::IdleTimeout(after), chunks: 0, .. }
                if after == Duration::from_secs(5)
        ));

        let session = stream.session();
        assert_eq!(session.status(), SessionStatus::Failed);
        assert!(session.time_to_first_token().is_none());
        assert!(matches!(session.failure(), Some(StreamFailure::IdleTimeout(_))));
        assert_eq!(stream.next_delta().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_open_failure_fails_from_init() {
        let provider = MockChatProvider::scripted(vec![]).with_open_failure(StreamFailure::Provider {
            status: Some(401),
            message: "invalid api key".to_string(),
        });
        let mut stream = generator(provider).generate(Uuid::new_v4(), &prompt());

        let err = stream.next_delta().await.unwrap_err();
        assert_eq!(err.partial_text(), Some(""));
        assert_eq!(stream.session().status(), SessionStatus::Failed);
        assert!(stream.session().time_to_first_token().is_none());
    }

    #[tokio::test]
    async fn test_generate_is_lazy() {
        let provider = Arc::new(MockChatProvider::from_chunks(&["x"], TokenUsage::new(1, 1)));
        let gen = StreamingGenerator::new(provider.clone(), ModelRateLimiter::disabled(), GenerationConfig::default());

        let stream = gen.generate(Uuid::new_v4(), &prompt());
        assert_eq!(provider.calls(), 0);
        let session = stream.into_session();
        assert_eq!(session.status(), SessionStatus::Cancelled);
    }
}
