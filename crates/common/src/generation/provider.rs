//! Model-serving provider abstraction
//!
//! Provides:
//! - Streaming chat completion trait (answer generation)
//! - Single-shot chat completion trait (coherence judge)
//! - Scripted mock provider for tests and offline runs

use crate::config::GenerationConfig;
use crate::context::{Prompt, RECORD_ID_LABEL, VERBATIM_LABEL};
use crate::errors::{AppError, Result, StreamFailure};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Result type for stream-level operations
pub type StreamResult<T> = std::result::Result<T, StreamFailure>;

/// Ordered provider events for one generation
pub type EventStream = BoxStream<'static, StreamResult<StreamEvent>>;

/// One chat call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub top_p: Option<f32>,
    pub max_tokens: u32,
}

impl ChatRequest {
    /// Request for a rendered answer prompt
    pub fn for_prompt(prompt: &Prompt, config: &GenerationConfig) -> Self {
        Self {
            model: config.model.clone(),
            system: prompt.system.clone(),
            user: prompt.user.clone(),
            temperature: config.temperature,
            top_p: config.top_p,
            max_tokens: config.max_tokens,
        }
    }
}

/// Terminal usage record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Text increment
    Delta(String),
    /// Token usage; arrives after the last increment
    Usage(TokenUsage),
    /// End-of-stream marker
    Done,
}

/// Trait for streaming answer generation
#[async_trait]
pub trait ChatStreamProvider: Send + Sync {
    /// Open a stream of events for one request
    async fn open_stream(&self, request: &ChatRequest) -> StreamResult<EventStream>;

    /// Provider name for logs and metrics
    fn name(&self) -> &str;
}

/// Trait for single-shot completions
#[async_trait]
pub trait ChatCompletionProvider: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<String>;
}

/// One step of a mock stream
#[derive(Debug, Clone, PartialEq)]
pub enum MockStep {
    Event(StreamEvent),
    Fail(StreamFailure),
    /// Never yields; exercises idle timeouts
    Stall,
}

#[derive(Debug, Clone)]
enum MockScript {
    Steps(Vec<MockStep>),
    /// Quote the first sentence of every verbatim field in the prompt
    Grounded,
}

/// Mock provider for testing
#[derive(Debug)]
pub struct MockChatProvider {
    script: MockScript,
    delay: Duration,
    open_failure: Option<StreamFailure>,
    completion: std::result::Result<String, String>,
    calls: AtomicUsize,
}

const MOCK_JUDGE_RESPONSE: &str =
    "SCORE: 4\nREASONING: Mock response - LLM API key not configured. The answer is on topic.";

impl MockChatProvider {
    /// Replay `steps` for every stream
    pub fn scripted(steps: Vec<MockStep>) -> Self {
        Self {
            script: MockScript::Steps(steps),
            delay: Duration::ZERO,
            open_failure: None,
            completion: Ok(MOCK_JUDGE_RESPONSE.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Deltas, then usage, then the end marker
    pub fn from_chunks(chunks: &[&str], usage: TokenUsage) -> Self {
        let mut steps: Vec<MockStep> = chunks
            .iter()
            .map(|c| MockStep::Event(StreamEvent::Delta(c.to_string())))
            .collect();
        steps.push(MockStep::Event(StreamEvent::Usage(usage)));
        steps.push(MockStep::Event(StreamEvent::Done));
        Self::scripted(steps)
    }

    /// Answers from the prompt itself, for offline runs
    pub fn grounded() -> Self {
        Self {
            script: MockScript::Grounded,
            ..Self::scripted(Vec::new())
        }
    }

    /// Sleep before every step
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail every stream before it opens
    pub fn with_open_failure(mut self, failure: StreamFailure) -> Self {
        self.open_failure = Some(failure);
        self
    }

    /// Fixed response for single-shot completions
    pub fn with_completion(mut self, text: impl Into<String>) -> Self {
        self.completion = Ok(text.into());
        self
    }

    /// Fail single-shot completions
    pub fn with_completion_error(mut self, message: impl Into<String>) -> Self {
        self.completion = Err(message.into());
        self
    }

    /// Number of calls made so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn steps_for(&self, request: &ChatRequest) -> Vec<MockStep> {
        match &self.script {
            MockScript::Steps(steps) => steps.clone(),
            MockScript::Grounded => {
                let answer = grounded_answer(&request.user);
                let usage = TokenUsage::new(
                    estimate_tokens(&request.system) + estimate_tokens(&request.user),
                    estimate_tokens(&answer),
                );
                let mut steps: Vec<MockStep> = answer
                    .split_inclusive(' ')
                    .map(|word| MockStep::Event(StreamEvent::Delta(word.to_string())))
                    .collect();
                steps.push(MockStep::Event(StreamEvent::Usage(usage)));
                steps.push(MockStep::Event(StreamEvent::Done));
                steps
            }
        }
    }
}

#[async_trait]
impl ChatStreamProvider for MockChatProvider {
    async fn open_stream(&self, request: &ChatRequest) -> StreamResult<EventStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = &self.open_failure {
            return Err(failure.clone());
        }

        let delay = self.delay;
        let steps = self.steps_for(request);
        let events = stream::unfold(steps.into_iter(), move |mut steps| async move {
            let step = steps.next()?;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let item = match step {
                MockStep::Event(event) => Ok(event),
                MockStep::Fail(failure) => Err(failure),
                MockStep::Stall => {
                    futures::future::pending::<()>().await;
                    return None;
                }
            };
            Some((item, steps))
        });

        Ok(events.boxed())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[async_trait]
impl ChatCompletionProvider for MockChatProvider {
    async fn complete(&self, _request: &ChatRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.completion.clone().map_err(|message| AppError::Provider {
            status: None,
            message,
        })
    }
}

/// Rough token estimate (4 chars per token)
fn estimate_tokens(text: &str) -> u64 {
    (text.len() as u64).div_ceil(4)
}

/// Build an answer quoting the first sentence of each verbatim field
fn grounded_answer(prompt: &str) -> String {
    let mut record_id: Option<&str> = None;
    let mut quotes = Vec::new();

    for line in prompt.lines() {
        if let Some(id) = line.strip_prefix(RECORD_ID_LABEL) {
            record_id = Some(id.trim());
        } else if let Some(verbatim) = line.strip_prefix(VERBATIM_LABEL) {
            let sentence = first_sentence(verbatim);
            if let Some(id) = record_id.take().filter(|_| !sentence.is_empty()) {
                quotes.push(format!("> \"{}\" \u{2014} {}", sentence, id));
            }
        }
    }

    if quotes.is_empty() {
        return "Based on the feedback provided, users raised several related points, \
            but no specific wording stands out."
            .to_string();
    }

    format!(
        "Users describe the following experiences in their own words.\n{}\n",
        quotes.join("\n")
    )
}

fn first_sentence(text: &str) -> &str {
    let text = text.trim();
    match text.find(['.', '!', '?']) {
        Some(end) => &text[..=end],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextRecord, ContextSet, PromptBuilder, PromptMode};

    fn request(user: &str) -> ChatRequest {
        ChatRequest {
            model: "gpt-4o-mini".to_string(),
            system: "system".to_string(),
            user: user.to_string(),
            temperature: 0.6,
            top_p: None,
            max_tokens: 256,
        }
    }

    async fn collect(provider: &MockChatProvider, req: &ChatRequest) -> Vec<StreamResult<StreamEvent>> {
        provider.open_stream(req).await.unwrap().collect().await
    }

    #[tokio::test]
    async fn test_scripted_stream_order() {
        let provider = MockChatProvider::from_chunks(&["Hello", " world"], TokenUsage::new(10, 2));
        let events = collect(&provider, &request("hi")).await;

        assert_eq!(events.len(), 4);
        assert_eq!(events[0], Ok(StreamEvent::Delta("Hello".to_string())));
        assert_eq!(events[2], Ok(StreamEvent::Usage(TokenUsage::new(10, 2))));
        assert_eq!(events[3], Ok(StreamEvent::Done));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_open_failure() {
        let provider = MockChatProvider::scripted(vec![]).with_open_failure(StreamFailure::Provider {
            status: Some(429),
            message: "rate limited".to_string(),
        });
        assert!(provider.open_stream(&request("hi")).await.is_err());
    }

    #[tokio::test]
    async fn test_grounded_answer_quotes_verbatim() {
        let contexts = ContextSet::new(vec![ContextRecord {
            record_id: "r1".to_string(),
            summary_text: "Crashes".to_string(),
            verbatim_text: "The app crashes daily. Please fix it.".to_string(),
            source: "zendesk".to_string(),
            language: "en".to_string(),
        }])
        .unwrap();
        let prompt = PromptBuilder::new().build(PromptMode::Enhanced, "What breaks?", &contexts);
        let req = ChatRequest::for_prompt(&prompt, &GenerationConfig::default());

        let provider = MockChatProvider::grounded();
        let text: String = collect(&provider, &req)
            .await
            .into_iter()
            .filter_map(|e| match e {
                Ok(StreamEvent::Delta(d)) => Some(d),
                _ => None,
            })
            .collect();

        assert!(text.contains("> \"The app crashes daily.\" \u{2014} r1"), "{}", text);
    }

    #[tokio::test]
    async fn test_mock_completion() {
        let provider = MockChatProvider::scripted(vec![]).with_completion("SCORE: 5\nREASONING: fine");
        assert_eq!(provider.complete(&request("q")).await.unwrap(), "SCORE: 5\nREASONING: fine");

        let failing = MockChatProvider::scripted(vec![]).with_completion_error("down");
        assert!(failing.complete(&request("q")).await.is_err());
    }

    #[test]
    fn test_token_usage_total() {
        assert_eq!(TokenUsage::new(120, 30).total(), 150);
    }
}
