//! Streaming answer generation
//!
//! Provides:
//! - Provider traits for streamed and single-shot chat completions
//! - OpenAI-compatible SSE client and a scripted mock
//! - Generation session state machine with TTFT/total timing
//! - Streaming generator with idle timeout and cancellation

mod openai;
mod provider;
mod session;
mod stream;

use crate::config::GenerationConfig;
use crate::errors::Result;
use std::sync::Arc;

pub use openai::{OpenAiChatClient, SseDecoder};
pub use provider::{
    ChatCompletionProvider, ChatRequest, ChatStreamProvider, EventStream, MockChatProvider,
    MockStep, StreamEvent, StreamResult, TokenUsage,
};
pub use session::{GenerationSession, SessionStatus};
pub use stream::{GenerationStream, StreamingGenerator};

/// One provider seen through both call shapes
#[derive(Clone)]
pub struct ChatBackend {
    pub stream: Arc<dyn ChatStreamProvider>,
    pub completion: Arc<dyn ChatCompletionProvider>,
}

impl ChatBackend {
    pub fn mock(provider: MockChatProvider) -> Self {
        let provider = Arc::new(provider);
        Self {
            stream: provider.clone(),
            completion: provider,
        }
    }

    pub fn name(&self) -> &str {
        self.stream.name()
    }
}

/// Create the chat backend based on configuration
pub fn create_chat_backend(config: &GenerationConfig) -> Result<ChatBackend> {
    let api_key = config.api_key.as_deref().filter(|k| !k.trim().is_empty());

    match (config.provider.as_str(), api_key) {
        ("openai", Some(key)) => {
            let client = Arc::new(OpenAiChatClient::new(
                key.to_string(),
                config.api_base.clone(),
                config.connect_timeout(),
            )?);
            Ok(ChatBackend {
                stream: client.clone(),
                completion: client,
            })
        }
        ("openai", None) => {
            tracing::warn!("LLM API key not configured, using grounded mock provider");
            Ok(ChatBackend::mock(MockChatProvider::grounded()))
        }
        ("mock", _) => Ok(ChatBackend::mock(MockChatProvider::grounded())),
        (provider, _) => {
            tracing::warn!(provider = provider, "Unknown chat provider, using mock");
            Ok(ChatBackend::mock(MockChatProvider::grounded()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_falls_back_to_mock() {
        let config = GenerationConfig {
            api_key: Some(String::new()),
            ..GenerationConfig::default()
        };
        assert_eq!(create_chat_backend(&config).unwrap().name(), "mock");
    }

    #[test]
    fn test_openai_backend_with_key() {
        let config = GenerationConfig {
            api_key: Some("sk-test".to_string()),
            ..GenerationConfig::default()
        };
        assert_eq!(create_chat_backend(&config).unwrap().name(), "openai");
    }
}
