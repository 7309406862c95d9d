//! OpenAI-compatible chat client
//!
//! Streams `/chat/completions` as server-sent events with
//! `stream_options.include_usage`, so the terminal frame carries the
//! token usage needed for cost.

use super::provider::{
    ChatCompletionProvider, ChatRequest, ChatStreamProvider, EventStream, StreamEvent,
    StreamResult, TokenUsage,
};
use crate::errors::{AppError, Result, StreamFailure};
use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

const SNIPPET_CHARS: usize = 300;

/// OpenAI chat client
#[derive(Debug, Clone)]
pub struct OpenAiChatClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

impl<'a> ChatCompletionBody<'a> {
    fn new(request: &'a ChatRequest, stream: bool) -> Self {
        Self {
            model: &request.model,
            messages: vec![
                ChatMessage { role: "system", content: &request.system },
                ChatMessage { role: "user", content: &request.user },
            ],
            temperature: request.temperature,
            top_p: request.top_p,
            max_tokens: request.max_tokens,
            stream,
            stream_options: stream.then_some(StreamOptions { include_usage: true }),
        }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChunkFrame {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    usage: Option<UsageFrame>,
    #[serde(default)]
    error: Option<ErrorFrame>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Deserialize, Default)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct UsageFrame {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Deserialize)]
struct ErrorFrame {
    #[serde(default)]
    message: String,
}

impl OpenAiChatClient {
    /// Create a new client; `connect_timeout` bounds connection setup only
    pub fn new(api_key: String, base_url: String, connect_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl ChatStreamProvider for OpenAiChatClient {
    async fn open_stream(&self, request: &ChatRequest) -> StreamResult<EventStream> {
        tracing::debug!(model = %request.model, "Opening chat stream");

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&ChatCompletionBody::new(request, true))
            .send()
            .await
            .map_err(|e| StreamFailure::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StreamFailure::Provider {
                status: Some(status.as_u16()),
                message: snippet(&body),
            });
        }

        Ok(sse_events(Box::pin(response.bytes_stream())).boxed())
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[async_trait]
impl ChatCompletionProvider for OpenAiChatClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&ChatCompletionBody::new(request, false))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Provider {
                status: Some(status.as_u16()),
                message: snippet(&body),
            });
        }

        let chat_response: ChatResponse = response.json().await?;
        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AppError::Provider {
                status: None,
                message: "Empty response from LLM".to_string(),
            })
    }
}

/// Incremental server-sent-events decoder for chat completion chunks.
///
/// Byte chunks may split lines, including inside multi-byte UTF-8
/// sequences; only complete lines are decoded.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a byte chunk, returning every event completed by it in order.
    ///
    /// A failure is the last item; events decoded before it are kept and
    /// the rest of the chunk is discarded.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamResult<StreamEvent>> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Err(failure) = decode_line(&String::from_utf8_lossy(&line), &mut events) {
                events.push(Err(failure));
                self.buffer.clear();
                break;
            }
        }
        events
    }

    /// Decode whatever is left once the body ends
    pub fn finish(&mut self) -> Vec<StreamResult<StreamEvent>> {
        let rest = std::mem::take(&mut self.buffer);
        let mut events = Vec::new();
        if !rest.is_empty() {
            if let Err(failure) = decode_line(&String::from_utf8_lossy(&rest), &mut events) {
                events.push(Err(failure));
            }
        }
        events
    }
}

fn decode_line(line: &str, events: &mut Vec<StreamResult<StreamEvent>>) -> StreamResult<()> {
    let line = line.trim_end_matches(['\r', '\n']);
    // Comments, `event:` and `id:` fields carry nothing we use
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(());
    };
    let data = data.trim();
    if data.is_empty() {
        return Ok(());
    }
    if data == "[DONE]" {
        events.push(Ok(StreamEvent::Done));
        return Ok(());
    }

    let frame: ChunkFrame = serde_json::from_str(data).map_err(|e| StreamFailure::Provider {
        status: None,
        message: format!("Malformed stream frame: {}", e),
    })?;

    if let Some(error) = frame.error {
        return Err(StreamFailure::Provider {
            status: None,
            message: error.message,
        });
    }

    for choice in frame.choices {
        if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
            events.push(Ok(StreamEvent::Delta(content)));
        }
    }
    if let Some(usage) = frame.usage {
        events.push(Ok(StreamEvent::Usage(TokenUsage::new(
            usage.prompt_tokens,
            usage.completion_tokens,
        ))));
    }
    Ok(())
}

struct SseState<S> {
    body: S,
    decoder: SseDecoder,
    queue: VecDeque<StreamResult<StreamEvent>>,
    ended: bool,
}

/// Turn a response body into decoded events; stops after an error or `[DONE]`
fn sse_events<S, B, E>(body: S) -> impl Stream<Item = StreamResult<StreamEvent>> + Send + 'static
where
    S: Stream<Item = std::result::Result<B, E>> + Unpin + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = SseState {
        body,
        decoder: SseDecoder::new(),
        queue: VecDeque::new(),
        ended: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.queue.pop_front() {
                if matches!(item, Err(_) | Ok(StreamEvent::Done)) {
                    state.ended = true;
                    state.queue.clear();
                }
                return Some((item, state));
            }
            if state.ended {
                return None;
            }

            match state.body.next().await {
                Some(Ok(bytes)) => state.queue.extend(state.decoder.push(bytes.as_ref())),
                Some(Err(e)) => state.queue.push_back(Err(StreamFailure::Transport(e.to_string()))),
                None => {
                    state.ended = true;
                    state.queue.extend(state.decoder.finish());
                }
            }
        }
    })
}

/// First characters of an error body, whitespace collapsed
fn snippet(body: &str) -> String {
    let collapsed = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= SNIPPET_CHARS {
        collapsed
    } else {
        let cut: String = collapsed.chars().take(SNIPPET_CHARS).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAMES: &str = concat!(
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}],\"usage\":null}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"Users \"}}],\"usage\":null}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"report \u{201C}crashes\u{201D}\"}}],\"usage\":null}\n\n",
        ": keep-alive\n\n",
        "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":42,\"completion_tokens\":7,\"total_tokens\":49}}\n\n",
        "data: [DONE]\n\n",
    );

    fn expected() -> Vec<StreamEvent> {
        vec![
            StreamEvent::Delta("Users ".to_string()),
            StreamEvent::Delta("report \u{201C}crashes\u{201D}".to_string()),
            StreamEvent::Usage(TokenUsage::new(42, 7)),
            StreamEvent::Done,
        ]
    }

    fn ok_events(items: Vec<StreamResult<StreamEvent>>) -> Vec<StreamEvent> {
        items.into_iter().map(|e| e.unwrap()).collect()
    }

    #[test]
    fn test_decoder_whole_body() {
        let mut decoder = SseDecoder::new();
        assert_eq!(ok_events(decoder.push(FRAMES.as_bytes())), expected());
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_decoder_byte_by_byte() {
        // Splits every line and every multi-byte character
        let mut decoder = SseDecoder::new();
        let mut events = Vec::new();
        for byte in FRAMES.as_bytes() {
            events.extend(ok_events(decoder.push(std::slice::from_ref(byte))));
        }
        assert_eq!(events, expected());
    }

    #[test]
    fn test_decoder_error_frame() {
        let mut decoder = SseDecoder::new();
        let result = decoder.push(b"data: {\"error\":{\"message\":\"model overloaded\"}}\n");
        assert_eq!(
            result,
            vec![Err(StreamFailure::Provider {
                status: None,
                message: "model overloaded".to_string()
            })]
        );
    }

    #[test]
    fn test_decoder_keeps_delta_before_error_frame() {
        let mut decoder = SseDecoder::new();
        let result = decoder.push(concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"last words\"}}]}\n",
            "data: {\"error\":{\"message\":\"overloaded\"}}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"never\"}}]}\n",
        ).as_bytes());
        assert_eq!(
            result,
            vec![
                Ok(StreamEvent::Delta("last words".to_string())),
                Err(StreamFailure::Provider {
                    status: None,
                    message: "overloaded".to_string()
                }),
            ]
        );
    }

    #[test]
    fn test_decoder_crlf_and_unterminated_tail() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\r\ndata: [DONE]");
        assert_eq!(ok_events(events), vec![StreamEvent::Delta("a".to_string())]);
        assert_eq!(ok_events(decoder.finish()), vec![StreamEvent::Done]);
    }

    #[tokio::test]
    async fn test_sse_events_over_chunked_body() {
        let bytes = FRAMES.as_bytes();
        let chunks: Vec<std::result::Result<Vec<u8>, String>> = bytes
            .chunks(7)
            .map(|c| Ok(c.to_vec()))
            .collect();
        let events: Vec<_> = sse_events(stream::iter(chunks)).collect().await;
        assert_eq!(ok_events(events), expected());
    }

    #[tokio::test]
    async fn test_sse_events_delta_then_error_in_one_chunk() {
        let chunks: Vec<std::result::Result<Vec<u8>, String>> = vec![Ok(concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"last words\"}}]}\n",
            "data: {\"error\":{\"message\":\"overloaded\"}}\n",
        )
        .as_bytes()
        .to_vec())];
        let events: Vec<_> = sse_events(stream::iter(chunks)).collect().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], Ok(StreamEvent::Delta("last words".to_string())));
        assert!(matches!(events[1], Err(StreamFailure::Provider { .. })));
    }

    #[tokio::test]
    async fn test_sse_events_stop_after_transport_error() {
        let chunks: Vec<std::result::Result<Vec<u8>, String>> = vec![
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n".to_vec()),
            Err("connection reset".to_string()),
            Ok(b"data: [DONE]\n".to_vec()),
        ];
        let events: Vec<_> = sse_events(stream::iter(chunks)).collect().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], Err(StreamFailure::Transport("connection reset".to_string())));
    }

    #[test]
    fn test_snippet_truncates() {
        let body = "x ".repeat(1000);
        let s = snippet(&body);
        assert!(s.ends_with("..."));
        assert_eq!(s.chars().count(), SNIPPET_CHARS + 3);
        assert_eq!(snippet("  short\n body "), "short body");
    }
}
