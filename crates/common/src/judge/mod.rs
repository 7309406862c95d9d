//! Coherence Judge - LLM-as-judge scoring of quote integration
//!
//! Advisory telemetry only: the verdict never feeds verification, and any
//! failure (provider error, timeout, unparseable reply) surfaces as
//! `JudgeUnavailable`, which callers treat as non-fatal.

use crate::config::JudgeConfig;
use crate::errors::{AppError, Result};
use crate::generation::{ChatCompletionProvider, ChatRequest};
use crate::limiter::ModelRateLimiter;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

const JUDGE_SYSTEM_PROMPT: &str = "You are an impartial evaluator of answer quality.";
const JUDGE_MAX_TOKENS: u32 = 200;

/// Judge verdict: integer score 1-5 and a short justification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoherenceVerdict {
    pub score: u8,
    pub reasoning: String,
}

pub struct CoherenceJudge {
    provider: Arc<dyn ChatCompletionProvider>,
    limiter: ModelRateLimiter,
    model: String,
    timeout: Duration,
}

impl CoherenceJudge {
    pub fn new(
        provider: Arc<dyn ChatCompletionProvider>,
        limiter: ModelRateLimiter,
        config: &JudgeConfig,
    ) -> Self {
        Self {
            provider,
            limiter,
            model: config.model.clone(),
            timeout: config.timeout(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Score how naturally the answer's quotes are woven into its prose
    pub async fn score(&self, query: &str, answer: &str) -> Result<CoherenceVerdict> {
        let request = ChatRequest {
            model: self.model.clone(),
            system: JUDGE_SYSTEM_PROMPT.to_string(),
            user: build_judge_prompt(query, answer),
            temperature: 0.0,
            top_p: None,
            max_tokens: JUDGE_MAX_TOKENS,
        };

        self.limiter.until_ready().await;
        let raw = match tokio::time::timeout(self.timeout, self.provider.complete(&request)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                return Err(AppError::JudgeUnavailable {
                    message: e.to_string(),
                })
            }
            Err(_) => {
                return Err(AppError::JudgeUnavailable {
                    message: format!("no verdict within {}s", self.timeout.as_secs_f64()),
                })
            }
        };

        let verdict = parse_verdict(&raw)
            .map_err(|message| AppError::JudgeUnavailable { message })?;
        tracing::debug!(score = verdict.score, "Coherence verdict");
        Ok(verdict)
    }
}

fn build_judge_prompt(query: &str, answer: &str) -> String {
    format!(
        "You are evaluating an AI-generated answer that includes verbatim quotes from user feedback.\n\n\
        Rate the answer 1-5 for COHERENCE: how naturally quotes are woven into the prose.\n\n\
        - 5: Every quote directly supports the claim before it; prose flows naturally\n\
        - 4: Most quotes well-placed; minor awkwardness in one or two spots\n\
        - 3: Some quotes feel forced or loosely connected to surrounding prose\n\
        - 2: Quotes mostly disconnected from claims; hard to follow\n\
        - 1: Quotes dumped in with no connection to prose; incoherent\n\n\
        Query: {}\n\n\
        Answer:\n{}\n\n\
        Respond in this exact format:\n\
        SCORE: <1-5>\n\
        REASONING: <one or two sentences>",
        query, answer
    )
}

static SCORE_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?im)^[\s*_#]*score[\s*_]*:[\s*_]*(\d+)(?:\.0+)?[\s*_]*(?:/\s*5)?[\s*_.]*$").ok()
});

static REASONING_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?is)reasoning[\s*_]*:[\s*_]*(.+)").ok());

/// Parse `SCORE:` / `REASONING:` lines; tolerates `4/5`, `4.0` and markdown bold
fn parse_verdict(raw: &str) -> std::result::Result<CoherenceVerdict, String> {
    let (Some(score_re), Some(reasoning_re)) = (SCORE_RE.as_ref(), REASONING_RE.as_ref()) else {
        return Err("judge reply patterns failed to compile".to_string());
    };

    let score = score_re
        .captures(raw)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u8>().ok())
        .filter(|s| (1..=5).contains(s))
        .ok_or_else(|| format!("no valid SCORE in judge reply: {:?}", truncate(raw)))?;

    let reasoning = reasoning_re
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|r| !r.is_empty())
        .ok_or_else(|| format!("no REASONING in judge reply: {:?}", truncate(raw)))?;

    Ok(CoherenceVerdict { score, reasoning })
}

fn truncate(raw: &str) -> String {
    raw.chars().take(120).collect()
}
