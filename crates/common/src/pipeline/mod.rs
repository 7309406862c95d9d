//! Query Runner - One query, one mode, end to end
//!
//! Steps:
//! 1. Check the model has pricing (fail before spending tokens)
//! 2. Assemble the context set from retrieval hits
//! 3. Render the prompt and stream the answer to the caller's sink
//! 4. Price the completed session
//! 5. Parse and verify quotes (enhanced mode)
//! 6. Ask the coherence judge (enhanced mode, non-fatal)

use crate::config::AppConfig;
use crate::context::{ContextAssembler, ContextSet, PromptBuilder, PromptMode, RetrievalHit};
use crate::cost::{CostRecord, CostTracker, PricingTable};
use crate::errors::Result;
use crate::generation::{ChatBackend, GenerationSession, SessionStatus, StreamingGenerator};
use crate::judge::{CoherenceJudge, CoherenceVerdict};
use crate::limiter::ModelRateLimiter;
use crate::metrics;
use crate::quotes::{ParsedAnswer, QuoteParser};
use crate::verification::{VerificationEngine, VerificationReport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;
use std::sync::Arc;
use uuid::Uuid;

/// One query to answer in one mode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query_id: Uuid,
    pub query: String,
    pub mode: PromptMode,
    pub hits: Vec<RetrievalHit>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>, mode: PromptMode, hits: Vec<RetrievalHit>) -> Self {
        Self {
            query_id: Uuid::new_v4(),
            query: query.into(),
            mode,
            hits,
        }
    }
}

/// Receives streamed increments in order.
///
/// Returning `ControlFlow::Break` cancels the generation at that increment.
pub trait DeltaSink: Send {
    fn on_delta(&mut self, delta: &str) -> ControlFlow<()>;
}

impl<F> DeltaSink for F
where
    F: FnMut(&str) -> ControlFlow<()> + Send,
{
    fn on_delta(&mut self, delta: &str) -> ControlFlow<()> {
        self(delta)
    }
}

/// Sink that discards increments
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DeltaSink for NullSink {
    fn on_delta(&mut self, _delta: &str) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }
}

/// Flat per-query record for downstream reports.
///
/// Verification and coherence fields are `None` in baseline mode, for
/// cancelled sessions, and (rates only) when the answer has no quotes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMetrics {
    pub query_id: Uuid,
    pub query: String,
    pub mode: PromptMode,
    pub model: String,
    pub prompt_sha256: String,
    pub started_at: DateTime<Utc>,
    pub status: SessionStatus,
    pub chunk_count: usize,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
    pub cost_usd: Option<f64>,
    pub ttft_s: Option<f64>,
    pub total_time_s: Option<f64>,
    pub num_quotes: Option<usize>,
    pub parse_errors: Option<usize>,
    pub verbatim_rate: Option<f64>,
    pub citation_rate: Option<f64>,
    pub hallucination_rate: Option<f64>,
    pub near_match_rate: Option<f64>,
    pub coherence_score: Option<u8>,
    pub coherence_reasoning: Option<String>,
}

/// Everything produced for one query
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub metrics: QueryMetrics,
    /// Full answer text as streamed
    pub answer: String,
    pub contexts: ContextSet,
    pub session: GenerationSession,
    pub cost: Option<CostRecord>,
    pub parsed: Option<ParsedAnswer>,
    pub verification: Option<VerificationReport>,
    pub coherence: Option<CoherenceVerdict>,
}

/// Runs queries; shared read-only across concurrent tasks
pub struct QueryRunner {
    assembler: ContextAssembler,
    builder: PromptBuilder,
    generator: StreamingGenerator,
    parser: QuoteParser,
    verifier: VerificationEngine,
    judge: Option<CoherenceJudge>,
    costs: CostTracker,
}

impl QueryRunner {
    pub fn new(
        generator: StreamingGenerator,
        parser: QuoteParser,
        verifier: VerificationEngine,
        judge: Option<CoherenceJudge>,
        costs: CostTracker,
    ) -> Self {
        Self {
            assembler: ContextAssembler::new(),
            builder: PromptBuilder::new(),
            generator,
            parser,
            verifier,
            judge,
            costs,
        }
    }

    /// Wire every component from configuration around one chat backend
    pub fn from_config(config: &AppConfig, backend: &ChatBackend) -> Result<Self> {
        let limiter = ModelRateLimiter::from_config(&config.rate_limit)?;
        let pricing = Arc::new(PricingTable::from_config(&config.pricing));

        let generator = StreamingGenerator::new(
            Arc::clone(&backend.stream),
            limiter.clone(),
            config.generation.clone(),
        );
        let parser = QuoteParser::with_citation_pattern(&config.verification.citation_pattern)?;
        let verifier = VerificationEngine::new(config.verification.clone());
        let judge = config.judge.enabled.then(|| {
            CoherenceJudge::new(Arc::clone(&backend.completion), limiter.clone(), &config.judge)
        });

        Ok(Self::new(generator, parser, verifier, judge, CostTracker::new(pricing)))
    }

    /// Answer one query, forwarding increments to `sink` as they arrive
    pub async fn run<S: DeltaSink>(&self, request: &QueryRequest, sink: &mut S) -> Result<QueryOutcome> {
        let result = self.run_query(request, sink).await;

        if let Err(e) = &result {
            metrics::record_query_failure(request.mode.as_str(), e.code().as_code());
            tracing::warn!(
                query_id = %request.query_id,
                mode = %request.mode,
                error = %e,
                "Query failed"
            );
        }
        result
    }

    async fn run_query<S: DeltaSink>(&self, request: &QueryRequest, sink: &mut S) -> Result<QueryOutcome> {
        // Step 1: fail fast on unpriced models
        self.costs.ensure_known(self.generator.model())?;

        // Step 2: context
        let contexts = self.assembler.assemble(&request.hits)?;

        // Step 3: prompt and stream
        let prompt = self.builder.build(request.mode, &request.query, &contexts);
        tracing::info!(
            query_id = %request.query_id,
            mode = %request.mode,
            model = self.generator.model(),
            provider = self.generator.provider_name(),
            records = contexts.len(),
            "Starting generation"
        );

        let mut stream = self.generator.generate(request.query_id, &prompt);
        loop {
            let next = stream.next_delta().await;
            match next {
                Ok(Some(delta)) => {
                    if sink.on_delta(&delta).is_break() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    metrics::record_generation(&stream.into_session(), request.mode.as_str(), None);
                    return Err(e);
                }
            }
        }
        let session = stream.into_session();

        // Step 4: cost only exists for completed sessions
        let cost = match session.status() {
            SessionStatus::Completed => Some(self.costs.finalize(&session)?),
            _ => None,
        };
        metrics::record_generation(&session, request.mode.as_str(), cost.map(|c| c.cost_usd));

        let mut outcome = QueryOutcome {
            metrics: base_metrics(request, &prompt.fingerprint(), &session, cost),
            answer: session.text().to_string(),
            contexts,
            session,
            cost,
            parsed: None,
            verification: None,
            coherence: None,
        };

        if outcome.session.status() == SessionStatus::Cancelled {
            tracing::info!(query_id = %request.query_id, "Query cancelled by caller");
            return Ok(outcome);
        }

        if request.mode == PromptMode::Enhanced {
            // Step 5: quotes
            let parsed = self.parser.parse(&outcome.answer);
            let quotes: Vec<_> = parsed.quotes().cloned().collect();
            let report = self.verifier.verify_all(&quotes, &outcome.contexts);
            metrics::record_parse_errors(parsed.num_errors());
            metrics::record_verification(&report);

            outcome.metrics.num_quotes = Some(report.num_quotes());
            outcome.metrics.parse_errors = Some(parsed.num_errors());
            outcome.metrics.verbatim_rate = report.rates.map(|r| r.verbatim_rate);
            outcome.metrics.citation_rate = report.rates.map(|r| r.citation_rate);
            outcome.metrics.hallucination_rate = report.rates.map(|r| r.hallucination_rate);
            outcome.metrics.near_match_rate = report.rates.map(|r| r.near_match_rate);
            outcome.parsed = Some(parsed);
            outcome.verification = Some(report);

            // Step 6: judge
            if let Some(judge) = &self.judge {
                outcome.coherence = match judge.score(&request.query, &outcome.answer).await {
                    Ok(verdict) => Some(verdict),
                    Err(e) => {
                        tracing::warn!(query_id = %request.query_id, error = %e, "Coherence judge unavailable");
                        None
                    }
                };
                metrics::record_judge(outcome.coherence.as_ref().map(|v| v.score));
                outcome.metrics.coherence_score = outcome.coherence.as_ref().map(|v| v.score);
                outcome.metrics.coherence_reasoning = outcome.coherence.as_ref().map(|v| v.reasoning.clone());
            }
        }

        tracing::info!(
            query_id = %request.query_id,
            mode = %request.mode,
            status = %outcome.metrics.status,
            total_tokens = outcome.metrics.total_tokens,
            cost_usd = outcome.metrics.cost_usd,
            num_quotes = outcome.metrics.num_quotes,
            "Query finished"
        );

        Ok(outcome)
    }
}

fn base_metrics(
    request: &QueryRequest,
    prompt_sha256: &str,
    session: &GenerationSession,
    cost: Option<CostRecord>,
) -> QueryMetrics {
    QueryMetrics {
        query_id: request.query_id,
        query: request.query.clone(),
        mode: request.mode,
        model: session.model().to_string(),
        prompt_sha256: prompt_sha256.to_string(),
        started_at: session.started_at(),
        status: session.status(),
        chunk_count: session.chunk_count(),
        input_tokens: cost.map(|c| c.input_tokens),
        output_tokens: cost.map(|c| c.output_tokens),
        total_tokens: cost.map(|c| c.total_tokens),
        cost_usd: cost.map(|c| c.cost_usd),
        ttft_s: session.time_to_first_token().map(|d| d.as_secs_f64()),
        total_time_s: session.total_time().map(|d| d.as_secs_f64()),
        num_quotes: None,
        parse_errors: None,
        verbatim_rate: None,
        citation_rate: None,
        hallucination_rate: None,
        near_match_rate: None,
        coherence_score: None,
        coherence_reasoning: None,
    }
}
