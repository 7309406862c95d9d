//! Benchmark report rows and per-mode summary

use anyhow::Context;
use quoteforge_common::context::PromptMode;
use quoteforge_common::{AppError, QueryMetrics, QueryOutcome};
use serde::Serialize;
use std::path::Path;

/// Content reported for a cited id missing from the context set
const NOT_FOUND: &str = "NOT FOUND";

/// One query in one mode
#[derive(Debug, Clone, Serialize)]
pub struct ReportRow {
    #[serde(flatten)]
    pub metrics: Option<QueryMetrics>,

    #[serde(flatten)]
    pub failed: Option<FailedQuery>,

    /// Answer text (partial for failed streams)
    pub output: Option<String>,

    /// Per-quote verdicts; enhanced mode only
    pub quotes_detail: Option<Vec<QuoteDetail>>,

    pub error: Option<RowError>,
}

/// Identity of a query that produced no metrics
#[derive(Debug, Clone, Serialize)]
pub struct FailedQuery {
    pub query: String,
    pub mode: PromptMode,
}

#[derive(Debug, Clone, Serialize)]
pub struct RowError {
    pub code: u16,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuoteDetail {
    pub extracted_quote: String,
    pub feedback_record_id: String,
    pub actual_feedback_content: String,
    pub paragraph_index: usize,
    pub verbatim_match: bool,
    pub citation_correct: bool,
    pub hallucinated: bool,
    pub near_match: bool,
    pub match_score: f64,
    pub found_in: Option<String>,
}

impl ReportRow {
    pub fn from_outcome(outcome: &QueryOutcome) -> Self {
        let quotes_detail = outcome.verification.as_ref().map(|report| {
            report
                .results
                .iter()
                .map(|r| QuoteDetail {
                    extracted_quote: r.quote.quote_text.clone(),
                    feedback_record_id: r.quote.cited_record_id.clone(),
                    actual_feedback_content: outcome
                        .contexts
                        .get(&r.quote.cited_record_id)
                        .map_or_else(|| NOT_FOUND.to_string(), |c| c.verbatim_text.clone()),
                    paragraph_index: r.quote.paragraph_index,
                    verbatim_match: r.verbatim_match,
                    citation_correct: r.citation_correct,
                    hallucinated: r.hallucinated,
                    near_match: r.near_match,
                    match_score: r.match_score,
                    found_in: r.found_in.clone(),
                })
                .collect()
        });

        Self {
            metrics: Some(outcome.metrics.clone()),
            failed: None,
            output: Some(outcome.answer.clone()),
            quotes_detail,
            error: None,
        }
    }

    pub fn failed(query: &str, mode: PromptMode, error: &AppError) -> Self {
        Self {
            metrics: None,
            failed: Some(FailedQuery {
                query: query.to_string(),
                mode,
            }),
            output: error.partial_text().map(str::to_string),
            quotes_detail: None,
            error: Some(RowError {
                code: error.code().as_code(),
                message: error.to_string(),
            }),
        }
    }

    pub fn mode(&self) -> Option<PromptMode> {
        self.metrics
            .as_ref()
            .map(|m| m.mode)
            .or_else(|| self.failed.as_ref().map(|f| f.mode))
    }
}

/// Averages over the successful rows of one mode
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModeSummary {
    pub mode: PromptMode,
    pub queries: usize,
    pub failed: usize,
    pub mean_cost_usd: Option<f64>,
    pub mean_ttft_s: Option<f64>,
    pub mean_total_time_s: Option<f64>,
    pub mean_verbatim_rate: Option<f64>,
    pub mean_hallucination_rate: Option<f64>,
    pub mean_near_match_rate: Option<f64>,
    pub mean_coherence: Option<f64>,
}

pub fn summarize(rows: &[ReportRow], mode: PromptMode) -> ModeSummary {
    let rows: Vec<&ReportRow> = rows.iter().filter(|r| r.mode() == Some(mode)).collect();
    let metrics: Vec<&QueryMetrics> = rows.iter().filter_map(|r| r.metrics.as_ref()).collect();

    let mean = |values: Vec<f64>| {
        (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
    };

    ModeSummary {
        mode,
        queries: rows.len(),
        failed: rows.iter().filter(|r| r.error.is_some()).count(),
        mean_cost_usd: mean(metrics.iter().filter_map(|m| m.cost_usd).collect()),
        mean_ttft_s: mean(metrics.iter().filter_map(|m| m.ttft_s).collect()),
        mean_total_time_s: mean(metrics.iter().filter_map(|m| m.total_time_s).collect()),
        mean_verbatim_rate: mean(metrics.iter().filter_map(|m| m.verbatim_rate).collect()),
        mean_hallucination_rate: mean(metrics.iter().filter_map(|m| m.hallucination_rate).collect()),
        mean_near_match_rate: mean(metrics.iter().filter_map(|m| m.near_match_rate).collect()),
        mean_coherence: mean(
            metrics
                .iter()
                .filter_map(|m| m.coherence_score.map(f64::from))
                .collect(),
        ),
    }
}

/// Write rows as a pretty JSON array, creating parent directories
pub fn write_report(path: impl AsRef<Path>, rows: &[ReportRow]) -> anyhow::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(rows)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quoteforge_common::errors::StreamFailure;
    use quoteforge_common::generation::SessionStatus;

    fn metrics(mode: PromptMode, cost: f64, verbatim: Option<f64>) -> QueryMetrics {
        QueryMetrics {
            query_id: uuid_stub(),
            query: "What breaks?".to_string(),
            mode,
            model: "gpt-4o-mini".to_string(),
            prompt_sha256: "0".repeat(64),
            started_at: chrono::Utc::now(),
            status: SessionStatus::Completed,
            chunk_count: 3,
            input_tokens: Some(100),
            output_tokens: Some(10),
            total_tokens: Some(110),
            cost_usd: Some(cost),
            ttft_s: Some(0.4),
            total_time_s: Some(1.2),
            num_quotes: verbatim.map(|_| 2),
            parse_errors: verbatim.map(|_| 0),
            verbatim_rate: verbatim,
            citation_rate: verbatim,
            hallucination_rate: verbatim.map(|v| 1.0 - v),
            near_match_rate: verbatim.map(|_| 0.0),
            coherence_score: verbatim.map(|_| 4),
            coherence_reasoning: verbatim.map(|_| "Flows well.".to_string()),
        }
    }

    fn uuid_stub() -> uuid::Uuid {
        uuid::Uuid::nil()
    }

    fn row(m: QueryMetrics) -> ReportRow {
        ReportRow {
            metrics: Some(m),
            failed: None,
            output: Some("answer".to_string()),
            quotes_detail: None,
            error: None,
        }
    }

    #[test]
    fn test_row_serializes_flat() {
        let value = serde_json::to_value(row(metrics(PromptMode::Enhanced, 0.001, Some(1.0)))).unwrap();
        assert_eq!(value["mode"], "enhanced");
        assert_eq!(value["status"], "completed");
        assert_eq!(value["total_tokens"], 110);
        assert_eq!(value["output"], "answer");
        assert!(value["error"].is_null());
    }

    #[test]
    fn test_failed_row_keeps_partial_output() {
        let err = AppError::Stream {
            kind: StreamFailure::Truncated,
            partial_text: "Users report".to_string(),
            chunks: 2,
        };
        let row = ReportRow::failed("What breaks?", PromptMode::Baseline, &err);
        let value = serde_json::to_value(&row).unwrap();

        assert_eq!(value["query"], "What breaks?");
        assert_eq!(value["mode"], "baseline");
        assert_eq!(value["output"], "Users report");
        assert_eq!(value["error"]["code"], 2004);
        assert_eq!(row.mode(), Some(PromptMode::Baseline));
    }

    #[test]
    fn test_summary_per_mode() {
        let failed = ReportRow::failed(
            "q",
            PromptMode::Enhanced,
            &AppError::UnknownModel { model: "x".to_string() },
        );
        let rows = vec![
            row(metrics(PromptMode::Baseline, 0.002, None)),
            row(metrics(PromptMode::Enhanced, 0.004, Some(1.0))),
            row(metrics(PromptMode::Enhanced, 0.002, Some(0.5))),
            failed,
        ];

        let baseline = summarize(&rows, PromptMode::Baseline);
        assert_eq!(baseline.queries, 1);
        assert!(baseline.mean_verbatim_rate.is_none());

        let enhanced = summarize(&rows, PromptMode::Enhanced);
        assert_eq!(enhanced.queries, 3);
        assert_eq!(enhanced.failed, 1);
        assert_eq!(enhanced.mean_verbatim_rate, Some(0.75));
        assert!((enhanced.mean_cost_usd.unwrap() - 0.003).abs() < 1e-12);
        assert_eq!(enhanced.mean_near_match_rate, Some(0.0));
        assert_eq!(enhanced.mean_coherence, Some(4.0));
    }

    #[test]
    fn test_write_report_creates_dirs() {
        let dir = std::env::temp_dir().join(format!("quoteforge-report-{}", std::process::id()));
        let path = dir.join("nested").join("results.json");
        write_report(&path, &[row(metrics(PromptMode::Baseline, 0.001, None))]).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written.as_array().unwrap().len(), 1);
        std::fs::remove_dir_all(dir).unwrap();
    }
}
