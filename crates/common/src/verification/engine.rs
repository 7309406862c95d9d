//! Verification Engine - Checks extracted quotes against ground truth
//!
//! Matching policy, in order:
//! 1. Normalize quote and every candidate verbatim text
//! 2. `verbatim_match`: normalized quote is a substring of the cited record
//! 3. `citation_correct`: cited id is in the context set and step 2 holds
//! 4. `hallucinated`: normalized quote is a substring of no record at all

use super::normalize::normalize;
use super::similarity::{approximate_substring_score, segments_in_order};
use super::EllipsisPolicy;
use crate::config::VerificationConfig;
use crate::context::ContextSet;
use crate::quotes::ExtractedQuote;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Verdict for one extracted quote
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerificationResult {
    pub quote: ExtractedQuote,

    /// Normalized quote is a contiguous substring of the cited record
    pub verbatim_match: bool,

    /// Similarity against the cited record (0.0 - 1.0)
    pub match_score: f64,

    /// Cited record is in the context set and contains the quote
    pub citation_correct: bool,

    /// Quote appears in no context record at all
    pub hallucinated: bool,

    /// Not verbatim, but within the drift threshold
    pub near_match: bool,

    /// Another context record that does contain the quote
    pub found_in: Option<String>,
}

/// Aggregate rates over all quotes of one query
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct QuoteRates {
    pub verbatim_rate: f64,
    pub citation_rate: f64,
    pub hallucination_rate: f64,
    pub near_match_rate: f64,
}

impl QuoteRates {
    /// Simple means over `results`; `None` when there are no quotes
    pub fn from_results(results: &[VerificationResult]) -> Option<Self> {
        if results.is_empty() {
            return None;
        }
        let n = results.len() as f64;
        let rate = |pred: fn(&VerificationResult) -> bool| {
            results.iter().filter(|r| pred(r)).count() as f64 / n
        };

        Some(Self {
            verbatim_rate: rate(|r| r.verbatim_match),
            citation_rate: rate(|r| r.citation_correct),
            hallucination_rate: rate(|r| r.hallucinated),
            near_match_rate: rate(|r| r.near_match),
        })
    }
}

/// All verdicts for one query
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerificationReport {
    pub results: Vec<VerificationResult>,

    /// Undefined (None) when the answer carried no quotes
    pub rates: Option<QuoteRates>,
}

impl VerificationReport {
    pub fn num_quotes(&self) -> usize {
        self.results.len()
    }
}

/// Context records normalized once per query
struct NormalizedContexts<'a> {
    entries: Vec<(&'a str, String)>,
    by_id: HashMap<&'a str, usize>,
}

impl<'a> NormalizedContexts<'a> {
    fn new(contexts: &'a ContextSet) -> Self {
        let entries: Vec<(&str, String)> = contexts
            .iter()
            .map(|r| (r.record_id.as_str(), normalize(&r.verbatim_text)))
            .collect();
        let by_id = entries
            .iter()
            .enumerate()
            .map(|(pos, (id, _))| (*id, pos))
            .collect();
        Self { entries, by_id }
    }

    fn get(&self, record_id: &str) -> Option<&str> {
        self.by_id
            .get(record_id)
            .map(|&pos| self.entries[pos].1.as_str())
    }

    /// First record other than `skip` whose text contains `needle`
    fn find_other(&self, needle: &str, skip: &str) -> Option<&'a str> {
        self.entries
            .iter()
            .find(|(id, text)| *id != skip && text.contains(needle))
            .map(|(id, _)| *id)
    }
}

/// Quote verifier
#[derive(Debug, Clone)]
pub struct VerificationEngine {
    config: VerificationConfig,
}

impl Default for VerificationEngine {
    fn default() -> Self {
        Self::new(VerificationConfig::default())
    }
}

impl VerificationEngine {
    pub fn new(config: VerificationConfig) -> Self {
        Self { config }
    }

    /// Verify a single quote against the query's context set
    pub fn verify(&self, quote: &ExtractedQuote, contexts: &ContextSet) -> VerificationResult {
        let normalized = NormalizedContexts::new(contexts);
        self.verify_normalized(quote, &normalized)
    }

    /// Verify every quote of one answer, normalizing the context set once
    pub fn verify_all(&self, quotes: &[ExtractedQuote], contexts: &ContextSet) -> VerificationReport {
        let normalized = NormalizedContexts::new(contexts);
        let results: Vec<VerificationResult> = quotes
            .iter()
            .map(|q| self.verify_normalized(q, &normalized))
            .collect();
        let rates = QuoteRates::from_results(&results);

        tracing::debug!(
            quotes = results.len(),
            verbatim_rate = rates.map(|r| r.verbatim_rate),
            hallucination_rate = rates.map(|r| r.hallucination_rate),
            "Quotes verified"
        );

        VerificationReport { results, rates }
    }

    fn verify_normalized(&self, quote: &ExtractedQuote, contexts: &NormalizedContexts<'_>) -> VerificationResult {
        let needle = normalize(&quote.quote_text);

        // Empty quotes are never skipped: they count as invented
        if needle.is_empty() {
            return VerificationResult {
                quote: quote.clone(),
                verbatim_match: false,
                match_score: 0.0,
                citation_correct: false,
                hallucinated: true,
                near_match: false,
                found_in: None,
            };
        }

        let cited = contexts.get(&quote.cited_record_id);
        let verbatim_match = cited.is_some_and(|text| text.contains(&needle));

        let match_score = match cited {
            Some(_) if verbatim_match => 1.0,
            Some(text) => self.drift_score(&needle, text),
            None => 0.0,
        };

        let found_in = if verbatim_match {
            None
        } else {
            contexts
                .find_other(&needle, &quote.cited_record_id)
                .map(str::to_string)
        };

        VerificationResult {
            quote: quote.clone(),
            verbatim_match,
            match_score,
            citation_correct: cited.is_some() && verbatim_match,
            hallucinated: !verbatim_match && found_in.is_none(),
            near_match: !verbatim_match && match_score >= self.config.drift_threshold,
            found_in,
        }
    }

    fn drift_score(&self, needle: &str, text: &str) -> f64 {
        if let EllipsisPolicy::Segments { min_segment_chars } = self.config.ellipsis {
            if let Some(segments) = elided_segments(needle, min_segment_chars) {
                if segments_in_order(segments.iter().map(String::as_str), text) {
                    return 1.0;
                }
            }
        }
        approximate_substring_score(needle, text)
    }
}

/// Split an elided quote into its normalized segments.
///
/// `None` when the quote has no ellipsis or no segment is long enough.
fn elided_segments(needle: &str, min_segment_chars: usize) -> Option<Vec<String>> {
    if !needle.contains("...") && !needle.contains('\u{2026}') {
        return None;
    }
    let segments: Vec<String> = needle
        .replace('\u{2026}', "...")
        .split("...")
        .map(normalize)
        .filter(|s| s.chars().count() >= min_segment_chars.max(1))
        .collect();

    (!segments.is_empty()).then_some(segments)
}
