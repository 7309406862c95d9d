//! Quote Verification
//!
//! Provides:
//! - Quote/source normalization
//! - Verbatim and citation checks against the query's context set
//! - Hallucination detection across all context records
//! - Drift scoring for near-verbatim quotes

mod engine;
mod normalize;
mod similarity;

use serde::{Deserialize, Serialize};

pub use engine::{QuoteRates, VerificationEngine, VerificationReport, VerificationResult};
pub use normalize::{fold_quote, normalize};
pub use similarity::approximate_substring_score;

/// How quotes elided with `...` are scored
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum EllipsisPolicy {
    /// Score the elided quote as one span
    #[default]
    Strict,
    /// Full score when every segment of at least `min_segment_chars`
    /// occurs in order in the cited text
    Segments { min_segment_chars: usize },
}
