//! QuoteForge Common Library
//!
//! Core of the quote-attributed answer pipeline:
//! - Context assembly and prompt rendering
//! - Streaming generation with session timing
//! - Quote parsing and verbatim/citation verification
//! - Coherence judging and cost tracking
//! - Error types, configuration, metrics and rate limiting

pub mod config;
pub mod context;
pub mod cost;
pub mod errors;
pub mod generation;
pub mod judge;
pub mod limiter;
pub mod metrics;
pub mod pipeline;
pub mod quotes;
pub mod verification;

// Re-export commonly used types
pub use config::AppConfig;
pub use errors::{AppError, Result};
pub use pipeline::{DeltaSink, NullSink, QueryMetrics, QueryOutcome, QueryRequest, QueryRunner};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
