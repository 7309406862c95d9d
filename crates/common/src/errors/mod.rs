//! Error types for QuoteForge
//!
//! Provides a comprehensive error handling system with:
//! - Distinct error types for different failure modes
//! - Query-fatal vs. degradable classification
//! - Error codes for machine-readable reports

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Assembly errors (1xxx)
    MissingRecord,
    BrokenJoin,
    DuplicateRecord,
    MissingField,

    // Stream errors (2xxx)
    StreamTransport,
    StreamProvider,
    StreamIdleTimeout,
    StreamTruncated,

    // Pricing errors (3xxx)
    UnknownModel,

    // Judge errors (4xxx)
    JudgeUnavailable,

    // External service errors (8xxx)
    UpstreamError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            // Assembly (1xxx)
            ErrorCode::MissingRecord => 1001,
            ErrorCode::BrokenJoin => 1002,
            ErrorCode::DuplicateRecord => 1003,
            ErrorCode::MissingField => 1004,

            // Stream (2xxx)
            ErrorCode::StreamTransport => 2001,
            ErrorCode::StreamProvider => 2002,
            ErrorCode::StreamIdleTimeout => 2003,
            ErrorCode::StreamTruncated => 2004,

            // Pricing (3xxx)
            ErrorCode::UnknownModel => 3001,

            // Judge (4xxx)
            ErrorCode::JudgeUnavailable => 4001,

            // External (8xxx)
            ErrorCode::UpstreamError => 8001,

            // Internal (9xxx)
            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Broken summary -> record join while assembling a context set.
///
/// Always fatal for the query: a record that cannot be resolved would
/// silently break citation verification later on.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AssemblyError {
    #[error("Retrieval hit for summary {summary_id} has no linked record (expected {feedback_record_id})")]
    MissingRecord {
        summary_id: String,
        feedback_record_id: String,
    },

    #[error("Summary {summary_id} links record {expected} but hit carries record {found}")]
    BrokenJoin {
        summary_id: String,
        expected: String,
        found: String,
    },

    #[error("Record {record_id} appears more than once in the context set")]
    DuplicateRecord { record_id: String },

    #[error("Document {document} is missing required field {field}")]
    MissingField { document: String, field: String },
}

impl AssemblyError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AssemblyError::MissingRecord { .. } => ErrorCode::MissingRecord,
            AssemblyError::BrokenJoin { .. } => ErrorCode::BrokenJoin,
            AssemblyError::DuplicateRecord { .. } => ErrorCode::DuplicateRecord,
            AssemblyError::MissingField { .. } => ErrorCode::MissingField,
        }
    }
}

/// Why a generation stream ended without a terminal usage signal
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StreamFailure {
    /// Connection or body read failed
    #[error("transport error: {0}")]
    Transport(String),

    /// Upstream answered with an error status or error frame
    #[error("provider error{}: {message}", .status.map(|s| format!(" {}", s)).unwrap_or_default())]
    Provider {
        status: Option<u16>,
        message: String,
    },

    /// No increment arrived within the idle interval
    #[error("no increment within {}ms", .0.as_millis())]
    IdleTimeout(Duration),

    /// The stream ended before usage was reported
    #[error("stream ended before usage was reported")]
    Truncated,
}

impl StreamFailure {
    pub fn code(&self) -> ErrorCode {
        match self {
            StreamFailure::Transport(_) => ErrorCode::StreamTransport,
            StreamFailure::Provider { .. } => ErrorCode::StreamProvider,
            StreamFailure::IdleTimeout(_) => ErrorCode::StreamIdleTimeout,
            StreamFailure::Truncated => ErrorCode::StreamTruncated,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Context assembly
    #[error("Assembly error: {0}")]
    Assembly(#[from] AssemblyError),

    // Generation
    #[error("Stream failed after {chunks} increments: {kind}")]
    Stream {
        kind: StreamFailure,
        /// Text already delivered to the caller before the failure
        partial_text: String,
        chunks: usize,
    },

    #[error("Upstream provider error: {message}")]
    Provider {
        status: Option<u16>,
        message: String,
    },

    // Pricing
    #[error("No pricing entry for model: {model}")]
    UnknownModel { model: String },

    // Coherence judge
    #[error("Coherence judge unavailable: {message}")]
    JudgeUnavailable { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Assembly(e) => e.code(),
            AppError::Stream { kind, .. } => kind.code(),
            AppError::Provider { .. } => ErrorCode::UpstreamError,
            AppError::UnknownModel { .. } => ErrorCode::UnknownModel,
            AppError::JudgeUnavailable { .. } => ErrorCode::JudgeUnavailable,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Whether this error aborts the whole query.
    ///
    /// Judge failures only drop the coherence fields.
    pub fn is_query_fatal(&self) -> bool {
        !matches!(self, AppError::JudgeUnavailable { .. })
    }

    /// Text delivered before a stream failure, if any
    pub fn partial_text(&self) -> Option<&str> {
        match self {
            AppError::Stream { partial_text, .. } => Some(partial_text),
            _ => None,
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string()
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string()
        }
    }
}
