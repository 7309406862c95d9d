//! Quote Extraction
//!
//! Provides:
//! - Line tokenizer for `> "span" — record_id` quote lines
//! - Block parser attaching quotes to their paragraphs
//! - Per-line parse errors that never abort the rest of the answer

mod parser;
mod tokenizer;

pub use parser::{
    ExtractedQuote, ParseError, ParseErrorKind, ParsedAnswer, ParsedParagraph, QuoteParser,
    DEFAULT_CITATION_PATTERN,
};
