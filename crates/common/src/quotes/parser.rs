//! Structural parser over the block grammar
//!
//! Blocks are separated by blank lines. A block whose first line is not a
//! quote line is a paragraph; quote lines attach to the paragraph above
//! them. Quote lines are tokenized, then checked token by token so a bad
//! line becomes a `ParseError` on its paragraph instead of aborting.

use super::tokenizer::{classify, tokenize, Line, Token};
use crate::errors::{AppError, Result};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default shape for citation tokens
pub const DEFAULT_CITATION_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9_.:-]*$";

/// One quote line resolved to a span and a record id
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractedQuote {
    /// Index of the paragraph the quote supports
    pub paragraph_index: usize,

    /// Quoted span as written, without the surrounding quote marks
    pub quote_text: String,

    pub cited_record_id: String,

    /// 0-based ordinal across the whole answer
    pub position_in_answer: usize,

    /// 1-based source line
    pub line: usize,
}

#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParseErrorKind {
    #[error("quote marker without a quoted span")]
    MissingQuotedSpan,

    #[error("quoted span is never closed")]
    UnterminatedQuote,

    #[error("no separator between quote and citation")]
    MissingSeparator,

    #[error("quote has no citation")]
    MissingCitation,

    #[error("citation {0:?} is not shaped like a record id")]
    MalformedCitation(String),
}

/// Malformed quote line, kept on the paragraph it belongs to
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("line {line}: {kind}")]
pub struct ParseError {
    /// 1-based source line
    pub line: usize,

    pub kind: ParseErrorKind,

    pub raw: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedParagraph {
    pub index: usize,
    pub text: String,
    pub quotes: Vec<ExtractedQuote>,
    pub errors: Vec<ParseError>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedAnswer {
    pub paragraphs: Vec<ParsedParagraph>,
}

impl ParsedAnswer {
    /// All quotes in answer order
    pub fn quotes(&self) -> impl Iterator<Item = &ExtractedQuote> {
        self.paragraphs.iter().flat_map(|p| p.quotes.iter())
    }

    pub fn errors(&self) -> impl Iterator<Item = &ParseError> {
        self.paragraphs.iter().flat_map(|p| p.errors.iter())
    }

    pub fn num_quotes(&self) -> usize {
        self.paragraphs.iter().map(|p| p.quotes.len()).sum()
    }

    pub fn num_errors(&self) -> usize {
        self.paragraphs.iter().map(|p| p.errors.len()).sum()
    }
}

#[derive(Debug, Clone)]
enum CitationShape {
    Default,
    Pattern(Regex),
}

impl CitationShape {
    fn matches(&self, token: &str) -> bool {
        match self {
            Self::Default => {
                let mut chars = token.chars();
                chars.next().is_some_and(|c| c.is_ascii_alphanumeric())
                    && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '-'))
            }
            Self::Pattern(re) => re.is_match(token),
        }
    }
}

/// Answer parser; pure and stateless between calls
#[derive(Debug, Clone)]
pub struct QuoteParser {
    citation: CitationShape,
}

impl Default for QuoteParser {
    fn default() -> Self {
        Self::new()
    }
}

impl QuoteParser {
    pub fn new() -> Self {
        Self {
            citation: CitationShape::Default,
        }
    }

    /// Parser that accepts citation tokens matching `pattern`
    pub fn with_citation_pattern(pattern: &str) -> Result<Self> {
        if pattern == DEFAULT_CITATION_PATTERN {
            return Ok(Self::new());
        }
        let re = Regex::new(pattern).map_err(|e| AppError::Configuration {
            message: format!("invalid citation pattern {:?}: {}", pattern, e),
        })?;
        Ok(Self {
            citation: CitationShape::Pattern(re),
        })
    }

    /// Parse a complete answer
    pub fn parse(&self, text: &str) -> ParsedAnswer {
        let mut paragraphs: Vec<ParsedParagraph> = Vec::new();
        let mut position = 0;
        // Whether a text line continues the last paragraph
        let mut in_paragraph = false;

        for (offset, raw) in text.lines().enumerate() {
            let line = offset + 1;
            match classify(raw) {
                Line::Blank => in_paragraph = false,
                Line::Text(content) => {
                    match paragraphs.last_mut() {
                        Some(current) if in_paragraph => {
                            current.text.push('\n');
                            current.text.push_str(content);
                        }
                        _ => paragraphs.push(ParsedParagraph {
                            index: paragraphs.len(),
                            text: content.to_string(),
                            ..ParsedParagraph::default()
                        }),
                    }
                    in_paragraph = true;
                }
                Line::Quote(body) => {
                    in_paragraph = false;
                    if paragraphs.is_empty() {
                        paragraphs.push(ParsedParagraph::default());
                    }
                    let Some(current) = paragraphs.last_mut() else {
                        continue;
                    };

                    match self.parse_quote_line(body) {
                        Ok((quote_text, cited_record_id)) => {
                            current.quotes.push(ExtractedQuote {
                                paragraph_index: current.index,
                                quote_text,
                                cited_record_id,
                                position_in_answer: position,
                                line,
                            });
                            position += 1;
                        }
                        Err(kind) => current.errors.push(ParseError {
                            line,
                            kind,
                            raw: raw.to_string(),
                        }),
                    }
                }
            }
        }

        ParsedAnswer { paragraphs }
    }

    /// Parse only the newline-terminated prefix of a partial answer.
    ///
    /// The trailing unterminated line of a stream in progress is skipped so
    /// a half-written quote line is not reported as malformed.
    pub fn parse_completed_prefix(&self, text: &str) -> ParsedAnswer {
        match text.rfind('\n') {
            Some(end) => self.parse(&text[..=end]),
            None => ParsedAnswer::default(),
        }
    }

    fn parse_quote_line(&self, body: &str) -> std::result::Result<(String, String), ParseErrorKind> {
        let tokens = tokenize(body);
        let mut tokens = tokens.into_iter();

        let span = match tokens.next() {
            Some(Token::Quoted(span)) => span,
            Some(Token::Unterminated(_)) => return Err(ParseErrorKind::UnterminatedQuote),
            _ => return Err(ParseErrorKind::MissingQuotedSpan),
        };

        match tokens.next() {
            Some(Token::Separator) => {}
            Some(_) => return Err(ParseErrorKind::MissingSeparator),
            None => return Err(ParseErrorKind::MissingCitation),
        }

        let citation = match tokens.next() {
            Some(Token::Word(word)) => clean_citation(word),
            _ => return Err(ParseErrorKind::MissingCitation),
        };
        if citation.is_empty() {
            return Err(ParseErrorKind::MissingCitation);
        }
        if !self.citation.matches(citation) {
            return Err(ParseErrorKind::MalformedCitation(citation.to_string()));
        }

        Ok((span.trim().to_string(), citation.to_string()))
    }
}

/// Strip wrapping brackets, markdown emphasis and trailing punctuation
fn clean_citation(token: &str) -> &str {
    token
        .trim_start_matches(['[', '(', '*', '`', '\'', '"'])
        .trim_end_matches([']', ')', '*', '`', '\'', '"', '.', ',', ';', ':', '!', '?'])
}
