//! Prompt Builder - Renders mode-specific prompts from context records
//!
//! Baseline prompts carry summaries only. Enhanced prompts label every
//! field so the model can tell the quotable verbatim text apart from the
//! paraphrased summary, and spell out the block-quote answer format.

use super::records::ContextSet;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

pub(crate) const SYSTEM_PROMPT: &str = "You are a helpful assistant that analyzes user feedback.";
pub(crate) const RECORD_ID_LABEL: &str = "Record ID: ";
pub(crate) const SUMMARY_LABEL: &str = "Summary (for understanding only, never quote): ";
pub(crate) const VERBATIM_LABEL: &str = "Verbatim (quote only from this field): ";

/// Prompt variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptMode {
    /// Summaries only, free-form answer
    Baseline,
    /// Summaries and verbatim text, quote-attributed answer
    Enhanced,
}

impl PromptMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptMode::Baseline => "baseline",
            PromptMode::Enhanced => "enhanced",
        }
    }
}

impl fmt::Display for PromptMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromptMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "baseline" => Ok(PromptMode::Baseline),
            "enhanced" => Ok(PromptMode::Enhanced),
            other => Err(format!("unknown prompt mode: {}", other)),
        }
    }
}

/// Rendered prompt ready for the model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prompt {
    pub mode: PromptMode,
    pub system: String,
    pub user: String,
}

impl Prompt {
    /// Stable SHA-256 hex digest of the rendered prompt
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.system.as_bytes());
        hasher.update(b"\n\n");
        hasher.update(self.user.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Stateless prompt renderer
#[derive(Debug, Default, Clone)]
pub struct PromptBuilder;

impl PromptBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Build the prompt for one query
    pub fn build(&self, mode: PromptMode, query: &str, contexts: &ContextSet) -> Prompt {
        let user = match mode {
            PromptMode::Baseline => self.render_baseline(query, contexts),
            PromptMode::Enhanced => self.render_enhanced(query, contexts),
        };

        Prompt {
            mode,
            system: SYSTEM_PROMPT.to_string(),
            user,
        }
    }

    fn render_baseline(&self, query: &str, contexts: &ContextSet) -> String {
        let context = contexts
            .iter()
            .enumerate()
            .map(|(i, ctx)| format!("Feedback {}: {}", i + 1, ctx.summary_text))
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut prompt = String::from(
            "You are a helpful assistant that answers questions based on user feedback summaries.\n\n",
        );

        if contexts.is_empty() {
            prompt.push_str(
                "No feedback matched this question. Say clearly that no relevant feedback was found.\n\n",
            );
        } else {
            prompt.push_str(&format!("Context from user feedback:\n{}\n\n", context));
        }

        prompt.push_str(&format!(
            "Question: {}\n\n\
            Based on the feedback summaries above, provide a comprehensive answer to the question. \
            If the feedback doesn't contain relevant information, say so clearly.\n\n\
            Answer:",
            query
        ));
        prompt
    }

    fn render_enhanced(&self, query: &str, contexts: &ContextSet) -> String {
        let mut prompt = String::from(
            "You answer questions about user feedback and support every claim with exact quotes.\n\n",
        );

        if contexts.is_empty() {
            prompt.push_str(
                "No feedback records matched this question. Say clearly that no relevant feedback \
                was found and do not include any quotes.\n\n",
            );
        } else {
            prompt.push_str(
                "Context from user feedback. Every record has three labeled fields:\n\
                - Record ID: the identifier to cite\n\
                - Summary: a paraphrase, for understanding only\n\
                - Verbatim: the user's original words, the only quotable text\n",
            );

            for (i, ctx) in contexts.iter().enumerate() {
                prompt.push_str(&format!(
                    "\n[Record {}]\n{}{}\n{}{}\n{}{}\n",
                    i + 1,
                    RECORD_ID_LABEL,
                    ctx.record_id,
                    SUMMARY_LABEL,
                    ctx.summary_text,
                    VERBATIM_LABEL,
                    ctx.verbatim_text
                ));
            }
            prompt.push('\n');
        }

        prompt.push_str(&format!(
            "Question: {}\n\n\
            Answer the question using the records above. These rules are a hard contract:\n\
            1. Write prose paragraphs grouped by theme. Do not write one sentence per record.\n\
            2. Copy quotes only from a Verbatim field, character for character. Never quote a Summary field.\n\
            3. If no Verbatim text supports a claim, omit the quote. Never invent or paraphrase a quote.\n\
            4. After each paragraph, add one or more quote lines, one quote per line, exactly like:\n\
            > \"exact words from the Verbatim field\" \u{2014} record_id\n\
            Leave a blank line after the last quote line of a paragraph.\n\n\
            Answer:",
            query
        ));
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::records::ContextRecord;

    fn contexts() -> ContextSet {
        ContextSet::new(vec![
            ContextRecord {
                record_id: "rec-1".to_string(),
                summary_text: "App crashes on photo upload.".to_string(),
                verbatim_text: "It crashes every single time I upload a photo!!".to_string(),
                source: "zendesk".to_string(),
                language: "en".to_string(),
            },
            ContextRecord {
                record_id: "rec-2".to_string(),
                summary_text: "Login is slow.".to_string(),
                verbatim_text: "login takes forever".to_string(),
                source: "app_store".to_string(),
                language: "en".to_string(),
            },
        ])
        .unwrap()
    }

    #[test]
    fn test_baseline_carries_summaries_only() {
        let prompt = PromptBuilder::new().build(PromptMode::Baseline, "why crashes?", &contexts());

        assert!(prompt.user.contains("Feedback 1: App crashes on photo upload."));
        assert!(prompt.user.contains("Feedback 2: Login is slow."));
        assert!(prompt.user.contains("why crashes?"));
        assert!(!prompt.user.contains("login takes forever"));
        assert!(!prompt.user.contains("rec-1"));
    }

    #[test]
    fn test_enhanced_labels_every_field() {
        let prompt = PromptBuilder::new().build(PromptMode::Enhanced, "why crashes?", &contexts());

        assert!(prompt.user.contains("Record ID: rec-1"));
        assert!(prompt.user.contains(&format!("{}App crashes on photo upload.", SUMMARY_LABEL)));
        assert!(prompt.user.contains(&format!("{}login takes forever", VERBATIM_LABEL)));
        assert!(prompt.user.contains("> \"exact words from the Verbatim field\" \u{2014} record_id"));
        assert!(prompt.user.contains("omit the quote"));
    }

    #[test]
    fn test_build_is_deterministic() {
        let builder = PromptBuilder::new();
        let a = builder.build(PromptMode::Enhanced, "q", &contexts());
        let b = builder.build(PromptMode::Enhanced, "q", &contexts());
        assert_eq!(a, b);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);

        let baseline = builder.build(PromptMode::Baseline, "q", &contexts());
        assert_ne!(a.fingerprint(), baseline.fingerprint());
    }

    #[test]
    fn test_empty_context_prompt() {
        let prompt = PromptBuilder::new().build(PromptMode::Enhanced, "anything?", &ContextSet::default());
        assert!(prompt.user.contains("no relevant feedback"));
        assert!(!prompt.user.contains("[Record 1]"));
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("Enhanced".parse::<PromptMode>().unwrap(), PromptMode::Enhanced);
        assert_eq!("baseline".parse::<PromptMode>().unwrap(), PromptMode::Baseline);
        assert!("fancy".parse::<PromptMode>().is_err());
        assert_eq!(PromptMode::Enhanced.to_string(), "enhanced");
    }
}
