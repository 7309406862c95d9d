//! Context Components
//!
//! Everything the model sees for one query:
//! - Retrieval collaborator record types
//! - Context assembly (summary -> record join)
//! - Mode-specific prompt rendering

mod assembler;
mod prompt;
mod records;

pub use assembler::ContextAssembler;
pub use prompt::{Prompt, PromptBuilder, PromptMode};
pub(crate) use prompt::{RECORD_ID_LABEL, VERBATIM_LABEL};
pub use records::{ContextRecord, ContextSet, RawRecord, RetrievalHit, SummaryRecord};
