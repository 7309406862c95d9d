//! Context Assembler - Turns retrieval hits into context records
//!
//! No ranking or filtering happens here: hits keep their order, and a hit
//! whose raw record cannot be resolved fails the whole assembly.

use super::records::{ContextRecord, ContextSet, RetrievalHit};
use crate::errors::AssemblyError;

/// Assembler for per-query context sets
#[derive(Debug, Default, Clone)]
pub struct ContextAssembler;

impl ContextAssembler {
    pub fn new() -> Self {
        Self
    }

    /// Assemble hits into an ordered, id-unique context set
    pub fn assemble(&self, hits: &[RetrievalHit]) -> Result<ContextSet, AssemblyError> {
        let mut records = Vec::with_capacity(hits.len());

        for hit in hits {
            let raw = hit.record.as_ref().ok_or_else(|| AssemblyError::MissingRecord {
                summary_id: hit.summary.id.clone(),
                feedback_record_id: hit.summary.feedback_record_id.clone(),
            })?;

            if raw.id != hit.summary.feedback_record_id {
                return Err(AssemblyError::BrokenJoin {
                    summary_id: hit.summary.id.clone(),
                    expected: hit.summary.feedback_record_id.clone(),
                    found: raw.id.clone(),
                });
            }

            records.push(ContextRecord {
                record_id: raw.id.clone(),
                summary_text: hit.summary.content.clone(),
                verbatim_text: raw.content.clone(),
                source: raw.source.clone(),
                language: raw.language.clone(),
            });
        }

        let set = ContextSet::new(records)?;
        tracing::debug!(records = set.len(), "Context assembled");
        Ok(set)
    }
}
