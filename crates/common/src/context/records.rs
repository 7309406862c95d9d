//! Context records and the retrieval collaborator's record types
//!
//! Feedback documents use an attribute envelope:
//! `{"id": "...", "attributes": {"content": {"string": {"values": ["..."]}}}}`

use crate::errors::AssemblyError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Fallback for optional record attributes
const UNKNOWN: &str = "unknown";

/// Summary side of a retrieval hit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SummaryRecord {
    pub id: String,

    /// Summarized feedback text (what the index matched on)
    pub content: String,

    /// Join key: id of the raw record this summary was derived from
    pub feedback_record_id: String,
}

/// Raw feedback record carrying the verbatim text
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawRecord {
    pub id: String,
    pub content: String,
    pub source: String,
    pub language: String,
}

/// One ranked hit as produced by the retrieval collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalHit {
    pub summary: SummaryRecord,

    /// Linked raw record; `None` when the join could not be resolved
    pub record: Option<RawRecord>,

    /// Similarity score from the vector search
    #[serde(default)]
    pub score: f32,
}

/// Normalized per-source context block, immutable once assembled
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextRecord {
    pub record_id: String,
    pub summary_text: String,
    pub verbatim_text: String,
    pub source: String,
    pub language: String,
}

/// Ordered context records for one query, unique by `record_id`
#[derive(Debug, Clone, Default)]
pub struct ContextSet {
    records: Vec<ContextRecord>,
    index: HashMap<String, usize>,
}

impl ContextSet {
    /// Build a set, rejecting duplicate record ids
    pub fn new(records: Vec<ContextRecord>) -> Result<Self, AssemblyError> {
        let mut index = HashMap::with_capacity(records.len());
        for (pos, record) in records.iter().enumerate() {
            if index.insert(record.record_id.clone(), pos).is_some() {
                return Err(AssemblyError::DuplicateRecord {
                    record_id: record.record_id.clone(),
                });
            }
        }
        Ok(Self { records, index })
    }

    pub fn get(&self, record_id: &str) -> Option<&ContextRecord> {
        self.index.get(record_id).map(|&pos| &self.records[pos])
    }

    pub fn contains(&self, record_id: &str) -> bool {
        self.index.contains_key(record_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContextRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.record_id.as_str())
    }
}

impl SummaryRecord {
    /// Parse a `feedback_summary` document
    pub fn from_document(doc: &Value) -> Result<Self, AssemblyError> {
        let id = document_id(doc, "feedback_summary")?;
        let content = required_attribute(doc, &id, "content")?;
        let feedback_record_id = required_attribute(doc, &id, "feedback_record_id")?;

        Ok(Self {
            id,
            content,
            feedback_record_id,
        })
    }
}

impl RawRecord {
    /// Parse a `feedback_record` document
    pub fn from_document(doc: &Value) -> Result<Self, AssemblyError> {
        let id = document_id(doc, "feedback_record")?;
        let content = required_attribute(doc, &id, "content")?;
        let source = attribute(doc, "source").unwrap_or_else(|| UNKNOWN.to_string());
        let language = attribute(doc, "language").unwrap_or_else(|| UNKNOWN.to_string());

        Ok(Self {
            id,
            content,
            source,
            language,
        })
    }
}

fn document_id(doc: &Value, kind: &str) -> Result<String, AssemblyError> {
    doc.get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AssemblyError::MissingField {
            document: kind.to_string(),
            field: "id".to_string(),
        })
}

/// First string value of `attributes.<name>`, if non-empty
fn attribute(doc: &Value, name: &str) -> Option<String> {
    doc.pointer(&format!("/attributes/{}/string/values/0", name))
        .and_then(Value::as_str)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn required_attribute(doc: &Value, id: &str, name: &str) -> Result<String, AssemblyError> {
    attribute(doc, name).ok_or_else(|| AssemblyError::MissingField {
        document: id.to_string(),
        field: format!("attributes.{}", name),
    })
}
