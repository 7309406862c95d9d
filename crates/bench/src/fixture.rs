//! Retrieval fixture: queries with the hits a retriever returned for them
//!
//! Documents keep the feedback attribute envelope, so fixtures can be cut
//! straight from a retrieval dump:
//! `{"queries": [{"query": "...", "hits": [{"summary": {..}, "record": {..}, "score": 0.8}]}]}`

use anyhow::Context;
use quoteforge_common::context::{RawRecord, RetrievalHit, SummaryRecord};
use quoteforge_common::errors::AssemblyError;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct Fixture {
    pub queries: Vec<FixtureQuery>,
}

#[derive(Debug, Deserialize)]
pub struct FixtureQuery {
    pub query: String,

    #[serde(default)]
    pub hits: Vec<FixtureHit>,
}

#[derive(Debug, Deserialize)]
pub struct FixtureHit {
    /// `feedback_summary` document
    pub summary: Value,

    /// `feedback_record` document; absent when the join is broken
    #[serde(default)]
    pub record: Option<Value>,

    #[serde(default)]
    pub score: f32,
}

impl Fixture {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixture {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("Invalid fixture {}", path.display()))
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        let fixture: Fixture = serde_json::from_str(raw)?;
        anyhow::ensure!(!fixture.queries.is_empty(), "fixture has no queries");
        Ok(fixture)
    }
}

impl FixtureQuery {
    /// Parse every document into retrieval hits, keeping their order
    pub fn retrieval_hits(&self) -> Result<Vec<RetrievalHit>, AssemblyError> {
        self.hits.iter().map(FixtureHit::to_retrieval_hit).collect()
    }
}

impl FixtureHit {
    fn to_retrieval_hit(&self) -> Result<RetrievalHit, AssemblyError> {
        let summary = SummaryRecord::from_document(&self.summary)?;
        let record = self
            .record
            .as_ref()
            .filter(|doc| !doc.is_null())
            .map(RawRecord::from_document)
            .transpose()?;

        Ok(RetrievalHit {
            summary,
            record,
            score: self.score,
        })
    }
}
