//! Cost Tracker - Prices completed generation sessions
//!
//! The pricing table is built once from configuration and shared read-only
//! behind an `Arc`. Cost is only computed from a completed session's usage
//! record; an unpriced model is an error, never a zero cost.

use crate::config::{PricingConfig, PricingEntry};
use crate::errors::{AppError, Result};
use crate::generation::{GenerationSession, SessionStatus, TokenUsage};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

const TOKENS_PER_UNIT: f64 = 1_000_000.0;

/// Immutable model -> rate table (USD per 1M tokens)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PricingTable {
    rates: HashMap<String, PricingEntry>,
}

impl PricingTable {
    pub fn new(rates: HashMap<String, PricingEntry>) -> Self {
        Self { rates }
    }

    pub fn from_config(config: &PricingConfig) -> Self {
        Self::new(config.models.clone())
    }

    /// Exact model id lookup
    pub fn rate(&self, model: &str) -> Option<PricingEntry> {
        self.rates.get(model).copied()
    }
}

/// Priced usage of one completed session
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostRecord {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub cost_usd: f64,
}

#[derive(Debug, Clone)]
pub struct CostTracker {
    pricing: Arc<PricingTable>,
}

impl CostTracker {
    pub fn new(pricing: Arc<PricingTable>) -> Self {
        Self { pricing }
    }

    /// Fail fast on a model with no pricing entry
    pub fn ensure_known(&self, model: &str) -> Result<PricingEntry> {
        self.pricing.rate(model).ok_or_else(|| AppError::UnknownModel {
            model: model.to_string(),
        })
    }

    /// `input_tokens * rate_in + output_tokens * rate_out`
    pub fn cost_for(&self, model: &str, usage: TokenUsage) -> Result<CostRecord> {
        let rate = self.ensure_known(model)?;
        let cost_usd = usage.input_tokens as f64 * rate.input_per_million / TOKENS_PER_UNIT
            + usage.output_tokens as f64 * rate.output_per_million / TOKENS_PER_UNIT;

        Ok(CostRecord {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            total_tokens: usage.total(),
            cost_usd,
        })
    }

    /// Price a finished session; only completed sessions carry usage
    pub fn finalize(&self, session: &GenerationSession) -> Result<CostRecord> {
        match (session.status(), session.usage()) {
            (SessionStatus::Completed, Some(usage)) => self.cost_for(session.model(), usage),
            (status, _) => Err(AppError::Internal {
                message: format!(
                    "cannot price session {} in state {}",
                    session.query_id(),
                    status
                ),
            }),
        }
    }
}
