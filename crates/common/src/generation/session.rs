//! Generation session state machine
//!
//! `Init -> Streaming` on the first increment, `Streaming -> Completed` on
//! the usage signal, and `Init | Streaming -> Failed | Cancelled`.
//! Terminal states never change again.
//!
//! Timing runs from the moment the request is sent, so a rate-limit wait
//! before the stream opens is not counted in time to first token.

use super::provider::TokenUsage;
use crate::errors::StreamFailure;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Init,
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Init => "init",
            SessionStatus::Streaming => "streaming",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One streamed generation for one query
#[derive(Debug, Clone)]
pub struct GenerationSession {
    query_id: Uuid,
    model: String,
    status: SessionStatus,
    text: String,
    chunk_count: usize,
    started_at: DateTime<Utc>,
    started: Instant,
    time_to_first_token: Option<Duration>,
    total_time: Option<Duration>,
    usage: Option<TokenUsage>,
    failure: Option<StreamFailure>,
}

impl GenerationSession {
    pub fn new(query_id: Uuid, model: impl Into<String>) -> Self {
        Self {
            query_id,
            model: model.into(),
            status: SessionStatus::Init,
            text: String::new(),
            chunk_count: 0,
            started_at: Utc::now(),
            started: Instant::now(),
            time_to_first_token: None,
            total_time: None,
            usage: None,
            failure: None,
        }
    }

    pub fn query_id(&self) -> Uuid {
        self.query_id
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Every increment delivered so far, in order
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn time_to_first_token(&self) -> Option<Duration> {
        self.time_to_first_token
    }

    /// Set only for completed sessions
    pub fn total_time(&self) -> Option<Duration> {
        self.total_time
    }

    /// Set only for completed sessions
    pub fn usage(&self) -> Option<TokenUsage> {
        self.usage
    }

    pub fn failure(&self) -> Option<&StreamFailure> {
        self.failure.as_ref()
    }

    /// Restart timing just before the request goes out; only before the first increment
    pub(crate) fn restart_clock(&mut self) {
        if self.status == SessionStatus::Init {
            self.started_at = Utc::now();
            self.started = Instant::now();
        }
    }

    /// Append an increment; ignored once the session is terminal
    pub(crate) fn record_delta(&mut self, delta: &str) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        if self.status == SessionStatus::Init {
            self.time_to_first_token = Some(self.started.elapsed());
            self.status = SessionStatus::Streaming;
        }
        self.text.push_str(delta);
        self.chunk_count += 1;
        true
    }

    pub(crate) fn complete(&mut self, usage: TokenUsage) -> bool {
        if !self.enter(SessionStatus::Completed) {
            return false;
        }
        let total = self.started.elapsed();
        // Keep ttft <= total_time even with a coarse clock
        self.time_to_first_token = self.time_to_first_token.map(|ttft| ttft.min(total));
        self.total_time = Some(total);
        self.usage = Some(usage);
        true
    }

    pub(crate) fn fail(&mut self, failure: StreamFailure) -> bool {
        if !self.enter(SessionStatus::Failed) {
            return false;
        }
        self.failure = Some(failure);
        true
    }

    pub(crate) fn cancel(&mut self) -> bool {
        self.enter(SessionStatus::Cancelled)
    }

    fn enter(&mut self, next: SessionStatus) -> bool {
        if self.status.is_terminal() {
            tracing::debug!(
                query_id = %self.query_id,
                from = %self.status,
                to = %next,
                "Ignoring transition out of terminal state"
            );
            return false;
        }
        self.status = next;
        true
    }
}
