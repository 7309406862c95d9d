//! Query sweep: every fixture query in every mode, bounded concurrency
//!
//! A query whose fixture hits cannot be parsed fails on its own; the rest
//! of the sweep keeps running.

use crate::fixture::Fixture;
use crate::report::ReportRow;
use futures::stream::{self, StreamExt};
use quoteforge_common::context::PromptMode;
use quoteforge_common::{metrics, AppError, NullSink, QueryRequest, QueryRunner};
use tracing::warn;

pub const MODES: [PromptMode; 2] = [PromptMode::Baseline, PromptMode::Enhanced];

/// One report row to produce
pub enum Job {
    Run(QueryRequest),
    /// Failed before reaching the runner
    Failed(ReportRow),
}

/// Expand the fixture into jobs, in report order
pub fn plan(fixture: &Fixture) -> Vec<Job> {
    let mut jobs = Vec::with_capacity(fixture.queries.len() * MODES.len());

    for query in &fixture.queries {
        match query.retrieval_hits() {
            Ok(hits) => {
                for mode in MODES {
                    jobs.push(Job::Run(QueryRequest::new(query.query.clone(), mode, hits.clone())));
                }
            }
            Err(e) => {
                warn!(query = %query.query, error = %e, "Invalid fixture hits, recording error rows");
                let error = AppError::from(e);
                for mode in MODES {
                    metrics::record_query_failure(mode.as_str(), error.code().as_code());
                    jobs.push(Job::Failed(ReportRow::failed(&query.query, mode, &error)));
                }
            }
        }
    }
    jobs
}

/// Run every job; rows come back in job order
pub async fn run(runner: &QueryRunner, jobs: Vec<Job>, concurrency: usize) -> Vec<ReportRow> {
    let mut rows: Vec<(usize, ReportRow)> = stream::iter(jobs.into_iter().enumerate())
        .map(|(index, job)| async move {
            let row = match job {
                Job::Run(request) => run_request(runner, &request).await,
                Job::Failed(row) => row,
            };
            (index, row)
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    rows.sort_by_key(|(index, _)| *index);
    rows.into_iter().map(|(_, row)| row).collect()
}

async fn run_request(runner: &QueryRunner, request: &QueryRequest) -> ReportRow {
    match runner.run(request, &mut NullSink).await {
        Ok(outcome) => ReportRow::from_outcome(&outcome),
        Err(e) => {
            warn!(
                query = %request.query,
                mode = %request.mode,
                code = e.code().as_code(),
                "Query failed, recording error row"
            );
            ReportRow::failed(&request.query, request.mode, &e)
        }
    }
}
