//! Persistence seam used by the pipeline.
//!
//! The libSQL implementation lives in `jobpulse-storage`; keeping the trait
//! here lets the pipeline run against any store, including in-memory ones in
//! tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use jobpulse_shared::{Job, Result};

use crate::pipeline::RunSummary;

/// Row counts from a batch upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertStats {
    pub inserted: usize,
    pub updated: usize,
}

impl UpsertStats {
    pub fn total(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Write side of the job store.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert or overwrite each job by `job_id`. Errors are returned, never
    /// swallowed; callers decide whether to retry.
    async fn upsert_jobs(&self, jobs: &[Job]) -> Result<UpsertStats>;

    /// Open a run-history row and return its id.
    async fn insert_run(&self, started_at: DateTime<Utc>) -> Result<String>;

    /// Close a run-history row with its summary.
    async fn finish_run(&self, run_id: &str, summary: &RunSummary) -> Result<()>;
}
