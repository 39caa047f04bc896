//! End-to-end run: fetch → normalize → dedup → freshness → score → rank → store.
//!
//! Fetching is concurrent; every later stage runs over the joined connector
//! output on one task. The store is only touched after fetching completes.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use jobpulse_connectors::{ConnectorRegistry, ConnectorReport, Fetcher};
use jobpulse_shared::{AppConfig, FetchConfig, Job, Result, ScoringConfig, Source};

use crate::freshness::{Freshness, check_max_age, classify};
use crate::identity::Deduplicator;
use crate::normalize::{Reject, normalize};
use crate::scoring::{KeywordSet, rank, tag_and_score};
use crate::store::{JobStore, UpsertStats};

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Per-invocation parameters; each overrides the configured default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunParams {
    pub max_age_hours: u32,
    pub keywords: Vec<String>,
    /// Skip store writes (and, in the CLI, export).
    pub dry_run: bool,
}

impl RunParams {
    /// Defaults from `[defaults]` in the config file.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_age_hours: config.defaults.max_age_hours,
            keywords: config.defaults.keywords.clone(),
            dry_run: false,
        }
    }

    /// Check the parameters and fold the keyword list.
    pub fn validate(&self) -> Result<KeywordSet> {
        check_max_age(self.max_age_hours)?;
        KeywordSet::parse(&self.keywords)
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// Fetch result of one connector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorSummary {
    pub connector: String,
    pub source: Source,
    pub fetched: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&ConnectorReport> for ConnectorSummary {
    fn from(report: &ConnectorReport) -> Self {
        let failure = report.failure();
        Self {
            connector: report.connector.clone(),
            source: report.source,
            fetched: report.records().len(),
            failure_kind: failure.map(|f| f.kind.as_str().to_string()),
            error: failure.map(|f| f.message.clone()),
        }
    }
}

/// Records that did not make it into the output, by reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropCounts {
    pub missing_title: usize,
    pub missing_company: usize,
    pub unparsable: usize,
    pub duplicate: usize,
    pub stale: usize,
    pub no_posted_at: usize,
}

impl DropCounts {
    fn record(&mut self, reject: &Reject) {
        match reject {
            Reject::MissingTitle => self.missing_title += 1,
            Reject::MissingCompany => self.missing_company += 1,
            Reject::Unparsable(_) => self.unparsable += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.missing_title
            + self.missing_company
            + self.unparsable
            + self.duplicate
            + self.stale
            + self.no_posted_at
    }
}

/// What happened during one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub max_age_hours: u32,
    pub keywords: Vec<String>,
    pub dry_run: bool,
    pub connectors: Vec<ConnectorSummary>,
    /// Raw records across all connectors.
    pub fetched: usize,
    /// Records that became jobs, before dedup.
    pub normalized: usize,
    /// Jobs in the ranked output.
    pub admitted: usize,
    pub dropped: DropCounts,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored: Option<UpsertStats>,
}

impl RunSummary {
    pub fn failed_connectors(&self) -> impl Iterator<Item = &ConnectorSummary> {
        self.connectors.iter().filter(|c| c.error.is_some())
    }
}

/// Ranked jobs plus the summary of how they were produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub jobs: Vec<Job>,
    pub summary: RunSummary,
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called once per connector after fetching completes.
    fn connector_done(&self, summary: &ConnectorSummary);
    /// Called when the run completes.
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn connector_done(&self, _summary: &ConnectorSummary) {}
    fn done(&self, _summary: &RunSummary) {}
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// A configured pipeline. Holds no state between runs.
pub struct Pipeline {
    registry: ConnectorRegistry,
    fetch: FetchConfig,
    scoring: ScoringConfig,
    write_retries: u32,
}

impl Pipeline {
    pub fn new(config: &AppConfig, registry: ConnectorRegistry) -> Self {
        Self {
            registry,
            fetch: FetchConfig::from(config),
            scoring: config.scoring.clone(),
            write_retries: config.storage.write_retries,
        }
    }

    pub fn registry(&self) -> &ConnectorRegistry {
        &self.registry
    }

    /// Fetch, normalize, dedup, filter, score and rank as of `now`.
    ///
    /// Invalid parameters fail here before any request is made. Connector
    /// failures never fail the run; they show up in the summary.
    #[instrument(skip_all, fields(connectors = self.registry.len(), max_age_hours = params.max_age_hours))]
    pub async fn collect(
        &self,
        params: &RunParams,
        now: DateTime<Utc>,
        progress: &dyn ProgressReporter,
    ) -> Result<RunOutcome> {
        let keywords = params.validate()?;
        self.scoring.validate()?;
        let fetcher = Fetcher::new(self.fetch.clone())?;

        // --- Phase 1: Fetch ---
        progress.phase("Fetching sources");
        let reports = fetcher.fetch_all(&self.registry).await;

        let connectors: Vec<ConnectorSummary> = reports.iter().map(ConnectorSummary::from).collect();
        for summary in &connectors {
            progress.connector_done(summary);
        }

        // --- Phase 2: Normalize + dedup ---
        progress.phase("Normalizing postings");
        let mut dropped = DropCounts::default();
        let mut fetched = 0;
        let mut normalized = 0;
        let mut dedup = Deduplicator::new();

        for report in &reports {
            for raw in report.records() {
                fetched += 1;
                match normalize(raw, now) {
                    Ok(job) => {
                        normalized += 1;
                        dedup.push(job);
                    }
                    Err(reject) => {
                        debug!(connector = %report.connector, reason = %reject, "record rejected");
                        dropped.record(&reject);
                    }
                }
            }
        }
        dropped.duplicate = dedup.duplicates();

        // --- Phase 3: Freshness + scoring ---
        progress.phase("Scoring fresh postings");
        let mut admitted = Vec::new();
        for job in dedup.into_jobs() {
            match classify(&job, now, params.max_age_hours) {
                Freshness::Fresh => admitted.push(tag_and_score(job, &keywords, &self.scoring)),
                Freshness::Stale => dropped.stale += 1,
                Freshness::Undated => dropped.no_posted_at += 1,
            }
        }
        let jobs = rank(admitted);

        let summary = RunSummary {
            started_at: now,
            max_age_hours: params.max_age_hours,
            keywords: keywords.as_slice().to_vec(),
            dry_run: params.dry_run,
            connectors,
            fetched,
            normalized,
            admitted: jobs.len(),
            dropped,
            stored: None,
        };

        info!(
            fetched = summary.fetched,
            admitted = summary.admitted,
            dropped = summary.dropped.total(),
            failed_connectors = summary.failed_connectors().count(),
            "collection complete"
        );

        Ok(RunOutcome { jobs, summary })
    }

    /// Upsert the outcome's jobs and record the run. Write failures are
    /// retried up to the configured count and then returned.
    #[instrument(skip_all, fields(jobs = outcome.jobs.len()))]
    pub async fn persist(&self, outcome: &mut RunOutcome, store: &dyn JobStore) -> Result<UpsertStats> {
        let run_id = store.insert_run(outcome.summary.started_at).await?;

        let stats = match self.upsert_with_retry(store, &outcome.jobs).await {
            Ok(stats) => stats,
            Err(e) => {
                if let Err(finish) = store.finish_run(&run_id, &outcome.summary).await {
                    warn!(error = %finish, "failed to close run record");
                }
                return Err(e);
            }
        };

        outcome.summary.stored = Some(stats);
        store.finish_run(&run_id, &outcome.summary).await?;

        info!(inserted = stats.inserted, updated = stats.updated, "jobs stored");
        Ok(stats)
    }

    async fn upsert_with_retry(&self, store: &dyn JobStore, jobs: &[Job]) -> Result<UpsertStats> {
        let mut attempt = 0;
        loop {
            match store.upsert_jobs(jobs).await {
                Ok(stats) => return Ok(stats),
                Err(e) if e.is_retryable() && attempt < self.write_retries => {
                    attempt += 1;
                    warn!(attempt, error = %e, "store write failed, retrying");
                    tokio::time::sleep(Duration::from_millis(100 * u64::from(attempt))).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Collect as of now and, unless `dry_run`, persist.
    pub async fn run(
        &self,
        params: &RunParams,
        store: &dyn JobStore,
        progress: &dyn ProgressReporter,
    ) -> Result<RunOutcome> {
        let mut outcome = self.collect(params, Utc::now(), progress).await?;

        if !params.dry_run {
            progress.phase("Storing postings");
            self.persist(&mut outcome, store).await?;
        }

        progress.done(&outcome.summary);
        Ok(outcome)
    }
}
