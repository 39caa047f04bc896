//! libSQL storage layer for canonical jobs and run history.
//!
//! The [`Storage`] struct wraps a local libSQL database. Jobs are keyed by
//! `job_id` and upserted last-write-wins; rows are never deleted here.
//!
//! **Access rules:**
//! - `jobpulse run`: read-write (sole writer) via [`Storage::open`]
//! - `jobpulse query`: read-only via [`Storage::open_readonly`]

mod migrations;

use std::fmt::Display;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use libsql::{Connection, Database, params};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use jobpulse_core::{
    JobStore, KeywordSet, RunSummary, UpsertStats, check_max_age, filter_fresh, rank,
    tag_and_score,
};
use jobpulse_shared::{Job, JobPulseError, Result, ScoringConfig, Source};

const JOB_COLUMNS: &str = "job_id, source, source_id, title, company, location, remote, url, \
     description, posted_at, fetched_at, tags, score, raw";

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

/// One row of run history.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub summary: Option<RunSummary>,
}

fn db_err(e: impl Display) -> JobPulseError {
    JobPulseError::Storage(e.to_string())
}

/// Fixed-width UTC timestamps so that text comparison matches time order.
fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| JobPulseError::Storage(format!("invalid date '{s}': {e}")))
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| JobPulseError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` for reads only.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(JobPulseError::Storage(format!(
                "database not found: {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    JobPulseError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(JobPulseError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Job writes
    // -----------------------------------------------------------------------

    /// Insert or overwrite one job. Returns `true` when the row is new.
    ///
    /// Every column except `job_id` and `first_seen_at` is replaced, so
    /// repeating a call with the same job leaves the row unchanged.
    pub async fn upsert_job(&self, job: &Job) -> Result<bool> {
        self.check_writable()?;
        upsert_on(&self.conn, job).await
    }

    /// Upsert a batch inside one transaction.
    #[instrument(skip_all, fields(jobs = jobs.len()))]
    pub async fn upsert_jobs(&self, jobs: &[Job]) -> Result<UpsertStats> {
        self.check_writable()?;

        let tx = self.conn.transaction().await.map_err(db_err)?;
        let mut stats = UpsertStats::default();
        for job in jobs {
            if upsert_on(&tx, job).await? {
                stats.inserted += 1;
            } else {
                stats.updated += 1;
            }
        }
        tx.commit().await.map_err(db_err)?;

        debug!(inserted = stats.inserted, updated = stats.updated, "upsert complete");
        Ok(stats)
    }

    // -----------------------------------------------------------------------
    // Job reads
    // -----------------------------------------------------------------------

    pub async fn get_job(&self, job_id: &str) -> Result<Option<Job>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE job_id = ?1");
        let mut rows = self.conn.query(&sql, params![job_id]).await.map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_job(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    /// When `job_id` was first stored.
    pub async fn first_seen_at(&self, job_id: &str) -> Result<Option<DateTime<Utc>>> {
        let mut rows = self
            .conn
            .query(
                "SELECT first_seen_at FROM jobs WHERE job_id = ?1",
                params![job_id],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => {
                let s: String = row.get(0).map_err(db_err)?;
                Ok(Some(parse_timestamp(&s)?))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    /// Stored jobs, most recently posted first (undated last).
    pub async fn list_jobs(&self, limit: Option<usize>) -> Result<Vec<Job>> {
        let limit = limit.map_or(-1, |l| l as i64);
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs
             ORDER BY posted_at IS NULL, posted_at DESC, title, job_id
             LIMIT ?1"
        );
        let mut rows = self.conn.query(&sql, params![limit]).await.map_err(db_err)?;

        let mut jobs = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            jobs.push(row_to_job(&row)?);
        }
        Ok(jobs)
    }

    pub async fn count_jobs(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM jobs", params![])
            .await
            .map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row.get(0).map_err(db_err)?;
                u64::try_from(count).map_err(db_err)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(db_err(e)),
        }
    }

    /// Stored jobs posted within `max_age_hours` of `now`, re-tagged and
    /// re-scored against `keywords` and ranked. Reads only.
    #[instrument(skip_all, fields(max_age_hours, keywords = keywords.len()))]
    pub async fn query_fresh(
        &self,
        max_age_hours: u32,
        keywords: &KeywordSet,
        scoring: &ScoringConfig,
        now: DateTime<Utc>,
    ) -> Result<Vec<Job>> {
        check_max_age(max_age_hours)?;
        let cutoff = now - TimeDelta::hours(i64::from(max_age_hours));

        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE posted_at IS NOT NULL AND posted_at >= ?1"
        );
        let mut rows = self
            .conn
            .query(&sql, params![timestamp(&cutoff)])
            .await
            .map_err(db_err)?;

        let mut candidates = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            candidates.push(row_to_job(&row)?);
        }

        let scored = filter_fresh(candidates, now, max_age_hours)
            .into_iter()
            .map(|job| tag_and_score(job, keywords, scoring))
            .collect();
        Ok(rank(scored))
    }

    // -----------------------------------------------------------------------
    // Run history
    // -----------------------------------------------------------------------

    /// Open a run record. Returns the generated run ID.
    pub async fn insert_run(&self, started_at: DateTime<Utc>) -> Result<String> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        self.conn
            .execute(
                "INSERT INTO runs (id, started_at) VALUES (?1, ?2)",
                params![id.as_str(), timestamp(&started_at)],
            )
            .await
            .map_err(db_err)?;
        Ok(id)
    }

    /// Close a run record with its summary.
    pub async fn finish_run(&self, run_id: &str, summary: &RunSummary) -> Result<()> {
        self.check_writable()?;
        let stats_json = serde_json::to_string(summary).map_err(db_err)?;
        self.conn
            .execute(
                "UPDATE runs SET finished_at = ?1, stats_json = ?2 WHERE id = ?3",
                params![timestamp(&Utc::now()), stats_json, run_id],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Most recent runs first.
    pub async fn list_runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, started_at, finished_at, stats_json FROM runs
                 ORDER BY started_at DESC, id DESC LIMIT ?1",
                params![limit as i64],
            )
            .await
            .map_err(db_err)?;

        let mut runs = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            let started: String = row.get(1).map_err(db_err)?;
            let finished_at = match row.get::<String>(2).ok() {
                Some(s) => Some(parse_timestamp(&s)?),
                None => None,
            };
            let summary = match row.get::<String>(3).ok() {
                Some(json) => Some(serde_json::from_str(&json).map_err(db_err)?),
                None => None,
            };
            runs.push(RunRecord {
                id: row.get::<String>(0).map_err(db_err)?,
                started_at: parse_timestamp(&started)?,
                finished_at,
                summary,
            });
        }
        Ok(runs)
    }
}

#[async_trait]
impl JobStore for Storage {
    async fn upsert_jobs(&self, jobs: &[Job]) -> Result<UpsertStats> {
        Storage::upsert_jobs(self, jobs).await
    }

    async fn insert_run(&self, started_at: DateTime<Utc>) -> Result<String> {
        Storage::insert_run(self, started_at).await
    }

    async fn finish_run(&self, run_id: &str, summary: &RunSummary) -> Result<()> {
        Storage::finish_run(self, run_id, summary).await
    }
}

/// Upsert on any connection (plain or inside a transaction).
async fn upsert_on(conn: &Connection, job: &Job) -> Result<bool> {
    let mut existing = conn
        .query("SELECT 1 FROM jobs WHERE job_id = ?1", params![job.job_id.as_str()])
        .await
        .map_err(db_err)?;
    let is_new = existing.next().await.map_err(db_err)?.is_none();

    let tags = serde_json::to_string(&job.tags).map_err(db_err)?;
    let raw = serde_json::to_string(&job.raw).map_err(db_err)?;
    let fetched_at = timestamp(&job.fetched_at);

    conn.execute(
        "INSERT INTO jobs (job_id, source, source_id, title, company, location, remote, url,
                           description, posted_at, fetched_at, tags, score, raw, first_seen_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?11)
         ON CONFLICT(job_id) DO UPDATE SET
           source = excluded.source,
           source_id = excluded.source_id,
           title = excluded.title,
           company = excluded.company,
           location = excluded.location,
           remote = excluded.remote,
           url = excluded.url,
           description = excluded.description,
           posted_at = excluded.posted_at,
           fetched_at = excluded.fetched_at,
           tags = excluded.tags,
           score = excluded.score,
           raw = excluded.raw",
        params![
            job.job_id.as_str(),
            job.source.as_str(),
            job.source_id.as_deref(),
            job.title.as_str(),
            job.company.as_str(),
            job.location.as_deref(),
            i64::from(job.remote),
            job.url.as_deref(),
            job.description.as_deref(),
            job.posted_at.as_ref().map(timestamp),
            fetched_at,
            tags,
            i64::from(job.score),
            raw,
        ],
    )
    .await
    .map_err(db_err)?;

    Ok(is_new)
}

/// Convert a database row (in [`JOB_COLUMNS`] order) to a [`Job`].
fn row_to_job(row: &libsql::Row) -> Result<Job> {
    let source: String = row.get(1).map_err(db_err)?;
    let fetched_at: String = row.get(10).map_err(db_err)?;
    let tags: String = row.get(11).map_err(db_err)?;
    let raw: String = row.get(13).map_err(db_err)?;

    Ok(Job {
        job_id: row.get::<String>(0).map_err(db_err)?,
        source: source.parse::<Source>().map_err(db_err)?,
        source_id: row.get::<String>(2).ok(),
        title: row.get::<String>(3).map_err(db_err)?,
        company: row.get::<String>(4).map_err(db_err)?,
        location: row.get::<String>(5).ok(),
        remote: row.get::<i64>(6).map_err(db_err)? != 0,
        url: row.get::<String>(7).ok(),
        description: row.get::<String>(8).ok(),
        posted_at: match row.get::<String>(9).ok() {
            Some(s) => Some(parse_timestamp(&s)?),
            None => None,
        },
        fetched_at: parse_timestamp(&fetched_at)?,
        tags: serde_json::from_str(&tags).map_err(db_err)?,
        score: u32::try_from(row.get::<i64>(12).map_err(db_err)?).unwrap_or(0),
        raw: serde_json::from_str(&raw).map_err(db_err)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use jobpulse_core::job_id;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
    }

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("jp_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn job(title: &str, company: &str, hours_old: Option<i64>) -> Job {
        let url = format!("https://jobs.example.com/{}", title.to_lowercase().replace(' ', "-"));
        Job {
            job_id: job_id(title, company, Source::Lever, None, Some(url.as_str())),
            source: Source::Lever,
            source_id: None,
            title: title.into(),
            company: company.into(),
            location: Some("Remote".into()),
            remote: true,
            url: Some(url),
            description: None,
            posted_at: hours_old.map(|h| now() - TimeDelta::hours(h)),
            fetched_at: now(),
            tags: vec!["stale-tag".into()],
            score: 42,
            raw: json!({"text": title}),
        }
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 2);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("jp_test_{}.db", Uuid::now_v7()));
        let first = Storage::open(&tmp).await.unwrap();
        drop(first);
        let second = Storage::open(&tmp).await.unwrap();
        assert_eq!(second.get_schema_version().await, 2);
    }

    #[tokio::test]
    async fn job_roundtrip() {
        let storage = test_storage().await;
        let original = job("Rust Engineer", "Acme", Some(2));

        assert!(storage.upsert_job(&original).await.unwrap());
        let loaded = storage.get_job(&original.job_id).await.unwrap().expect("stored");
        assert_eq!(loaded, original);
        assert!(storage.get_job("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let storage = test_storage().await;
        let j = job("Rust Engineer", "Acme", Some(2));

        storage.upsert_job(&j).await.unwrap();
        let once = storage.list_jobs(None).await.unwrap();
        assert!(!storage.upsert_job(&j).await.unwrap());
        let twice = storage.list_jobs(None).await.unwrap();

        assert_eq!(once, twice);
        assert_eq!(storage.count_jobs().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn upsert_overwrites_mutable_fields_and_keeps_first_seen() {
        let storage = test_storage().await;
        let first = job("Rust Engineer", "Acme", Some(5));
        storage.upsert_job(&first).await.unwrap();

        let mut second = first.clone();
        second.fetched_at = now() + TimeDelta::hours(1);
        second.location = None;
        second.tags = vec!["rust".into()];
        second.score = 5;
        second.raw = json!({"text": "Rust Engineer", "v": 2});
        storage.upsert_job(&second).await.unwrap();

        let stored = storage.get_job(&first.job_id).await.unwrap().unwrap();
        assert_eq!(stored, second);
        assert_eq!(
            storage.first_seen_at(&first.job_id).await.unwrap(),
            Some(first.fetched_at)
        );
    }

    #[tokio::test]
    async fn batch_upsert_counts_inserts_and_updates() {
        let storage = test_storage().await;
        let a = job("Rust Engineer", "Acme", Some(1));
        let b = job("Go Engineer", "Acme", Some(1));

        let stats = storage.upsert_jobs(&[a.clone(), b.clone()]).await.unwrap();
        assert_eq!(stats, UpsertStats { inserted: 2, updated: 0 });

        let c = job("Data Engineer", "Acme", Some(1));
        let stats = storage.upsert_jobs(&[a, c]).await.unwrap();
        assert_eq!(stats, UpsertStats { inserted: 1, updated: 1 });
        assert_eq!(storage.count_jobs().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn list_orders_by_recency() {
        let storage = test_storage().await;
        storage
            .upsert_jobs(&[
                job("Old", "Acme", Some(50)),
                job("Undated", "Acme", None),
                job("New", "Acme", Some(1)),
            ])
            .await
            .unwrap();

        let titles: Vec<_> = storage
            .list_jobs(None)
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.title)
            .collect();
        assert_eq!(titles, vec!["New", "Old", "Undated"]);
        assert_eq!(storage.list_jobs(Some(1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn query_fresh_filters_and_rescores() {
        let storage = test_storage().await;
        storage
            .upsert_jobs(&[
                job("Python Developer", "Acme", Some(2)),
                job("Rust Engineer", "Acme", Some(3)),
                job("Sales Associate", "Acme", Some(30)),
                job("Undated Role", "Acme", None),
            ])
            .await
            .unwrap();

        let keywords = KeywordSet::parse(["rust"]).unwrap();
        let fresh = storage
            .query_fresh(24, &keywords, &ScoringConfig::default(), now())
            .await
            .unwrap();

        let ranked: Vec<_> = fresh.iter().map(|j| (j.title.as_str(), j.score)).collect();
        assert_eq!(ranked, vec![("Rust Engineer", 5), ("Python Developer", 0)]);
        assert_eq!(fresh[0].tags, vec!["rust"]);
        assert!(fresh[1].tags.is_empty(), "stored tags are replaced");
    }

    #[tokio::test]
    async fn query_fresh_boundary_is_inclusive() {
        let storage = test_storage().await;
        storage.upsert_job(&job("Edge", "Acme", Some(24))).await.unwrap();

        let fresh = storage
            .query_fresh(24, &KeywordSet::default(), &ScoringConfig::default(), now())
            .await
            .unwrap();
        assert_eq!(fresh.len(), 1);

        let narrower = storage
            .query_fresh(23, &KeywordSet::default(), &ScoringConfig::default(), now())
            .await
            .unwrap();
        assert!(narrower.is_empty());
    }

    #[tokio::test]
    async fn query_fresh_rejects_bad_window() {
        let storage = test_storage().await;
        let result = storage
            .query_fresh(0, &KeywordSet::default(), &ScoringConfig::default(), now())
            .await;
        assert!(matches!(result, Err(JobPulseError::Config { .. })));
    }

    #[tokio::test]
    async fn run_lifecycle() {
        let storage = test_storage().await;
        let run_id = storage.insert_run(now()).await.unwrap();

        let runs = storage.list_runs(10).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert!(runs[0].finished_at.is_none());

        let summary = RunSummary {
            started_at: now(),
            max_age_hours: 24,
            keywords: vec!["rust".into()],
            dry_run: false,
            connectors: Vec::new(),
            fetched: 3,
            normalized: 3,
            admitted: 2,
            dropped: Default::default(),
            stored: Some(UpsertStats { inserted: 2, updated: 0 }),
        };
        storage.finish_run(&run_id, &summary).await.unwrap();

        let runs = storage.list_runs(10).await.unwrap();
        assert_eq!(runs[0].id, run_id);
        assert_eq!(runs[0].started_at, now());
        assert!(runs[0].finished_at.is_some());
        assert_eq!(runs[0].summary.as_ref(), Some(&summary));
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("jp_test_{}.db", Uuid::now_v7()));
        let rw = Storage::open(&tmp).await.unwrap();
        rw.upsert_job(&job("Rust Engineer", "Acme", Some(1))).await.unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        assert_eq!(ro.count_jobs().await.unwrap(), 1);

        let result = ro.upsert_job(&job("Go Engineer", "Acme", Some(1))).await;
        let err = result.unwrap_err();
        assert!(err.to_string().contains("read-only"));
    }

    #[tokio::test]
    async fn count_jobs_reports_errors_instead_of_zero() {
        let storage = test_storage().await;
        assert_eq!(storage.count_jobs().await.unwrap(), 0);

        // An empty file is a valid database without the jobs table.
        let tmp = std::env::temp_dir().join(format!("jp_bare_{}.db", Uuid::now_v7()));
        std::fs::write(&tmp, b"").unwrap();
        let bare = Storage::open_readonly(&tmp).await.unwrap();
        let err = bare.count_jobs().await.unwrap_err();
        assert!(matches!(err, JobPulseError::Storage(_)));
    }

    #[tokio::test]
    async fn readonly_requires_existing_file() {
        let tmp = std::env::temp_dir().join(format!("jp_missing_{}.db", Uuid::now_v7()));
        assert!(Storage::open_readonly(&tmp).await.is_err());
    }
}
