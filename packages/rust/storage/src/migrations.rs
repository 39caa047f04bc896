//! SQL migration definitions for the JobPulse database.
//!
//! Migrations are applied in order on database open. Each migration records
//! its version in `schema_migrations`.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: jobs, runs",
            sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per job_id; rows are overwritten, never deleted.
CREATE TABLE IF NOT EXISTS jobs (
    job_id        TEXT PRIMARY KEY,
    source        TEXT NOT NULL,
    source_id     TEXT,
    title         TEXT NOT NULL,
    company       TEXT NOT NULL,
    location      TEXT,
    remote        INTEGER NOT NULL DEFAULT 0,
    url           TEXT,
    description   TEXT,
    posted_at     TEXT,
    fetched_at    TEXT NOT NULL,
    tags          TEXT NOT NULL DEFAULT '[]',
    score         INTEGER NOT NULL DEFAULT 0,
    raw           TEXT NOT NULL DEFAULT 'null',
    first_seen_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_jobs_posted_at ON jobs(posted_at);
CREATE INDEX IF NOT EXISTS idx_jobs_source ON jobs(source);

-- Pipeline run history
CREATE TABLE IF NOT EXISTS runs (
    id          TEXT PRIMARY KEY,
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    stats_json  TEXT
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Index jobs by company",
            sql: r#"
CREATE INDEX IF NOT EXISTS idx_jobs_company ON jobs(company);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
