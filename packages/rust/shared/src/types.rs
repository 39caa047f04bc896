//! Core domain types for the JobPulse aggregation pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::JobPulseError;

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// Provenance of a job posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// RSS / Atom syndication feed.
    Feed,
    /// Greenhouse public job-board API.
    Greenhouse,
    /// Lever public postings API.
    Lever,
}

impl Source {
    /// Stable lowercase label, used in identity hashing, storage and export.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Feed => "feed",
            Self::Greenhouse => "greenhouse",
            Self::Lever => "lever",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Source {
    type Err = JobPulseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "feed" => Ok(Self::Feed),
            "greenhouse" => Ok(Self::Greenhouse),
            "lever" => Ok(Self::Lever),
            other => Err(JobPulseError::validation(format!("unknown source '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// RawRecord
// ---------------------------------------------------------------------------

/// A provider-specific record as returned by a connector, not yet canonical.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
    /// Connector variant that produced the record.
    pub source: Source,
    /// Endpoint the record came from (feed URL, board token, company slug).
    pub origin: String,
    /// Original payload, shaped by the provider.
    pub payload: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// The canonical, source-agnostic job posting.
///
/// A `Job` is built fresh on every run and never mutated in place; the
/// scorer returns a new value with `tags` and `score` filled in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Stable identifier derived from title, company, source and source id/URL.
    pub job_id: String,
    /// Provenance.
    pub source: Source,
    /// Source-native identifier, preferred for identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    pub title: String,
    pub company: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Inferred from remote markers in title/location.
    #[serde(default)]
    pub remote: bool,
    /// Application link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Plain-text description, when the source provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Posting time in UTC. `None` never passes the freshness filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posted_at: Option<DateTime<Utc>>,
    /// Normalization time in UTC. Observability only.
    pub fetched_at: DateTime<Utc>,
    /// Matched keywords in discovery order.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Relevance score from the last scoring pass.
    #[serde(default)]
    pub score: u32,
    /// Original source payload, kept for audit.
    #[serde(default)]
    pub raw: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_roundtrip() {
        for source in [Source::Feed, Source::Greenhouse, Source::Lever] {
            let parsed: Source = source.as_str().parse().expect("parse source");
            assert_eq!(parsed, source);
        }
        assert!("monster".parse::<Source>().is_err());
    }

    #[test]
    fn source_serializes_lowercase() {
        let json = serde_json::to_string(&Source::Greenhouse).expect("serialize");
        assert_eq!(json, r#""greenhouse""#);
    }

    #[test]
    fn job_serialization() {
        let job = Job {
            job_id: "abc".into(),
            source: Source::Lever,
            source_id: Some("b1c2".into()),
            title: "Backend Engineer".into(),
            company: "Acme".into(),
            location: None,
            remote: true,
            url: Some("https://jobs.lever.co/acme/b1c2".into()),
            description: None,
            posted_at: Some(Utc::now()),
            fetched_at: Utc::now(),
            tags: vec!["backend".into()],
            score: 5,
            raw: serde_json::json!({"id": "b1c2"}),
        };

        let json = serde_json::to_string(&job).expect("serialize");
        assert!(!json.contains("location"));
        let parsed: Job = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, job);
    }
}
