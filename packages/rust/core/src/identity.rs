//! Stable job identity and in-run deduplication.

use std::collections::HashMap;

use sha2::{Digest, Sha256};
use url::Url;

use jobpulse_shared::{Job, Source};

/// Query parameters that only carry campaign or referral tracking.
const TRACKING_PARAMS: &[&str] = &[
    "ref", "src", "source", "fbclid", "gclid", "_ga", "_gid", "_gac", "mc_cid", "mc_eid",
    "mkt_tok", "igshid", "twclid", "referrer", "referer",
];

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

/// Canonical form of a posting URL.
///
/// Lower-cases scheme and host, drops the fragment and tracking parameters,
/// and strips trailing slashes. Strings that do not parse as URLs are only
/// trimmed.
pub fn canonicalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(mut url) = Url::parse(trimmed) else {
        return trimmed.to_string();
    };

    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept.iter());
    }

    let path = url.path().trim_end_matches('/').to_string();
    url.set_path(&path);

    let mut canonical = url.to_string();
    if url.query().is_none() {
        while canonical.ends_with('/') {
            canonical.pop();
        }
    }
    canonical
}

/// Lower-case and collapse internal whitespace.
fn fold(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Deterministic identifier for a posting.
///
/// Hashes folded title and company, the source name, and the first available
/// of `source_id` and canonical `url`. With neither present the fourth
/// component is empty, so two such postings sharing title, company and
/// source collapse into one.
pub fn job_id(
    title: &str,
    company: &str,
    source: Source,
    source_id: Option<&str>,
    url: Option<&str>,
) -> String {
    let identifier = source_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_lowercase)
        .or_else(|| {
            url.map(str::trim)
                .filter(|u| !u.is_empty())
                .map(canonicalize_url)
        })
        .unwrap_or_default();

    let title = fold(title);
    let company = fold(company);

    let mut hasher = Sha256::new();
    for part in [title.as_str(), company.as_str(), source.as_str(), identifier.as_str()] {
        hasher.update(part.as_bytes());
        hasher.update([0x1f]);
    }
    format!("{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// Deduplicator
// ---------------------------------------------------------------------------

/// Collapses jobs sharing a `job_id` within one run. A later job replaces an
/// earlier one in place, so output order follows first appearance.
#[derive(Debug, Default)]
pub struct Deduplicator {
    index: HashMap<String, usize>,
    jobs: Vec<Job>,
    duplicates: usize,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a job. Returns `false` when it replaced an earlier duplicate.
    pub fn push(&mut self, job: Job) -> bool {
        match self.index.get(&job.job_id) {
            Some(&slot) => {
                self.jobs[slot] = job;
                self.duplicates += 1;
                false
            }
            None => {
                self.index.insert(job.job_id.clone(), self.jobs.len());
                self.jobs.push(job);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Number of jobs that replaced an earlier duplicate.
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    pub fn into_jobs(self) -> Vec<Job> {
        self.jobs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn job(id: &str, title: &str) -> Job {
        Job {
            job_id: id.into(),
            source: Source::Feed,
            source_id: None,
            title: title.into(),
            company: "Acme".into(),
            location: None,
            remote: false,
            url: None,
            description: None,
            posted_at: None,
            fetched_at: Utc::now(),
            tags: Vec::new(),
            score: 0,
            raw: serde_json::Value::Null,
        }
    }

    #[test]
    fn canonicalize_strips_tracking_and_fragment() {
        assert_eq!(
            canonicalize_url("HTTPS://Jobs.Example.com/rust/?utm_source=rss&id=42&fbclid=x#apply"),
            "https://jobs.example.com/rust?id=42"
        );
        assert_eq!(
            canonicalize_url("https://jobs.example.com/rust/?utm_medium=feed"),
            "https://jobs.example.com/rust"
        );
        assert_eq!(canonicalize_url("https://example.com/"), "https://example.com");
    }

    #[test]
    fn canonicalize_leaves_non_urls_trimmed() {
        assert_eq!(canonicalize_url("  not a url "), "not a url");
    }

    #[test]
    fn job_id_is_deterministic() {
        let a = job_id("Rust Engineer", "Acme", Source::Lever, Some("abc"), None);
        let b = job_id("Rust Engineer", "Acme", Source::Lever, Some("abc"), None);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn job_id_ignores_cosmetic_differences() {
        let a = job_id("Rust  Engineer", " ACME ", Source::Feed, None, Some("https://x.io/j/1"));
        let b = job_id(
            "rust engineer",
            "Acme",
            Source::Feed,
            None,
            Some("https://X.io/j/1/?utm_campaign=spring"),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn job_id_prefers_source_id_over_url() {
        let with_id = job_id("T", "C", Source::Greenhouse, Some("7"), Some("https://a/1"));
        let other_url = job_id("T", "C", Source::Greenhouse, Some("7"), Some("https://b/2"));
        assert_eq!(with_id, other_url);
    }

    #[test]
    fn job_id_separates_sources() {
        let feed = job_id("T", "C", Source::Feed, Some("1"), None);
        let lever = job_id("T", "C", Source::Lever, Some("1"), None);
        assert_ne!(feed, lever);
    }

    #[test]
    fn job_id_without_identifiers_collapses() {
        let a = job_id("Engineer", "Acme", Source::Feed, None, None);
        let b = job_id("Engineer", "Acme", Source::Feed, Some("  "), Some(""));
        assert_eq!(a, b);
    }

    #[test]
    fn deduplicator_keeps_later_instance_in_first_position() {
        let mut dedup = Deduplicator::new();
        assert!(dedup.push(job("a", "first")));
        assert!(dedup.push(job("b", "other")));
        assert!(!dedup.push(job("a", "second")));

        assert_eq!(dedup.len(), 2);
        assert_eq!(dedup.duplicates(), 1);
        let jobs = dedup.into_jobs();
        assert_eq!(jobs[0].title, "second");
        assert_eq!(jobs[1].title, "other");
    }
}
