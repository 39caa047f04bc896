//! Raw record to canonical [`Job`] conversion.
//!
//! Each source has its own payload shape; all of them end up in
//! [`assemble`], which applies the shared cleanup, rejection and identity
//! rules.

use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use regex::Regex;
use scraper::Html;

use jobpulse_connectors::{FeedEntry, GreenhousePosting, LeverPosting, slug_to_company};
use jobpulse_shared::{Job, RawRecord, Source};

use crate::identity::job_id;

/// Case-insensitive substrings that mark a posting as remote.
const REMOTE_MARKERS: &[&str] = &["remote", "anywhere", "work from home", "wfh", "distributed"];

/// Words that identify the job-title side of a `"<a> - <b>"` style title.
const JOB_WORDS: &[&str] = &[
    "engineer", "developer", "manager", "analyst", "designer", "director", "lead", "senior",
    "junior", "intern", "specialist",
];

/// Phrases that make a parenthesised title segment look like a location.
const LOCATION_PHRASES: &[&str] = &[
    "remote", "hybrid", "city", "state", "san francisco", "new york", "los angeles", "chicago",
    "boston",
];

/// State codes that only count as whole words.
const LOCATION_CODES: &[&str] = &["ca", "ny", "tx", "fl"];

static PARENTHESISED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(([^)]+)\)").expect("valid regex"));

// ---------------------------------------------------------------------------
// Reject
// ---------------------------------------------------------------------------

/// Why a raw record did not become a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reject {
    MissingTitle,
    MissingCompany,
    /// The payload does not have the shape its source promises.
    Unparsable(String),
}

impl Reject {
    /// Label used in run summaries.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingTitle => "missing_title",
            Self::MissingCompany => "missing_company",
            Self::Unparsable(_) => "unparsable",
        }
    }
}

impl fmt::Display for Reject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unparsable(detail) => write!(f, "unparsable: {detail}"),
            other => f.write_str(other.reason()),
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Fields common to every source before cleanup.
#[derive(Default)]
struct Draft {
    source_id: Option<String>,
    title: Option<String>,
    company: Option<String>,
    location: Option<String>,
    remote_hint: bool,
    url: Option<String>,
    description: Option<String>,
    posted_at: Option<DateTime<Utc>>,
}

/// Convert a raw record into a canonical job stamped with `now`.
pub fn normalize(raw: &RawRecord, now: DateTime<Utc>) -> Result<Job, Reject> {
    let draft = match raw.source {
        Source::Feed => from_feed(raw)?,
        Source::Greenhouse => from_greenhouse(raw)?,
        Source::Lever => from_lever(raw)?,
    };
    assemble(raw, draft, now)
}

fn assemble(raw: &RawRecord, draft: Draft, now: DateTime<Utc>) -> Result<Job, Reject> {
    let title = draft
        .title
        .as_deref()
        .and_then(clean)
        .ok_or(Reject::MissingTitle)?;
    let company = draft
        .company
        .as_deref()
        .and_then(clean)
        .ok_or(Reject::MissingCompany)?;
    let location = draft.location.as_deref().and_then(clean);
    let source_id = draft.source_id.as_deref().and_then(clean);
    let url = draft.url.as_deref().and_then(clean);

    let remote = draft.remote_hint
        || has_remote_marker(&title)
        || location.as_deref().is_some_and(has_remote_marker);

    Ok(Job {
        job_id: job_id(&title, &company, raw.source, source_id.as_deref(), url.as_deref()),
        source: raw.source,
        source_id,
        title,
        company,
        location,
        remote,
        url,
        description: draft.description.as_deref().and_then(html_to_text),
        posted_at: draft.posted_at,
        fetched_at: now,
        tags: Vec::new(),
        score: 0,
        raw: raw.payload.clone(),
    })
}

// ---------------------------------------------------------------------------
// Per-source mapping
// ---------------------------------------------------------------------------

fn from_feed(raw: &RawRecord) -> Result<Draft, Reject> {
    let entry: FeedEntry = serde_json::from_value(raw.payload.clone())
        .map_err(|e| Reject::Unparsable(e.to_string()))?;

    let title = entry.title.as_deref().and_then(clean);
    let company = entry
        .company
        .clone()
        .or_else(|| entry.author.clone())
        .or_else(|| title.as_deref().and_then(company_from_title));
    let location = entry
        .location
        .clone()
        .or_else(|| title.as_deref().and_then(location_from_title));
    let posted_at = entry
        .published
        .as_deref()
        .and_then(parse_timestamp)
        .or_else(|| entry.updated.as_deref().and_then(parse_timestamp));

    Ok(Draft {
        source_id: entry.id,
        title,
        company,
        location,
        remote_hint: false,
        url: entry.link,
        description: entry.description,
        posted_at,
    })
}

fn from_greenhouse(raw: &RawRecord) -> Result<Draft, Reject> {
    let posting: GreenhousePosting = serde_json::from_value(raw.payload.clone())
        .map_err(|e| Reject::Unparsable(e.to_string()))?;

    let company = posting
        .company_name
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| slug_to_company(&raw.origin));

    let posted_at = greenhouse_posted_at(
        posting.updated_at.as_deref(),
        [posting.created_at.as_deref(), posting.first_published.as_deref()],
    );

    Ok(Draft {
        source_id: posting.id.map(|id| id.to_string()),
        title: posting.title,
        company: Some(company),
        location: posting.location.and_then(|l| l.name),
        remote_hint: false,
        url: posting.absolute_url,
        description: posting.content,
        posted_at,
    })
}

/// `updated_at`, unless an earlier creation timestamp is more than a day
/// older; boards bump `updated_at` on trivial edits.
fn greenhouse_posted_at(
    updated: Option<&str>,
    created: [Option<&str>; 2],
) -> Option<DateTime<Utc>> {
    let updated = updated.and_then(parse_timestamp);
    let earliest = created.into_iter().flatten().filter_map(parse_timestamp).min();

    match (updated, earliest) {
        (Some(updated), Some(earliest)) if updated - earliest > TimeDelta::days(1) => Some(earliest),
        (Some(updated), _) => Some(updated),
        (None, earliest) => earliest,
    }
}

fn from_lever(raw: &RawRecord) -> Result<Draft, Reject> {
    let posting: LeverPosting = serde_json::from_value(raw.payload.clone())
        .map_err(|e| Reject::Unparsable(e.to_string()))?;

    let remote_hint = posting
        .workplace_type
        .as_deref()
        .is_some_and(|w| w.eq_ignore_ascii_case("remote"));

    Ok(Draft {
        source_id: posting.id,
        title: posting.text,
        company: Some(slug_to_company(&raw.origin)),
        location: posting.categories.location_text(),
        remote_hint,
        url: posting.hosted_url.or(posting.apply_url),
        description: posting.description_plain.or(posting.description),
        posted_at: posting.created_at.and_then(DateTime::from_timestamp_millis),
    })
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

/// Trim and collapse whitespace; `None` when nothing is left.
fn clean(value: &str) -> Option<String> {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}

fn has_remote_marker(value: &str) -> bool {
    let lower = value.to_lowercase();
    REMOTE_MARKERS.iter().any(|m| lower.contains(m))
}

fn has_job_word(value: &str) -> bool {
    let lower = value.to_lowercase();
    JOB_WORDS.iter().any(|w| lower.contains(w))
}

/// Infer the company from `"<title> at <company>"`, `"<a> - <b>"` or
/// `"<a> | <b>"`, picking the side without a job word.
pub fn company_from_title(title: &str) -> Option<String> {
    for separator in [" at ", " - ", " | "] {
        let Some((left, right)) = title.split_once(separator) else {
            continue;
        };
        let (left, right) = (left.trim(), right.trim());
        let picked = match (has_job_word(left), has_job_word(right)) {
            (true, false) => right,
            (false, true) => left,
            _ if separator == " at " => right,
            _ => continue,
        };
        let company = PARENTHESISED.replace_all(picked, "");
        if let Some(company) = clean(&company) {
            return Some(company);
        }
    }
    None
}

/// Infer a location from a parenthesised title segment such as
/// `"Engineer (Remote)"`.
pub fn location_from_title(title: &str) -> Option<String> {
    PARENTHESISED
        .captures_iter(title)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().trim()))
        .find(|segment| looks_like_location(segment))
        .map(str::to_string)
}

fn looks_like_location(segment: &str) -> bool {
    let lower = segment.to_lowercase();
    LOCATION_PHRASES.iter().any(|p| lower.contains(p))
        || lower
            .split(|c: char| !c.is_ascii_alphanumeric())
            .any(|word| LOCATION_CODES.contains(&word))
}

/// Parse the timestamp formats seen across feeds and board APIs into UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Some(dt) = parse_rfc2822_lenient(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"] {
        if let Ok(dt) = DateTime::parse_from_str(value, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// RFC 2822 as feeds actually write it: `UTC` or `Z` as the zone name, and
/// a weekday that may not match the date (the weekday is then ignored).
fn parse_rfc2822_lenient(value: &str) -> Option<DateTime<FixedOffset>> {
    let zoned = [" UTC", " Z"]
        .iter()
        .find_map(|zone| value.strip_suffix(zone))
        .map(|head| format!("{head} +0000"));
    let value = zoned.as_deref().unwrap_or(value);

    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt);
    }
    let (weekday, rest) = value.split_once(',')?;
    if weekday.trim().is_empty() || !weekday.trim().chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    DateTime::parse_from_rfc2822(rest.trim()).ok()
}

/// Strip markup and decode entities. Greenhouse double-escapes its HTML, so
/// a second pass runs when the first one still yields tags.
fn html_to_text(value: &str) -> Option<String> {
    let mut text = fragment_text(value);
    if text.contains('<') && text.contains('>') {
        text = fragment_text(&text);
    }
    clean(&text)
}

fn fragment_text(html: &str) -> String {
    Html::parse_fragment(html)
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ")
}
