//! Freshness window filter.

use chrono::{DateTime, TimeDelta, Utc};

use jobpulse_shared::{Job, JobPulseError, MAX_AGE_HOURS_LIMIT, Result};

/// Reject windows outside `1..=MAX_AGE_HOURS_LIMIT`.
pub fn check_max_age(max_age_hours: u32) -> Result<()> {
    if !(1..=MAX_AGE_HOURS_LIMIT).contains(&max_age_hours) {
        return Err(JobPulseError::config(format!(
            "max_age_hours must be between 1 and {MAX_AGE_HOURS_LIMIT}, got {max_age_hours}"
        )));
    }
    Ok(())
}

/// Where a job falls relative to the freshness window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
    /// No `posted_at`, so age is unknown.
    Undated,
}

pub fn classify(job: &Job, now: DateTime<Utc>, max_age_hours: u32) -> Freshness {
    match job.posted_at {
        None => Freshness::Undated,
        Some(posted_at) if now - posted_at <= TimeDelta::hours(i64::from(max_age_hours)) => {
            Freshness::Fresh
        }
        Some(_) => Freshness::Stale,
    }
}

/// Whether `job` was posted within `max_age_hours` of `now`. The boundary is
/// inclusive and postings dated in the future are admitted.
pub fn admit(job: &Job, now: DateTime<Utc>, max_age_hours: u32) -> bool {
    classify(job, now, max_age_hours) == Freshness::Fresh
}

/// Keep the jobs that pass [`admit`], preserving order.
pub fn filter_fresh(jobs: Vec<Job>, now: DateTime<Utc>, max_age_hours: u32) -> Vec<Job> {
    jobs.into_iter()
        .filter(|job| admit(job, now, max_age_hours))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use jobpulse_shared::Source;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
    }

    fn posted(at: Option<DateTime<Utc>>) -> Job {
        Job {
            job_id: "id".into(),
            source: Source::Greenhouse,
            source_id: None,
            title: "Engineer".into(),
            company: "Acme".into(),
            location: None,
            remote: false,
            url: None,
            description: None,
            posted_at: at,
            fetched_at: now(),
            tags: Vec::new(),
            score: 0,
            raw: serde_json::Value::Null,
        }
    }

    #[test]
    fn boundary_is_inclusive() {
        let edge = posted(Some(now() - TimeDelta::hours(24)));
        assert!(admit(&edge, now(), 24));

        let past_edge = posted(Some(now() - TimeDelta::hours(24) - TimeDelta::seconds(1)));
        assert!(!admit(&past_edge, now(), 24));
        assert_eq!(classify(&past_edge, now(), 24), Freshness::Stale);
    }

    #[test]
    fn undated_is_never_admitted() {
        let job = posted(None);
        assert!(!admit(&job, now(), 8760));
        assert_eq!(classify(&job, now(), 24), Freshness::Undated);
    }

    #[test]
    fn future_postings_are_admitted() {
        let job = posted(Some(now() + TimeDelta::hours(3)));
        assert!(admit(&job, now(), 1));
    }

    #[test]
    fn timezone_offsets_do_not_skew() {
        let offset = chrono::FixedOffset::west_opt(5 * 3600).unwrap();
        let local = offset.with_ymd_and_hms(2024, 1, 14, 7, 0, 0).unwrap();
        // 12:00Z on the 14th, exactly 24h before now.
        let job = posted(Some(local.with_timezone(&Utc)));
        assert!(admit(&job, now(), 24));
    }

    #[test]
    fn max_age_range() {
        assert!(check_max_age(1).is_ok());
        assert!(check_max_age(MAX_AGE_HOURS_LIMIT).is_ok());
        assert!(check_max_age(0).is_err());
        assert!(check_max_age(MAX_AGE_HOURS_LIMIT + 1).is_err());
    }

    #[test]
    fn filter_keeps_order() {
        let jobs = vec![
            posted(Some(now() - TimeDelta::hours(1))),
            posted(None),
            posted(Some(now() - TimeDelta::hours(30))),
            posted(Some(now() - TimeDelta::hours(2))),
        ];
        let kept = filter_fresh(jobs, now(), 24);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].posted_at, Some(now() - TimeDelta::hours(1)));
        assert_eq!(kept[1].posted_at, Some(now() - TimeDelta::hours(2)));
    }
}
