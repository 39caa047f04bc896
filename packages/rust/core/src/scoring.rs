//! Keyword tagging, scoring and ranking.
//!
//! Scoring only orders results; a job with no keyword match keeps score 0
//! and stays in the output.

use std::cmp::Ordering;
use std::collections::HashSet;

use jobpulse_shared::{Job, JobPulseError, Result, ScoringConfig};

/// An ordered, case-insensitively unique keyword list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordSet {
    keywords: Vec<String>,
}

impl KeywordSet {
    /// Validate and fold a keyword list. Blank keywords are a config error;
    /// repeats are dropped, keeping the first occurrence.
    pub fn parse<I, S>(keywords: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut folded = Vec::new();

        for (position, keyword) in keywords.into_iter().enumerate() {
            let keyword = keyword.as_ref().trim().to_lowercase();
            if keyword.is_empty() {
                return Err(JobPulseError::config(format!(
                    "keyword #{} is blank",
                    position + 1
                )));
            }
            if seen.insert(keyword.clone()) {
                folded.push(keyword);
            }
        }

        Ok(Self { keywords: folded })
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    /// Lower-cased keywords in configured order.
    pub fn as_slice(&self) -> &[String] {
        &self.keywords
    }
}

/// Return `job` with `tags` and `score` recomputed.
///
/// Each distinct keyword counts once, at the weight of the best field it
/// appears in (title, then company, then location, then description when
/// enabled). Tags are listed in discovery order: every title match, then
/// company matches, and so on.
pub fn tag_and_score(job: Job, keywords: &KeywordSet, scoring: &ScoringConfig) -> Job {
    let title = job.title.to_lowercase();
    let company = job.company.to_lowercase();
    let location = job.location.as_deref().map(str::to_lowercase).unwrap_or_default();
    let description = if scoring.match_description {
        job.description.as_deref().map(str::to_lowercase).unwrap_or_default()
    } else {
        String::new()
    };

    let fields = [
        (title.as_str(), scoring.title_weight),
        (company.as_str(), scoring.company_weight),
        (location.as_str(), scoring.location_weight),
        (description.as_str(), scoring.description_weight),
    ];

    let mut tags: Vec<String> = Vec::new();
    let mut score = 0u32;
    for (text, weight) in fields {
        if text.is_empty() {
            continue;
        }
        for keyword in keywords.as_slice() {
            if text.contains(keyword.as_str()) && !tags.contains(keyword) {
                tags.push(keyword.clone());
                score = score.saturating_add(weight);
            }
        }
    }

    Job { tags, score, ..job }
}

/// Sort by score (high first), then `posted_at` (recent first, undated
/// last), then title, then `job_id`. Stable and total, so identical input
/// always yields identical order.
pub fn rank(mut jobs: Vec<Job>) -> Vec<Job> {
    jobs.sort_by(compare);
    jobs
}

fn compare(a: &Job, b: &Job) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| b.posted_at.cmp(&a.posted_at))
        .then_with(|| a.title.cmp(&b.title))
        .then_with(|| a.job_id.cmp(&b.job_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use jobpulse_shared::Source;

    fn at(hour: u32) -> Option<DateTime<Utc>> {
        Some(Utc.with_ymd_and_hms(2024, 1, 15, hour, 0, 0).unwrap())
    }

    fn job(id: &str, title: &str, company: &str, location: Option<&str>) -> Job {
        Job {
            job_id: id.into(),
            source: Source::Feed,
            source_id: None,
            title: title.into(),
            company: company.into(),
            location: location.map(Into::into),
            remote: false,
            url: None,
            description: Some("We use Kubernetes and Go".into()),
            posted_at: at(9),
            fetched_at: Utc::now(),
            tags: Vec::new(),
            score: 0,
            raw: serde_json::Value::Null,
        }
    }

    fn keywords(list: &[&str]) -> KeywordSet {
        KeywordSet::parse(list).unwrap()
    }

    #[test]
    fn parse_folds_and_dedups() {
        let set = KeywordSet::parse(["Rust", " python ", "RUST"]).unwrap();
        assert_eq!(set.as_slice(), ["rust", "python"]);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn parse_rejects_blank() {
        let err = KeywordSet::parse(["rust", "  "]).unwrap_err();
        assert!(err.to_string().contains("keyword #2"));
    }

    #[test]
    fn empty_set_scores_zero() {
        let scored = tag_and_score(
            job("a", "Rust Engineer", "Acme", None),
            &KeywordSet::default(),
            &ScoringConfig::default(),
        );
        assert_eq!(scored.score, 0);
        assert!(scored.tags.is_empty());
    }

    #[test]
    fn field_weights_are_ordered() {
        let scoring = ScoringConfig::default();
        let set = keywords(&["acme"]);

        let in_title = tag_and_score(job("a", "Acme Engineer", "Other", None), &set, &scoring);
        let in_company = tag_and_score(job("b", "Engineer", "Acme", None), &set, &scoring);
        let in_location = tag_and_score(job("c", "Engineer", "Other", Some("Acme City")), &set, &scoring);

        assert!(in_title.score > in_company.score);
        assert!(in_company.score > in_location.score);
        assert!(in_location.score > 0);
    }

    #[test]
    fn keyword_counts_once_at_best_field() {
        let scoring = ScoringConfig::default();
        let scored = tag_and_score(
            job("a", "Rust Engineer", "Rust Corp", Some("Rust Belt")),
            &keywords(&["rust"]),
            &scoring,
        );
        assert_eq!(scored.score, scoring.title_weight);
        assert_eq!(scored.tags, vec!["rust".to_string()]);
    }

    #[test]
    fn tags_follow_discovery_order() {
        let scored = tag_and_score(
            job("a", "Senior Python Engineer", "Remote First Inc", Some("Berlin")),
            &keywords(&["berlin", "remote", "python"]),
            &ScoringConfig::default(),
        );
        assert_eq!(scored.tags, vec!["python", "remote", "berlin"]);
        assert_eq!(scored.score, 5 + 3 + 2);
    }

    #[test]
    fn description_matching_is_opt_in() {
        let set = keywords(&["kubernetes"]);
        let off = tag_and_score(job("a", "SRE", "Acme", None), &set, &ScoringConfig::default());
        assert_eq!(off.score, 0);

        let scoring = ScoringConfig {
            match_description: true,
            ..ScoringConfig::default()
        };
        let on = tag_and_score(job("a", "SRE", "Acme", None), &set, &scoring);
        assert_eq!(on.score, scoring.description_weight);
        assert_eq!(on.tags, vec!["kubernetes"]);
    }

    #[test]
    fn adding_title_keyword_never_lowers_score() {
        let scoring = ScoringConfig::default();
        let base = job("a", "Python Data Engineer", "Acme", Some("Remote"));
        let without = tag_and_score(base.clone(), &keywords(&["remote", "acme"]), &scoring);
        let with = tag_and_score(base, &keywords(&["remote", "acme", "python"]), &scoring);
        assert!(with.score >= without.score);
        assert_eq!(with.score, without.score + scoring.title_weight);
    }

    #[test]
    fn rank_orders_by_score_then_recency_then_title() {
        let mut low = job("1", "Zeta", "Acme", None);
        low.score = 1;
        let mut old = job("2", "Alpha", "Acme", None);
        old.score = 5;
        old.posted_at = at(3);
        let mut recent_b = job("3", "Beta", "Acme", None);
        recent_b.score = 5;
        let mut recent_a = job("4", "Alpha", "Acme", None);
        recent_a.score = 5;
        let mut undated = job("5", "Aardvark", "Acme", None);
        undated.score = 5;
        undated.posted_at = None;

        let ranked = rank(vec![low, old, undated, recent_b, recent_a]);
        let ids: Vec<_> = ranked.iter().map(|j| j.job_id.as_str()).collect();
        assert_eq!(ids, vec!["4", "3", "2", "5", "1"]);
    }

    #[test]
    fn rank_is_independent_of_input_order() {
        let jobs = vec![
            job("a", "Same", "Acme", None),
            job("b", "Same", "Acme", None),
            job("c", "Other", "Acme", None),
        ];
        let mut reversed = jobs.clone();
        reversed.reverse();
        assert_eq!(rank(jobs), rank(reversed));
    }
}
