//! Job pipeline domain logic for JobPulse.
//!
//! Connector output flows through [`normalize`], [`identity`],
//! [`freshness`] and [`scoring`]; [`pipeline`] wires those stages together
//! and hands the ranked result to a [`JobStore`].

pub mod freshness;
pub mod identity;
pub mod normalize;
pub mod pipeline;
pub mod scoring;
pub mod store;

pub use freshness::{Freshness, admit, check_max_age, classify, filter_fresh};
pub use identity::{Deduplicator, canonicalize_url, job_id};
pub use normalize::{Reject, normalize, parse_timestamp};
pub use pipeline::{
    ConnectorSummary, DropCounts, Pipeline, ProgressReporter, RunOutcome, RunParams, RunSummary,
    SilentProgress,
};
pub use scoring::{KeywordSet, rank, tag_and_score};
pub use store::{JobStore, UpsertStats};
