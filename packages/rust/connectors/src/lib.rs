//! Source connectors and the concurrent fetch runner.
//!
//! This crate provides:
//! - [`sources`]: the [`SourceConnector`] trait, the feed, Greenhouse and
//!   Lever connectors, and the [`ConnectorRegistry`]
//! - [`syndication`]: a tolerant RSS/Atom parser
//! - [`runner`]: [`Fetcher`], which runs every connector concurrently with
//!   per-connector failure isolation

pub mod runner;
pub mod sources;
pub mod syndication;

pub use runner::{
    ConnectorOutcome, ConnectorReport, FailureKind, FetchFailure, Fetcher, fetch_all,
};
pub use sources::{
    ConnectorRegistry, FeedConnector, GreenhouseConnector, GreenhouseLocation, GreenhousePosting,
    LeverCategories, LeverConnector, LeverPosting, SourceConnector, slug_to_company,
};
pub use syndication::{FeedEntry, FeedParse, parse_feed};
