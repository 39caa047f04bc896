//! Source connector trait and built-in connectors.
//!
//! Each connector fetches raw records from one configured endpoint. Adding a
//! new source means one new module implementing [`SourceConnector`] plus a
//! line in [`ConnectorRegistry::from_config`].

mod feed;
mod greenhouse;
mod lever;

use std::sync::Arc;

use async_trait::async_trait;
use jobpulse_shared::{JobPulseError, RawRecord, Result, Source, SourcesConfig};
use reqwest::Client;
use tracing::debug;

pub use feed::FeedConnector;
pub use greenhouse::{GreenhouseConnector, GreenhouseLocation, GreenhousePosting};
pub use lever::{LeverCategories, LeverConnector, LeverPosting};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A fetcher for one external job source endpoint.
///
/// Implementations return `Err` for transport or body failures; the runner
/// turns those into a failed [`ConnectorReport`](crate::ConnectorReport) so
/// that one broken source never aborts a run.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// Human-readable connector name for tracing and run summaries
    /// (e.g. `greenhouse:acme`).
    fn name(&self) -> &str;

    /// Connector variant, stamped on every record.
    fn source(&self) -> Source;

    /// Fetch all raw records currently published at this endpoint.
    async fn fetch(&self, client: &Client) -> Result<Vec<RawRecord>>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Holds the configured connectors in a fixed order.
///
/// Registry order determines the order in which connector output is joined,
/// which keeps "later record wins" deduplication independent of which
/// connector finished first.
#[derive(Default, Clone)]
pub struct ConnectorRegistry {
    connectors: Vec<Arc<dyn SourceConnector>>,
}

impl ConnectorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one connector per configured endpoint: feeds first, then
    /// Greenhouse boards, then Lever companies. Blank entries are skipped.
    pub fn from_config(sources: &SourcesConfig) -> Self {
        let mut registry = Self::new();

        for feed_url in non_blank(&sources.feeds) {
            registry.register(FeedConnector::new(feed_url));
        }
        for board in non_blank(&sources.greenhouse_boards) {
            registry.register(GreenhouseConnector::new(&sources.greenhouse_api_base, board));
        }
        for company in non_blank(&sources.lever_companies) {
            registry.register(LeverConnector::new(&sources.lever_api_base, company));
        }

        debug!(connectors = registry.len(), "connector registry built");
        registry
    }

    /// Append a connector.
    pub fn register(&mut self, connector: impl SourceConnector + 'static) {
        self.connectors.push(Arc::new(connector));
    }

    /// Number of registered connectors.
    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    /// Whether no connector is registered.
    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }

    /// Registered connectors, in registration order.
    pub fn connectors(&self) -> &[Arc<dyn SourceConnector>] {
        &self.connectors
    }
}

fn non_blank(values: &[String]) -> impl Iterator<Item = &str> {
    values.iter().map(|v| v.trim()).filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// Shared HTTP helpers
// ---------------------------------------------------------------------------

/// GET `url` and return the body. Non-2xx statuses are errors.
pub(crate) async fn fetch_text(client: &Client, url: &str) -> Result<String> {
    debug!(%url, "fetching source endpoint");

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| JobPulseError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(JobPulseError::Network(format!("{url}: HTTP {status}")));
    }

    response
        .text()
        .await
        .map_err(|e| JobPulseError::Network(format!("{url}: body read failed: {e}")))
}

/// Turn a board slug into a display name (`acme-corp` → `Acme Corp`).
pub fn slug_to_company(slug: &str) -> String {
    slug.split(['-', '_'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Join an API base URL and a path without doubling slashes.
pub(crate) fn join_base(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_to_company_title_cases() {
        assert_eq!(slug_to_company("acme-corp"), "Acme Corp");
        assert_eq!(slug_to_company("globex"), "Globex");
        assert_eq!(slug_to_company("initech_labs"), "Initech Labs");
    }

    #[test]
    fn join_base_handles_slashes() {
        assert_eq!(
            join_base("https://api.lever.co/", "/v0/postings/acme"),
            "https://api.lever.co/v0/postings/acme"
        );
    }

    #[test]
    fn registry_from_config_skips_blank_entries() {
        let sources = SourcesConfig {
            feeds: vec!["https://example.com/jobs.rss".into(), "  ".into()],
            greenhouse_boards: vec!["acme".into()],
            lever_companies: vec!["globex".into(), String::new()],
            ..SourcesConfig::default()
        };

        let registry = ConnectorRegistry::from_config(&sources);
        let names: Vec<&str> = registry.connectors().iter().map(|c| c.name()).collect();
        assert_eq!(
            names,
            vec![
                "feed:https://example.com/jobs.rss",
                "greenhouse:acme",
                "lever:globex"
            ]
        );
    }

    #[test]
    fn empty_registry() {
        let registry = ConnectorRegistry::from_config(&SourcesConfig::default());
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }
}
