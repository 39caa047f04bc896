//! Concurrent connector runner.
//!
//! Every registered connector is fetched in its own task, bounded by a
//! semaphore and a per-connector timeout. Failures are captured per connector
//! so that one broken source never aborts the run, and results are joined in
//! registry order regardless of completion order.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use jobpulse_shared::{FetchConfig, JobPulseError, RawRecord, Result, Source};

use crate::sources::{ConnectorRegistry, SourceConnector};

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Why a connector produced no records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    Network,
    Malformed,
    /// The fetch task panicked or was cancelled.
    Aborted,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::Malformed => "malformed",
            Self::Aborted => "aborted",
        }
    }
}

/// A captured connector failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl FetchFailure {
    fn from_error(err: &JobPulseError) -> Self {
        let kind = match err {
            JobPulseError::Parse { .. } => FailureKind::Malformed,
            _ => FailureKind::Network,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ConnectorOutcome {
    Fetched(Vec<RawRecord>),
    Failed(FetchFailure),
}

/// Result of running one connector.
#[derive(Debug, Clone)]
pub struct ConnectorReport {
    pub connector: String,
    pub source: Source,
    pub outcome: ConnectorOutcome,
    pub elapsed: Duration,
}

impl ConnectorReport {
    /// Records fetched, or an empty slice on failure.
    pub fn records(&self) -> &[RawRecord] {
        match &self.outcome {
            ConnectorOutcome::Fetched(records) => records,
            ConnectorOutcome::Failed(_) => &[],
        }
    }

    pub fn failure(&self) -> Option<&FetchFailure> {
        match &self.outcome {
            ConnectorOutcome::Fetched(_) => None,
            ConnectorOutcome::Failed(failure) => Some(failure),
        }
    }
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// Runs connectors with a shared HTTP client.
pub struct Fetcher {
    config: FetchConfig,
    client: Client,
}

impl Fetcher {
    /// Build a fetcher. Fails if `config` is invalid or the HTTP client
    /// cannot be constructed.
    pub fn new(config: FetchConfig) -> Result<Self> {
        config.validate()?;

        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| JobPulseError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Fetch every connector in `registry`. Never fails as a whole: each
    /// connector's error is captured in its report.
    #[instrument(skip_all, fields(connectors = registry.len()))]
    pub async fn fetch_all(&self, registry: &ConnectorRegistry) -> Vec<ConnectorReport> {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency as usize));
        let timeout = Duration::from_secs(self.config.timeout_secs);

        info!(
            concurrency = self.config.concurrency,
            timeout_secs = self.config.timeout_secs,
            "fetching sources"
        );

        let mut handles = Vec::with_capacity(registry.len());
        for connector in registry.connectors() {
            let connector = Arc::clone(connector);
            let sem = Arc::clone(&semaphore);
            let client = self.client.clone();

            handles.push(tokio::spawn(async move {
                let _permit = sem.acquire_owned().await.ok();
                let started = Instant::now();
                let outcome = run_one(connector.as_ref(), &client, timeout).await;
                (outcome, started.elapsed())
            }));
        }

        let mut reports = Vec::with_capacity(handles.len());
        for (connector, handle) in registry.connectors().iter().zip(handles) {
            let (outcome, elapsed) = match handle.await {
                Ok(done) => done,
                Err(e) => (
                    ConnectorOutcome::Failed(FetchFailure {
                        kind: FailureKind::Aborted,
                        message: e.to_string(),
                    }),
                    Duration::ZERO,
                ),
            };

            match &outcome {
                ConnectorOutcome::Fetched(records) => debug!(
                    connector = connector.name(),
                    records = records.len(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "connector finished"
                ),
                ConnectorOutcome::Failed(failure) => warn!(
                    connector = connector.name(),
                    kind = failure.kind.as_str(),
                    error = %failure.message,
                    "connector failed"
                ),
            }

            reports.push(ConnectorReport {
                connector: connector.name().to_string(),
                source: connector.source(),
                outcome,
                elapsed,
            });
        }

        reports
    }
}

/// Build a [`Fetcher`] from `config` and run every connector in `registry`.
pub async fn fetch_all(
    registry: &ConnectorRegistry,
    config: FetchConfig,
) -> Result<Vec<ConnectorReport>> {
    Ok(Fetcher::new(config)?.fetch_all(registry).await)
}

async fn run_one(
    connector: &dyn SourceConnector,
    client: &Client,
    timeout: Duration,
) -> ConnectorOutcome {
    match tokio::time::timeout(timeout, connector.fetch(client)).await {
        Ok(Ok(records)) => ConnectorOutcome::Fetched(records),
        Ok(Err(e)) => ConnectorOutcome::Failed(FetchFailure::from_error(&e)),
        Err(_) => ConnectorOutcome::Failed(FetchFailure {
            kind: FailureKind::Timeout,
            message: format!("no response within {}s", timeout.as_secs()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct Fixed {
        name: &'static str,
        records: usize,
        delay: Duration,
    }

    #[async_trait]
    impl SourceConnector for Fixed {
        fn name(&self) -> &str {
            self.name
        }
        fn source(&self) -> Source {
            Source::Feed
        }
        async fn fetch(&self, _client: &Client) -> Result<Vec<RawRecord>> {
            tokio::time::sleep(self.delay).await;
            Ok((0..self.records)
                .map(|i| RawRecord {
                    source: Source::Feed,
                    origin: self.name.to_string(),
                    payload: json!({"title": format!("{} {i}", self.name)}),
                })
                .collect())
        }
    }

    struct Broken;

    #[async_trait]
    impl SourceConnector for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        fn source(&self) -> Source {
            Source::Lever
        }
        async fn fetch(&self, _client: &Client) -> Result<Vec<RawRecord>> {
            Err(JobPulseError::parse("not JSON"))
        }
    }

    fn fetch_config(timeout_secs: u64) -> FetchConfig {
        FetchConfig {
            concurrency: 2,
            timeout_secs,
            ..FetchConfig::default()
        }
    }

    #[tokio::test]
    async fn reports_follow_registry_order() {
        let mut registry = ConnectorRegistry::new();
        registry.register(Fixed { name: "slow", records: 2, delay: Duration::from_millis(150) });
        registry.register(Fixed { name: "fast", records: 1, delay: Duration::ZERO });

        let fetcher = Fetcher::new(fetch_config(5)).unwrap();
        let reports = fetcher.fetch_all(&registry).await;

        let names: Vec<_> = reports.iter().map(|r| r.connector.as_str()).collect();
        assert_eq!(names, vec!["slow", "fast"]);
        assert_eq!(reports[0].records().len(), 2);
        assert_eq!(reports[1].records().len(), 1);
    }

    #[tokio::test]
    async fn failure_is_isolated() {
        let mut registry = ConnectorRegistry::new();
        registry.register(Broken);
        registry.register(Fixed { name: "ok", records: 3, delay: Duration::ZERO });

        let fetcher = Fetcher::new(fetch_config(5)).unwrap();
        let reports = fetcher.fetch_all(&registry).await;

        let failure = reports[0].failure().expect("broken connector fails");
        assert_eq!(failure.kind, FailureKind::Malformed);
        assert!(reports[0].records().is_empty());
        assert_eq!(reports[0].source, Source::Lever);
        assert_eq!(reports[1].records().len(), 3);
    }

    #[tokio::test]
    async fn slow_connector_times_out() {
        let mut registry = ConnectorRegistry::new();
        registry.register(Fixed { name: "stuck", records: 1, delay: Duration::from_secs(5) });
        registry.register(Fixed { name: "ok", records: 1, delay: Duration::ZERO });

        let fetcher = Fetcher::new(fetch_config(1)).unwrap();
        let reports = fetcher.fetch_all(&registry).await;

        assert_eq!(reports[0].failure().map(|f| f.kind), Some(FailureKind::Timeout));
        assert_eq!(reports[1].records().len(), 1);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_network_failure() {
        let mut registry = ConnectorRegistry::new();
        registry.register(crate::LeverConnector::new("http://127.0.0.1:9", "nobody"));

        let fetcher = Fetcher::new(fetch_config(5)).unwrap();
        let reports = fetcher.fetch_all(&registry).await;

        assert_eq!(reports[0].failure().map(|f| f.kind), Some(FailureKind::Network));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = FetchConfig {
            concurrency: 0,
            ..FetchConfig::default()
        };
        assert!(Fetcher::new(config).is_err());
    }

    #[tokio::test]
    async fn empty_registry_yields_no_reports() {
        let fetcher = Fetcher::new(FetchConfig::default()).unwrap();
        assert!(fetcher.fetch_all(&ConnectorRegistry::new()).await.is_empty());
    }
}
