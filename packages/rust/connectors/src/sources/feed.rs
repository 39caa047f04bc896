//! RSS / Atom feed connector.

use async_trait::async_trait;
use jobpulse_shared::{JobPulseError, RawRecord, Result, Source};
use reqwest::Client;
use tracing::{debug, instrument, warn};

use super::{SourceConnector, fetch_text};
use crate::syndication::parse_feed;

/// Fetches one syndication feed and yields a record per entry.
pub struct FeedConnector {
    name: String,
    url: String,
}

impl FeedConnector {
    pub fn new(url: &str) -> Self {
        Self {
            name: format!("feed:{url}"),
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl SourceConnector for FeedConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn source(&self) -> Source {
        Source::Feed
    }

    #[instrument(skip_all, fields(feed = %self.url))]
    async fn fetch(&self, client: &Client) -> Result<Vec<RawRecord>> {
        let body = fetch_text(client, &self.url).await?;
        let parsed = parse_feed(&body);

        if let Some(error) = &parsed.error {
            if parsed.entries.is_empty() {
                return Err(JobPulseError::parse(format!("feed {}: {error}", self.url)));
            }
            warn!(
                error = %error,
                kept = parsed.entries.len(),
                "malformed feed, keeping the entries that parsed"
            );
        }

        let mut records = Vec::with_capacity(parsed.entries.len());
        for entry in parsed.entries {
            let payload = serde_json::to_value(&entry)
                .map_err(|e| JobPulseError::parse(format!("feed {}: {e}", self.url)))?;
            records.push(RawRecord {
                source: Source::Feed,
                origin: self.url.clone(),
                payload,
            });
        }

        debug!(records = records.len(), "feed fetched");
        Ok(records)
    }
}
