//! Greenhouse job-board connector.
//!
//! Uses the public board API (`/v1/boards/{token}/jobs?content=true`), which
//! needs no authentication.

use async_trait::async_trait;
use jobpulse_shared::{JobPulseError, RawRecord, Result, Source};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{SourceConnector, fetch_text, join_base};

/// Fetches every open posting on one Greenhouse board.
pub struct GreenhouseConnector {
    name: String,
    board: String,
    endpoint: String,
}

impl GreenhouseConnector {
    /// Create a connector for `board` against the API rooted at `api_base`.
    pub fn new(api_base: &str, board: &str) -> Self {
        Self {
            name: format!("greenhouse:{board}"),
            board: board.to_string(),
            endpoint: join_base(api_base, &format!("v1/boards/{board}/jobs?content=true")),
        }
    }
}

#[async_trait]
impl SourceConnector for GreenhouseConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn source(&self) -> Source {
        Source::Greenhouse
    }

    #[instrument(skip_all, fields(board = %self.board))]
    async fn fetch(&self, client: &Client) -> Result<Vec<RawRecord>> {
        let body = fetch_text(client, &self.endpoint).await?;
        let records = parse_board(&body, &self.board)?;
        debug!(records = records.len(), "greenhouse board fetched");
        Ok(records)
    }
}

/// Split a board response into one raw record per posting.
fn parse_board(body: &str, board: &str) -> Result<Vec<RawRecord>> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| JobPulseError::parse(format!("greenhouse:{board}: invalid JSON: {e}")))?;

    let jobs = value
        .get("jobs")
        .and_then(|jobs| jobs.as_array())
        .ok_or_else(|| {
            JobPulseError::parse(format!("greenhouse:{board}: response has no `jobs` array"))
        })?;

    Ok(jobs
        .iter()
        .map(|job| RawRecord {
            source: Source::Greenhouse,
            origin: board.to_string(),
            payload: job.clone(),
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Payload shape
// ---------------------------------------------------------------------------

/// The subset of a Greenhouse posting the normalizer reads.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GreenhousePosting {
    pub id: Option<u64>,
    pub title: Option<String>,
    pub absolute_url: Option<String>,
    pub company_name: Option<String>,
    pub location: Option<GreenhouseLocation>,
    /// HTML, entity-escaped.
    pub content: Option<String>,
    pub updated_at: Option<String>,
    pub created_at: Option<String>,
    pub first_published: Option<String>,
}

/// Greenhouse location object.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GreenhouseLocation {
    pub name: Option<String>,
}
