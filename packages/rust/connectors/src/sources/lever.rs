//! Lever postings connector.
//!
//! Uses the public postings API (`/v0/postings/{company}?mode=json`), which
//! needs no authentication and returns a bare JSON array.

use async_trait::async_trait;
use jobpulse_shared::{JobPulseError, RawRecord, Result, Source};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{SourceConnector, fetch_text, join_base};

/// Fetches every published posting for one Lever company.
pub struct LeverConnector {
    name: String,
    company: String,
    endpoint: String,
}

impl LeverConnector {
    /// Create a connector for `company` against the API rooted at `api_base`.
    pub fn new(api_base: &str, company: &str) -> Self {
        Self {
            name: format!("lever:{company}"),
            company: company.to_string(),
            endpoint: join_base(api_base, &format!("v0/postings/{company}?mode=json")),
        }
    }
}

#[async_trait]
impl SourceConnector for LeverConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn source(&self) -> Source {
        Source::Lever
    }

    #[instrument(skip_all, fields(company = %self.company))]
    async fn fetch(&self, client: &Client) -> Result<Vec<RawRecord>> {
        let body = fetch_text(client, &self.endpoint).await?;

        let postings: Vec<serde_json::Value> = serde_json::from_str(&body).map_err(|e| {
            JobPulseError::parse(format!("lever:{}: expected a JSON array: {e}", self.company))
        })?;

        debug!(records = postings.len(), "lever postings fetched");

        Ok(postings
            .into_iter()
            .map(|payload| RawRecord {
                source: Source::Lever,
                origin: self.company.clone(),
                payload,
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Payload shape
// ---------------------------------------------------------------------------

/// The subset of a Lever posting the normalizer reads.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LeverPosting {
    pub id: Option<String>,
    /// Posting title.
    pub text: Option<String>,
    pub hosted_url: Option<String>,
    pub apply_url: Option<String>,
    /// Epoch milliseconds.
    pub created_at: Option<i64>,
    pub categories: LeverCategories,
    pub workplace_type: Option<String>,
    pub description_plain: Option<String>,
    /// HTML.
    pub description: Option<String>,
}

/// Lever posting categories. `location` is a string on most boards and an
/// array on a few.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LeverCategories {
    pub location: Option<serde_json::Value>,
    pub team: Option<String>,
    pub commitment: Option<String>,
}

impl LeverCategories {
    /// Location as a single display string.
    pub fn location_text(&self) -> Option<String> {
        match self.location.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Array(items) => {
                let parts: Vec<&str> = items.iter().filter_map(|v| v.as_str()).collect();
                (!parts.is_empty()).then(|| parts.join(", "))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn location_text_accepts_string_or_array() {
        let single: LeverCategories =
            serde_json::from_value(serde_json::json!({"location": "Berlin"})).unwrap();
        assert_eq!(single.location_text().as_deref(), Some("Berlin"));

        let many: LeverCategories =
            serde_json::from_value(serde_json::json!({"location": ["Berlin", "Remote"]})).unwrap();
        assert_eq!(many.location_text().as_deref(), Some("Berlin, Remote"));

        assert!(LeverCategories::default().location_text().is_none());
    }

    #[tokio::test]
    async fn fetches_postings_array() {
        let server = MockServer::start().await;
        let body = serde_json::json!([
            {
                "id": "0f1e2d3c-aaaa-bbbb-cccc-123456789abc",
                "text": "Data Engineer",
                "hostedUrl": "https://jobs.lever.co/globex/0f1e2d3c-aaaa-bbbb-cccc-123456789abc",
                "createdAt": 1705312800000_i64,
                "categories": {"location": "Remote", "team": "Data", "commitment": "Full-time"},
                "workplaceType": "remote"
            }
        ]);
        Mock::given(method("GET"))
            .and(path("/v0/postings/globex"))
            .and(query_param("mode", "json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let connector = LeverConnector::new(&server.uri(), "globex");
        let records = connector.fetch(&Client::new()).await.expect("fetch");

        assert_eq!(records.len(), 1);
        let posting: LeverPosting = serde_json::from_value(records[0].payload.clone()).unwrap();
        assert_eq!(posting.text.as_deref(), Some("Data Engineer"));
        assert_eq!(posting.created_at, Some(1_705_312_800_000));
        assert_eq!(posting.categories.team.as_deref(), Some("Data"));
    }

    #[tokio::test]
    async fn object_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": false})),
            )
            .mount(&server)
            .await;

        let connector = LeverConnector::new(&server.uri(), "globex");
        assert!(connector.fetch(&Client::new()).await.is_err());
    }
}
