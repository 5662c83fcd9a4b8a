//! Bing Web Search (v7) content source.
//!
//! Endpoint: GET https://api.bing.microsoft.com/v7.0/search
//! Auth: `Ocp-Apim-Subscription-Key` header

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

use super::{transport_error, ContentSource, StageError};
use crate::domain::{dedup_by_url, Candidate};

pub const DEFAULT_ENDPOINT: &str = "https://api.bing.microsoft.com/v7.0/search";

/// Bing search client
pub struct BingSearchSource {
    endpoint: String,
    subscription_key: String,
    market: String,
    freshness: String,
    client: reqwest::Client,
}

impl BingSearchSource {
    pub fn new(endpoint: String, subscription_key: String) -> Self {
        Self {
            endpoint,
            subscription_key,
            market: "en-US".to_string(),
            freshness: "Day".to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Create from environment variables
    pub fn from_env(endpoint: Option<&str>) -> Result<Self> {
        let key = std::env::var("BING_SEARCH_V7_SUBSCRIPTION_KEY")
            .context("BING_SEARCH_V7_SUBSCRIPTION_KEY environment variable required")?;
        let endpoint = std::env::var("BING_SEARCH_V7_ENDPOINT")
            .ok()
            .or_else(|| endpoint.map(str::to_string))
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        Ok(Self::new(endpoint, key))
    }

    /// Market code such as `en-US` or `en-CA`
    pub fn with_market(mut self, market: impl Into<String>) -> Self {
        self.market = market.into();
        self
    }

    /// `Day`, `Week` or `Month`
    pub fn with_freshness(mut self, freshness: impl Into<String>) -> Self {
        self.freshness = freshness.into();
        self
    }
}

/// Collect every item of every nested `value` array in a response
fn collect_values<'a>(node: &'a Value, out: &mut Vec<&'a Value>) {
    match node {
        Value::Object(map) => {
            for (key, value) in map {
                match (key.as_str(), value) {
                    ("value", Value::Array(items)) => out.extend(items.iter()),
                    _ => collect_values(value, out),
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_values(item, out);
            }
        }
        _ => {}
    }
}

/// Parse Bing timestamps, which may or may not carry fractional seconds or a zone
fn parse_published(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Turn one search result into a candidate, if it has what we need
fn candidate_from_item(item: &Value, now: DateTime<Utc>) -> Option<Candidate> {
    let title = item.get("name")?.as_str()?;
    let url = item.get("url")?.as_str()?;
    let snippet = item
        .get("snippet")
        .or_else(|| item.get("description"))?
        .as_str()?;

    if item.get("isFamilyFriendly").and_then(Value::as_bool) == Some(false) {
        return None;
    }

    let discovered_at = item
        .get("datePublished")
        .and_then(Value::as_str)
        .and_then(parse_published)
        .unwrap_or(now);

    Some(Candidate::new(title, url, snippet, discovered_at))
}

/// Extract deduplicated candidates from a raw search response
pub fn extract_candidates(response: &Value, now: DateTime<Utc>) -> Vec<Candidate> {
    let mut items = Vec::new();
    collect_values(response, &mut items);

    dedup_by_url(
        items
            .into_iter()
            .filter_map(|item| candidate_from_item(item, now))
            .collect(),
    )
}

#[async_trait]
impl ContentSource for BingSearchSource {
    fn name(&self) -> &str {
        "bing"
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Candidate>, StageError> {
        let count = limit.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .header("Ocp-Apim-Subscription-Key", &self.subscription_key)
            .query(&[
                ("q", query),
                ("count", count.as_str()),
                ("textDecorations", "false"),
                ("textFormat", "Raw"),
                ("safeSearch", "Strict"),
                ("freshness", self.freshness.as_str()),
                ("mkt", self.market.as_str()),
            ])
            .send()
            .await
            .map_err(|e| transport_error(StageError::SourceUnavailable, "Bing request failed", e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(StageError::SourceUnavailable(format!(
                "Bing error ({}): {}",
                status, text
            )));
        }

        let body: Value = response.json().await.map_err(|e| {
            transport_error(StageError::SourceUnavailable, "Failed to parse Bing response", e)
        })?;

        let mut candidates = extract_candidates(&body, Utc::now());
        candidates.truncate(limit);
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response() -> Value {
        json!({
            "_type": "SearchResponse",
            "webPages": {
                "value": [
                    {
                        "name": "Town rallies to fix playground",
                        "url": "https://news.example/playground",
                        "snippet": "Neighbors raised funds in a weekend.",
                        "isFamilyFriendly": true,
                        "datePublished": "2024-10-01T08:30:00.0000000Z"
                    },
                    {
                        "name": "Missing snippet",
                        "url": "https://news.example/nosnippet"
                    },
                    {
                        "name": "Not for kids",
                        "url": "https://news.example/nsfw",
                        "snippet": "...",
                        "isFamilyFriendly": false
                    }
                ]
            },
            "news": {
                "value": [
                    {
                        "name": "Town rallies to fix playground (dupe)",
                        "url": "https://news.example/playground",
                        "description": "Same story, other section."
                    },
                    {
                        "name": "Library opens reading garden",
                        "url": "https://news.example/garden",
                        "description": "Kids read outdoors.",
                        "datePublished": "2024-10-01T07:00:00"
                    }
                ]
            }
        })
    }

    #[test]
    fn test_extracts_nested_values() {
        let now = Utc::now();
        let candidates = extract_candidates(&response(), now);

        let urls: Vec<_> = candidates.iter().map(|c| c.source_url.as_str()).collect();
        assert_eq!(urls.len(), 2);
        assert!(urls.contains(&"https://news.example/playground"));
        assert!(urls.contains(&"https://news.example/garden"));
    }

    #[test]
    fn test_published_date_parsing() {
        let with_zone = parse_published("2024-10-01T08:30:00.0000000Z").unwrap();
        assert_eq!(with_zone.to_rfc3339(), "2024-10-01T08:30:00+00:00");

        let naive = parse_published("2024-10-01T07:00:00").unwrap();
        assert_eq!(naive.to_rfc3339(), "2024-10-01T07:00:00+00:00");

        assert!(parse_published("yesterday").is_none());
    }

    #[test]
    fn test_missing_date_uses_now() {
        let now = Utc::now();
        let item = json!({"name": "a", "url": "https://a", "snippet": "s"});
        let candidate = candidate_from_item(&item, now).unwrap();
        assert_eq!(candidate.discovered_at, now);
    }
}
