//! Article text fetcher.
//!
//! Downloads a story's page and flattens its HTML into plain text so the
//! synthesizer works from the whole article rather than a search snippet.

use std::time::Duration;

use async_trait::async_trait;
use scraper::Html;

use super::{transport_error, ArticleFetcher, StageError};
use crate::domain::Candidate;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Elements whose text is never part of the article
const HIDDEN: &[&str] = &["script", "style", "noscript", "template", "head"];

/// Plain HTTP page fetcher
pub struct HttpArticleFetcher {
    client: reqwest::Client,
}

impl HttpArticleFetcher {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

/// Visible text of an HTML document, whitespace-normalized
pub fn page_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut words: Vec<&str> = Vec::new();

    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .ancestors()
            .filter_map(|a| a.value().as_element())
            .any(|e| HIDDEN.contains(&e.name()));
        if !hidden {
            words.extend(text.split_whitespace());
        }
    }

    words.join(" ")
}

#[async_trait]
impl ArticleFetcher for HttpArticleFetcher {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self, candidate: &Candidate) -> Result<String, StageError> {
        let response = self
            .client
            .get(&candidate.source_url)
            .send()
            .await
            .map_err(|e| transport_error(StageError::SourceUnavailable, "Article request failed", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StageError::SourceUnavailable(format!(
                "Article fetch returned {} for {}",
                status, candidate.source_url
            )));
        }

        let html = response.text().await.map_err(|e| {
            transport_error(StageError::SourceUnavailable, "Failed to read article body", e)
        })?;

        Ok(page_text(&html))
    }
}
