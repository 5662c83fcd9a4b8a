//! Discovered stories and their validation results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// An unvalidated story returned by a content source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Stable identifier derived from the source URL
    pub id: String,

    /// Headline
    pub title: String,

    /// Where the story was published
    pub source_url: String,

    /// Snippet or body text as returned by the provider
    pub raw_text: String,

    /// Publication time if the provider reports one, else discovery time
    pub discovered_at: DateTime<Utc>,

    /// Full page text, once the article has been fetched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article_text: Option<String>,
}

impl Candidate {
    pub fn new(
        title: impl Into<String>,
        source_url: impl Into<String>,
        raw_text: impl Into<String>,
        discovered_at: DateTime<Utc>,
    ) -> Self {
        let source_url = source_url.into();
        Self {
            id: content_hash(&source_url),
            title: title.into(),
            source_url,
            raw_text: raw_text.into(),
            discovered_at,
            article_text: None,
        }
    }

    pub fn with_article(mut self, text: impl Into<String>) -> Self {
        self.article_text = Some(text.into());
        self
    }

    /// The fullest text known for the story: the article if fetched, else the snippet
    pub fn body(&self) -> &str {
        self.article_text.as_deref().unwrap_or(&self.raw_text)
    }
}

/// Number of whitespace-separated words in `text`
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Score and verdict for one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub candidate_id: String,

    /// How uplifting the story is, in [0, 1]
    pub positivity_score: f64,

    /// False when the story must not be used regardless of score
    pub appropriate: bool,

    /// Explanations in the order the validator produced them
    pub reasons: Vec<String>,
}

impl ValidationResult {
    /// Build a result, clamping the score into [0, 1] (NaN becomes 0)
    pub fn new(
        candidate_id: impl Into<String>,
        positivity_score: f64,
        appropriate: bool,
        reasons: Vec<String>,
    ) -> Self {
        let positivity_score = if positivity_score.is_nan() {
            0.0
        } else {
            positivity_score.clamp(0.0, 1.0)
        };

        Self {
            candidate_id: candidate_id.into(),
            positivity_score,
            appropriate,
            reasons,
        }
    }
}

/// Hash content (first 16 hex chars of SHA256)
pub fn content_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(&hasher.finalize()[..8])
}

/// Drop candidates whose `source_url` was already seen, keeping first-seen order
pub fn dedup_by_url(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen = std::collections::HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.source_url.clone()))
        .collect()
}
