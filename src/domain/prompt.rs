//! Image prompts, image references and image reviews.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// An image-generation prompt derived from one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub derived_from_candidate_id: String,

    /// Text sent to the image model
    pub text: String,

    #[serde(default)]
    pub style_tags: BTreeSet<String>,

    /// Reader-facing summary of the story the prompt illustrates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_summary: Option<String>,
}

impl Prompt {
    pub fn new(derived_from_candidate_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            derived_from_candidate_id: derived_from_candidate_id.into(),
            text: text.into(),
            style_tags: BTreeSet::new(),
            story_summary: None,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.style_tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.story_summary = Some(summary.into());
        self
    }
}

/// Opaque handle to a generated image (a URI)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(String);

impl ImageRef {
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    /// Reference a local file as a `file://` URI
    pub fn from_path(path: &Path) -> Self {
        Self(format!("file://{}", path.display()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Local path if this reference points at a file
    pub fn local_path(&self) -> Option<PathBuf> {
        self.0.strip_prefix("file://").map(PathBuf::from)
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-criterion scores (0-10) given to a generated image
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageReview {
    pub scores: BTreeMap<String, f64>,
}

impl ImageReview {
    pub fn mean(&self) -> f64 {
        if self.scores.is_empty() {
            return 0.0;
        }
        self.scores.values().sum::<f64>() / self.scores.len() as f64
    }

    /// The image passes when its mean score is strictly above the threshold
    pub fn passes(&self, threshold: f64) -> bool {
        self.mean() > threshold
    }

    /// Criteria scoring below the threshold, phrased as improvement requests
    pub fn improvements(&self, threshold: f64) -> Vec<String> {
        self.scores
            .iter()
            .filter(|(_, score)| **score < threshold)
            .map(|(name, _)| format!("Improve {}", name.replace('_', " ")))
            .collect()
    }
}
