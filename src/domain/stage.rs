//! Pipeline stages and the error taxonomy shared by runs and artifacts.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One step of a day's run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Searching for candidate stories
    Source,

    /// Scoring and filtering candidates
    Validate,

    /// Downloading the article text of a ranked story (optional)
    Fetch,

    /// Turning the chosen story into an image prompt
    Synthesize,

    /// Producing the image
    Generate,

    /// Reviewing the generated image (optional); failures keep the image
    Review,

    /// Writing the artifact to the store
    Commit,
}

impl Stage {
    /// Error kind reported when this stage exhausts its retries
    pub fn unavailable_kind(self) -> ErrorKind {
        match self {
            Stage::Source | Stage::Fetch => ErrorKind::SourceUnavailable,
            Stage::Validate => ErrorKind::ValidationUnavailable,
            Stage::Synthesize => ErrorKind::SynthesisUnavailable,
            Stage::Generate | Stage::Review => ErrorKind::GenerationUnavailable,
            Stage::Commit => ErrorKind::Storage,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Source => "source",
            Stage::Validate => "validate",
            Stage::Fetch => "fetch",
            Stage::Synthesize => "synthesize",
            Stage::Generate => "generate",
            Stage::Review => "review",
            Stage::Commit => "commit",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a failed run.
///
/// The `*Unavailable` kinds are transient and were retried before being
/// reported; the rest end the day's run on first occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SourceUnavailable,
    ValidationUnavailable,
    SynthesisUnavailable,
    GenerationUnavailable,
    NoSuitableContent,
    ContentPolicyRejected,
    Cancelled,
    Storage,
}

impl ErrorKind {
    /// Whether a stage error of this kind is eligible for another attempt
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::SourceUnavailable
                | ErrorKind::ValidationUnavailable
                | ErrorKind::SynthesisUnavailable
                | ErrorKind::GenerationUnavailable
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::SourceUnavailable => "source_unavailable",
            ErrorKind::ValidationUnavailable => "validation_unavailable",
            ErrorKind::SynthesisUnavailable => "synthesis_unavailable",
            ErrorKind::GenerationUnavailable => "generation_unavailable",
            ErrorKind::NoSuitableContent => "no_suitable_content",
            ErrorKind::ContentPolicyRejected => "content_policy_rejected",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Storage => "storage",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
