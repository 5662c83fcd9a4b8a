//! Collaborator interfaces for the external services a run depends on.
//!
//! Each pipeline stage talks to exactly one collaborator through one of the
//! traits below. Concrete providers (Bing, OpenAI, Replicate) and the
//! deterministic offline implementations are interchangeable behind them.

pub mod article;
pub mod bing;
pub mod offline;
pub mod openai;
pub mod replicate;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Candidate, ErrorKind, ImageRef, ImageReview, Prompt, Stage, ValidationResult};

pub use article::HttpArticleFetcher;
pub use bing::BingSearchSource;
pub use offline::{KeywordValidator, PlaceholderImageGenerator, StaticSource, TemplateSynthesizer};
pub use openai::{LlmImageCritic, LlmPromptSynthesizer, LlmValidator, OpenAiClient};
pub use replicate::ReplicateImageGenerator;

/// Failure reported by a collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    #[error("Content source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Validation service unavailable: {0}")]
    ValidationUnavailable(String),

    #[error("Prompt synthesis unavailable: {0}")]
    SynthesisUnavailable(String),

    #[error("Image generation unavailable: {0}")]
    GenerationUnavailable(String),

    /// The provider refused the prompt; retrying will not help
    #[error("Content policy rejected: {0}")]
    ContentPolicyRejected(String),

    /// Anything the collaborator could not classify
    #[error("Unexpected collaborator error: {0}")]
    Unexpected(String),
}

impl StageError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, StageError::ContentPolicyRejected(_))
    }

    /// Kind recorded when this error ends a run in `stage`
    pub fn kind(&self, stage: Stage) -> ErrorKind {
        match self {
            StageError::SourceUnavailable(_) => ErrorKind::SourceUnavailable,
            StageError::ValidationUnavailable(_) => ErrorKind::ValidationUnavailable,
            StageError::SynthesisUnavailable(_) => ErrorKind::SynthesisUnavailable,
            StageError::GenerationUnavailable(_) => ErrorKind::GenerationUnavailable,
            StageError::ContentPolicyRejected(_) => ErrorKind::ContentPolicyRejected,
            StageError::Unexpected(_) => stage.unavailable_kind(),
        }
    }
}

/// Finds candidate stories
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Human-readable provider name
    fn name(&self) -> &str;

    /// Up to `limit` candidates for `query`, without duplicate URLs
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Candidate>, StageError>;
}

/// Scores and filters candidates
#[async_trait]
pub trait ContentValidator: Send + Sync {
    fn name(&self) -> &str;

    async fn validate(&self, candidate: &Candidate) -> Result<ValidationResult, StageError>;
}

/// Downloads the full text of a story's page
#[async_trait]
pub trait ArticleFetcher: Send + Sync {
    fn name(&self) -> &str;

    /// Readable text of `candidate.source_url`
    async fn fetch(&self, candidate: &Candidate) -> Result<String, StageError>;
}

/// Turns a story into an image prompt
#[async_trait]
pub trait PromptSynthesizer: Send + Sync {
    fn name(&self) -> &str;

    async fn synthesize(&self, candidate: &Candidate) -> Result<Prompt, StageError>;

    /// Rewrite a prompt whose image scored poorly
    async fn refine(
        &self,
        candidate: &Candidate,
        _previous: &Prompt,
        _improvements: &[String],
    ) -> Result<Prompt, StageError> {
        self.synthesize(candidate).await
    }
}

/// Produces an image for a prompt
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &Prompt) -> Result<ImageRef, StageError>;
}

/// Scores a generated image against its prompt
#[async_trait]
pub trait ImageCritic: Send + Sync {
    fn name(&self) -> &str;

    async fn review(&self, prompt: &Prompt, image: &ImageRef) -> Result<ImageReview, StageError>;
}

/// The set of collaborators a run uses
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn ContentSource>,
    pub validator: Arc<dyn ContentValidator>,
    pub fetcher: Option<Arc<dyn ArticleFetcher>>,
    pub synthesizer: Arc<dyn PromptSynthesizer>,
    pub generator: Arc<dyn ImageGenerator>,
    pub critic: Option<Arc<dyn ImageCritic>>,
}

impl Collaborators {
    pub fn new(
        source: Arc<dyn ContentSource>,
        validator: Arc<dyn ContentValidator>,
        synthesizer: Arc<dyn PromptSynthesizer>,
        generator: Arc<dyn ImageGenerator>,
    ) -> Self {
        Self {
            source,
            validator,
            fetcher: None,
            synthesizer,
            generator,
            critic: None,
        }
    }

    /// Summarize fetched article text instead of search snippets
    pub fn with_fetcher(mut self, fetcher: Arc<dyn ArticleFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_critic(mut self, critic: Arc<dyn ImageCritic>) -> Self {
        self.critic = Some(critic);
        self
    }
}

/// Map a transport error to the stage's unavailable error, keeping the cause
pub(crate) fn transport_error(
    wrap: fn(String) -> StageError,
    context: &str,
    err: impl std::fmt::Display,
) -> StageError {
    wrap(format!("{context}: {err}"))
}
