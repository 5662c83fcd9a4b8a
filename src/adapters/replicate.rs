//! Replicate image generation.
//!
//! Endpoint: POST https://api.replicate.com/v1/models/{owner}/{name}/predictions
//! Auth: Bearer token
//!
//! Predictions are created with `Prefer: wait`, polled until they settle,
//! and the resulting image is downloaded into a local images directory.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{transport_error, ImageGenerator, StageError};
use crate::domain::{content_hash, ImageRef, Prompt};

pub const DEFAULT_API_BASE: &str = "https://api.replicate.com/v1";
pub const DEFAULT_MODEL: &str = "ideogram-ai/ideogram-v2-turbo";

const POLL_INTERVAL: Duration = Duration::from_secs(2);
const MAX_POLLS: u32 = 90;

/// Words in a provider error that mean the prompt itself was refused
const POLICY_MARKERS: &[&str] = &["nsfw", "safety", "policy", "flagged", "sensitive"];

/// Replicate prediction, as much of it as we read
#[derive(Debug, Clone, Deserialize)]
struct Prediction {
    status: String,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    urls: Option<PredictionUrls>,
}

#[derive(Debug, Clone, Deserialize)]
struct PredictionUrls {
    get: Option<String>,
}

impl Prediction {
    fn is_pending(&self) -> bool {
        matches!(self.status.as_str(), "starting" | "processing")
    }

    /// First output URL; models return either a string or a list
    fn output_url(&self) -> Option<&str> {
        match self.output.as_ref()? {
            Value::String(url) => Some(url),
            Value::Array(items) => items.iter().find_map(Value::as_str),
            _ => None,
        }
    }

    fn error_text(&self) -> String {
        match &self.error {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => format!("prediction {}", self.status),
        }
    }
}

/// Classify a provider error message
fn classify(message: String) -> StageError {
    let lower = message.to_lowercase();
    if POLICY_MARKERS.iter().any(|m| lower.contains(m)) {
        StageError::ContentPolicyRejected(message)
    } else {
        StageError::GenerationUnavailable(message)
    }
}

/// Replicate-hosted text-to-image model
pub struct ReplicateImageGenerator {
    api_base: String,
    token: String,
    model: String,
    aspect_ratio: String,
    file_type: String,
    images_dir: PathBuf,
    client: reqwest::Client,
}

impl ReplicateImageGenerator {
    pub fn new(token: String, images_dir: impl Into<PathBuf>) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            token,
            model: DEFAULT_MODEL.to_string(),
            aspect_ratio: "16:9".to_string(),
            file_type: "png".to_string(),
            images_dir: images_dir.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Create from environment variables
    pub fn from_env(images_dir: impl Into<PathBuf>) -> Result<Self> {
        let token = std::env::var("REPLICATE_API_TOKEN")
            .context("REPLICATE_API_TOKEN environment variable required")?;
        Ok(Self::new(token, images_dir))
    }

    /// `owner/name` of the model to run
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_aspect_ratio(mut self, aspect_ratio: impl Into<String>) -> Self {
        self.aspect_ratio = aspect_ratio.into();
        self
    }

    /// Extension of downloaded images (`png`, `jpg`, `webp`)
    pub fn with_file_type(mut self, file_type: impl Into<String>) -> Self {
        self.file_type = file_type.into();
        self
    }

    async fn create_prediction(&self, prompt: &Prompt) -> Result<Prediction, StageError> {
        let url = format!("{}/models/{}/predictions", self.api_base, self.model);
        let body = json!({
            "input": {
                "prompt": prompt.text,
                "aspect_ratio": self.aspect_ratio,
                "magic_prompt_option": "Off",
                "style_type": "Design",
            }
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .header("Prefer", "wait")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                transport_error(StageError::GenerationUnavailable, "Replicate request failed", e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = format!("Replicate error ({}): {}", status, text);
            // 422 carries input validation and safety refusals
            return Err(if status == reqwest::StatusCode::UNPROCESSABLE_ENTITY {
                classify(message)
            } else {
                StageError::GenerationUnavailable(message)
            });
        }

        response.json().await.map_err(|e| {
            transport_error(
                StageError::GenerationUnavailable,
                "Failed to parse Replicate prediction",
                e,
            )
        })
    }

    async fn poll(&self, mut prediction: Prediction) -> Result<Prediction, StageError> {
        let mut polls = 0;
        while prediction.is_pending() {
            let Some(url) = prediction.urls.as_ref().and_then(|u| u.get.clone()) else {
                return Err(StageError::GenerationUnavailable(
                    "Pending prediction has no polling URL".to_string(),
                ));
            };
            if polls >= MAX_POLLS {
                return Err(StageError::GenerationUnavailable(format!(
                    "Prediction still {} after {} polls",
                    prediction.status, polls
                )));
            }

            tokio::time::sleep(POLL_INTERVAL).await;
            polls += 1;
            debug!(polls, status = %prediction.status, "Polling prediction");

            prediction = self
                .client
                .get(&url)
                .bearer_auth(&self.token)
                .send()
                .await
                .map_err(|e| {
                    transport_error(StageError::GenerationUnavailable, "Replicate poll failed", e)
                })?
                .json()
                .await
                .map_err(|e| {
                    transport_error(
                        StageError::GenerationUnavailable,
                        "Failed to parse Replicate prediction",
                        e,
                    )
                })?;
        }
        Ok(prediction)
    }

    async fn download(&self, url: &str, prompt: &Prompt) -> Result<ImageRef, StageError> {
        let bytes = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| transport_error(StageError::GenerationUnavailable, "Image download failed", e))?
            .bytes()
            .await
            .map_err(|e| transport_error(StageError::GenerationUnavailable, "Image download failed", e))?;

        let path = self
            .images_dir
            .join(format!("{}.{}", content_hash(&prompt.text), self.file_type));

        tokio::fs::create_dir_all(&self.images_dir)
            .await
            .map_err(|e| transport_error(StageError::Unexpected, "Failed to create images directory", e))?;
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| transport_error(StageError::Unexpected, "Failed to save image", e))?;

        Ok(ImageRef::from_path(&path))
    }
}

/// Outcome of a settled prediction: its image URL or the error to report
fn settled_output(prediction: &Prediction) -> Result<String, StageError> {
    match prediction.status.as_str() {
        "succeeded" => prediction
            .output_url()
            .map(str::to_string)
            .ok_or_else(|| StageError::GenerationUnavailable("Prediction has no output".to_string())),
        "failed" => Err(classify(prediction.error_text())),
        _ => Err(StageError::GenerationUnavailable(prediction.error_text())),
    }
}

#[async_trait]
impl ImageGenerator for ReplicateImageGenerator {
    fn name(&self) -> &str {
        "replicate"
    }

    async fn generate(&self, prompt: &Prompt) -> Result<ImageRef, StageError> {
        let prediction = self.create_prediction(prompt).await?;
        let prediction = self.poll(prediction).await?;
        let url = settled_output(&prediction)?;
        debug!(url = %url, "Prediction succeeded");
        self.download(&url, prompt).await
    }
}
