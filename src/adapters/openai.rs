//! OpenAI chat-completions collaborators: story validation, prompt
//! synthesis and image review.
//!
//! Endpoint: POST /v1/chat/completions
//! Auth: Bearer token
//!
//! Every call asks the model for a single-line JSON object and parses it;
//! a reply that is not valid JSON counts as the service being unavailable.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{
    transport_error, ContentValidator, ImageCritic, PromptSynthesizer, StageError,
};
use crate::domain::{Candidate, ImageRef, ImageReview, Prompt, ValidationResult};

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

const JSON_ONLY: &str = "You always answer with a strict JSON object on a single line. \
    Never use code fences or any other formatting.";

/// Thin chat-completions client shared by the collaborators below
#[derive(Clone)]
pub struct OpenAiClient {
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(endpoint: String, api_key: String) -> Self {
        Self {
            endpoint,
            api_key,
            client: reqwest::Client::new(),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let api_key =
            std::env::var("OPENAI_API_KEY").context("OPENAI_API_KEY environment variable required")?;
        let endpoint = std::env::var("OPENAI_CHAT_ENDPOINT")
            .unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
        Ok(Self::new(endpoint, api_key))
    }

    /// Send `content` as the user message and parse the JSON reply.
    ///
    /// Errors are plain strings; callers wrap them in their stage's error.
    pub async fn complete_json(&self, model: &str, content: Value) -> Result<Value, String> {
        let body = json!({
            "model": model,
            "temperature": 0,
            "messages": [
                { "role": "system", "content": JSON_ONLY },
                { "role": "user", "content": content },
            ],
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("OpenAI request failed: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(format!("OpenAI error ({}): {}", status, text));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| format!("Failed to parse OpenAI response: {e}"))?;

        let reply = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| "OpenAI response had no content".to_string())?;

        parse_json_reply(&reply)
    }
}

/// Parse a model reply, tolerating code fences around the JSON
fn parse_json_reply(reply: &str) -> Result<Value, String> {
    let trimmed = reply.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    serde_json::from_str(unfenced).map_err(|e| format!("Model reply is not JSON ({e}): {reply}"))
}

fn string_field(value: &Value, field: &str) -> Option<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

// ============================================================================
// Validation
// ============================================================================

/// Scores headlines for how well they fit an uplifting daily cartoon
pub struct LlmValidator {
    client: OpenAiClient,
    model: String,
    min_positivity: f64,
}

impl LlmValidator {
    pub fn new(client: OpenAiClient, model: impl Into<String>, min_positivity: f64) -> Self {
        Self {
            client,
            model: model.into(),
            min_positivity,
        }
    }

    fn instruction(candidate: &Candidate) -> String {
        let headline = json!({
            "title": candidate.title,
            "url": candidate.source_url,
            "snippet": candidate.raw_text,
        });

        format!(
            "Rate how well this headline suits a daily hand-drawn cartoon meant to spread joy.\n\
             Prefer: local people or small communities, acts of kindness, personal achievements, \
             unusual and heartwarming stories, strong visual potential, reputable sources.\n\
             Avoid: celebrities, politics, sad or tragic contexts (even with a happy ending), \
             spam and clickbait.\n\
             Reply as {{\"ranking\": <0.00-10.00>, \"appropriate\": <true|false>, \
             \"explanation\": \"<at most 30 words>\"}}.\n\
             Set appropriate to false for anything that must never be illustrated.\n\n\
             Headline: {headline}"
        )
    }

    /// Turn the model's reply into a validation result
    fn interpret(&self, candidate: &Candidate, reply: &Value) -> Result<ValidationResult, StageError> {
        let ranking = reply.get("ranking").and_then(Value::as_f64).ok_or_else(|| {
            StageError::ValidationUnavailable(format!("Reply has no numeric ranking: {reply}"))
        })?;

        let score = ranking / 10.0;
        let flagged_ok = reply.get("appropriate").and_then(Value::as_bool).unwrap_or(true);

        let mut reasons = Vec::new();
        if let Some(explanation) = string_field(reply, "explanation") {
            reasons.push(explanation);
        }
        if !flagged_ok {
            reasons.push("Flagged as inappropriate by the model".to_string());
        }
        if score < self.min_positivity {
            reasons.push(format!("Below minimum positivity {:.2}", self.min_positivity));
        }

        let appropriate = flagged_ok && score >= self.min_positivity;
        Ok(ValidationResult::new(candidate.id.clone(), score, appropriate, reasons))
    }
}

#[async_trait]
impl ContentValidator for LlmValidator {
    fn name(&self) -> &str {
        "openai"
    }

    async fn validate(&self, candidate: &Candidate) -> Result<ValidationResult, StageError> {
        let reply = self
            .client
            .complete_json(&self.model, Value::String(Self::instruction(candidate)))
            .await
            .map_err(StageError::ValidationUnavailable)?;

        self.interpret(candidate, &reply)
    }
}

// ============================================================================
// Prompt synthesis
// ============================================================================

/// Summarizes the story, then writes an image prompt from the summary
pub struct LlmPromptSynthesizer {
    client: OpenAiClient,
    model: String,
    style: String,
    style_tags: Vec<String>,
}

impl LlmPromptSynthesizer {
    pub fn new(client: OpenAiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            style: "loose, confident ink brush strokes and gentle gray watercolor shading"
                .to_string(),
            style_tags: vec!["ink".to_string(), "watercolor".to_string()],
        }
    }

    pub fn with_style(mut self, style: impl Into<String>, tags: Vec<String>) -> Self {
        self.style = style.into();
        self.style_tags = tags;
        self
    }

    async fn summarize(&self, candidate: &Candidate) -> Result<String, StageError> {
        let story = json!({ "title": candidate.title, "text": candidate.body() });
        let instruction = format!(
            "Condense this story into an engaging summary of under 200 words, split into short \
             paragraphs separated by blank lines. Start with the story's location, as a news \
             article would. Keep the tense of the original and its emotional core. Markdown \
             emphasis is welcome; do not mention images or cartoons.\n\
             Reply as {{\"summary\": \"...\"}}.\n\nStory: {story}"
        );

        let reply = self
            .client
            .complete_json(&self.model, Value::String(instruction))
            .await
            .map_err(StageError::SynthesisUnavailable)?;

        string_field(&reply, "summary").ok_or_else(|| {
            StageError::SynthesisUnavailable(format!("Reply has no summary: {reply}"))
        })
    }

    async fn write_prompt(
        &self,
        candidate: &Candidate,
        summary: &str,
        improvements: &[String],
    ) -> Result<Prompt, StageError> {
        let mut instruction = format!(
            "Write an image-generation prompt of at most 200 words that shows the story below \
             drawn with {style}.\n\
             Guidelines: human characters are diverse in age, gender and ethnicity; mood matches \
             the story; keep the focus on its key moment; symbolic details are welcome; the image \
             contains no text.\n\
             Reply as {{\"prompt\": \"...\"}}.\n\nStory: {story}",
            style = self.style,
            story = json!(summary),
        );

        if !improvements.is_empty() {
            instruction.push_str(&format!(
                "\n\nA previous image for this story was weak in these areas; address them \
                 explicitly: {}",
                json!({ "improvements_needed": improvements })
            ));
        }

        let reply = self
            .client
            .complete_json(&self.model, Value::String(instruction))
            .await
            .map_err(StageError::SynthesisUnavailable)?;

        let text = string_field(&reply, "prompt")
            .or_else(|| string_field(&reply, "full_prompt"))
            .ok_or_else(|| {
                StageError::SynthesisUnavailable(format!("Reply has no prompt: {reply}"))
            })?;

        Ok(Prompt::new(candidate.id.clone(), text)
            .with_tags(self.style_tags.iter().cloned())
            .with_summary(summary))
    }
}

#[async_trait]
impl PromptSynthesizer for LlmPromptSynthesizer {
    fn name(&self) -> &str {
        "openai"
    }

    async fn synthesize(&self, candidate: &Candidate) -> Result<Prompt, StageError> {
        let summary = self.summarize(candidate).await?;
        self.write_prompt(candidate, &summary, &[]).await
    }

    async fn refine(
        &self,
        candidate: &Candidate,
        previous: &Prompt,
        improvements: &[String],
    ) -> Result<Prompt, StageError> {
        match &previous.story_summary {
            Some(summary) => self.write_prompt(candidate, summary, improvements).await,
            None => self.synthesize(candidate).await,
        }
    }
}

// ============================================================================
// Image review
// ============================================================================

/// Criteria the critic scores, each 0-10
const CRITERIA: &[(&str, &str)] = &[
    ("character_diversity", "diversity of people in age, gender, ethnicity and ability"),
    ("theme_relevance", "how closely the image matches the prompt"),
    ("emotional_impact", "how strongly it evokes joy, hope or warmth"),
    ("visual_appeal", "composition, colour and style without distracting elements"),
    ("clarity", "free of blur, distortion and artifacts"),
    ("cohesiveness", "how well all elements work together"),
    ("creativity", "originality, avoiding cliches"),
    ("uplifting_suitability", "fit for a light-hearted, joyful story"),
];

/// Scores generated images with a vision-capable chat model
pub struct LlmImageCritic {
    client: OpenAiClient,
    model: String,
}

impl LlmImageCritic {
    pub fn new(client: OpenAiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    fn instruction(prompt: &Prompt) -> String {
        let criteria: Vec<String> = CRITERIA
            .iter()
            .map(|(name, meaning)| format!("- {name}: {meaning}"))
            .collect();

        format!(
            "Score this image from 0.00 to 10.00 on each criterion:\n{}\n\
             Reply with one JSON object mapping each criterion name to its score.\n\n\
             Prompt used to generate the image: {}",
            criteria.join("\n"),
            json!(prompt.text)
        )
    }

    /// Image as a URL the model can fetch: inline data for local files
    async fn image_url(image: &ImageRef) -> Result<String, StageError> {
        let Some(path) = image.local_path() else {
            return Ok(image.as_str().to_string());
        };

        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            transport_error(StageError::Unexpected, "Failed to read generated image", e)
        })?;

        let mime = match path.extension().and_then(|e| e.to_str()) {
            Some("jpg") | Some("jpeg") => "image/jpeg",
            Some("webp") => "image/webp",
            _ => "image/png",
        };

        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        Ok(format!("data:{mime};base64,{encoded}"))
    }
}

/// Keep numeric fields of a review reply
fn review_from_reply(reply: &Value) -> Result<ImageReview, StageError> {
    let scores: BTreeMap<String, f64> = reply
        .as_object()
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_f64().map(|score| (k.clone(), score)))
                .collect()
        })
        .unwrap_or_default();

    if scores.is_empty() {
        return Err(StageError::Unexpected(format!("Review reply has no scores: {reply}")));
    }
    Ok(ImageReview { scores })
}

#[async_trait]
impl ImageCritic for LlmImageCritic {
    fn name(&self) -> &str {
        "openai"
    }

    async fn review(&self, prompt: &Prompt, image: &ImageRef) -> Result<ImageReview, StageError> {
        let url = Self::image_url(image).await?;
        let content = json!([
            { "type": "text", "text": Self::instruction(prompt) },
            { "type": "image_url", "image_url": { "url": url } },
        ]);

        let reply = self
            .client
            .complete_json(&self.model, content)
            .await
            .map_err(StageError::Unexpected)?;

        review_from_reply(&reply)
    }
}
