//! Deterministic collaborators that need no network access.
//!
//! Used by `--offline` runs and by tests. Every output is a pure function of
//! the input, so repeated runs give identical artifacts.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use super::{
    ContentSource, ContentValidator, ImageGenerator, PromptSynthesizer, StageError,
};
use crate::domain::{content_hash, dedup_by_url, Candidate, ImageRef, Prompt, ValidationResult};

/// Serves a fixed list of candidates for every query
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    candidates: Vec<Candidate>,
}

impl StaticSource {
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self { candidates }
    }

    /// A small built-in set of stories
    pub fn sample() -> Self {
        let at = |hour| {
            Utc.with_ymd_and_hms(2024, 1, 15, hour, 0, 0)
                .single()
                .unwrap_or_else(Utc::now)
        };

        Self::new(vec![
            Candidate::new(
                "Neighbors rebuild community garden after spring flood",
                "https://example.org/stories/community-garden",
                "Volunteers from a small town came together to rebuild a beloved community \
                 garden, planting vegetables to share with local families.",
                at(8),
            ),
            Candidate::new(
                "Retired teacher knits hats for every newborn at local hospital",
                "https://example.org/stories/knitted-hats",
                "A retired teacher has knitted more than a thousand hats, bringing joy and \
                 warmth to new families in her neighborhood.",
                at(9),
            ),
            Candidate::new(
                "Senate debate stalls over budget dispute",
                "https://example.org/stories/budget-dispute",
                "Lawmakers remained divided after a tense political debate over the budget.",
                at(7),
            ),
        ])
    }
}

#[async_trait]
impl ContentSource for StaticSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn search(&self, _query: &str, limit: usize) -> Result<Vec<Candidate>, StageError> {
        let mut found = dedup_by_url(self.candidates.clone());
        found.truncate(limit);
        Ok(found)
    }
}

const UPLIFTING: &[&str] = &[
    "joy", "kind", "kindness", "hope", "volunteer", "volunteers", "community", "together",
    "rescue", "rescued", "donate", "donated", "celebrate", "celebrates", "smile", "help",
    "helps", "neighbors", "neighbor", "warmth", "share", "gift", "garden", "local", "families",
    "inspiring", "beloved", "friendship", "bringing",
];

const DOWNBEAT: &[&str] = &[
    "dies", "died", "death", "killed", "war", "crash", "tragedy", "lawsuit", "dispute",
    "arrested", "crime", "shooting", "flood", "fire", "scandal", "divided", "tense",
];

/// Topics that disqualify a story outright
const EXCLUDED: &[&str] = &[
    "election", "senate", "congress", "parliament", "politics", "political", "lawmakers",
    "celebrity", "murder", "violence",
];

/// Lexicon-based validator.
///
/// The score is the share of uplifting words among all matched words,
/// mapped into [0, 1]; unmatched text scores a neutral 0.5.
#[derive(Debug, Clone)]
pub struct KeywordValidator {
    /// Minimum score for a story to count as appropriate
    pub min_positivity: f64,
}

impl Default for KeywordValidator {
    fn default() -> Self {
        Self {
            min_positivity: 0.5,
        }
    }
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

#[async_trait]
impl ContentValidator for KeywordValidator {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn validate(&self, candidate: &Candidate) -> Result<ValidationResult, StageError> {
        let text = format!("{} {}", candidate.title, candidate.raw_text);

        let mut up = 0usize;
        let mut down = 0usize;
        let mut excluded = BTreeSet::new();

        for word in words(&text) {
            if UPLIFTING.contains(&word.as_str()) {
                up += 1;
            } else if DOWNBEAT.contains(&word.as_str()) {
                down += 1;
            }
            if EXCLUDED.contains(&word.as_str()) {
                excluded.insert(word);
            }
        }

        let score = if up + down == 0 {
            0.5
        } else {
            up as f64 / (up + down) as f64
        };

        let mut reasons = vec![format!("{up} uplifting and {down} downbeat terms")];
        if !excluded.is_empty() {
            let topics: Vec<_> = excluded.into_iter().collect();
            reasons.push(format!("Excluded topics: {}", topics.join(", ")));
        }
        let appropriate = reasons.len() == 1 && score >= self.min_positivity;
        if reasons.len() == 1 && !appropriate {
            reasons.push(format!("Below minimum positivity {:.2}", self.min_positivity));
        }

        Ok(ValidationResult::new(candidate.id.clone(), score, appropriate, reasons))
    }
}

/// Builds prompts from a fixed template
#[derive(Debug, Clone)]
pub struct TemplateSynthesizer {
    pub style: String,
    pub style_tags: Vec<String>,
}

impl Default for TemplateSynthesizer {
    fn default() -> Self {
        Self {
            style: "loose, confident ink brush strokes with gentle gray watercolor shading"
                .to_string(),
            style_tags: vec!["ink".to_string(), "watercolor".to_string()],
        }
    }
}

#[async_trait]
impl PromptSynthesizer for TemplateSynthesizer {
    fn name(&self) -> &str {
        "template"
    }

    async fn synthesize(&self, candidate: &Candidate) -> Result<Prompt, StageError> {
        let text = format!(
            "A warm, uplifting illustration of \"{}\". {} Drawn in {}. \
             Diverse people of different ages, no text in the image.",
            candidate.title.trim(),
            candidate.body().trim(),
            self.style
        );

        Ok(Prompt::new(candidate.id.clone(), text)
            .with_tags(self.style_tags.iter().cloned())
            .with_summary(candidate.body().trim()))
    }

    async fn refine(
        &self,
        candidate: &Candidate,
        previous: &Prompt,
        improvements: &[String],
    ) -> Result<Prompt, StageError> {
        if improvements.is_empty() {
            return Ok(previous.clone());
        }
        let base = self.synthesize(candidate).await?;
        let text = format!("{} Pay special attention to: {}.", base.text, improvements.join("; "));
        Ok(Prompt { text, ..base })
    }
}

/// Returns a placeholder reference derived from the prompt text
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderImageGenerator;

#[async_trait]
impl ImageGenerator for PlaceholderImageGenerator {
    fn name(&self) -> &str {
        "placeholder"
    }

    async fn generate(&self, prompt: &Prompt) -> Result<ImageRef, StageError> {
        Ok(ImageRef::new(format!("placeholder:{}", content_hash(&prompt.text))))
    }
}
