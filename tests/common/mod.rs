//! Counting test doubles for the pipeline collaborators.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use tokio::sync::Notify;

use joyful_bytes::adapters::{
    ArticleFetcher, Collaborators, ContentSource, ContentValidator, ImageCritic, ImageGenerator,
    PromptSynthesizer,
};
use joyful_bytes::core::{Orchestrator, PipelineSettings, RetryPolicy, RunJournal};
use joyful_bytes::domain::{
    content_hash, Candidate, ImageRef, ImageReview, Prompt, ValidationResult,
};
use joyful_bytes::store::MemoryArtifactStore;
use joyful_bytes::StageError;

pub fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
}

/// A story discovered on 2024-06-01 at `hour:minute`
pub fn story(url: &str, hour: u32, minute: u32) -> Candidate {
    let at = Utc.with_ymd_and_hms(2024, 6, 1, hour, minute, 0).unwrap();
    Candidate::new(format!("Story {url}"), url, format!("Text of {url}"), at)
}

/// Call counter plus a queue of scripted failures
#[derive(Default)]
pub struct Script {
    calls: AtomicUsize,
    failures: Mutex<VecDeque<StageError>>,
    always: Mutex<Option<StageError>>,
    delay: Mutex<Duration>,
    held: Mutex<Option<Arc<Notify>>>,
}

impl Script {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Fail the next `times` calls with `error`
    pub fn fail_times(&self, times: usize, error: StageError) {
        let mut failures = self.failures.lock().unwrap();
        for _ in 0..times {
            failures.push_back(error.clone());
        }
    }

    /// Fail every call with `error`
    pub fn fail_always(&self, error: StageError) {
        *self.always.lock().unwrap() = Some(error);
    }

    /// Sleep before answering each call
    pub fn delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Block the next call until the returned handle is notified
    pub fn hold_next(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.held.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Wait until at least `n` calls have been made
    pub async fn wait_for_calls(&self, n: usize) {
        for _ in 0..1000 {
            if self.calls() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {n} calls, saw {}", self.calls());
    }

    async fn enter(&self) -> Result<(), StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let gate = self.held.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.always.lock().unwrap().clone() {
            return Err(error);
        }
        match self.failures.lock().unwrap().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct FakeSource {
    pub script: Script,
    candidates: Mutex<Vec<Candidate>>,
    queries: Mutex<Vec<String>>,
    broken_queries: Mutex<HashMap<String, StageError>>,
}

impl FakeSource {
    pub fn with(candidates: Vec<Candidate>) -> Self {
        let source = Self::default();
        *source.candidates.lock().unwrap() = candidates;
        source
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    /// Fail every search for `query` with `error`
    pub fn fail_query(&self, query: &str, error: StageError) {
        self.broken_queries
            .lock()
            .unwrap()
            .insert(query.to_string(), error);
    }
}

#[async_trait]
impl ContentSource for FakeSource {
    fn name(&self) -> &str {
        "fake"
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Candidate>, StageError> {
        self.queries.lock().unwrap().push(query.to_string());
        self.script.enter().await?;
        if let Some(error) = self.broken_queries.lock().unwrap().get(query).cloned() {
            return Err(error);
        }
        let mut found = self.candidates.lock().unwrap().clone();
        found.truncate(limit);
        Ok(found)
    }
}

/// Scores candidates by URL; unknown URLs score 0.5 and are appropriate
#[derive(Default)]
pub struct FakeValidator {
    pub script: Script,
    verdicts: Mutex<HashMap<String, (f64, bool)>>,
}

impl FakeValidator {
    pub fn verdict(self, url: &str, score: f64, appropriate: bool) -> Self {
        self.verdicts
            .lock()
            .unwrap()
            .insert(url.to_string(), (score, appropriate));
        self
    }
}

#[async_trait]
impl ContentValidator for FakeValidator {
    fn name(&self) -> &str {
        "fake"
    }

    async fn validate(&self, candidate: &Candidate) -> Result<ValidationResult, StageError> {
        self.script.enter().await?;
        let (score, appropriate) = self
            .verdicts
            .lock()
            .unwrap()
            .get(&candidate.source_url)
            .copied()
            .unwrap_or((0.5, true));
        Ok(ValidationResult::new(
            candidate.id.clone(),
            score,
            appropriate,
            vec![],
        ))
    }
}

/// Serves scripted pages by URL; unknown URLs are not found
#[derive(Default)]
pub struct FakeFetcher {
    pub script: Script,
    pages: Mutex<HashMap<String, Result<String, StageError>>>,
    fetched: Mutex<Vec<String>>,
}

impl FakeFetcher {
    /// Serve an article of `words` words at `url`
    pub fn page(self, url: &str, words: usize) -> Self {
        let text = vec!["kind"; words].join(" ");
        self.pages.lock().unwrap().insert(url.to_string(), Ok(text));
        self
    }

    /// Fail every fetch of `url`
    pub fn broken(self, url: &str) -> Self {
        self.pages.lock().unwrap().insert(
            url.to_string(),
            Err(StageError::SourceUnavailable(format!("403 for {url}"))),
        );
        self
    }

    /// URLs fetched, in order
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArticleFetcher for FakeFetcher {
    fn name(&self) -> &str {
        "fake"
    }

    async fn fetch(&self, candidate: &Candidate) -> Result<String, StageError> {
        self.fetched
            .lock()
            .unwrap()
            .push(candidate.source_url.clone());
        self.script.enter().await?;
        self.pages
            .lock()
            .unwrap()
            .get(&candidate.source_url)
            .cloned()
            .unwrap_or_else(|| Err(StageError::SourceUnavailable("404".to_string())))
    }
}

#[derive(Default)]
pub struct FakeSynthesizer {
    pub script: Script,
    pub refinements: AtomicUsize,
}

#[async_trait]
impl PromptSynthesizer for FakeSynthesizer {
    fn name(&self) -> &str {
        "fake"
    }

    async fn synthesize(&self, candidate: &Candidate) -> Result<Prompt, StageError> {
        self.script.enter().await?;
        Ok(Prompt::new(candidate.id.clone(), format!("Draw {}", candidate.title))
            .with_tags(["ink"])
            .with_summary(candidate.body()))
    }

    async fn refine(
        &self,
        _candidate: &Candidate,
        previous: &Prompt,
        improvements: &[String],
    ) -> Result<Prompt, StageError> {
        self.script.enter().await?;
        self.refinements.fetch_add(1, Ordering::SeqCst);
        Ok(Prompt {
            text: format!("{} [{}]", previous.text, improvements.join(", ")),
            ..previous.clone()
        })
    }
}

#[derive(Default)]
pub struct FakeGenerator {
    pub script: Script,
}

#[async_trait]
impl ImageGenerator for FakeGenerator {
    fn name(&self) -> &str {
        "fake"
    }

    async fn generate(&self, prompt: &Prompt) -> Result<ImageRef, StageError> {
        self.script.enter().await?;
        Ok(ImageRef::new(format!("mem://{}", content_hash(&prompt.text))))
    }
}

/// Returns scripted reviews in order, repeating the last one
#[derive(Default)]
pub struct FakeCritic {
    pub script: Script,
    reviews: Mutex<VecDeque<ImageReview>>,
}

impl FakeCritic {
    /// Queue a review whose every criterion scores `score`
    pub fn then(self, score: f64) -> Self {
        let review = ImageReview {
            scores: [("clarity", score), ("creativity", score)]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        };
        self.reviews.lock().unwrap().push_back(review);
        self
    }
}

#[async_trait]
impl ImageCritic for FakeCritic {
    fn name(&self) -> &str {
        "fake"
    }

    async fn review(&self, _prompt: &Prompt, _image: &ImageRef) -> Result<ImageReview, StageError> {
        self.script.enter().await?;
        let mut reviews = self.reviews.lock().unwrap();
        let review = if reviews.len() > 1 {
            reviews.pop_front()
        } else {
            reviews.front().cloned()
        };
        review.ok_or_else(|| StageError::Unexpected("no review scripted".to_string()))
    }
}

/// Fakes wired into an orchestrator over an in-memory store
pub struct Harness {
    pub source: Arc<FakeSource>,
    pub validator: Arc<FakeValidator>,
    pub fetcher: Option<Arc<FakeFetcher>>,
    pub synthesizer: Arc<FakeSynthesizer>,
    pub generator: Arc<FakeGenerator>,
    pub critic: Option<Arc<FakeCritic>>,
    pub store: Arc<MemoryArtifactStore>,
    pub journal: Option<RunJournal>,
    pub settings: PipelineSettings,
}

impl Harness {
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self {
            source: Arc::new(FakeSource::with(candidates)),
            validator: Arc::new(FakeValidator::default()),
            fetcher: None,
            synthesizer: Arc::new(FakeSynthesizer::default()),
            generator: Arc::new(FakeGenerator::default()),
            critic: None,
            store: Arc::new(MemoryArtifactStore::new()),
            journal: None,
            settings: PipelineSettings {
                retry: RetryPolicy::immediate(3),
                ..Default::default()
            },
        }
    }

    /// Harness with one story that always qualifies
    pub fn single() -> Self {
        Self::new(vec![story("https://news.example/one", 9, 0)])
    }

    pub fn with_validator(mut self, validator: FakeValidator) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    pub fn with_fetcher(mut self, fetcher: FakeFetcher) -> Self {
        self.fetcher = Some(Arc::new(fetcher));
        self
    }

    pub fn with_journal(mut self, journal: RunJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn with_critic(mut self, critic: FakeCritic) -> Self {
        self.critic = Some(Arc::new(critic));
        self
    }

    pub fn orchestrator(&self) -> Orchestrator {
        let mut collaborators = Collaborators::new(
            self.source.clone(),
            self.validator.clone(),
            self.synthesizer.clone(),
            self.generator.clone(),
        );
        if let Some(fetcher) = &self.fetcher {
            collaborators = collaborators.with_fetcher(fetcher.clone());
        }
        if let Some(critic) = &self.critic {
            collaborators = collaborators.with_critic(critic.clone());
        }
        let orchestrator =
            Orchestrator::new(collaborators, self.store.clone(), self.settings.clone());
        match &self.journal {
            Some(journal) => orchestrator.with_journal(journal.clone()),
            None => orchestrator,
        }
    }

    /// Total collaborator calls across every fake
    pub fn total_calls(&self) -> usize {
        self.source.script.calls()
            + self.validator.script.calls()
            + self.fetcher.as_ref().map_or(0, |f| f.script.calls())
            + self.synthesizer.script.calls()
            + self.generator.script.calls()
            + self.critic.as_ref().map_or(0, |c| c.script.calls())
    }
}
