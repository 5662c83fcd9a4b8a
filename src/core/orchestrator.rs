//! Daily pipeline orchestrator.
//!
//! Sequences discovery, validation, article fetching, prompt synthesis,
//! image generation and persistence for one calendar date, retrying
//! transient stage failures, recording terminal ones, and guaranteeing at
//! most one run per date.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::adapters::{ArticleFetcher, Collaborators, StageError};
use crate::domain::{
    word_count, Artifact, Candidate, ErrorKind, FailureRecord, ImageRef, JournalEvent,
    JournalEventType, Prompt, Stage,
};
use crate::store::ArtifactStore;

use super::cancel::CancelToken;
use super::errors::PipelineError;
use super::inflight::{Claim, InFlight, Outcome};
use super::journal::RunJournal;
use super::retry::RetryPolicy;
use super::selection::{self, Scored};

/// Tunables for a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Search queries, issued in order
    pub queries: Vec<String>,

    /// Results requested per query
    pub search_limit: usize,

    /// A fetched article must have more words than this to be used
    pub min_article_words: usize,

    pub retry: RetryPolicy,

    pub review: ReviewSettings,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            queries: vec!["good news".to_string()],
            search_limit: 50,
            min_article_words: 300,
            retry: RetryPolicy::default(),
            review: ReviewSettings::default(),
        }
    }
}

/// Image review loop settings (used only when a critic is configured)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewSettings {
    /// Mean score an image must exceed to be accepted
    pub score_threshold: f64,

    /// Maximum images generated per run
    pub max_rounds: u32,
}

impl Default for ReviewSettings {
    fn default() -> Self {
        Self {
            score_threshold: 8.0,
            max_rounds: 5,
        }
    }
}

/// Mutable state of one run
struct RunContext {
    date: NaiveDate,
    run: u32,
    cancel: CancelToken,
    /// Stage-call attempts across the whole run
    attempts: u32,
    candidate: Option<Candidate>,
    prompt: Option<Prompt>,
}

/// What a completed run produced
struct Produced {
    candidate: Candidate,
    prompt: Prompt,
    image: ImageRef,
}

/// Main pipeline orchestrator
pub struct Orchestrator {
    collaborators: Collaborators,
    store: Arc<dyn ArtifactStore>,
    settings: PipelineSettings,
    journal: Option<RunJournal>,
    inflight: InFlight,
}

impl Orchestrator {
    /// Create a new orchestrator
    pub fn new(
        collaborators: Collaborators,
        store: Arc<dyn ArtifactStore>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            collaborators,
            store,
            settings,
            journal: None,
            inflight: InFlight::default(),
        }
    }

    /// Record every run in a journal
    pub fn with_journal(mut self, journal: RunJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Read-only access to the underlying store
    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    /// Produce the artifact for `date`, or return the one already produced
    pub async fn run_for_date(&self, date: NaiveDate) -> Result<Artifact, PipelineError> {
        self.run_for_date_with_cancel(date, CancelToken::new()).await
    }

    /// Like [`Orchestrator::run_for_date`], abandoning the run once `cancel` is raised
    #[instrument(skip(self, cancel))]
    pub async fn run_for_date_with_cancel(
        &self,
        date: NaiveDate,
        cancel: CancelToken,
    ) -> Result<Artifact, PipelineError> {
        loop {
            if let Some(existing) = self.load_succeeded(date).await? {
                debug!("Artifact already succeeded, skipping run");
                return Ok(existing);
            }

            match self.inflight.claim(date, &cancel) {
                Claim::Leader(guard) => {
                    // Another run may have finished between the check and the claim
                    let outcome: Outcome = match self.load_succeeded(date).await {
                        Ok(Some(existing)) => Ok(existing),
                        Ok(None) => self.execute(date, &cancel).await,
                        Err(e) => Err(e),
                    };
                    guard.finish(&outcome);
                    return outcome;
                }
                Claim::Follower(mut outcome) => {
                    info!("Run already in flight, waiting for its outcome");
                    tokio::select! {
                        published = async {
                            outcome.wait_for(Option::is_some).await.ok().and_then(|r| r.clone())
                        } => {
                            if let Some(result) = published {
                                return result;
                            }
                            // Leader went away without an outcome; try again
                            debug!("In-flight run ended without an outcome, retrying claim");
                        }
                        _ = cancel.cancelled() => {
                            return Err(PipelineError {
                                kind: ErrorKind::Cancelled,
                                date,
                                attempts: 0,
                                stage: None,
                                message: cancel.reason().unwrap_or_default(),
                            });
                        }
                    }
                }
            }
        }
    }

    /// Cancel the run in flight for `date`. Returns false if none is running.
    pub fn cancel(&self, date: NaiveDate, reason: &str) -> bool {
        let cancelled = self.inflight.cancel(date, reason);
        if cancelled {
            warn!(%date, reason, "Cancelling in-flight run");
        }
        cancelled
    }

    /// Whether a run for `date` is currently executing
    pub fn is_running(&self, date: NaiveDate) -> bool {
        self.inflight.is_running(date)
    }

    async fn load_succeeded(&self, date: NaiveDate) -> Result<Option<Artifact>, PipelineError> {
        let stored = self
            .store
            .get(date)
            .await
            .map_err(|e| PipelineError::storage(date, &e))?;
        Ok(stored.filter(Artifact::is_succeeded))
    }

    /// Execute one run for `date`; the caller holds the date's claim
    async fn execute(&self, date: NaiveDate, cancel: &CancelToken) -> Outcome {
        let previous = self
            .store
            .get(date)
            .await
            .map_err(|e| PipelineError::storage(date, &e))?;

        let mut artifact = Artifact::begin(date, previous.as_ref()).map_err(|e| PipelineError {
            kind: ErrorKind::Storage,
            date,
            attempts: 0,
            stage: Some(Stage::Commit),
            message: e.to_string(),
        })?;

        self.store
            .put(&artifact)
            .await
            .map_err(|e| PipelineError::storage(date, &e))?;

        info!(run = artifact.runs, "Starting daily run");
        let run_start = Instant::now();
        self.record(JournalEvent::new(
            date,
            artifact.runs,
            None,
            JournalEventType::RunStarted,
            format!("Run {} started", artifact.runs),
        ))
        .await;

        let mut ctx = RunContext {
            date,
            run: artifact.runs,
            cancel: cancel.clone(),
            attempts: 0,
            candidate: None,
            prompt: None,
        };

        let result = self.drive(&mut ctx).await;
        artifact.attempts = ctx.attempts;
        let duration_ms = run_start.elapsed().as_millis() as u64;

        match result {
            Ok(produced) => self.commit_success(artifact, produced, duration_ms).await,
            Err(failure) => {
                artifact.candidate = ctx.candidate.take();
                artifact.prompt = ctx.prompt.take();
                self.commit_failure(artifact, failure, duration_ms).await
            }
        }
    }

    /// Run every stage in order
    async fn drive(&self, ctx: &mut RunContext) -> Result<Produced, FailureRecord> {
        let c = &self.collaborators;

        // Discovery; a query that keeps failing is skipped unless every query does
        let mut candidates: Vec<Candidate> = Vec::new();
        let mut seen = HashSet::new();
        let mut searched = 0;
        let mut last_failure = None;
        for query in &self.settings.queries {
            let limit = self.settings.search_limit;
            match self
                .call_stage(ctx, Stage::Source, || c.source.search(query, limit))
                .await
            {
                Ok(found) => {
                    searched += 1;
                    debug!(query = %query, count = found.len(), "Search returned candidates");
                    candidates
                        .extend(found.into_iter().filter(|f| seen.insert(f.source_url.clone())));
                }
                Err(failure) if failure.kind == ErrorKind::Cancelled => return Err(failure),
                Err(failure) => {
                    warn!(
                        query = %query,
                        error = %failure.message,
                        "Search query failed, skipping it"
                    );
                    last_failure = Some(failure);
                }
            }
        }
        if searched == 0 {
            if let Some(failure) = last_failure {
                return Err(failure);
            }
        }
        info!(count = candidates.len(), source = c.source.name(), "Discovered candidates");

        if candidates.is_empty() {
            return Err(FailureRecord::new(
                ErrorKind::NoSuitableContent,
                Some(Stage::Source),
                "No candidates discovered",
                1,
            ));
        }

        // Validation
        let mut scored = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let validation = self
                .call_stage(ctx, Stage::Validate, || c.validator.validate(&candidate))
                .await?;
            scored.push(Scored::new(candidate, validation));
        }

        let total = scored.len();
        let ranked = selection::eligible(scored);
        let unqualified = || {
            FailureRecord::new(
                ErrorKind::NoSuitableContent,
                Some(Stage::Validate),
                format!("None of {total} candidates qualified"),
                1,
            )
        };

        let chosen = match &c.fetcher {
            Some(_) if ranked.is_empty() => return Err(unqualified()),
            Some(fetcher) => self.first_readable(ctx, fetcher.as_ref(), ranked).await?,
            None => ranked.into_iter().next().ok_or_else(unqualified)?,
        };
        info!(
            candidate = %chosen.candidate.id,
            title = %chosen.candidate.title,
            score = chosen.validation.positivity_score,
            "Selected story"
        );
        let candidate = chosen.candidate;
        ctx.candidate = Some(candidate.clone());

        // Prompt synthesis
        let mut prompt = self
            .call_stage(ctx, Stage::Synthesize, || c.synthesizer.synthesize(&candidate))
            .await?;
        ctx.prompt = Some(prompt.clone());

        // Image generation, optionally reviewed and regenerated
        let mut image = self
            .call_stage(ctx, Stage::Generate, || c.generator.generate(&prompt))
            .await?;

        if let Some(critic) = &c.critic {
            let review = &self.settings.review;
            let mut round = 1;

            loop {
                let verdict = match self
                    .call_optional(ctx, Stage::Review, critic.review(&prompt, &image))
                    .await?
                {
                    Some(verdict) => verdict,
                    None => {
                        info!(round, "Accepting current image without review");
                        break;
                    }
                };

                info!(round, mean = verdict.mean(), "Image reviewed");
                if verdict.passes(review.score_threshold) {
                    break;
                }
                if round >= review.max_rounds {
                    warn!(round, "Image review rounds exhausted, keeping last image");
                    break;
                }

                let improvements = verdict.improvements(review.score_threshold);
                let previous = prompt.clone();
                prompt = self
                    .call_stage(ctx, Stage::Synthesize, || {
                        c.synthesizer.refine(&candidate, &previous, &improvements)
                    })
                    .await?;
                ctx.prompt = Some(prompt.clone());

                image = self
                    .call_stage(ctx, Stage::Generate, || c.generator.generate(&prompt))
                    .await?;
                round += 1;
            }
        }

        Ok(Produced {
            candidate,
            prompt,
            image,
        })
    }

    /// Walk ranked stories until one's page yields enough article text
    async fn first_readable(
        &self,
        ctx: &mut RunContext,
        fetcher: &dyn ArticleFetcher,
        ranked: Vec<Scored>,
    ) -> Result<Scored, FailureRecord> {
        let min_words = self.settings.min_article_words;
        let total = ranked.len();

        for mut scored in ranked {
            let fetched = self
                .call_optional(ctx, Stage::Fetch, fetcher.fetch(&scored.candidate))
                .await?;

            match fetched {
                Some(text) if word_count(&text) > min_words => {
                    debug!(
                        url = %scored.candidate.source_url,
                        words = word_count(&text),
                        "Fetched article"
                    );
                    scored.candidate = scored.candidate.with_article(text);
                    return Ok(scored);
                }
                Some(text) => {
                    debug!(
                        url = %scored.candidate.source_url,
                        words = word_count(&text),
                        min_words,
                        "Article too short, trying next story"
                    );
                }
                None => {}
            }
        }

        Err(FailureRecord::new(
            ErrorKind::NoSuitableContent,
            Some(Stage::Fetch),
            format!("None of {total} ranked stories had more than {min_words} words of article text"),
            1,
        ))
    }

    /// Make one call to a stage the run can do without; a failure yields `None`
    async fn call_optional<T, Fut>(
        &self,
        ctx: &mut RunContext,
        stage: Stage,
        call: Fut,
    ) -> Result<Option<T>, FailureRecord>
    where
        Fut: Future<Output = Result<T, StageError>>,
    {
        if let Some(reason) = ctx.cancel.reason() {
            return Err(self.stage_failed(ctx, cancelled(stage, 0, reason)).await);
        }

        ctx.attempts += 1;
        let started = Instant::now();
        self.record(
            JournalEvent::new(
                ctx.date,
                ctx.run,
                Some(stage),
                JournalEventType::StageStarted,
                format!("Stage '{}' attempt 1", stage),
            )
            .with_attempt(1),
        )
        .await;

        let result = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => {
                let reason = ctx.cancel.reason().unwrap_or_default();
                return Err(self.stage_failed(ctx, cancelled(stage, 1, reason)).await);
            }
            result = call => result,
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(value) => {
                self.record(
                    JournalEvent::new(
                        ctx.date,
                        ctx.run,
                        Some(stage),
                        JournalEventType::StageCompleted,
                        format!("Stage '{}' completed in {}ms", stage, duration_ms),
                    )
                    .with_attempt(1)
                    .with_duration(duration_ms),
                )
                .await;
                Ok(Some(value))
            }
            Err(e) => {
                warn!(%stage, error = %e, "Optional stage failed, continuing without it");
                let failure = FailureRecord::new(e.kind(stage), Some(stage), e.to_string(), 1);
                self.stage_failed(ctx, failure).await;
                Ok(None)
            }
        }
    }

    /// Call a stage with retry, backoff and cancellation
    async fn call_stage<T, F, Fut>(
        &self,
        ctx: &mut RunContext,
        stage: Stage,
        mut call: F,
    ) -> Result<T, FailureRecord>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StageError>>,
    {
        let policy = &self.settings.retry;
        let mut attempt = 0u32;

        loop {
            if let Some(reason) = ctx.cancel.reason() {
                return Err(self.stage_failed(ctx, cancelled(stage, attempt, reason)).await);
            }

            attempt += 1;
            ctx.attempts += 1;
            let started = Instant::now();

            self.record(
                JournalEvent::new(
                    ctx.date,
                    ctx.run,
                    Some(stage),
                    JournalEventType::StageStarted,
                    format!("Stage '{}' attempt {}", stage, attempt),
                )
                .with_attempt(attempt),
            )
            .await;

            let result = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => {
                    let reason = ctx.cancel.reason().unwrap_or_default();
                    return Err(self.stage_failed(ctx, cancelled(stage, attempt, reason)).await);
                }
                result = call() => result,
            };

            let duration_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(value) => {
                    self.record(
                        JournalEvent::new(
                            ctx.date,
                            ctx.run,
                            Some(stage),
                            JournalEventType::StageCompleted,
                            format!("Stage '{}' completed in {}ms", stage, duration_ms),
                        )
                        .with_attempt(attempt)
                        .with_duration(duration_ms),
                    )
                    .await;
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && policy.should_retry(attempt) => {
                    let delay = policy.delay_for_attempt(attempt);

                    warn!(
                        %stage,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Stage failed, retrying"
                    );
                    self.record(
                        JournalEvent::new(
                            ctx.date,
                            ctx.run,
                            Some(stage),
                            JournalEventType::StageRetrying,
                            format!("Stage '{}' failed, retrying in {:?}", stage, delay),
                        )
                        .with_attempt(attempt)
                        .with_duration(duration_ms)
                        .with_error(e.to_string()),
                    )
                    .await;

                    tokio::select! {
                        biased;
                        _ = ctx.cancel.cancelled() => {
                            let reason = ctx.cancel.reason().unwrap_or_default();
                            return Err(self.stage_failed(ctx, cancelled(stage, attempt, reason)).await);
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => {
                    error!(%stage, attempt, error = %e, "Stage failed permanently");
                    let failure = FailureRecord::new(e.kind(stage), Some(stage), e.to_string(), attempt);
                    return Err(self.stage_failed(ctx, failure).await);
                }
            }
        }
    }

    async fn stage_failed(&self, ctx: &RunContext, failure: FailureRecord) -> FailureRecord {
        self.record(
            JournalEvent::new(
                ctx.date,
                ctx.run,
                failure.stage,
                JournalEventType::StageFailed,
                format!("Stage failed after {} attempt(s)", failure.attempts),
            )
            .with_attempt(failure.attempts)
            .with_error(failure.message.clone()),
        )
        .await;
        failure
    }

    /// Persist a succeeded artifact unless another writer got there first
    async fn commit_success(
        &self,
        mut artifact: Artifact,
        produced: Produced,
        duration_ms: u64,
    ) -> Outcome {
        let date = artifact.date;
        let attempts = artifact.attempts;

        // Best-effort check for a writer outside this orchestrator that finished
        // the date meanwhile; it is not atomic with the put below
        if let Some(existing) = self.load_succeeded(date).await? {
            warn!("Another writer already succeeded for this date, keeping theirs");
            return Ok(existing);
        }

        artifact
            .succeed(produced.candidate, produced.prompt, produced.image)
            .map_err(|e| PipelineError {
                kind: ErrorKind::Storage,
                date,
                attempts,
                stage: Some(Stage::Commit),
                message: e.to_string(),
            })?;

        self.store
            .put(&artifact)
            .await
            .map_err(|e| PipelineError::storage(date, &e))?;

        info!(
            run = artifact.runs,
            attempts = artifact.attempts,
            duration_ms,
            "Run succeeded"
        );
        self.record(
            JournalEvent::new(
                date,
                artifact.runs,
                None,
                JournalEventType::RunSucceeded,
                format!("Run {} succeeded", artifact.runs),
            )
            .with_duration(duration_ms),
        )
        .await;

        Ok(artifact)
    }

    /// Persist a failed artifact and report the failure
    async fn commit_failure(
        &self,
        mut artifact: Artifact,
        failure: FailureRecord,
        duration_ms: u64,
    ) -> Outcome {
        let date = artifact.date;
        let err = PipelineError::from_failure(date, &failure);

        error!(kind = %failure.kind, attempts = failure.attempts, error = %failure.message, "Run failed");

        if let Err(e) = artifact.fail(failure) {
            error!(error = %e, "Could not mark artifact failed");
            return Err(err);
        }

        if let Err(e) = self.store.put(&artifact).await {
            error!(error = %e, "Failed to persist failed artifact");
        }

        self.record(
            JournalEvent::new(
                date,
                artifact.runs,
                err.stage,
                JournalEventType::RunFailed,
                format!("Run {} failed ({})", artifact.runs, err.kind),
            )
            .with_duration(duration_ms)
            .with_error(err.message.clone()),
        )
        .await;

        Err(err)
    }

    /// Append to the journal; journal failures never fail a run
    async fn record(&self, event: JournalEvent) {
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.append(&event).await {
                warn!(error = %e, "Failed to write journal event");
            }
        }
    }
}

fn cancelled(stage: Stage, attempts: u32, reason: String) -> FailureRecord {
    let message = if reason.is_empty() {
        "Run cancelled".to_string()
    } else {
        format!("Run cancelled: {reason}")
    };
    FailureRecord::new(ErrorKind::Cancelled, Some(stage), message, attempts)
}
