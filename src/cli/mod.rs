//! Command-line interface for joyful.
//!
//! Provides commands for producing the daily artifact, backfilling past
//! dates, and inspecting stored artifacts and run journals.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration, Local, NaiveDate};
use clap::{Parser, Subcommand};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::adapters::{
    BingSearchSource, Collaborators, HttpArticleFetcher, KeywordValidator, LlmImageCritic,
    LlmPromptSynthesizer, LlmValidator, OpenAiClient, PlaceholderImageGenerator,
    ReplicateImageGenerator, StaticSource, TemplateSynthesizer,
};
use crate::config::{self, ResolvedConfig};
use crate::core::{CancelToken, Orchestrator, PipelineError, RunJournal};
use crate::domain::{Artifact, ArtifactStatus};
use crate::store::{ArtifactStore, DateRange, FileArtifactStore};

/// joyful - one uplifting story and illustration per day
#[derive(Parser, Debug)]
#[command(name = "joyful")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Produce the artifact for a date (today by default)
    Run {
        /// Date to run for (YYYY-MM-DD)
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Use deterministic built-in collaborators instead of external services
        #[arg(long)]
        offline: bool,
    },

    /// Produce artifacts for a range of dates
    Backfill {
        /// First date (inclusive)
        #[arg(long)]
        from: NaiveDate,

        /// Last date (inclusive)
        #[arg(long)]
        to: NaiveDate,

        /// Dates run at the same time
        #[arg(short, long, default_value = "2")]
        concurrency: usize,

        /// Use deterministic built-in collaborators instead of external services
        #[arg(long)]
        offline: bool,
    },

    /// Show the artifact stored for a date
    Show {
        /// Date (YYYY-MM-DD)
        date: NaiveDate,
    },

    /// List stored artifacts
    List {
        /// First date (inclusive)
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Last date (inclusive)
        #[arg(long)]
        to: Option<NaiveDate>,
    },

    /// Show the run journal for a date
    History {
        /// Date (YYYY-MM-DD)
        date: NaiveDate,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run { date, offline } => {
                let date = date.unwrap_or_else(|| Local::now().date_naive());
                run_date(date, offline).await
            }
            Commands::Backfill {
                from,
                to,
                concurrency,
                offline,
            } => backfill(from, to, concurrency, offline).await,
            Commands::Show { date } => show_artifact(date).await,
            Commands::List { from, to } => list_artifacts(DateRange::new(from, to)).await,
            Commands::History { date } => show_history(date).await,
            Commands::Config => show_config(),
        }
    }
}

/// Wire an orchestrator from configuration.
///
/// Offline mode uses the deterministic collaborators; otherwise provider
/// credentials are read from the environment.
pub async fn build_orchestrator(cfg: &ResolvedConfig, offline: bool) -> Result<Orchestrator> {
    let collaborators = if offline {
        Collaborators::new(
            Arc::new(StaticSource::sample()),
            Arc::new(KeywordValidator {
                min_positivity: cfg.models.min_positivity,
            }),
            Arc::new(TemplateSynthesizer::default()),
            Arc::new(PlaceholderImageGenerator),
        )
    } else {
        live_collaborators(cfg)?
    };

    let store = open_store(cfg).await?;
    let journal = RunJournal::open(cfg.journal_dir()).await?;

    Ok(Orchestrator::new(collaborators, Arc::new(store), cfg.pipeline_settings()).with_journal(journal))
}

fn live_collaborators(cfg: &ResolvedConfig) -> Result<Collaborators> {
    let models = &cfg.models;

    let source = BingSearchSource::from_env(cfg.search.endpoint.as_deref())?
        .with_market(cfg.search.market.clone())
        .with_freshness(cfg.search.freshness.clone());
    let openai = OpenAiClient::from_env()?;
    let generator = ReplicateImageGenerator::from_env(cfg.images_dir())?
        .with_model(models.image_model.clone())
        .with_aspect_ratio(models.aspect_ratio.clone())
        .with_file_type(models.file_type.clone());

    let mut collaborators = Collaborators::new(
        Arc::new(source),
        Arc::new(LlmValidator::new(
            openai.clone(),
            models.validation_model.clone(),
            models.min_positivity,
        )),
        Arc::new(LlmPromptSynthesizer::new(openai.clone(), models.synthesis_model.clone())),
        Arc::new(generator),
    );

    if cfg.article.enabled {
        let fetcher =
            HttpArticleFetcher::new(std::time::Duration::from_secs(cfg.article.timeout_secs))
                .context("Failed to build article fetcher")?;
        collaborators = collaborators.with_fetcher(Arc::new(fetcher));
    }

    if models.review_enabled {
        collaborators = collaborators.with_critic(Arc::new(LlmImageCritic::new(
            openai,
            models.review_model.clone(),
        )));
    }

    Ok(collaborators)
}

async fn open_store(cfg: &ResolvedConfig) -> Result<FileArtifactStore> {
    FileArtifactStore::open(cfg.artifacts_dir())
        .await
        .context("Failed to open artifact store")
}

/// Run one date; Ctrl+C cancels the run
async fn run_date(date: NaiveDate, offline: bool) -> Result<()> {
    let cfg = config::config()?;
    let orchestrator = build_orchestrator(cfg, offline).await?;

    println!("🌅 Producing artifact for {}", date);

    let cancel = CancelToken::new();
    let run = orchestrator.run_for_date_with_cancel(date, cancel.clone());
    tokio::pin!(run);

    let outcome = tokio::select! {
        outcome = &mut run => outcome,
        _ = tokio::signal::ctrl_c() => {
            println!();
            println!("🛑 Cancelling run...");
            if !orchestrator.cancel(date, "interrupted by user") {
                cancel.cancel("interrupted by user");
            }
            run.await
        }
    };

    match outcome {
        Ok(artifact) => {
            println!("✅ Artifact ready");
            println!();
            print_artifact(&artifact);
            Ok(())
        }
        Err(e) => {
            print_failure(&e);
            Err(e.into())
        }
    }
}

/// Run every date in `from..=to`, at most `concurrency` at a time
async fn backfill(from: NaiveDate, to: NaiveDate, concurrency: usize, offline: bool) -> Result<()> {
    if from > to {
        anyhow::bail!("--from ({}) is after --to ({})", from, to);
    }

    let cfg = config::config()?;
    let orchestrator = Arc::new(build_orchestrator(cfg, offline).await?);
    let permits = Arc::new(Semaphore::new(concurrency.max(1)));

    let mut tasks = JoinSet::new();
    let mut date = from;
    while date <= to {
        let orchestrator = Arc::clone(&orchestrator);
        let permits = Arc::clone(&permits);
        tasks.spawn(async move {
            let _permit = permits.acquire_owned().await;
            (date, orchestrator.run_for_date(date).await)
        });
        date += Duration::days(1);
    }

    let mut outcomes = BTreeMap::new();
    while let Some(joined) = tasks.join_next().await {
        let (date, outcome) = joined.context("Backfill task panicked")?;
        outcomes.insert(date, outcome);
    }

    println!("{:<12} {:<10} {}", "DATE", "STATUS", "DETAIL");
    println!("{}", "-".repeat(72));

    let mut failed = 0;
    for (date, outcome) in &outcomes {
        match outcome {
            Ok(artifact) => {
                let title = artifact.candidate.as_ref().map(|c| c.title.as_str()).unwrap_or("");
                println!("{:<12} {:<10} {}", date, "succeeded", title);
            }
            Err(e) => {
                failed += 1;
                println!("{:<12} {:<10} {}: {}", date, "failed", e.kind, e.message);
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} dates failed", failed, outcomes.len());
    }
    Ok(())
}

async fn show_artifact(date: NaiveDate) -> Result<()> {
    let cfg = config::config()?;
    let store = open_store(cfg).await?;

    match store.get(date).await? {
        Some(artifact) => print_artifact(&artifact),
        None => println!("No artifact for {}", date),
    }
    Ok(())
}

async fn list_artifacts(range: DateRange) -> Result<()> {
    let cfg = config::config()?;
    let store = open_store(cfg).await?;
    let dates = store.list_dates(range).await?;

    if dates.is_empty() {
        println!("No artifacts found");
        return Ok(());
    }

    println!("{:<12} {:<10} {:<5} {}", "DATE", "STATUS", "RUNS", "TITLE");
    println!("{}", "-".repeat(72));

    for date in dates {
        let Some(artifact) = store.get(date).await? else {
            continue;
        };
        let title = artifact.candidate.as_ref().map(|c| c.title.as_str()).unwrap_or("-");
        println!(
            "{:<12} {:<10} {:<5} {}",
            date,
            status_label(artifact.status),
            artifact.runs,
            title
        );
    }

    Ok(())
}

async fn show_history(date: NaiveDate) -> Result<()> {
    let cfg = config::config()?;
    let journal = RunJournal::open(cfg.journal_dir()).await?;
    let events = journal.replay(date).await?;

    if events.is_empty() {
        println!("No journal entries for {}", date);
        return Ok(());
    }

    for event in events {
        let stage = event.stage.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string());
        print!(
            "{}  run {:<3} {:<11} {}",
            event.timestamp.format("%H:%M:%S%.3f"),
            event.run,
            stage,
            event.summary
        );
        if let Some(error) = &event.error {
            print!("  ({})", error);
        }
        println!();
    }

    Ok(())
}

fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("joyful configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:      {}", cfg.home.display());
    println!("  Artifacts: {}", cfg.artifacts_dir().display());
    println!("  Images:    {}", cfg.images_dir().display());
    println!("  Journal:   {}", cfg.journal_dir().display());
    println!();
    println!("Search:");
    println!("  Queries:   {}", cfg.search.queries.join(" | "));
    println!("  Limit:     {}", cfg.search.limit);
    println!("  Market:    {} ({})", cfg.search.market, cfg.search.freshness);
    if cfg.article.enabled {
        println!(
            "  Articles:  fetched, more than {} words ({}s timeout)",
            cfg.article.min_words, cfg.article.timeout_secs
        );
    } else {
        println!("  Articles:  not fetched (snippets are summarized)");
    }
    println!();
    println!("Retry:");
    println!("  Max attempts per stage: {}", cfg.retry.max_attempts);
    println!(
        "  Backoff: {}ms x{} (max {}ms)",
        cfg.retry.initial_delay_ms, cfg.retry.backoff_multiplier, cfg.retry.max_delay_ms
    );
    println!();
    println!("Models:");
    println!(
        "  Validation: {} (min positivity {:.2})",
        cfg.models.validation_model, cfg.models.min_positivity
    );
    println!("  Synthesis:  {}", cfg.models.synthesis_model);
    println!(
        "  Image:      {} ({}, {})",
        cfg.models.image_model, cfg.models.aspect_ratio, cfg.models.file_type
    );
    if cfg.models.review_enabled {
        println!(
            "  Review:     {} (threshold {}, max {} rounds)",
            cfg.models.review_model, cfg.review.score_threshold, cfg.review.max_rounds
        );
    } else {
        println!("  Review:     disabled");
    }
    println!();
    println!("Credentials:");
    for key in [
        "BING_SEARCH_V7_SUBSCRIPTION_KEY",
        "OPENAI_API_KEY",
        "REPLICATE_API_TOKEN",
    ] {
        let state = if config::has_env(key) { "set" } else { "missing" };
        println!("  {:<32} {}", key, state);
    }

    Ok(())
}

fn status_label(status: ArtifactStatus) -> &'static str {
    match status {
        ArtifactStatus::Pending => "pending",
        ArtifactStatus::Succeeded => "succeeded",
        ArtifactStatus::Failed => "failed",
    }
}

fn print_artifact(artifact: &Artifact) {
    println!("{}", artifact.date.format("%B %d, %Y"));
    println!(
        "Status: {} (run {}, {} attempts)",
        status_label(artifact.status),
        artifact.runs,
        artifact.attempts
    );

    if let Some(candidate) = &artifact.candidate {
        println!();
        println!("{}", candidate.title);
        println!("{}", candidate.source_url);
    }

    if let Some(prompt) = &artifact.prompt {
        if let Some(summary) = &prompt.story_summary {
            println!();
            println!("{}", summary);
        }
    }

    if let Some(image) = &artifact.image_ref {
        println!();
        println!("Image: {}", image);
    }

    if let Some(failure) = &artifact.failure {
        println!();
        println!("Failure: {} after {} attempt(s)", failure.kind, failure.attempts);
        println!("  {}", failure.message);
    }
}

fn print_failure(error: &PipelineError) {
    println!("❌ Run failed: {}", error.kind);
    if let Some(stage) = error.stage {
        println!("  Stage:    {}", stage);
    }
    println!("  Attempts: {}", error.attempts);
    println!("  Error:    {}", error.message);
}
