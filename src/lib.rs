//! joyful-bytes - daily good-news pipeline orchestrator
//!
//! Once per calendar date, discovers candidate stories, scores them for
//! positivity and appropriateness, reads the best one that has a full
//! article, turns it into an image prompt,
//! generates an illustration, and stores the result as that date's artifact.
//!
//! # Architecture
//!
//! - Each date has at most one artifact, and at most one run in flight
//! - A succeeded artifact is final; failed dates can be run again
//! - Transient collaborator failures are retried with bounded backoff
//! - Every run is recorded in an append-only per-date journal
//!
//! # Modules
//!
//! - `adapters`: Collaborator traits and providers (Bing, article pages, OpenAI, Replicate, offline)
//! - `core`: Orchestration logic (Orchestrator, retry, selection, journal)
//! - `domain`: Data structures (Candidate, Prompt, Artifact, JournalEvent)
//! - `store`: Artifact persistence (file, memory)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Produce today's artifact without calling external services
//! joyful run --offline
//!
//! # Backfill a week, three dates at a time
//! joyful backfill --from 2024-03-01 --to 2024-03-07 --concurrency 3
//!
//! # Inspect what happened
//! joyful show 2024-03-01
//! joyful history 2024-03-01
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod store;

// Re-export main types at crate root for convenience
pub use adapters::{Collaborators, StageError};
pub use core::{CancelToken, Orchestrator, PipelineError, PipelineSettings, RetryPolicy};
pub use domain::{Artifact, ArtifactStatus, Candidate, ErrorKind, ImageRef, Prompt, Stage};
pub use store::{ArtifactStore, FileArtifactStore, MemoryArtifactStore};
