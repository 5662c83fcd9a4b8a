//! Domain types for the daily pipeline.
//!
//! This module contains the core data structures:
//! - Candidate / ValidationResult: discovered stories and their scores
//! - Prompt / ImageRef / ImageReview: what gets drawn and how it turned out
//! - Artifact: the per-day output bundle and its lifecycle
//! - Stage / ErrorKind: pipeline steps and failure taxonomy
//! - JournalEvent: audit records of a run

pub mod artifact;
pub mod candidate;
pub mod events;
pub mod prompt;
pub mod stage;

// Re-export commonly used types
pub use artifact::{Artifact, ArtifactStatus, FailureRecord, TransitionError};
pub use candidate::{content_hash, dedup_by_url, word_count, Candidate, ValidationResult};
pub use events::{JournalEvent, JournalEventType};
pub use prompt::{ImageRef, ImageReview, Prompt};
pub use stage::{ErrorKind, Stage};
