//! The per-day output bundle and its lifecycle.
//!
//! One artifact exists per calendar date. It starts `Pending`, and ends either
//! `Succeeded` (final, never rewritten) or `Failed` (a later run for the same
//! date starts a fresh `Pending` artifact over it).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::candidate::Candidate;
use super::prompt::{ImageRef, Prompt};
use super::stage::{ErrorKind, Stage};

/// Lifecycle state of a day's artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    Pending,
    Succeeded,
    Failed,
}

impl Default for ArtifactStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// Why a run ended without an artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub kind: ErrorKind,

    /// Stage that was running when the run ended
    pub stage: Option<Stage>,

    /// Last error message, verbatim
    pub message: String,

    /// Attempts made by the failing stage
    pub attempts: u32,
}

impl FailureRecord {
    pub fn new(kind: ErrorKind, stage: Option<Stage>, message: impl Into<String>, attempts: u32) -> Self {
        Self {
            kind,
            stage,
            message: message.into(),
            attempts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid artifact transition for {date}: {from:?} → {to:?}")]
pub struct TransitionError {
    pub date: NaiveDate,
    pub from: ArtifactStatus,
    pub to: ArtifactStatus,
}

/// A day's story, prompt and image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Calendar day this artifact belongs to (unique key)
    pub date: NaiveDate,

    pub status: ArtifactStatus,

    /// Selected story (set once selection has happened)
    pub candidate: Option<Candidate>,

    pub prompt: Option<Prompt>,

    pub image_ref: Option<ImageRef>,

    /// Stage-call attempts consumed by the most recent run
    pub attempts: u32,

    /// Number of runs started for this date
    pub runs: u32,

    pub failure: Option<FailureRecord>,

    pub started_at: DateTime<Utc>,

    pub finished_at: Option<DateTime<Utc>>,
}

impl Artifact {
    /// Start a new run for `date`, replacing a previous failed (or stale
    /// pending) artifact. A succeeded artifact cannot be restarted.
    pub fn begin(date: NaiveDate, previous: Option<&Artifact>) -> Result<Self, TransitionError> {
        let runs = match previous {
            Some(prev) if prev.status == ArtifactStatus::Succeeded => {
                return Err(TransitionError {
                    date,
                    from: ArtifactStatus::Succeeded,
                    to: ArtifactStatus::Pending,
                });
            }
            Some(prev) => prev.runs + 1,
            None => 1,
        };

        Ok(Self {
            date,
            status: ArtifactStatus::Pending,
            candidate: None,
            prompt: None,
            image_ref: None,
            attempts: 0,
            runs,
            failure: None,
            started_at: Utc::now(),
            finished_at: None,
        })
    }

    /// Pending -> Succeeded
    pub fn succeed(
        &mut self,
        candidate: Candidate,
        prompt: Prompt,
        image_ref: ImageRef,
    ) -> Result<(), TransitionError> {
        self.ensure_pending(ArtifactStatus::Succeeded)?;
        self.status = ArtifactStatus::Succeeded;
        self.candidate = Some(candidate);
        self.prompt = Some(prompt);
        self.image_ref = Some(image_ref);
        self.failure = None;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Pending -> Failed
    pub fn fail(&mut self, failure: FailureRecord) -> Result<(), TransitionError> {
        self.ensure_pending(ArtifactStatus::Failed)?;
        self.status = ArtifactStatus::Failed;
        self.failure = Some(failure);
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub fn is_succeeded(&self) -> bool {
        self.status == ArtifactStatus::Succeeded
    }

    fn ensure_pending(&self, to: ArtifactStatus) -> Result<(), TransitionError> {
        if self.status == ArtifactStatus::Pending {
            Ok(())
        } else {
            Err(TransitionError {
                date: self.date,
                from: self.status,
                to,
            })
        }
    }
}
