//! Errors returned to callers of the orchestrator.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{ErrorKind, FailureRecord, Stage};
use crate::store::StoreError;

/// Typed outcome of a failed `run_for_date`
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("Run for {date} failed ({kind}) after {attempts} attempt(s): {message}")]
pub struct PipelineError {
    pub kind: ErrorKind,

    pub date: NaiveDate,

    /// Attempts made by the stage that ended the run
    pub attempts: u32,

    pub stage: Option<Stage>,

    pub message: String,
}

impl PipelineError {
    pub fn from_failure(date: NaiveDate, failure: &FailureRecord) -> Self {
        Self {
            kind: failure.kind,
            date,
            attempts: failure.attempts,
            stage: failure.stage,
            message: failure.message.clone(),
        }
    }

    pub fn storage(date: NaiveDate, error: &StoreError) -> Self {
        Self {
            kind: ErrorKind::Storage,
            date,
            attempts: 1,
            stage: Some(Stage::Commit),
            message: error.to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}
