//! Core orchestration logic.
//!
//! This module contains:
//! - Orchestrator: runs the daily pipeline for one date
//! - Retry: bounded exponential backoff
//! - Selection: ranking and choice of validated candidates
//! - Journal: append-only per-date run history
//! - Cancel: cooperative cancellation of in-flight runs

pub mod cancel;
pub mod errors;
pub(crate) mod inflight;
pub mod journal;
pub mod orchestrator;
pub mod retry;
pub mod selection;

// Re-export commonly used types
pub use cancel::CancelToken;
pub use errors::PipelineError;
pub use journal::RunJournal;
pub use orchestrator::{Orchestrator, PipelineSettings, ReviewSettings};
pub use retry::RetryPolicy;
pub use selection::{eligible, rank, select, Scored};
