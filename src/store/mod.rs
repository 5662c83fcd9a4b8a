//! Keyed persistence for daily artifacts.
//!
//! A store is a plain get/put/list contract keyed by calendar date. It does
//! not validate what it is given; lifecycle rules live in the orchestrator.

pub mod file;
pub mod memory;

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::Artifact;

pub use file::FileArtifactStore;
pub use memory::MemoryArtifactStore;

/// Errors raised by artifact stores
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt artifact record at {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Store task failed: {0}")]
    Task(String),
}

/// Inclusive date range; an open end is unbounded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    /// Every date
    pub fn all() -> Self {
        Self::default()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |s| date >= s) && self.end.map_or(true, |e| date <= e)
    }
}

/// Durable storage of one artifact per date
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Artifact stored for `date`, if any
    async fn get(&self, date: NaiveDate) -> Result<Option<Artifact>, StoreError>;

    /// Store `artifact`, replacing whatever was stored for its date
    async fn put(&self, artifact: &Artifact) -> Result<(), StoreError>;

    /// Dates with a stored artifact inside `range`, ascending
    async fn list_dates(&self, range: DateRange) -> Result<Vec<NaiveDate>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    #[test]
    fn test_range_bounds_are_inclusive() {
        let range = DateRange::new(Some(d(5)), Some(d(10)));
        assert!(!range.contains(d(4)));
        assert!(range.contains(d(5)));
        assert!(range.contains(d(10)));
        assert!(!range.contains(d(11)));
    }

    #[test]
    fn test_open_range() {
        assert!(DateRange::all().contains(d(1)));
        assert!(DateRange::new(None, Some(d(3))).contains(d(1)));
        assert!(!DateRange::new(Some(d(3)), None).contains(d(1)));
    }
}
