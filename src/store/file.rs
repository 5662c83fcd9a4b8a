//! File-based artifact store: one JSON record per date.
//!
//! Layout under the store root:
//!
//! ```text
//! artifacts/
//!   2024-11-05.json    # the artifact for that day
//!   2024-11-05.lock    # advisory lock serializing writers of that day
//! ```
//!
//! Writes go to a temp file in the same directory and are renamed into
//! place, so readers never observe a half-written record.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use fs2::FileExt;
use tempfile::NamedTempFile;
use tokio::fs;

use super::{ArtifactStore, DateRange, StoreError};
use crate::domain::Artifact;

const RECORD_EXT: &str = "json";
const LOCK_EXT: &str = "lock";

/// Artifact store backed by a directory of JSON files
#[derive(Debug, Clone)]
pub struct FileArtifactStore {
    dir: PathBuf,
}

impl FileArtifactStore {
    /// Open (creating if needed) a store rooted at `dir`
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    /// Directory holding the records
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for `date`
    pub fn record_path(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.{}", date.format("%Y-%m-%d"), RECORD_EXT))
    }

    fn lock_path(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.{}", date.format("%Y-%m-%d"), LOCK_EXT))
    }
}

/// Blocking write: lock the date, write a temp file, rename over the record
fn write_record(dir: &Path, lock_path: &Path, record_path: &Path, json: &[u8]) -> Result<(), StoreError> {
    let lock = OpenOptions::new()
        .create(true)
        .write(true)
        .open(lock_path)?;
    lock.lock_exclusive()?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(json)?;
    tmp.as_file().sync_all()?;
    tmp.persist(record_path).map_err(|e| StoreError::Io(e.error))?;

    // Lock is released when `lock` is dropped
    Ok(())
}

/// Parse a record file name such as `2024-11-05.json`
fn parse_record_name(name: &str) -> Option<NaiveDate> {
    let stem = name.strip_suffix(&format!(".{RECORD_EXT}"))?;
    NaiveDate::parse_from_str(stem, "%Y-%m-%d").ok()
}

#[async_trait]
impl ArtifactStore for FileArtifactStore {
    async fn get(&self, date: NaiveDate) -> Result<Option<Artifact>, StoreError> {
        let path = self.record_path(date);

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let artifact: Artifact =
            serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        if artifact.date != date {
            return Err(StoreError::Corrupt {
                path,
                reason: format!("record holds date {}", artifact.date),
            });
        }

        Ok(Some(artifact))
    }

    async fn put(&self, artifact: &Artifact) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(artifact)?;
        let dir = self.dir.clone();
        let lock_path = self.lock_path(artifact.date);
        let record_path = self.record_path(artifact.date);

        tokio::task::spawn_blocking(move || write_record(&dir, &lock_path, &record_path, &json))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }

    async fn list_dates(&self, range: DateRange) -> Result<Vec<NaiveDate>, StoreError> {
        let mut dates = Vec::new();

        if !self.dir.exists() {
            return Ok(dates);
        }

        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(date) = entry.file_name().to_str().and_then(parse_record_name) {
                if range.contains(date) {
                    dates.push(date);
                }
            }
        }

        dates.sort();
        Ok(dates)
    }
}
