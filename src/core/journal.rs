//! Append-only run journal with file-based persistence.
//!
//! Each date gets one newline-delimited JSON (JSONL) file, so every run and
//! retry for that day can be inspected after the fact.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::domain::JournalEvent;

/// Directory of per-date JSONL journals
#[derive(Debug, Clone)]
pub struct RunJournal {
    dir: PathBuf,
}

impl RunJournal {
    /// Create or open a journal directory
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create journal directory: {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path to the journal file for a date
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.jsonl", date.format("%Y-%m-%d")))
    }

    /// Append an event to its date's journal
    pub async fn append(&self, event: &JournalEvent) -> Result<()> {
        let path = self.path_for(event.date);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("Failed to open journal file: {}", path.display()))?;

        let json = serde_json::to_string(event).context("Failed to serialize journal event")?;
        file.write_all(format!("{}\n", json).as_bytes())
            .await
            .context("Failed to write journal event")?;
        file.flush().await.context("Failed to flush journal event")?;

        Ok(())
    }

    /// Replay all events for a date in order
    pub async fn replay(&self, date: NaiveDate) -> Result<Vec<JournalEvent>> {
        let path = self.path_for(date);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&path)
            .await
            .with_context(|| format!("Failed to open journal file: {}", path.display()))?;

        let mut lines = BufReader::new(file).lines();
        let mut events = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let event: JournalEvent = serde_json::from_str(&line)
                .with_context(|| format!("Failed to parse journal event: {}", line))?;
            events.push(event);
        }

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JournalEventType, Stage};
    use tempfile::TempDir;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 8, 14).unwrap()
    }

    #[tokio::test]
    async fn test_append_and_replay_order() {
        let temp = TempDir::new().unwrap();
        let journal = RunJournal::open(temp.path()).await.unwrap();

        for attempt in 1..=4 {
            let event = JournalEvent::new(
                date(),
                1,
                Some(Stage::Source),
                JournalEventType::StageStarted,
                format!("attempt {attempt}"),
            )
            .with_attempt(attempt);
            journal.append(&event).await.unwrap();
        }

        let events = journal.replay(date()).await.unwrap();
        assert_eq!(events.len(), 4);
        for (i, event) in events.iter().enumerate() {
            assert_eq!(event.attempt, Some(i as u32 + 1));
        }
    }

    #[tokio::test]
    async fn test_dates_are_separate_files() {
        let temp = TempDir::new().unwrap();
        let journal = RunJournal::open(temp.path()).await.unwrap();
        let other = date().succ_opt().unwrap();

        journal
            .append(&JournalEvent::new(date(), 1, None, JournalEventType::RunStarted, "a"))
            .await
            .unwrap();

        assert_eq!(journal.replay(date()).await.unwrap().len(), 1);
        assert!(journal.replay(other).await.unwrap().is_empty());
        assert!(journal.path_for(date()).ends_with("2024-08-14.jsonl"));
    }
}
