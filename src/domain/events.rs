//! Journal events recorded while a day's run executes.
//!
//! The journal is append-only; it is an audit trail, the artifact store
//! remains the source of truth for a date's outcome.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::stage::Stage;

/// A single entry in a date's run journal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEvent {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When this event occurred (ISO 8601)
    pub timestamp: DateTime<Utc>,

    /// Date whose run produced the event
    pub date: NaiveDate,

    /// Run number for the date (1-based)
    pub run: u32,

    /// Stage involved (if applicable)
    pub stage: Option<Stage>,

    /// Type of event
    pub event_type: JournalEventType,

    /// Human-readable summary (NO secrets)
    pub summary: String,

    /// Attempt number within the stage
    pub attempt: Option<u32>,

    /// Time taken in milliseconds
    pub duration_ms: Option<u64>,

    /// Error message if failed
    pub error: Option<String>,
}

impl JournalEvent {
    /// Create a new event with the current timestamp
    pub fn new(
        date: NaiveDate,
        run: u32,
        stage: Option<Stage>,
        event_type: JournalEventType,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            date,
            run,
            stage,
            event_type,
            summary: summary.into(),
            attempt: None,
            duration_ms: None,
            error: None,
        }
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Types of journal events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalEventType {
    RunStarted,
    RunSucceeded,
    RunFailed,
    StageStarted,
    StageCompleted,
    /// A stage call failed and will be attempted again
    StageRetrying,
    /// A stage call failed permanently
    StageFailed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        let event = JournalEvent::new(
            date,
            1,
            Some(Stage::Source),
            JournalEventType::StageRetrying,
            "search failed",
        )
        .with_attempt(2)
        .with_error("timeout");

        let json = serde_json::to_string(&event).unwrap();
        let parsed: JournalEvent = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.event_type, JournalEventType::StageRetrying);
        assert_eq!(parsed.stage, Some(Stage::Source));
        assert_eq!(parsed.attempt, Some(2));
        assert_eq!(parsed.error.as_deref(), Some("timeout"));
        assert!(json.contains("\"stage_retrying\""));
    }

    #[test]
    fn test_event_with_duration() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        let event = JournalEvent::new(date, 1, None, JournalEventType::RunSucceeded, "done")
            .with_duration(1500);

        assert_eq!(event.duration_ms, Some(1500));
    }
}
