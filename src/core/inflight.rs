//! Registry of in-flight runs, one per date.
//!
//! The first caller for a date becomes the leader and executes the run;
//! callers arriving while it is in flight become followers and receive the
//! leader's outcome instead of starting their own.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDate;
use tokio::sync::watch;

use super::cancel::CancelToken;
use super::errors::PipelineError;
use crate::domain::Artifact;

pub(crate) type Outcome = Result<Artifact, PipelineError>;

struct Entry {
    outcome: watch::Receiver<Option<Outcome>>,
    cancel: CancelToken,
}

#[derive(Default)]
pub(crate) struct InFlight {
    runs: Mutex<HashMap<NaiveDate, Entry>>,
}

pub(crate) enum Claim<'a> {
    Leader(LeaderGuard<'a>),
    Follower(watch::Receiver<Option<Outcome>>),
}

/// Held by the leader for the duration of its run. Dropping it frees the
/// date, whether or not an outcome was published.
pub(crate) struct LeaderGuard<'a> {
    registry: &'a InFlight,
    date: NaiveDate,
    outcome: watch::Sender<Option<Outcome>>,
}

impl LeaderGuard<'_> {
    /// Publish the outcome to every follower
    pub(crate) fn finish(self, outcome: &Outcome) {
        self.outcome.send_replace(Some(outcome.clone()));
    }
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.date);
    }
}

impl InFlight {
    fn lock(&self) -> MutexGuard<'_, HashMap<NaiveDate, Entry>> {
        // The map holds no invariants a panicking holder could break
        self.runs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Become leader for `date`, or follow the run already in flight
    pub(crate) fn claim(&self, date: NaiveDate, cancel: &CancelToken) -> Claim<'_> {
        let mut runs = self.lock();

        if let Some(entry) = runs.get(&date) {
            return Claim::Follower(entry.outcome.clone());
        }

        let (tx, rx) = watch::channel(None);
        runs.insert(
            date,
            Entry {
                outcome: rx,
                cancel: cancel.clone(),
            },
        );

        Claim::Leader(LeaderGuard {
            registry: self,
            date,
            outcome: tx,
        })
    }

    /// Cancel the run in flight for `date`. Returns false if none is running.
    pub(crate) fn cancel(&self, date: NaiveDate, reason: &str) -> bool {
        match self.lock().get(&date) {
            Some(entry) => {
                entry.cancel.cancel(reason);
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_running(&self, date: NaiveDate) -> bool {
        self.lock().contains_key(&date)
    }
}
