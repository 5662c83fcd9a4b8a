//! In-memory artifact store for tests and offline runs.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;

use super::{ArtifactStore, DateRange, StoreError};
use crate::domain::Artifact;

/// Artifacts held in a map; lost when dropped
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    artifacts: RwLock<BTreeMap<NaiveDate, Artifact>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored artifacts
    pub async fn len(&self) -> usize {
        self.artifacts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.artifacts.read().await.is_empty()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn get(&self, date: NaiveDate) -> Result<Option<Artifact>, StoreError> {
        Ok(self.artifacts.read().await.get(&date).cloned())
    }

    async fn put(&self, artifact: &Artifact) -> Result<(), StoreError> {
        self.artifacts
            .write()
            .await
            .insert(artifact.date, artifact.clone());
        Ok(())
    }

    async fn list_dates(&self, range: DateRange) -> Result<Vec<NaiveDate>, StoreError> {
        Ok(self
            .artifacts
            .read()
            .await
            .keys()
            .copied()
            .filter(|d| range.contains(*d))
            .collect())
    }
}
