//! In-memory snapshot store.
//!
//! All state lives in one `HashMap` pair behind a `tokio::sync::RwLock`,
//! so every save is atomic with respect to readers. The whole store can
//! be written to and restored from a JSON state file.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::{check_status_write, SnapshotRepository};
use crate::engine::Derivation;
use crate::snapshot::{Snapshot, SnapshotRecord};
use crate::types::{DomainError, SnapshotStatus};

#[derive(Debug, Default, Serialize, Deserialize)]
struct MemoryState {
    snapshots: HashMap<Uuid, SnapshotRecord>,
    artifacts: HashMap<Uuid, Derivation>,
}

impl MemoryState {
    fn upsert(&mut self, snapshot: &Snapshot) -> Result<(), DomainError> {
        let record = snapshot.to_record();
        if let Some(stored) = self.snapshots.get(&record.id) {
            check_status_write(record.id, stored.status, record.status)?;
        }
        let clash = self.snapshots.values().any(|existing| {
            existing.id != record.id
                && existing.company_id == record.company_id
                && existing.snapshot_date == record.snapshot_date
        });
        if clash {
            return Err(DomainError::DuplicateSnapshot {
                company_id: record.company_id,
                snapshot_date: record.snapshot_date,
            });
        }
        self.snapshots.insert(record.id, record);
        Ok(())
    }

    fn find(&self, predicate: impl Fn(&SnapshotRecord) -> bool) -> Result<Option<Snapshot>, DomainError> {
        self.snapshots
            .values()
            .find(|r| predicate(r))
            .cloned()
            .map(Snapshot::from_record)
            .transpose()
    }
}

#[derive(Debug, Default)]
pub struct InMemoryRepository {
    state: RwLock<MemoryState>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a store from a JSON state file. A missing file yields an
    /// empty store.
    pub async fn load_from_file(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            info!(path, "No saved state found, starting fresh");
            return Ok(Self::new());
        }

        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read state from {path}"))?;
        let state: MemoryState = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse state from {path}"))?;

        info!(path, snapshots = state.snapshots.len(), "State loaded from disk");
        Ok(Self {
            state: RwLock::new(state),
        })
    }

    /// Write the whole store to a JSON state file.
    pub async fn save_to_file(&self, path: &str) -> Result<()> {
        let state = self.state.read().await;
        let json = serde_json::to_string_pretty(&*state).context("Failed to serialise store state")?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write state to {path}"))?;
        debug!(path, snapshots = state.snapshots.len(), "State saved");
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.snapshots.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl SnapshotRepository for InMemoryRepository {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Snapshot>, DomainError> {
        self.state
            .read()
            .await
            .snapshots
            .get(&id)
            .cloned()
            .map(Snapshot::from_record)
            .transpose()
    }

    async fn list_finalized_by_company(&self, company_id: Uuid) -> Result<Vec<Snapshot>, DomainError> {
        let state = self.state.read().await;
        let mut records: Vec<&SnapshotRecord> = state
            .snapshots
            .values()
            .filter(|r| r.company_id == company_id && r.status == SnapshotStatus::Finalized)
            .collect();
        records.sort_by_key(|r| r.snapshot_date);
        records
            .into_iter()
            .cloned()
            .map(Snapshot::from_record)
            .collect()
    }

    async fn get_finalized_by_company_and_date(
        &self,
        company_id: Uuid,
        snapshot_date: NaiveDate,
    ) -> Result<Option<Snapshot>, DomainError> {
        self.state.read().await.find(|r| {
            r.company_id == company_id
                && r.snapshot_date == snapshot_date
                && r.status == SnapshotStatus::Finalized
        })
    }

    async fn get_any_by_company_and_date(
        &self,
        company_id: Uuid,
        snapshot_date: NaiveDate,
    ) -> Result<Option<Snapshot>, DomainError> {
        self.state
            .read()
            .await
            .find(|r| r.company_id == company_id && r.snapshot_date == snapshot_date)
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), DomainError> {
        self.state.write().await.upsert(snapshot)?;
        debug!(snapshot_id = %snapshot.id(), status = %snapshot.status(), "Snapshot saved");
        Ok(())
    }

    async fn save_with_artifacts(
        &self,
        snapshot: &Snapshot,
        artifacts: &Derivation,
    ) -> Result<(), DomainError> {
        let mut state = self.state.write().await;
        state.upsert(snapshot)?;
        state.artifacts.insert(snapshot.id(), artifacts.clone());
        debug!(
            snapshot_id = %snapshot.id(),
            status = %snapshot.status(),
            signals = artifacts.signals.len(),
            "Snapshot saved with artifacts"
        );
        Ok(())
    }

    async fn load_artifacts(&self, snapshot_id: Uuid) -> Result<Option<Derivation>, DomainError> {
        Ok(self.state.read().await.artifacts.get(&snapshot_id).cloned())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
