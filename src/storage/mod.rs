//! Persistence layer.
//!
//! Defines the `SnapshotRepository` trait the workflows depend on and
//! provides two implementations:
//! - `InMemoryRepository`: `HashMap` behind a lock, optionally dumped
//!   to and restored from a JSON state file
//! - `SqliteRepository`: `sqlx` SQLite pool with per-save transactions
//!
//! Every `save` is atomic: the snapshot and its artifacts land together
//! or not at all.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::engine::Derivation;
use crate::snapshot::Snapshot;
use crate::types::{DomainError, SnapshotStatus};

pub use memory::InMemoryRepository;
pub use sqlite::SqliteRepository;

/// Abstraction over snapshot storage.
///
/// Queries scoped to a company return snapshots ordered by date ascending.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Snapshot>, DomainError>;

    /// All FINALIZED snapshots for a company. DRAFT and INVALIDATED are
    /// excluded.
    async fn list_finalized_by_company(&self, company_id: Uuid) -> Result<Vec<Snapshot>, DomainError>;

    /// The FINALIZED snapshot for a company on a date, if any.
    async fn get_finalized_by_company_and_date(
        &self,
        company_id: Uuid,
        snapshot_date: NaiveDate,
    ) -> Result<Option<Snapshot>, DomainError>;

    /// Any snapshot, whatever its status, for a company on a date.
    async fn get_any_by_company_and_date(
        &self,
        company_id: Uuid,
        snapshot_date: NaiveDate,
    ) -> Result<Option<Snapshot>, DomainError>;

    /// Insert or update a snapshot, leaving any stored artifacts untouched.
    /// A write whose status is behind the stored one is refused with
    /// `InvalidTransition`.
    async fn save(&self, snapshot: &Snapshot) -> Result<(), DomainError>;

    /// Insert or update a snapshot and replace its stored derivation in the
    /// same unit of work.
    async fn save_with_artifacts(
        &self,
        snapshot: &Snapshot,
        artifacts: &Derivation,
    ) -> Result<(), DomainError>;

    /// The derivation stored when the snapshot was finalized.
    async fn load_artifacts(&self, snapshot_id: Uuid) -> Result<Option<Derivation>, DomainError>;
}

/// A stored snapshot may be rewritten at its current status or moved to
/// the next one, never backward.
pub(crate) fn check_status_write(
    snapshot_id: Uuid,
    stored: SnapshotStatus,
    incoming: SnapshotStatus,
) -> Result<(), DomainError> {
    if stored == incoming || stored.can_transition_to(incoming) {
        return Ok(());
    }
    Err(DomainError::InvalidTransition {
        from: stored,
        to: incoming,
        reason: format!("Stored snapshot {snapshot_id} is already {stored}; stale write refused"),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
