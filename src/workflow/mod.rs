//! Snapshot workflows: create, update, preview, finalize, invalidate,
//! and the read-side company views (explanation, compare, timeline,
//! trends).
//!
//! `SnapshotService` owns no state of its own. It loads through a
//! `SnapshotRepository`, hands pure data to the engines, and persists
//! the result in one `save` call so a failed step leaves storage as it
//! was.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::trend::TrendReport;
use crate::engine::{self, Derivation, TrendEngine};
use crate::snapshot::{FinancialInputs, Snapshot, SnapshotRecord};
use crate::storage::SnapshotRepository;
use crate::types::{DomainError, RuleResult, Signal, Stage};
use crate::validation::FinancialValidator;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSnapshot {
    pub company_id: Uuid,
    pub snapshot_date: NaiveDate,
    #[serde(default)]
    pub cash_balance: Option<Decimal>,
    #[serde(default)]
    pub monthly_revenue: Option<Decimal>,
    #[serde(default)]
    pub operating_costs: Option<Decimal>,
}

impl NewSnapshot {
    pub fn inputs(&self) -> FinancialInputs {
        FinancialInputs::new(self.cash_balance, self.monthly_revenue, self.operating_costs)
    }
}

/// What finalizing a snapshot would produce, computed on a copy.
#[derive(Debug, Clone, Serialize)]
pub struct Preview {
    pub snapshot: SnapshotRecord,
    pub derivation: Derivation,
}

#[derive(Debug, Clone)]
pub struct Finalized {
    pub snapshot: Snapshot,
    pub derivation: Derivation,
}

/// The stored audit trail behind a finalized snapshot's stage.
#[derive(Debug, Clone, Serialize)]
pub struct Explanation {
    pub snapshot_id: Uuid,
    pub stage: Option<Stage>,
    pub signals: Vec<Signal>,
    pub rule_results: Vec<RuleResult>,
    pub contributing_signals: Vec<Signal>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricSet {
    pub monthly_revenue: Option<Decimal>,
    pub monthly_burn: Option<Decimal>,
    pub runway_months: Option<Decimal>,
}

impl MetricSet {
    fn of(snapshot: &Snapshot) -> Self {
        Self {
            monthly_revenue: snapshot.monthly_revenue(),
            monthly_burn: snapshot.monthly_burn(),
            runway_months: snapshot.runway_months(),
        }
    }
}

/// `to - from` per metric; absent when either side is absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Deltas {
    pub delta_revenue: Option<Decimal>,
    pub delta_burn: Option<Decimal>,
    pub delta_runway: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub from_stage: Option<Stage>,
    pub to_stage: Option<Stage>,
    pub stage_changed: bool,
    pub from_metrics: MetricSet,
    pub to_metrics: MetricSet,
    pub deltas: Deltas,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineEntry {
    pub snapshot_id: Uuid,
    pub snapshot_date: NaiveDate,
    pub stage: Option<Stage>,
    pub monthly_revenue: Option<Decimal>,
    pub monthly_burn: Option<Decimal>,
    pub runway_months: Option<Decimal>,
    pub stage_transition_from_previous: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompanyTrends {
    pub company_id: Uuid,
    #[serde(flatten)]
    pub report: TrendReport,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct SnapshotService {
    repo: Arc<dyn SnapshotRepository>,
    validator: FinancialValidator,
}

impl SnapshotService {
    pub fn new(repo: Arc<dyn SnapshotRepository>, validator: FinancialValidator) -> Self {
        Self { repo, validator }
    }

    pub async fn get_snapshot(&self, id: Uuid) -> Result<Snapshot, DomainError> {
        self.load(id).await
    }

    /// Create a DRAFT snapshot. At most one snapshot exists per company
    /// and date, whatever its status.
    pub async fn create_snapshot(&self, request: NewSnapshot) -> Result<Snapshot, DomainError> {
        if self
            .repo
            .get_any_by_company_and_date(request.company_id, request.snapshot_date)
            .await?
            .is_some()
        {
            return Err(DomainError::DuplicateSnapshot {
                company_id: request.company_id,
                snapshot_date: request.snapshot_date,
            });
        }

        let snapshot = Snapshot::new(request.company_id, request.snapshot_date, request.inputs());
        self.validator.validate_snapshot(&snapshot)?;
        snapshot.check_initial_state()?;
        self.repo.save(&snapshot).await?;

        info!(
            snapshot_id = %snapshot.id(),
            company_id = %snapshot.company_id(),
            date = %snapshot.snapshot_date(),
            "Snapshot created"
        );
        Ok(snapshot)
    }

    /// Apply a partial update to a DRAFT snapshot's raw inputs.
    pub async fn update_snapshot(
        &self,
        id: Uuid,
        update: FinancialInputs,
    ) -> Result<Snapshot, DomainError> {
        let mut snapshot = self.load(id).await?;
        snapshot.update_financials(&update)?;
        self.validator.validate_snapshot(&snapshot)?;
        self.repo.save(&snapshot).await?;

        info!(snapshot_id = %id, "Snapshot financials updated");
        Ok(snapshot)
    }

    /// Run the derivation pipeline without persisting anything.
    pub async fn preview(&self, id: Uuid) -> Result<Preview, DomainError> {
        let mut snapshot = self.load(id).await?;
        snapshot.compute_derived_metrics();
        let derivation = engine::derive(&snapshot);
        Ok(Preview {
            snapshot: snapshot.to_record(),
            derivation,
        })
    }

    /// Derive the stage, freeze the snapshot and persist it with its
    /// derivation as one unit of work.
    pub async fn finalize_snapshot(&self, id: Uuid) -> Result<Finalized, DomainError> {
        let mut snapshot = self.load(id).await?;
        if !snapshot.is_draft() {
            return Err(DomainError::FinalizeDraftOnly {
                snapshot_id: id,
                status: snapshot.status(),
            });
        }

        snapshot.compute_derived_metrics();
        let derivation = engine::derive(&snapshot);
        snapshot.set_stage(derivation.stage)?;
        snapshot.finalize()?;

        if derivation.stage.is_none() {
            warn!(snapshot_id = %id, "Stage undetermined, finalizing without one");
        }

        self.repo.save_with_artifacts(&snapshot, &derivation).await?;

        info!(
            snapshot_id = %id,
            stage = ?snapshot.stage(),
            contributing = derivation.contributing_signals.len(),
            "Snapshot finalized"
        );
        Ok(Finalized {
            snapshot,
            derivation,
        })
    }

    /// FINALIZED → INVALIDATED. Stored artifacts are kept for audit.
    pub async fn invalidate_snapshot(&self, id: Uuid, reason: &str) -> Result<Snapshot, DomainError> {
        if reason.trim().is_empty() {
            return Err(DomainError::EmptyInvalidationReason { snapshot_id: id });
        }

        let mut snapshot = self.load(id).await?;
        snapshot.invalidate(reason)?;
        self.repo.save(&snapshot).await?;

        info!(snapshot_id = %id, reason = reason.trim(), "Snapshot invalidated");
        Ok(snapshot)
    }

    pub async fn explanation(&self, id: Uuid) -> Result<Explanation, DomainError> {
        let snapshot = self.load(id).await?;
        let Some(derivation) = self.repo.load_artifacts(id).await? else {
            return Err(DomainError::SnapshotNotFoundOrNotFinalized {
                company_id: snapshot.company_id(),
                snapshot_date: snapshot.snapshot_date(),
            });
        };

        Ok(Explanation {
            snapshot_id: id,
            stage: snapshot.stage(),
            signals: derivation.signals,
            rule_results: derivation.rule_results,
            contributing_signals: derivation.contributing_signals,
        })
    }

    /// Compare the FINALIZED snapshots of a company on two dates.
    pub async fn compare(
        &self,
        company_id: Uuid,
        from_date: NaiveDate,
        to_date: NaiveDate,
    ) -> Result<Comparison, DomainError> {
        let from = self.load_finalized(company_id, from_date).await?;
        let to = self.load_finalized(company_id, to_date).await?;

        let from_metrics = MetricSet::of(&from);
        let to_metrics = MetricSet::of(&to);
        let deltas = Deltas {
            delta_revenue: delta(from_metrics.monthly_revenue, to_metrics.monthly_revenue),
            delta_burn: delta(from_metrics.monthly_burn, to_metrics.monthly_burn),
            delta_runway: delta(from_metrics.runway_months, to_metrics.runway_months),
        };

        Ok(Comparison {
            from_date,
            to_date,
            from_stage: from.stage(),
            to_stage: to.stage(),
            stage_changed: from.stage() != to.stage(),
            from_metrics,
            to_metrics,
            deltas,
        })
    }

    /// One entry per FINALIZED snapshot, oldest first.
    pub async fn timeline(&self, company_id: Uuid) -> Result<Vec<TimelineEntry>, DomainError> {
        let snapshots = self.repo.list_finalized_by_company(company_id).await?;
        Ok(build_timeline(&snapshots))
    }

    pub async fn trends(&self, company_id: Uuid) -> Result<CompanyTrends, DomainError> {
        let snapshots = self.repo.list_finalized_by_company(company_id).await?;
        Ok(CompanyTrends {
            company_id,
            report: TrendEngine::build_time_series(&snapshots),
        })
    }

    async fn load(&self, id: Uuid) -> Result<Snapshot, DomainError> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or(DomainError::SnapshotNotFound(id))
    }

    async fn load_finalized(&self, company_id: Uuid, date: NaiveDate) -> Result<Snapshot, DomainError> {
        self.repo
            .get_finalized_by_company_and_date(company_id, date)
            .await?
            .ok_or(DomainError::SnapshotNotFoundOrNotFinalized {
                company_id,
                snapshot_date: date,
            })
    }
}

fn delta(from: Option<Decimal>, to: Option<Decimal>) -> Option<Decimal> {
    to?.checked_sub(from?)
}

fn build_timeline(snapshots: &[Snapshot]) -> Vec<TimelineEntry> {
    let mut previous: Option<Stage> = None;
    snapshots
        .iter()
        .map(|snapshot| {
            let current = snapshot.stage();
            let transition = match previous {
                Some(prev) if Some(prev) != current => Some(format!(
                    "{prev} -> {}",
                    current.map_or("NONE", |s| s.as_str())
                )),
                _ => None,
            };
            previous = current;

            TimelineEntry {
                snapshot_id: snapshot.id(),
                snapshot_date: snapshot.snapshot_date(),
                stage: current,
                monthly_revenue: snapshot.monthly_revenue(),
                monthly_burn: snapshot.monthly_burn(),
                runway_months: snapshot.runway_months(),
                stage_transition_from_previous: transition,
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
