//! Snapshot entity with lifecycle state machine.
//!
//! A snapshot is one dated financial observation for a company. It owns
//! its raw inputs, the metrics derived from them, and its lifecycle:
//!
//! ```text
//! DRAFT ──finalize()──▶ FINALIZED ──invalidate(reason)──▶ INVALIDATED
//! ```
//!
//! Only DRAFT snapshots can be modified. The struct keeps its state
//! private; every mutation goes through a method that checks the
//! current status and returns a `DomainError` when the move is illegal.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::types::{DomainError, SnapshotStatus, Stage};

/// Decimal places kept for runway (NUMERIC(10, 2) in the persisted schema).
pub const RUNWAY_SCALE: u32 = 2;

// ---------------------------------------------------------------------------
// Raw inputs
// ---------------------------------------------------------------------------

/// Raw financial inputs in SAR. Also used as a partial update, where
/// `None` means "leave untouched".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinancialInputs {
    #[serde(default)]
    pub cash_balance: Option<Decimal>,
    #[serde(default)]
    pub monthly_revenue: Option<Decimal>,
    #[serde(default)]
    pub operating_costs: Option<Decimal>,
}

impl FinancialInputs {
    pub fn new(
        cash_balance: Option<Decimal>,
        monthly_revenue: Option<Decimal>,
        operating_costs: Option<Decimal>,
    ) -> Self {
        Self {
            cash_balance,
            monthly_revenue,
            operating_costs,
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Snapshot {
    id: Uuid,
    company_id: Uuid,
    snapshot_date: NaiveDate,
    status: SnapshotStatus,
    cash_balance: Option<Decimal>,
    monthly_revenue: Option<Decimal>,
    operating_costs: Option<Decimal>,
    monthly_burn: Option<Decimal>,
    runway_months: Option<Decimal>,
    stage: Option<Stage>,
    invalidation_reason: Option<String>,
    created_at: DateTime<Utc>,
    finalized_at: Option<DateTime<Utc>>,
    invalidated_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    /// Create a new DRAFT snapshot with a generated id.
    pub fn new(company_id: Uuid, snapshot_date: NaiveDate, inputs: FinancialInputs) -> Self {
        Self::with_id(Uuid::new_v4(), company_id, snapshot_date, inputs)
    }

    pub fn with_id(
        id: Uuid,
        company_id: Uuid,
        snapshot_date: NaiveDate,
        inputs: FinancialInputs,
    ) -> Self {
        Self {
            id,
            company_id,
            snapshot_date,
            status: SnapshotStatus::Draft,
            cash_balance: inputs.cash_balance,
            monthly_revenue: inputs.monthly_revenue,
            operating_costs: inputs.operating_costs,
            monthly_burn: None,
            runway_months: None,
            stage: None,
            invalidation_reason: None,
            created_at: Utc::now(),
            finalized_at: None,
            invalidated_at: None,
        }
    }

    // -- Accessors ---------------------------------------------------------

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn company_id(&self) -> Uuid {
        self.company_id
    }

    pub fn snapshot_date(&self) -> NaiveDate {
        self.snapshot_date
    }

    pub fn status(&self) -> SnapshotStatus {
        self.status
    }

    pub fn is_draft(&self) -> bool {
        self.status == SnapshotStatus::Draft
    }

    pub fn is_finalized(&self) -> bool {
        self.status == SnapshotStatus::Finalized
    }

    pub fn is_invalidated(&self) -> bool {
        self.status == SnapshotStatus::Invalidated
    }

    pub fn cash_balance(&self) -> Option<Decimal> {
        self.cash_balance
    }

    pub fn monthly_revenue(&self) -> Option<Decimal> {
        self.monthly_revenue
    }

    pub fn operating_costs(&self) -> Option<Decimal> {
        self.operating_costs
    }

    pub fn monthly_burn(&self) -> Option<Decimal> {
        self.monthly_burn
    }

    pub fn runway_months(&self) -> Option<Decimal> {
        self.runway_months
    }

    pub fn stage(&self) -> Option<Stage> {
        self.stage
    }

    pub fn invalidation_reason(&self) -> Option<&str> {
        self.invalidation_reason.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn finalized_at(&self) -> Option<DateTime<Utc>> {
        self.finalized_at
    }

    pub fn invalidated_at(&self) -> Option<DateTime<Utc>> {
        self.invalidated_at
    }

    pub fn inputs(&self) -> FinancialInputs {
        FinancialInputs::new(self.cash_balance, self.monthly_revenue, self.operating_costs)
    }

    // -- Transitions -------------------------------------------------------

    /// DRAFT → FINALIZED. The snapshot is immutable afterwards.
    pub fn finalize(&mut self) -> Result<(), DomainError> {
        if !self.is_draft() {
            return Err(DomainError::FinalizeDraftOnly {
                snapshot_id: self.id,
                status: self.status,
            });
        }
        self.status = SnapshotStatus::Finalized;
        self.finalized_at = Some(Utc::now());
        debug!(snapshot_id = %self.id, stage = ?self.stage, "Snapshot finalized");
        Ok(())
    }

    /// FINALIZED → INVALIDATED, recording the trimmed reason.
    pub fn invalidate(&mut self, reason: &str) -> Result<(), DomainError> {
        if !self.is_finalized() {
            return Err(DomainError::InvalidateDraftSnapshot {
                snapshot_id: self.id,
                status: self.status,
            });
        }
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(DomainError::EmptyInvalidationReason { snapshot_id: self.id });
        }
        self.status = SnapshotStatus::Invalidated;
        self.invalidation_reason = Some(reason.to_string());
        self.invalidated_at = Some(Utc::now());
        debug!(snapshot_id = %self.id, reason, "Snapshot invalidated");
        Ok(())
    }

    /// Move to `target` when it is the next legal status. Invalidation
    /// needs a reason.
    pub fn transition_to(
        &mut self,
        target: SnapshotStatus,
        reason: Option<&str>,
    ) -> Result<(), DomainError> {
        if !self.status.can_transition_to(target) {
            let reason = match self.status.next() {
                Some(next) => format!("{} can only move to {next}", self.status),
                None => format!("{} is terminal", self.status),
            };
            return Err(DomainError::InvalidTransition {
                from: self.status,
                to: target,
                reason,
            });
        }
        match target {
            SnapshotStatus::Finalized => self.finalize(),
            SnapshotStatus::Invalidated => self.invalidate(reason.unwrap_or_default()),
            // No status advances to DRAFT.
            SnapshotStatus::Draft => Ok(()),
        }
    }

    // -- Guarded mutation --------------------------------------------------

    /// Overwrite the supplied raw inputs. Absent fields are left untouched.
    pub fn update_financials(&mut self, update: &FinancialInputs) -> Result<(), DomainError> {
        self.ensure_draft("update financial attributes")?;
        if let Some(cash) = update.cash_balance {
            self.cash_balance = Some(cash);
        }
        if let Some(revenue) = update.monthly_revenue {
            self.monthly_revenue = Some(revenue);
        }
        if let Some(costs) = update.operating_costs {
            self.operating_costs = Some(costs);
        }
        Ok(())
    }

    /// Set or clear the derived stage. Only the orchestrator calls this,
    /// immediately before `finalize`.
    pub fn set_stage(&mut self, stage: Option<Stage>) -> Result<(), DomainError> {
        self.ensure_draft("set stage")?;
        self.stage = stage;
        Ok(())
    }

    fn ensure_draft(&self, action: &'static str) -> Result<(), DomainError> {
        if self.is_draft() {
            Ok(())
        } else {
            Err(DomainError::ImmutableSnapshot {
                snapshot_id: self.id,
                action,
            })
        }
    }

    // -- Derived metrics ---------------------------------------------------

    /// Recompute burn and runway from the current raw inputs.
    ///
    /// Idempotent and allowed in any status. A no-op when operating costs
    /// or monthly revenue are missing.
    pub fn compute_derived_metrics(&mut self) {
        let (Some(costs), Some(revenue)) = (self.operating_costs, self.monthly_revenue) else {
            return;
        };

        let Some(burn) = costs.checked_sub(revenue) else {
            warn!(snapshot_id = %self.id, %costs, %revenue, "Monthly burn overflowed");
            self.monthly_burn = None;
            self.runway_months = None;
            return;
        };
        self.monthly_burn = Some(burn);

        self.runway_months = match self.cash_balance {
            Some(cash) if burn > Decimal::ZERO => cash.checked_div(burn).map(|r| {
                let mut runway = r.round_dp_with_strategy(RUNWAY_SCALE, RoundingStrategy::MidpointAwayFromZero);
                runway.rescale(RUNWAY_SCALE);
                runway
            }),
            _ => None,
        };

        debug!(
            snapshot_id = %self.id,
            burn = %burn,
            runway = ?self.runway_months,
            "Derived metrics computed"
        );
    }

    // -- Creation checks ---------------------------------------------------

    /// A newly created snapshot must be a clean DRAFT.
    pub fn check_initial_state(&self) -> Result<(), DomainError> {
        let violation = if self.status != SnapshotStatus::Draft {
            Some(format!("New snapshots must be in DRAFT status, not {}", self.status))
        } else if self.stage.is_some() {
            Some("New snapshots must not have a stage assigned".to_string())
        } else if self.finalized_at.is_some() {
            Some("New snapshots must not be marked as finalized".to_string())
        } else if self.invalidated_at.is_some() {
            Some("New snapshots must not be marked as invalidated".to_string())
        } else if self.invalidation_reason.is_some() {
            Some("New snapshots must not have an invalidation reason".to_string())
        } else {
            None
        };

        match violation {
            Some(violation) => Err(DomainError::SnapshotValidation {
                snapshot_id: self.id,
                violation,
            }),
            None => Ok(()),
        }
    }

    // -- Persistence form --------------------------------------------------

    pub fn to_record(&self) -> SnapshotRecord {
        SnapshotRecord {
            id: self.id,
            company_id: self.company_id,
            snapshot_date: self.snapshot_date,
            status: self.status,
            cash_balance: self.cash_balance,
            monthly_revenue: self.monthly_revenue,
            operating_costs: self.operating_costs,
            monthly_burn: self.monthly_burn,
            runway_months: self.runway_months,
            stage: self.stage,
            invalidation_reason: self.invalidation_reason.clone(),
            created_at: self.created_at,
            finalized_at: self.finalized_at,
            invalidated_at: self.invalidated_at,
        }
    }

    /// Rebuild a snapshot from its persisted form, rejecting records whose
    /// lifecycle fields contradict their status.
    pub fn from_record(record: SnapshotRecord) -> Result<Self, DomainError> {
        let reason_present = record
            .invalidation_reason
            .as_deref()
            .is_some_and(|r| !r.trim().is_empty());

        let violation = match record.status {
            SnapshotStatus::Draft
                if record.finalized_at.is_some()
                    || record.invalidated_at.is_some()
                    || record.invalidation_reason.is_some() =>
            {
                Some("DRAFT snapshot carries finalization or invalidation data")
            }
            SnapshotStatus::Finalized if record.finalized_at.is_none() => {
                Some("FINALIZED snapshot has no finalized timestamp")
            }
            SnapshotStatus::Finalized if record.invalidated_at.is_some() || record.invalidation_reason.is_some() => {
                Some("FINALIZED snapshot carries invalidation data")
            }
            SnapshotStatus::Invalidated
                if record.finalized_at.is_none() || record.invalidated_at.is_none() || !reason_present =>
            {
                Some("INVALIDATED snapshot is missing timestamps or reason")
            }
            _ => None,
        };

        if let Some(violation) = violation {
            return Err(DomainError::SnapshotValidation {
                snapshot_id: record.id,
                violation: violation.to_string(),
            });
        }

        Ok(Self {
            id: record.id,
            company_id: record.company_id,
            snapshot_date: record.snapshot_date,
            status: record.status,
            cash_balance: record.cash_balance,
            monthly_revenue: record.monthly_revenue,
            operating_costs: record.operating_costs,
            monthly_burn: record.monthly_burn,
            runway_months: record.runway_months,
            stage: record.stage,
            invalidation_reason: record.invalidation_reason,
            created_at: record.created_at,
            finalized_at: record.finalized_at,
            invalidated_at: record.invalidated_at,
        })
    }
}

impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Snapshot {}

impl Hash for Snapshot {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Snapshot {} [{}] company={} date={}",
            self.id, self.status, self.company_id, self.snapshot_date,
        )?;
        if let Some(stage) = self.stage {
            write!(f, " stage={stage}")?;
        }
        Ok(())
    }
}

/// Flat, serializable form of a snapshot for storage and transport.
/// Monetary fields serialize as decimal strings so they stay exact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub id: Uuid,
    pub company_id: Uuid,
    pub snapshot_date: NaiveDate,
    pub status: SnapshotStatus,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub cash_balance: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub monthly_revenue: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub operating_costs: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub monthly_burn: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub runway_months: Option<Decimal>,
    pub stage: Option<Stage>,
    pub invalidation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finalized_at: Option<DateTime<Utc>>,
    pub invalidated_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
