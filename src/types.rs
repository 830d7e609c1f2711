//! Shared types for STAGEWISE.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that the snapshot entity, the
//! derivation engines, storage, and the HTTP layer can depend on them
//! without circular references.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Qualitative growth-maturity classification of a finalized snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Idea,
    PreSeed,
    Seed,
    SeriesA,
    /// Declared but never produced by the current ruleset.
    Growth,
}

impl Stage {
    /// All known stages, earliest first.
    pub const ALL: &'static [Stage] = &[
        Stage::Idea,
        Stage::PreSeed,
        Stage::Seed,
        Stage::SeriesA,
        Stage::Growth,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Idea => "IDEA",
            Stage::PreSeed => "PRE_SEED",
            Stage::Seed => "SEED",
            Stage::SeriesA => "SERIES_A",
            Stage::Growth => "GROWTH",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .iter()
            .copied()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| anyhow::anyhow!("Unknown stage: {s}"))
    }
}

/// Snapshot lifecycle status. Only ever advances DRAFT → FINALIZED → INVALIDATED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SnapshotStatus {
    Draft,
    Finalized,
    Invalidated,
}

impl SnapshotStatus {
    /// The single legal successor of this status, if any.
    pub fn next(&self) -> Option<SnapshotStatus> {
        match self {
            SnapshotStatus::Draft => Some(SnapshotStatus::Finalized),
            SnapshotStatus::Finalized => Some(SnapshotStatus::Invalidated),
            SnapshotStatus::Invalidated => None,
        }
    }

    pub fn can_transition_to(&self, target: SnapshotStatus) -> bool {
        self.next() == Some(target)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotStatus::Draft => "DRAFT",
            SnapshotStatus::Finalized => "FINALIZED",
            SnapshotStatus::Invalidated => "INVALIDATED",
        }
    }
}

impl fmt::Display for SnapshotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SnapshotStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "DRAFT" => Ok(SnapshotStatus::Draft),
            "FINALIZED" => Ok(SnapshotStatus::Finalized),
            "INVALIDATED" => Ok(SnapshotStatus::Invalidated),
            _ => Err(anyhow::anyhow!("Unknown snapshot status: {s}")),
        }
    }
}

/// Closed set of signal categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalCategory {
    Financial,
    Growth,
    Risk,
    Operational,
    Market,
}

impl fmt::Display for SignalCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalCategory::Financial => write!(f, "FINANCIAL"),
            SignalCategory::Growth => write!(f, "GROWTH"),
            SignalCategory::Risk => write!(f, "RISK"),
            SignalCategory::Operational => write!(f, "OPERATIONAL"),
            SignalCategory::Market => write!(f, "MARKET"),
        }
    }
}

/// The signals the engine knows how to emit. Each kind has a fixed
/// name and category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalKind {
    MonthlyBurn,
    RunwayMonths,
    RunwayRisk,
}

impl SignalKind {
    pub const ALL: &'static [SignalKind] = &[
        SignalKind::MonthlyBurn,
        SignalKind::RunwayMonths,
        SignalKind::RunwayRisk,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SignalKind::MonthlyBurn => "MonthlyBurn",
            SignalKind::RunwayMonths => "RunwayMonths",
            SignalKind::RunwayRisk => "RunwayRisk",
        }
    }

    pub fn category(&self) -> SignalCategory {
        match self {
            SignalKind::MonthlyBurn | SignalKind::RunwayMonths => SignalCategory::Financial,
            SignalKind::RunwayRisk => SignalCategory::Risk,
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for SignalKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SignalKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == s.trim())
            .ok_or_else(|| anyhow::anyhow!("Unknown signal: {s}"))
    }
}

// ---------------------------------------------------------------------------
// Signal
// ---------------------------------------------------------------------------

/// An immutable, named numeric observation derived from a snapshot.
///
/// Equality and hashing are by id: two signals with the same name and
/// value from different pipeline runs are distinct facts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    id: Uuid,
    kind: SignalKind,
    value: f64,
    created_at: DateTime<Utc>,
}

impl Signal {
    pub fn new(kind: SignalKind, value: f64) -> Self {
        Self::with_id(Uuid::new_v4(), kind, value, Utc::now())
    }

    /// Rebuild a previously persisted signal.
    pub fn with_id(id: Uuid, kind: SignalKind, value: f64, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            kind,
            value,
            created_at,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> SignalKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn category(&self) -> SignalCategory {
        self.kind.category()
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl PartialEq for Signal {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Signal {}

impl Hash for Signal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]={}", self.name(), self.category(), self.value)
    }
}

// ---------------------------------------------------------------------------
// Rule results
// ---------------------------------------------------------------------------

/// Outcome of the runway risk rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunwayRiskClass {
    HighRisk,
    Caution,
    Healthy,
    Profitable,
    /// Risk value outside the engine's output range.
    Unknown,
}

impl RunwayRiskClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunwayRiskClass::HighRisk => "HIGH_RISK",
            RunwayRiskClass::Caution => "CAUTION",
            RunwayRiskClass::Healthy => "HEALTHY",
            RunwayRiskClass::Profitable => "PROFITABLE",
            RunwayRiskClass::Unknown => "UNKNOWN",
        }
    }
}

/// Outcome of the profitability rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProfitabilityClass {
    Profitable,
    Burning,
}

impl ProfitabilityClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfitabilityClass::Profitable => "PROFITABLE",
            ProfitabilityClass::Burning => "BURNING",
        }
    }
}

/// A rule together with the classification it produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "rule_name", content = "result")]
pub enum RuleVerdict {
    #[serde(rename = "RunwayRiskRule")]
    RunwayRisk(RunwayRiskClass),
    #[serde(rename = "ProfitabilityRule")]
    Profitability(ProfitabilityClass),
}

impl RuleVerdict {
    pub fn rule_name(&self) -> &'static str {
        match self {
            RuleVerdict::RunwayRisk(_) => "RunwayRiskRule",
            RuleVerdict::Profitability(_) => "ProfitabilityRule",
        }
    }

    pub fn result(&self) -> &'static str {
        match self {
            RuleVerdict::RunwayRisk(class) => class.as_str(),
            RuleVerdict::Profitability(class) => class.as_str(),
        }
    }

    /// Parse the persisted `(rule_name, result)` pair.
    pub fn parse(rule_name: &str, result: &str) -> anyhow::Result<Self> {
        let verdict = match (rule_name, result) {
            ("RunwayRiskRule", "HIGH_RISK") => RuleVerdict::RunwayRisk(RunwayRiskClass::HighRisk),
            ("RunwayRiskRule", "CAUTION") => RuleVerdict::RunwayRisk(RunwayRiskClass::Caution),
            ("RunwayRiskRule", "HEALTHY") => RuleVerdict::RunwayRisk(RunwayRiskClass::Healthy),
            ("RunwayRiskRule", "PROFITABLE") => RuleVerdict::RunwayRisk(RunwayRiskClass::Profitable),
            ("RunwayRiskRule", "UNKNOWN") => RuleVerdict::RunwayRisk(RunwayRiskClass::Unknown),
            ("ProfitabilityRule", "PROFITABLE") => {
                RuleVerdict::Profitability(ProfitabilityClass::Profitable)
            }
            ("ProfitabilityRule", "BURNING") => RuleVerdict::Profitability(ProfitabilityClass::Burning),
            _ => anyhow::bail!("Unknown rule result: {rule_name}={result}"),
        };
        Ok(verdict)
    }
}

/// An immutable named classification produced by one rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleResult {
    id: Uuid,
    verdict: RuleVerdict,
    created_at: DateTime<Utc>,
}

impl RuleResult {
    pub fn new(verdict: RuleVerdict) -> Self {
        Self::with_id(Uuid::new_v4(), verdict, Utc::now())
    }

    pub fn with_id(id: Uuid, verdict: RuleVerdict, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            verdict,
            created_at,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn verdict(&self) -> RuleVerdict {
        self.verdict
    }

    pub fn rule_name(&self) -> &'static str {
        self.verdict.rule_name()
    }

    pub fn result(&self) -> &'static str {
        self.verdict.result()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl PartialEq for RuleResult {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RuleResult {}

impl Hash for RuleResult {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for RuleResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} → {}", self.rule_name(), self.result())
    }
}

// ---------------------------------------------------------------------------
// Company
// ---------------------------------------------------------------------------

/// Company metadata. Snapshots reference a company by id only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    pub sector: Option<String>,
}

impl Company {
    pub fn new(id: Uuid, name: &str, sector: Option<&str>) -> Result<Self, DomainError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::InvalidCompany(
                "Company name must be a non-empty string".to_string(),
            ));
        }
        let sector = sector
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        Ok(Self {
            id,
            name: name.to_string(),
            sector,
        })
    }
}

impl PartialEq for Company {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Company {}

impl Hash for Company {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Company {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sector {
            Some(sector) => write!(f, "{} ({sector})", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-rule violations. All are deterministic, none are transient
/// except `Storage`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DomainError {
    #[error("Cannot {action}: snapshot {snapshot_id} is immutable (already finalized)")]
    ImmutableSnapshot { snapshot_id: Uuid, action: &'static str },

    #[error("Cannot finalize snapshot {snapshot_id}: only DRAFT snapshots can be finalized, but is {status}")]
    FinalizeDraftOnly { snapshot_id: Uuid, status: SnapshotStatus },

    #[error("Cannot invalidate snapshot {snapshot_id}: must be FINALIZED, but is {status}")]
    InvalidateDraftSnapshot { snapshot_id: Uuid, status: SnapshotStatus },

    #[error("Invalidation reason for snapshot {snapshot_id} must be a non-empty string")]
    EmptyInvalidationReason { snapshot_id: Uuid },

    #[error("Financial sanity check failed for {field} (value: {value}): {reason}")]
    FinancialSanity {
        field: &'static str,
        value: Decimal,
        reason: String,
    },

    #[error("Snapshot already exists for company {company_id} on {snapshot_date}")]
    DuplicateSnapshot { company_id: Uuid, snapshot_date: NaiveDate },

    #[error("Snapshot {snapshot_id} failed validation: {violation}")]
    SnapshotValidation { snapshot_id: Uuid, violation: String },

    #[error("No finalized snapshot for company {company_id} on {snapshot_date}")]
    SnapshotNotFoundOrNotFinalized { company_id: Uuid, snapshot_date: NaiveDate },

    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(Uuid),

    #[error("Invalid snapshot transition: {from} → {to}. {reason}")]
    InvalidTransition {
        from: SnapshotStatus,
        to: SnapshotStatus,
        reason: String,
    },

    #[error("Invalid company: {0}")]
    InvalidCompany(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl DomainError {
    /// Stable machine-readable identifier for callers that translate
    /// errors into transport responses.
    pub fn kind(&self) -> &'static str {
        match self {
            DomainError::ImmutableSnapshot { .. } => "immutable_snapshot",
            DomainError::FinalizeDraftOnly { .. } => "finalize_draft_only",
            DomainError::InvalidateDraftSnapshot { .. } => "invalidate_draft_snapshot",
            DomainError::EmptyInvalidationReason { .. } => "empty_invalidation_reason",
            DomainError::FinancialSanity { .. } => "financial_sanity",
            DomainError::DuplicateSnapshot { .. } => "duplicate_snapshot",
            DomainError::SnapshotValidation { .. } => "snapshot_validation",
            DomainError::SnapshotNotFoundOrNotFinalized { .. } => "snapshot_not_found_or_not_finalized",
            DomainError::SnapshotNotFound(_) => "snapshot_not_found",
            DomainError::InvalidTransition { .. } => "invalid_transition",
            DomainError::InvalidCompany(_) => "invalid_company",
            DomainError::Storage(_) => "storage",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
