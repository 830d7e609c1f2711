//! Stage decision table and the stage evaluator.
//!
//! Stage determination and explainability both read `decide`, so the
//! stage chosen and the signals credited for it come from the same
//! branch by construction.

use tracing::debug;

use crate::types::{ProfitabilityClass, RuleResult, RuleVerdict, RunwayRiskClass, SignalKind, Stage};

const RISK_DRIVERS: &[SignalKind] = &[SignalKind::RunwayRisk, SignalKind::RunwayMonths];
const RUNWAY_THEN_BURN: &[SignalKind] = &[SignalKind::RunwayMonths, SignalKind::MonthlyBurn];
const BURN_THEN_RUNWAY: &[SignalKind] = &[SignalKind::MonthlyBurn, SignalKind::RunwayMonths];

/// One row of the decision table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// `None` when the rule results are incomplete or unrecognised.
    pub stage: Option<Stage>,
    /// Signals credited for the decision, in reporting order.
    pub contributing: &'static [SignalKind],
}

impl Decision {
    pub const UNDETERMINED: Decision = Decision {
        stage: None,
        contributing: &[],
    };

    const fn of(stage: Stage, contributing: &'static [SignalKind]) -> Self {
        Decision {
            stage: Some(stage),
            contributing,
        }
    }
}

/// The two rule outcomes the decision table is keyed on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuleOutcomes {
    pub runway_risk: Option<RunwayRiskClass>,
    pub profitability: Option<ProfitabilityClass>,
}

impl RuleOutcomes {
    pub fn from_results(results: &[RuleResult]) -> Self {
        let mut outcomes = RuleOutcomes::default();
        for result in results {
            match result.verdict() {
                RuleVerdict::RunwayRisk(class) => outcomes.runway_risk = Some(class),
                RuleVerdict::Profitability(class) => outcomes.profitability = Some(class),
            }
        }
        outcomes
    }
}

/// First match wins. GROWTH has no branch.
pub fn decide(outcomes: RuleOutcomes) -> Decision {
    use ProfitabilityClass as P;
    use RunwayRiskClass as R;

    match (outcomes.runway_risk, outcomes.profitability) {
        (Some(R::HighRisk), _) => Decision::of(Stage::Idea, RISK_DRIVERS),
        (Some(R::Caution), _) => Decision::of(Stage::PreSeed, RISK_DRIVERS),
        (Some(R::Healthy), Some(P::Burning)) => Decision::of(Stage::Seed, RUNWAY_THEN_BURN),
        (Some(R::Healthy), Some(P::Profitable)) => Decision::of(Stage::SeriesA, RUNWAY_THEN_BURN),
        // Positive burn with no cash on record: runway is absent, so risk reads as none.
        (Some(R::Profitable), Some(P::Burning)) => Decision::of(Stage::Seed, &[]),
        (Some(R::Profitable), Some(P::Profitable)) => Decision::of(Stage::SeriesA, BURN_THEN_RUNWAY),
        (Some(R::Healthy | R::Profitable), None) | (Some(R::Unknown), _) | (None, _) => {
            Decision::UNDETERMINED
        }
    }
}

pub struct StageEvaluator;

impl StageEvaluator {
    pub fn determine(rule_results: &[RuleResult]) -> Option<Stage> {
        let outcomes = RuleOutcomes::from_results(rule_results);
        let stage = decide(outcomes).stage;
        debug!(?outcomes, ?stage, "Stage determined");
        stage
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
