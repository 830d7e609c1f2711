//! Rule engine.
//!
//! Each rule reads one signal and classifies it. A rule whose input
//! signal is missing produces no result; that is not an error.

use tracing::debug;

use super::signals::risk_level;
use crate::types::{
    ProfitabilityClass, RuleResult, RuleVerdict, RunwayRiskClass, Signal, SignalKind,
};

pub struct RuleEngine;

impl RuleEngine {
    pub fn evaluate(signals: &[Signal]) -> Vec<RuleResult> {
        let mut results = Vec::with_capacity(2);

        if let Some(risk) = find(signals, SignalKind::RunwayRisk) {
            results.push(RuleResult::new(RuleVerdict::RunwayRisk(classify_runway_risk(
                risk.value(),
            ))));
        }
        if let Some(burn) = find(signals, SignalKind::MonthlyBurn) {
            results.push(RuleResult::new(RuleVerdict::Profitability(classify_profitability(
                burn.value(),
            ))));
        }

        debug!(
            results = ?results.iter().map(|r| r.to_string()).collect::<Vec<_>>(),
            "Rules evaluated"
        );
        results
    }
}

/// Later signals of the same kind shadow earlier ones.
pub(crate) fn find(signals: &[Signal], kind: SignalKind) -> Option<&Signal> {
    signals.iter().rfind(|s| s.kind() == kind)
}

pub fn classify_runway_risk(value: f64) -> RunwayRiskClass {
    if value == risk_level::HIGH_RISK {
        RunwayRiskClass::HighRisk
    } else if value == risk_level::CAUTION {
        RunwayRiskClass::Caution
    } else if value == risk_level::HEALTHY {
        RunwayRiskClass::Healthy
    } else if value == risk_level::NO_RISK {
        RunwayRiskClass::Profitable
    } else {
        RunwayRiskClass::Unknown
    }
}

pub fn classify_profitability(burn: f64) -> ProfitabilityClass {
    if burn <= 0.0 {
        ProfitabilityClass::Profitable
    } else {
        ProfitabilityClass::Burning
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
