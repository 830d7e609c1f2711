//! Signal engine.
//!
//! Turns a snapshot's derived metrics into an ordered list of signals.
//! Pure and deterministic apart from the generated signal ids.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::snapshot::Snapshot;
use crate::types::{Signal, SignalKind};

/// Runway below this many months is high risk.
pub const HIGH_RISK_RUNWAY_MONTHS: Decimal = dec!(6);
/// Runway above this many months is healthy.
pub const HEALTHY_RUNWAY_MONTHS: Decimal = dec!(12);

/// Integer risk levels carried by the `RunwayRisk` signal.
pub mod risk_level {
    pub const NO_RISK: f64 = 0.0;
    pub const HEALTHY: f64 = 1.0;
    pub const CAUTION: f64 = 2.0;
    pub const HIGH_RISK: f64 = 3.0;
}

pub struct SignalEngine;

impl SignalEngine {
    /// Emit `MonthlyBurn` and `RunwayMonths` when present, then always
    /// `RunwayRisk`.
    pub fn compute(snapshot: &Snapshot) -> Vec<Signal> {
        let mut signals = Vec::with_capacity(3);

        if let Some(burn) = snapshot.monthly_burn() {
            signals.push(Signal::new(SignalKind::MonthlyBurn, to_f64(burn)));
        }
        if let Some(runway) = snapshot.runway_months() {
            signals.push(Signal::new(SignalKind::RunwayMonths, to_f64(runway)));
        }
        signals.push(Signal::new(
            SignalKind::RunwayRisk,
            runway_risk(snapshot.runway_months()),
        ));

        debug!(
            snapshot_id = %snapshot.id(),
            signals = signals.len(),
            "Signals computed"
        );
        signals
    }
}

/// Classify runway into a risk level. No runway means the company is
/// profitable or break-even.
pub fn runway_risk(runway: Option<Decimal>) -> f64 {
    match runway {
        None => risk_level::NO_RISK,
        Some(r) if r < HIGH_RISK_RUNWAY_MONTHS => risk_level::HIGH_RISK,
        Some(r) if r <= HEALTHY_RUNWAY_MONTHS => risk_level::CAUTION,
        Some(_) => risk_level::HEALTHY,
    }
}

fn to_f64(value: Decimal) -> f64 {
    // Decimal's range always fits in an f64.
    value.to_f64().unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::FinancialInputs;
    use crate::types::SignalCategory;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn snapshot(cash: Decimal, revenue: Decimal, costs: Decimal) -> Snapshot {
        let mut s = Snapshot::new(
            Uuid::new_v4(),
            NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
            FinancialInputs::new(Some(cash), Some(revenue), Some(costs)),
        );
        s.compute_derived_metrics();
        s
    }

    fn values(signals: &[Signal]) -> Vec<(SignalKind, f64)> {
        signals.iter().map(|s| (s.kind(), s.value())).collect()
    }

    #[test]
    fn test_burning_company_emits_three_signals() {
        let signals = SignalEngine::compute(&snapshot(dec!(120000), dec!(20000), dec!(40000)));
        assert_eq!(
            values(&signals),
            vec![
                (SignalKind::MonthlyBurn, 20000.0),
                (SignalKind::RunwayMonths, 6.0),
                (SignalKind::RunwayRisk, 2.0),
            ]
        );
        assert_eq!(signals[0].category(), SignalCategory::Financial);
        assert_eq!(signals[2].category(), SignalCategory::Risk);
    }

    #[test]
    fn test_deterministic_for_identical_inputs() {
        let s = snapshot(dec!(120000), dec!(20000), dec!(40000));
        let a = SignalEngine::compute(&s);
        let b = SignalEngine::compute(&s);
        assert_eq!(values(&a), values(&b));
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn test_profitable_company_has_no_runway_signal() {
        let signals = SignalEngine::compute(&snapshot(dec!(100000), dec!(50000), dec!(40000)));
        assert_eq!(
            values(&signals),
            vec![(SignalKind::MonthlyBurn, -10000.0), (SignalKind::RunwayRisk, 0.0)]
        );
    }

    #[test]
    fn test_no_metrics_still_emits_risk() {
        let s = Snapshot::new(
            Uuid::new_v4(),
            NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
            FinancialInputs::default(),
        );
        let signals = SignalEngine::compute(&s);
        assert_eq!(values(&signals), vec![(SignalKind::RunwayRisk, 0.0)]);
    }

    #[test]
    fn test_runway_risk_bands() {
        assert_eq!(runway_risk(None), 0.0);
        assert_eq!(runway_risk(Some(dec!(0.5))), 3.0);
        assert_eq!(runway_risk(Some(dec!(5.99))), 3.0);
        assert_eq!(runway_risk(Some(dec!(6))), 2.0);
        assert_eq!(runway_risk(Some(dec!(12))), 2.0);
        assert_eq!(runway_risk(Some(dec!(12.01))), 1.0);
        assert_eq!(runway_risk(Some(dec!(48))), 1.0);
    }
}
