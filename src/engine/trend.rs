//! Trend engine.
//!
//! Builds a time series over finalized snapshots (ascending by date, as
//! supplied by the caller) and derives monotonic-trend indicators from
//! the most recent points.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::snapshot::Snapshot;

/// Number of trailing points the indicators look at.
pub const TREND_WINDOW: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrendDirection {
    Up,
    Down,
    Flat,
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrendDirection::Up => write!(f, "UP"),
            TrendDirection::Down => write!(f, "DOWN"),
            TrendDirection::Flat => write!(f, "FLAT"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub date: NaiveDate,
    pub runway_months: Option<Decimal>,
    pub monthly_burn: Option<Decimal>,
    pub monthly_revenue: Option<Decimal>,
    pub revenue_growth_percent: Option<Decimal>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendIndicators {
    pub revenue_trend: Option<TrendDirection>,
    pub burn_trend: Option<TrendDirection>,
    pub runway_trend: Option<TrendDirection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendReport {
    pub time_series: Vec<TimeSeriesPoint>,
    pub indicators: TrendIndicators,
    pub snapshot_count: usize,
}

pub struct TrendEngine;

impl TrendEngine {
    pub fn build_time_series(snapshots: &[Snapshot]) -> TrendReport {
        let mut time_series = Vec::with_capacity(snapshots.len());
        let mut previous_revenue: Option<Decimal> = None;

        for snapshot in snapshots {
            let revenue = snapshot.monthly_revenue();
            time_series.push(TimeSeriesPoint {
                date: snapshot.snapshot_date(),
                runway_months: snapshot.runway_months(),
                monthly_burn: snapshot.monthly_burn(),
                monthly_revenue: revenue,
                revenue_growth_percent: growth_percent(revenue, previous_revenue),
            });
            previous_revenue = revenue;
        }

        let indicators = compute_indicators(&time_series);
        debug!(points = time_series.len(), ?indicators, "Time series built");

        TrendReport {
            time_series,
            indicators,
            snapshot_count: snapshots.len(),
        }
    }
}

/// Percentage change from `previous` to `current`, rounded to 2 places.
/// Absent when either side is absent or `previous` is zero.
pub fn growth_percent(current: Option<Decimal>, previous: Option<Decimal>) -> Option<Decimal> {
    let (current, previous) = (current?, previous?);
    if previous.is_zero() {
        return None;
    }
    let ratio = (current - previous).checked_div(previous)?;
    ratio.checked_mul(Decimal::ONE_HUNDRED).map(|g| g.round_dp(2))
}

fn compute_indicators(points: &[TimeSeriesPoint]) -> TrendIndicators {
    if points.len() < 2 {
        return TrendIndicators::default();
    }
    let recent = &points[points.len().saturating_sub(TREND_WINDOW)..];

    let trend_of = |metric: fn(&TimeSeriesPoint) -> Option<Decimal>| {
        let values: Vec<Decimal> = recent.iter().filter_map(metric).collect();
        determine_trend(&values)
    };

    TrendIndicators {
        revenue_trend: trend_of(|p| p.monthly_revenue),
        burn_trend: trend_of(|p| p.monthly_burn),
        runway_trend: trend_of(|p| p.runway_months),
    }
}

/// UP if strictly increasing, DOWN if strictly decreasing, FLAT otherwise.
/// Undetermined with fewer than two values.
pub fn determine_trend(values: &[Decimal]) -> Option<TrendDirection> {
    if values.len() < 2 {
        return None;
    }
    if values.windows(2).all(|w| w[0] < w[1]) {
        Some(TrendDirection::Up)
    } else if values.windows(2).all(|w| w[0] > w[1]) {
        Some(TrendDirection::Down)
    } else {
        Some(TrendDirection::Flat)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::FinancialInputs;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn snap(day: u32, cash: Option<Decimal>, revenue: Option<Decimal>, costs: Option<Decimal>) -> Snapshot {
        let mut s = Snapshot::new(
            Uuid::nil(),
            NaiveDate::from_ymd_opt(2026, 1, day).unwrap(),
            FinancialInputs::new(cash, revenue, costs),
        );
        s.compute_derived_metrics();
        s.finalize().unwrap();
        s
    }

    #[test]
    fn test_empty_series() {
        let report = TrendEngine::build_time_series(&[]);
        assert!(report.time_series.is_empty());
        assert_eq!(report.indicators, TrendIndicators::default());
        assert_eq!(report.snapshot_count, 0);
    }

    #[test]
    fn test_single_point_has_no_indicators() {
        let report = TrendEngine::build_time_series(&[snap(1, Some(dec!(1000)), Some(dec!(10)), Some(dec!(20)))]);
        assert_eq!(report.time_series.len(), 1);
        assert_eq!(report.indicators, TrendIndicators::default());
        assert_eq!(report.time_series[0].revenue_growth_percent, None);
    }

    #[test]
    fn test_revenue_growth_with_gap() {
        let snapshots = [
            snap(1, None, Some(dec!(10000)), None),
            snap(2, None, Some(dec!(15000)), None),
            snap(3, None, None, None),
        ];
        let report = TrendEngine::build_time_series(&snapshots);
        let growth: Vec<_> = report.time_series.iter().map(|p| p.revenue_growth_percent).collect();
        assert_eq!(growth, vec![None, Some(dec!(50.00)), None]);
        assert_eq!(report.indicators.revenue_trend, Some(TrendDirection::Up));
        assert_eq!(report.indicators.burn_trend, None);
    }

    #[test]
    fn test_growth_from_zero_is_absent() {
        assert_eq!(growth_percent(Some(dec!(500)), Some(dec!(0))), None);
        assert_eq!(growth_percent(Some(dec!(500)), None), None);
        assert_eq!(growth_percent(None, Some(dec!(500))), None);
    }

    #[test]
    fn test_growth_rounds_to_two_places() {
        assert_eq!(growth_percent(Some(dec!(4)), Some(dec!(3))), Some(dec!(33.33)));
        assert_eq!(growth_percent(Some(dec!(2)), Some(dec!(3))), Some(dec!(-33.33)));
    }

    #[test]
    fn test_indicators_use_last_three_points() {
        // Revenue dips early, then rises over the final three points.
        let snapshots = [
            snap(1, Some(dec!(100000)), Some(dec!(9000)), Some(dec!(20000))),
            snap(2, Some(dec!(90000)), Some(dec!(5000)), Some(dec!(20000))),
            snap(3, Some(dec!(80000)), Some(dec!(6000)), Some(dec!(20000))),
            snap(4, Some(dec!(70000)), Some(dec!(7000)), Some(dec!(20000))),
        ];
        let report = TrendEngine::build_time_series(&snapshots);
        assert_eq!(report.snapshot_count, 4);
        assert_eq!(report.indicators.revenue_trend, Some(TrendDirection::Up));
        assert_eq!(report.indicators.burn_trend, Some(TrendDirection::Down));
        assert_eq!(report.indicators.runway_trend, Some(TrendDirection::Down));
    }

    #[test]
    fn test_flat_when_not_monotonic() {
        assert_eq!(
            determine_trend(&[dec!(1), dec!(3), dec!(2)]),
            Some(TrendDirection::Flat)
        );
        assert_eq!(determine_trend(&[dec!(2), dec!(2)]), Some(TrendDirection::Flat));
        assert_eq!(determine_trend(&[dec!(2)]), None);
    }

    #[test]
    fn test_runway_absent_when_profitable() {
        let snapshots = [
            snap(1, Some(dec!(100000)), Some(dec!(50000)), Some(dec!(40000))),
            snap(2, Some(dec!(120000)), Some(dec!(55000)), Some(dec!(40000))),
        ];
        let report = TrendEngine::build_time_series(&snapshots);
        assert!(report.time_series.iter().all(|p| p.runway_months.is_none()));
        assert_eq!(report.indicators.runway_trend, None);
        assert_eq!(report.indicators.burn_trend, Some(TrendDirection::Down));
        assert_eq!(report.time_series[1].revenue_growth_percent, Some(dec!(10)));
    }
}
