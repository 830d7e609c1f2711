//! A company's year of snapshots, run against every storage backend.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use uuid::Uuid;

use stagewise::engine::trend::TrendDirection;
use stagewise::snapshot::FinancialInputs;
use stagewise::storage::{InMemoryRepository, SnapshotRepository, SqliteRepository};
use stagewise::types::{DomainError, Stage};
use stagewise::validation::{FinancialValidator, ValidatorConfig};
use stagewise::workflow::{NewSnapshot, SnapshotService};

fn quarter(q: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, q * 3, 1).unwrap()
}

fn new_snapshot(company_id: Uuid, q: u32, cash: Decimal, revenue: Decimal, costs: Decimal) -> NewSnapshot {
    NewSnapshot {
        company_id,
        snapshot_date: quarter(q),
        cash_balance: Some(cash),
        monthly_revenue: Some(revenue),
        operating_costs: Some(costs),
    }
}

async fn run_journey(repo: Arc<dyn SnapshotRepository>) {
    let svc = SnapshotService::new(repo, FinancialValidator::new(ValidatorConfig::default()));
    let company = Uuid::new_v4();

    // Q1: 3 months of runway.
    let q1 = svc
        .create_snapshot(new_snapshot(company, 1, dec!(60000), dec!(5000), dec!(25000)))
        .await
        .unwrap();
    let q1 = svc.finalize_snapshot(q1.id()).await.unwrap().snapshot;
    assert_eq!(q1.stage(), Some(Stage::Idea));

    // Q2: input corrected while still a draft.
    let q2 = svc
        .create_snapshot(new_snapshot(company, 2, dec!(150000), dec!(10000), dec!(40000)))
        .await
        .unwrap();
    svc.update_snapshot(q2.id(), FinancialInputs::new(None, Some(dec!(15000)), None))
        .await
        .unwrap();
    let q2 = svc.finalize_snapshot(q2.id()).await.unwrap().snapshot;
    assert_eq!(q2.runway_months(), Some(dec!(6.00)));
    assert_eq!(q2.stage(), Some(Stage::PreSeed));

    // Q3: long runway, still burning.
    let q3 = svc
        .create_snapshot(new_snapshot(company, 3, dec!(400000), dec!(20000), dec!(40000)))
        .await
        .unwrap();
    let q3 = svc.finalize_snapshot(q3.id()).await.unwrap().snapshot;
    assert_eq!(q3.stage(), Some(Stage::Seed));

    // Q4: profitable, then found to be misreported.
    let q4 = svc
        .create_snapshot(new_snapshot(company, 4, dec!(400000), dec!(60000), dec!(40000)))
        .await
        .unwrap();
    let q4 = svc.finalize_snapshot(q4.id()).await.unwrap().snapshot;
    assert_eq!(q4.stage(), Some(Stage::SeriesA));
    svc.invalidate_snapshot(q4.id(), "revenue double counted").await.unwrap();

    // Invalidated snapshots drop out of every company view.
    let timeline = svc.timeline(company).await.unwrap();
    let labels: Vec<_> = timeline
        .iter()
        .map(|e| e.stage_transition_from_previous.as_deref())
        .collect();
    assert_eq!(labels, vec![None, Some("IDEA -> PRE_SEED"), Some("PRE_SEED -> SEED")]);

    let trends = svc.trends(company).await.unwrap();
    assert_eq!(trends.report.snapshot_count, 3);
    assert_eq!(trends.report.indicators.revenue_trend, Some(TrendDirection::Up));
    assert_eq!(trends.report.indicators.burn_trend, Some(TrendDirection::Flat));
    assert_eq!(trends.report.indicators.runway_trend, Some(TrendDirection::Up));

    let err = svc.compare(company, quarter(1), quarter(4)).await.unwrap_err();
    assert!(matches!(err, DomainError::SnapshotNotFoundOrNotFinalized { .. }));

    let cmp = svc.compare(company, quarter(1), quarter(3)).await.unwrap();
    assert_eq!(cmp.deltas.delta_revenue, Some(dec!(15000)));
    assert_eq!(cmp.deltas.delta_burn, Some(dec!(0)));
    assert_eq!(cmp.deltas.delta_runway, Some(dec!(17.00)));

    // The invalidated snapshot keeps its audit trail and blocks its date.
    let explanation = svc.explanation(q4.id()).await.unwrap();
    assert_eq!(explanation.stage, Some(Stage::SeriesA));
    let err = svc
        .create_snapshot(new_snapshot(company, 4, dec!(1), dec!(1), dec!(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::DuplicateSnapshot { .. }));
}

#[tokio::test]
async fn journey_in_memory() {
    run_journey(Arc::new(InMemoryRepository::new())).await;
}

#[tokio::test]
async fn journey_in_sqlite() {
    let repo = SqliteRepository::connect("sqlite::memory:").await.unwrap();
    run_journey(Arc::new(repo)).await;
}

#[tokio::test]
async fn memory_state_survives_restart() {
    let path = std::env::temp_dir()
        .join(format!("stagewise_it_{}.json", Uuid::new_v4()))
        .to_string_lossy()
        .to_string();
    let company = Uuid::new_v4();

    let store = Arc::new(InMemoryRepository::new());
    let svc = SnapshotService::new(store.clone(), FinancialValidator::default());
    let s = svc
        .create_snapshot(new_snapshot(company, 1, dec!(120000), dec!(20000), dec!(40000)))
        .await
        .unwrap();
    svc.finalize_snapshot(s.id()).await.unwrap();
    store.save_to_file(&path).await.unwrap();

    let restored = Arc::new(InMemoryRepository::load_from_file(&path).await.unwrap());
    let svc = SnapshotService::new(restored, FinancialValidator::default());
    let explanation = svc.explanation(s.id()).await.unwrap();
    assert_eq!(explanation.stage, Some(Stage::PreSeed));
    assert_eq!(explanation.contributing_signals.len(), 2);

    std::fs::remove_file(&path).unwrap();
}
