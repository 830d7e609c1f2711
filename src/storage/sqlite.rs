//! SQLite snapshot store backed by `sqlx`.
//!
//! Schema is created on connect. Monetary values are stored as TEXT so
//! they round-trip exactly; timestamps as RFC 3339 TEXT.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

use super::{check_status_write, SnapshotRepository};
use crate::engine::Derivation;
use crate::snapshot::{Snapshot, SnapshotRecord};
use crate::types::{DomainError, RuleResult, RuleVerdict, Signal, SignalKind, SnapshotStatus, Stage};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS snapshots (
        id TEXT PRIMARY KEY,
        company_id TEXT NOT NULL,
        snapshot_date TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'DRAFT',
        cash_balance TEXT,
        monthly_revenue TEXT,
        operating_costs TEXT,
        monthly_burn TEXT,
        runway_months TEXT,
        stage TEXT,
        invalidation_reason TEXT,
        created_at TEXT NOT NULL,
        finalized_at TEXT,
        invalidated_at TEXT,
        UNIQUE (company_id, snapshot_date)
    )",
    "CREATE TABLE IF NOT EXISTS snapshot_signals (
        id TEXT PRIMARY KEY,
        snapshot_id TEXT NOT NULL REFERENCES snapshots(id),
        name TEXT NOT NULL,
        value REAL NOT NULL,
        contributing_rank INTEGER,
        position INTEGER NOT NULL,
        computed_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS snapshot_rule_results (
        id TEXT PRIMARY KEY,
        snapshot_id TEXT NOT NULL REFERENCES snapshots(id),
        rule_name TEXT NOT NULL,
        result TEXT NOT NULL,
        position INTEGER NOT NULL,
        evaluated_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_snapshots_company_date ON snapshots (company_id, snapshot_date)",
];

const UPSERT_SNAPSHOT: &str = "INSERT INTO snapshots (
        id, company_id, snapshot_date, status, cash_balance, monthly_revenue,
        operating_costs, monthly_burn, runway_months, stage, invalidation_reason,
        created_at, finalized_at, invalidated_at
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT (id) DO UPDATE SET
        status = excluded.status,
        cash_balance = excluded.cash_balance,
        monthly_revenue = excluded.monthly_revenue,
        operating_costs = excluded.operating_costs,
        monthly_burn = excluded.monthly_burn,
        runway_months = excluded.runway_months,
        stage = excluded.stage,
        invalidation_reason = excluded.invalidation_reason,
        finalized_at = excluded.finalized_at,
        invalidated_at = excluded.invalidated_at
    WHERE snapshots.status = excluded.status
        OR (snapshots.status = 'DRAFT' AND excluded.status = 'FINALIZED')
        OR (snapshots.status = 'FINALIZED' AND excluded.status = 'INVALIDATED')";

const SELECT_SNAPSHOT: &str = "SELECT id, company_id, snapshot_date, status, cash_balance,
        monthly_revenue, operating_costs, monthly_burn, runway_months, stage,
        invalidation_reason, created_at, finalized_at, invalidated_at
    FROM snapshots";

pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Connect to `url` (e.g. `sqlite://stagewise.db` or `sqlite::memory:`)
    /// and create the schema if needed.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        // An in-memory database lives and dies with its one connection.
        let pool_options = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_options.connect_with(options).await?;

        let repo = Self { pool };
        repo.migrate().await?;
        info!(url, "SQLite store ready");
        Ok(repo)
    }

    async fn migrate(&self) -> Result<(), sqlx::Error> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn fetch_one_where(
        &self,
        clause: &str,
        binds: &[String],
    ) -> Result<Option<Snapshot>, DomainError> {
        let sql = format!("{SELECT_SNAPSHOT} WHERE {clause} LIMIT 1");
        let mut query = sqlx::query(&sql);
        for value in binds {
            query = query.bind(value);
        }
        let row = query.fetch_optional(&self.pool).await.map_err(storage_err)?;
        row.as_ref().map(row_to_snapshot).transpose()
    }
}

async fn upsert(
    conn: &mut sqlx::SqliteConnection,
    snapshot: &Snapshot,
) -> Result<(), DomainError> {
    let r = snapshot.to_record();
    let (id, status) = (r.id, r.status);
    let done = sqlx::query(UPSERT_SNAPSHOT)
        .bind(r.id.to_string())
        .bind(r.company_id.to_string())
        .bind(r.snapshot_date.to_string())
        .bind(r.status.as_str())
        .bind(r.cash_balance.map(|d| d.to_string()))
        .bind(r.monthly_revenue.map(|d| d.to_string()))
        .bind(r.operating_costs.map(|d| d.to_string()))
        .bind(r.monthly_burn.map(|d| d.to_string()))
        .bind(r.runway_months.map(|d| d.to_string()))
        .bind(r.stage.map(|s| s.as_str()))
        .bind(r.invalidation_reason)
        .bind(r.created_at.to_rfc3339())
        .bind(r.finalized_at.map(|t| t.to_rfc3339()))
        .bind(r.invalidated_at.map(|t| t.to_rfc3339()))
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            if matches!(&e, sqlx::Error::Database(db) if db.is_unique_violation()) {
                DomainError::DuplicateSnapshot {
                    company_id: r.company_id,
                    snapshot_date: r.snapshot_date,
                }
            } else {
                storage_err(e)
            }
        })?;

    // Zero rows means the status guard on DO UPDATE refused the write.
    if done.rows_affected() == 0 {
        let stored: Option<String> = sqlx::query_scalar("SELECT status FROM snapshots WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *conn)
            .await
            .map_err(storage_err)?;
        if let Some(stored) = stored {
            let stored = SnapshotStatus::from_str(&stored).map_err(corrupt)?;
            check_status_write(id, stored, status)?;
        }
        return Err(DomainError::Storage(format!("Snapshot {id} was not written")));
    }
    Ok(())
}

#[async_trait]
impl SnapshotRepository for SqliteRepository {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Snapshot>, DomainError> {
        self.fetch_one_where("id = ?", &[id.to_string()]).await
    }

    async fn list_finalized_by_company(&self, company_id: Uuid) -> Result<Vec<Snapshot>, DomainError> {
        let sql = format!("{SELECT_SNAPSHOT} WHERE company_id = ? AND status = ? ORDER BY snapshot_date ASC");
        let rows = sqlx::query(&sql)
            .bind(company_id.to_string())
            .bind(SnapshotStatus::Finalized.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        rows.iter().map(row_to_snapshot).collect()
    }

    async fn get_finalized_by_company_and_date(
        &self,
        company_id: Uuid,
        snapshot_date: NaiveDate,
    ) -> Result<Option<Snapshot>, DomainError> {
        self.fetch_one_where(
            "company_id = ? AND snapshot_date = ? AND status = ?",
            &[
                company_id.to_string(),
                snapshot_date.to_string(),
                SnapshotStatus::Finalized.as_str().to_string(),
            ],
        )
        .await
    }

    async fn get_any_by_company_and_date(
        &self,
        company_id: Uuid,
        snapshot_date: NaiveDate,
    ) -> Result<Option<Snapshot>, DomainError> {
        self.fetch_one_where(
            "company_id = ? AND snapshot_date = ?",
            &[company_id.to_string(), snapshot_date.to_string()],
        )
        .await
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), DomainError> {
        let mut conn = self.pool.acquire().await.map_err(storage_err)?;
        upsert(&mut conn, snapshot).await?;
        debug!(snapshot_id = %snapshot.id(), status = %snapshot.status(), "Snapshot saved");
        Ok(())
    }

    async fn save_with_artifacts(
        &self,
        snapshot: &Snapshot,
        artifacts: &Derivation,
    ) -> Result<(), DomainError> {
        let id = snapshot.id().to_string();
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        upsert(&mut tx, snapshot).await?;

        sqlx::query("DELETE FROM snapshot_signals WHERE snapshot_id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        sqlx::query("DELETE FROM snapshot_rule_results WHERE snapshot_id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;

        for (position, signal) in artifacts.signals.iter().enumerate() {
            let rank = artifacts
                .contributing_signals
                .iter()
                .position(|c| c == signal)
                .map(|r| r as i64);
            sqlx::query(
                "INSERT INTO snapshot_signals (id, snapshot_id, name, value, contributing_rank, position, computed_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(signal.id().to_string())
            .bind(&id)
            .bind(signal.name())
            .bind(signal.value())
            .bind(rank)
            .bind(position as i64)
            .bind(signal.created_at().to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        }

        for (position, result) in artifacts.rule_results.iter().enumerate() {
            sqlx::query(
                "INSERT INTO snapshot_rule_results (id, snapshot_id, rule_name, result, position, evaluated_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(result.id().to_string())
            .bind(&id)
            .bind(result.rule_name())
            .bind(result.result())
            .bind(position as i64)
            .bind(result.created_at().to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        }

        tx.commit().await.map_err(storage_err)?;
        debug!(
            snapshot_id = %id,
            signals = artifacts.signals.len(),
            rule_results = artifacts.rule_results.len(),
            "Snapshot saved with artifacts"
        );
        Ok(())
    }

    async fn load_artifacts(&self, snapshot_id: Uuid) -> Result<Option<Derivation>, DomainError> {
        let Some(snapshot) = self.get_by_id(snapshot_id).await? else {
            return Ok(None);
        };
        let id = snapshot_id.to_string();

        let signal_rows = sqlx::query(
            "SELECT id, name, value, contributing_rank, computed_at FROM snapshot_signals
             WHERE snapshot_id = ? ORDER BY position ASC",
        )
        .bind(&id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        let rule_rows = sqlx::query(
            "SELECT id, rule_name, result, evaluated_at FROM snapshot_rule_results
             WHERE snapshot_id = ? ORDER BY position ASC",
        )
        .bind(&id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        if signal_rows.is_empty() && rule_rows.is_empty() {
            return Ok(None);
        }

        let mut signals = Vec::with_capacity(signal_rows.len());
        let mut ranked = Vec::new();
        for row in &signal_rows {
            let name: String = get(row, "name")?;
            let kind = SignalKind::from_str(&name).map_err(corrupt)?;
            let signal = Signal::with_id(
                parse_uuid(&get::<String>(row, "id")?)?,
                kind,
                get(row, "value")?,
                parse_timestamp(&get::<String>(row, "computed_at")?)?,
            );
            if let Some(rank) = get::<Option<i64>>(row, "contributing_rank")? {
                ranked.push((rank, signal.clone()));
            }
            signals.push(signal);
        }
        ranked.sort_by_key(|(rank, _)| *rank);

        let mut rule_results = Vec::with_capacity(rule_rows.len());
        for row in &rule_rows {
            let verdict = RuleVerdict::parse(&get::<String>(row, "rule_name")?, &get::<String>(row, "result")?)
                .map_err(corrupt)?;
            rule_results.push(RuleResult::with_id(
                parse_uuid(&get::<String>(row, "id")?)?,
                verdict,
                parse_timestamp(&get::<String>(row, "evaluated_at")?)?,
            ));
        }

        let contributing_signals = ranked.into_iter().map(|(_, signal)| signal).collect();

        Ok(Some(Derivation {
            signals,
            rule_results,
            stage: snapshot.stage(),
            contributing_signals,
        }))
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn row_to_snapshot(row: &SqliteRow) -> Result<Snapshot, DomainError> {
    let record = SnapshotRecord {
        id: parse_uuid(&get::<String>(row, "id")?)?,
        company_id: parse_uuid(&get::<String>(row, "company_id")?)?,
        snapshot_date: NaiveDate::from_str(&get::<String>(row, "snapshot_date")?).map_err(corrupt)?,
        status: SnapshotStatus::from_str(&get::<String>(row, "status")?).map_err(corrupt)?,
        cash_balance: parse_decimal(get(row, "cash_balance")?)?,
        monthly_revenue: parse_decimal(get(row, "monthly_revenue")?)?,
        operating_costs: parse_decimal(get(row, "operating_costs")?)?,
        monthly_burn: parse_decimal(get(row, "monthly_burn")?)?,
        runway_months: parse_decimal(get(row, "runway_months")?)?,
        stage: get::<Option<String>>(row, "stage")?
            .map(|s| Stage::from_str(&s))
            .transpose()
            .map_err(corrupt)?,
        invalidation_reason: get(row, "invalidation_reason")?,
        created_at: parse_timestamp(&get::<String>(row, "created_at")?)?,
        finalized_at: get::<Option<String>>(row, "finalized_at")?
            .map(|t| parse_timestamp(&t))
            .transpose()?,
        invalidated_at: get::<Option<String>>(row, "invalidated_at")?
            .map(|t| parse_timestamp(&t))
            .transpose()?,
    };
    Snapshot::from_record(record)
}

fn get<'r, T>(row: &'r SqliteRow, column: &str) -> Result<T, DomainError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(column).map_err(storage_err)
}

fn parse_uuid(value: &str) -> Result<Uuid, DomainError> {
    Uuid::parse_str(value).map_err(corrupt)
}

fn parse_decimal(value: Option<String>) -> Result<Option<Decimal>, DomainError> {
    value.map(|v| Decimal::from_str(&v).map_err(corrupt)).transpose()
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, DomainError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(corrupt)
}

fn storage_err(e: sqlx::Error) -> DomainError {
    DomainError::Storage(e.to_string())
}

fn corrupt(e: impl std::fmt::Display) -> DomainError {
    DomainError::Storage(format!("Corrupt row: {e}"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine;
    use crate::snapshot::FinancialInputs;
    use rust_decimal_macros::dec;

    async fn repo() -> SqliteRepository {
        SqliteRepository::connect("sqlite::memory:").await.unwrap()
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, day).unwrap()
    }

    fn burning(company: Uuid, day: u32) -> Snapshot {
        let mut s = Snapshot::new(
            company,
            date(day),
            FinancialInputs::new(Some(dec!(120000.55)), Some(dec!(20000)), Some(dec!(40000))),
        );
        s.compute_derived_metrics();
        s
    }

    #[tokio::test]
    async fn test_round_trip_keeps_decimals_exact() {
        let repo = repo().await;
        let s = burning(Uuid::new_v4(), 1);
        repo.save(&s).await.unwrap();

        let loaded = repo.get_by_id(s.id()).await.unwrap().unwrap();
        assert_eq!(loaded.cash_balance(), Some(dec!(120000.55)));
        assert_eq!(loaded.runway_months(), Some(dec!(6.00)));
        assert!(loaded.is_draft());
    }

    #[tokio::test]
    async fn test_update_overwrites_status() {
        let repo = repo().await;
        let mut s = burning(Uuid::new_v4(), 1);
        repo.save(&s).await.unwrap();

        s.set_stage(Some(Stage::PreSeed)).unwrap();
        s.finalize().unwrap();
        repo.save(&s).await.unwrap();

        let loaded = repo.get_by_id(s.id()).await.unwrap().unwrap();
        assert!(loaded.is_finalized());
        assert_eq!(loaded.stage(), Some(Stage::PreSeed));
        assert!(loaded.finalized_at().is_some());
    }

    #[tokio::test]
    async fn test_stale_draft_cannot_overwrite_finalized() {
        let repo = repo().await;
        let mut s = burning(Uuid::new_v4(), 7);
        repo.save(&s).await.unwrap();
        let mut stale = s.clone();

        let derivation = engine::derive(&s);
        s.set_stage(derivation.stage).unwrap();
        s.finalize().unwrap();
        repo.save_with_artifacts(&s, &derivation).await.unwrap();

        stale
            .update_financials(&FinancialInputs::new(None, Some(dec!(99999)), None))
            .unwrap();
        let err = repo.save(&stale).await.unwrap_err();
        assert_eq!(
            err,
            DomainError::InvalidTransition {
                from: SnapshotStatus::Finalized,
                to: SnapshotStatus::Draft,
                reason: format!("Stored snapshot {} is already FINALIZED; stale write refused", s.id()),
            }
        );

        let stored = repo.get_by_id(s.id()).await.unwrap().unwrap();
        assert!(stored.is_finalized());
        assert_eq!(stored.stage(), Some(Stage::PreSeed));
        assert_eq!(stored.monthly_revenue(), Some(dec!(20000)));
        assert!(repo.load_artifacts(s.id()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_stale_finalized_cannot_undo_invalidation() {
        let repo = repo().await;
        let mut s = burning(Uuid::new_v4(), 8);
        s.finalize().unwrap();
        repo.save(&s).await.unwrap();
        let stale = s.clone();

        s.invalidate("restated").unwrap();
        repo.save(&s).await.unwrap();

        let err = repo.save(&stale).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_transition");
        assert!(repo.get_by_id(s.id()).await.unwrap().unwrap().is_invalidated());
    }

    #[tokio::test]
    async fn test_unique_company_date() {
        let repo = repo().await;
        let company = Uuid::new_v4();
        repo.save(&burning(company, 2)).await.unwrap();
        let err = repo.save(&burning(company, 2)).await.unwrap_err();
        assert!(matches!(err, DomainError::DuplicateSnapshot { .. }));
    }

    #[tokio::test]
    async fn test_finalized_queries() {
        let repo = repo().await;
        let company = Uuid::new_v4();

        for day in [9, 3] {
            let mut s = burning(company, day);
            s.finalize().unwrap();
            repo.save(&s).await.unwrap();
        }
        repo.save(&burning(company, 6)).await.unwrap();

        let listed = repo.list_finalized_by_company(company).await.unwrap();
        let dates: Vec<_> = listed.iter().map(Snapshot::snapshot_date).collect();
        assert_eq!(dates, vec![date(3), date(9)]);

        assert!(repo.get_finalized_by_company_and_date(company, date(6)).await.unwrap().is_none());
        assert!(repo.get_any_by_company_and_date(company, date(6)).await.unwrap().is_some());
        assert!(repo.get_finalized_by_company_and_date(company, date(9)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_artifacts_round_trip() {
        let repo = repo().await;
        let mut s = burning(Uuid::new_v4(), 4);
        let derivation = engine::derive(&s);
        s.set_stage(derivation.stage).unwrap();
        s.finalize().unwrap();
        repo.save_with_artifacts(&s, &derivation).await.unwrap();

        let loaded = repo.load_artifacts(s.id()).await.unwrap().unwrap();
        assert_eq!(loaded.stage, Some(Stage::PreSeed));
        assert_eq!(loaded.signals, derivation.signals);
        assert_eq!(loaded.rule_results, derivation.rule_results);
        assert_eq!(loaded.contributing_signals, derivation.contributing_signals);
    }

    #[tokio::test]
    async fn test_no_artifacts_for_draft() {
        let repo = repo().await;
        let s = burning(Uuid::new_v4(), 4);
        repo.save(&s).await.unwrap();
        assert!(repo.load_artifacts(s.id()).await.unwrap().is_none());
        assert!(repo.load_artifacts(Uuid::new_v4()).await.unwrap().is_none());
    }
}
