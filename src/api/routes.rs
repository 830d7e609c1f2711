//! HTTP route handlers.
//!
//! All endpoints speak JSON. Handlers are thin: they extract, call the
//! `SnapshotService`, and map `DomainError` to a status code.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

use crate::engine::Derivation;
use crate::snapshot::{FinancialInputs, SnapshotRecord};
use crate::types::DomainError;
use crate::workflow::{
    CompanyTrends, Comparison, Explanation, NewSnapshot, Preview, SnapshotService, TimelineEntry,
};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub struct ApiState {
    pub service: SnapshotService,
    pub service_name: String,
    pub started_at: DateTime<Utc>,
}

impl ApiState {
    pub fn new(service: SnapshotService, service_name: impl Into<String>) -> Self {
        Self {
            service,
            service_name: service_name.into(),
            started_at: Utc::now(),
        }
    }
}

pub type AppState = Arc<ApiState>;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct InvalidateRequest {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompareQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: String,
    pub uptime_secs: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FinalizeResponse {
    pub snapshot: SnapshotRecord,
    pub derivation: Derivation,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ApiError(pub DomainError);

impl From<DomainError> for ApiError {
    fn from(e: DomainError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            DomainError::SnapshotNotFound(_) | DomainError::SnapshotNotFoundOrNotFinalized { .. } => {
                StatusCode::NOT_FOUND
            }
            DomainError::DuplicateSnapshot { .. }
            | DomainError::ImmutableSnapshot { .. }
            | DomainError::FinalizeDraftOnly { .. }
            | DomainError::InvalidateDraftSnapshot { .. }
            | DomainError::InvalidTransition { .. } => StatusCode::CONFLICT,
            DomainError::FinancialSanity { .. }
            | DomainError::SnapshotValidation { .. }
            | DomainError::EmptyInvalidationReason { .. }
            | DomainError::InvalidCompany(_) => StatusCode::UNPROCESSABLE_ENTITY,
            DomainError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        } else {
            warn!(kind = self.0.kind(), error = %self.0, "Request rejected");
        }
        let body = ErrorBody {
            error: self.0.kind(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: state.service_name.clone(),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
    })
}

/// POST /api/snapshots
pub async fn create_snapshot(
    State(state): State<AppState>,
    Json(request): Json<NewSnapshot>,
) -> Result<(StatusCode, Json<SnapshotRecord>), ApiError> {
    let snapshot = state.service.create_snapshot(request).await?;
    Ok((StatusCode::CREATED, Json(snapshot.to_record())))
}

/// GET /api/snapshots/:id
pub async fn get_snapshot(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<SnapshotRecord> {
    let snapshot = state.service.get_snapshot(id).await?;
    Ok(Json(snapshot.to_record()))
}

/// PATCH /api/snapshots/:id
pub async fn update_snapshot(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<FinancialInputs>,
) -> ApiResult<SnapshotRecord> {
    let snapshot = state.service.update_snapshot(id, update).await?;
    Ok(Json(snapshot.to_record()))
}

/// GET /api/snapshots/:id/preview
pub async fn preview_snapshot(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Preview> {
    Ok(Json(state.service.preview(id).await?))
}

/// POST /api/snapshots/:id/finalize
pub async fn finalize_snapshot(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<FinalizeResponse> {
    let finalized = state.service.finalize_snapshot(id).await?;
    Ok(Json(FinalizeResponse {
        snapshot: finalized.snapshot.to_record(),
        derivation: finalized.derivation,
    }))
}

/// POST /api/snapshots/:id/invalidate
pub async fn invalidate_snapshot(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<InvalidateRequest>,
) -> ApiResult<SnapshotRecord> {
    let snapshot = state.service.invalidate_snapshot(id, &request.reason).await?;
    Ok(Json(snapshot.to_record()))
}

/// GET /api/snapshots/:id/explanation
pub async fn get_explanation(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Explanation> {
    Ok(Json(state.service.explanation(id).await?))
}

/// GET /api/companies/:company_id/timeline
pub async fn get_timeline(
    State(state): State<AppState>,
    Path(company_id): Path<Uuid>,
) -> ApiResult<Vec<TimelineEntry>> {
    Ok(Json(state.service.timeline(company_id).await?))
}

/// GET /api/companies/:company_id/compare?from=&to=
pub async fn compare_snapshots(
    State(state): State<AppState>,
    Path(company_id): Path<Uuid>,
    Query(query): Query<CompareQuery>,
) -> ApiResult<Comparison> {
    Ok(Json(state.service.compare(company_id, query.from, query.to).await?))
}

/// GET /api/companies/:company_id/trends
pub async fn get_trends(
    State(state): State<AppState>,
    Path(company_id): Path<Uuid>,
) -> ApiResult<CompanyTrends> {
    Ok(Json(state.service.trends(company_id).await?))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
