//! Manual surveillance record handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::dashboard::FarmRecords;
use crate::services::record::{CreateRecordInput, SurveillanceRecord};
use crate::services::{DashboardService, RecordService};
use crate::AppState;
use shared::types::{PaginatedResponse, Pagination};

pub async fn create_record(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(farm_id): Path<Uuid>,
    Json(input): Json<CreateRecordInput>,
) -> impl IntoResponse {
    let service = RecordService::new(state.db.clone());

    match service
        .create_record(current_user.0.grower_id, farm_id, input)
        .await
    {
        Ok(created) => (StatusCode::CREATED, Json(created)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn list_records(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(farm_id): Path<Uuid>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<PaginatedResponse<SurveillanceRecord>>> {
    let records = RecordService::new(state.db.clone())
        .list_records(current_user.0.grower_id, farm_id, pagination)
        .await?;
    Ok(Json(records))
}

/// Completed survey sessions grouped by farm
pub async fn session_records(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<Vec<FarmRecords>>> {
    let records = DashboardService::new(state.db.clone())
        .record_list(current_user.0.user_id)
        .await?;
    Ok(Json(records))
}
