//! Farm management handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::calculation::SurveillanceCalculation;
use crate::services::farm::{BoundaryInput, FarmDetail, FarmInput, FarmStats, Recommendations};
use crate::services::season::MonthQuery;
use crate::services::{BoundaryService, CalculationService, FarmService};
use crate::AppState;

/// Farms of the current grower with surveillance status
pub async fn list_farms(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> impl IntoResponse {
    let service = FarmService::new(state.db.clone());

    match service.list_farms(current_user.0.grower_id).await {
        Ok(farms) => (StatusCode::OK, Json(serde_json::json!({ "farms": farms }))).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn create_farm(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<FarmInput>,
) -> impl IntoResponse {
    let service = FarmService::new(state.db.clone());

    match service.create_farm(current_user.0.grower_id, input).await {
        Ok(farm) => (StatusCode::CREATED, Json(farm)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Farm page: stage, sample size, priorities and recent sessions
pub async fn get_farm(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(farm_id): Path<Uuid>,
    Query(query): Query<MonthQuery>,
) -> AppResult<Json<FarmDetail>> {
    let detail = FarmService::new(state.db.clone())
        .farm_detail(current_user.0.grower_id, farm_id, query.month.as_deref())
        .await?;
    Ok(Json(detail))
}

pub async fn update_farm(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(farm_id): Path<Uuid>,
    Json(input): Json<FarmInput>,
) -> impl IntoResponse {
    let service = FarmService::new(state.db.clone());

    match service
        .update_farm(current_user.0.grower_id, farm_id, input)
        .await
    {
        Ok(farm) => (StatusCode::OK, Json(farm)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn delete_farm(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(farm_id): Path<Uuid>,
) -> impl IntoResponse {
    let service = FarmService::new(state.db.clone());

    match service.delete_farm(current_user.0.grower_id, farm_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

/// Set or clear the boundary polygon
pub async fn set_boundary(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(farm_id): Path<Uuid>,
    Json(input): Json<BoundaryInput>,
) -> impl IntoResponse {
    let service = FarmService::new(state.db.clone());

    match service
        .set_boundary(current_user.0.grower_id, farm_id, input)
        .await
    {
        Ok(farm) => (StatusCode::OK, Json(farm)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn recommendations(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(farm_id): Path<Uuid>,
    Query(query): Query<MonthQuery>,
) -> AppResult<Json<Recommendations>> {
    let recommendations = FarmService::new(state.db.clone())
        .recommendations(current_user.0.grower_id, farm_id, query.month.as_deref())
        .await?;
    Ok(Json(recommendations))
}

pub async fn farm_stats(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(farm_id): Path<Uuid>,
) -> AppResult<Json<FarmStats>> {
    let stats = FarmService::new(state.db.clone())
        .farm_stats(current_user.0.grower_id, farm_id)
        .await?;
    Ok(Json(stats))
}

/// Saved calculations, newest first
pub async fn calculation_history(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(farm_id): Path<Uuid>,
) -> AppResult<Json<Vec<SurveillanceCalculation>>> {
    let history = CalculationService::new(state.db.clone())
        .history(current_user.0.grower_id, farm_id)
        .await?;
    Ok(Json(history))
}

/// Issue a boundary mapping link for the farm
pub async fn create_mapping_link(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(farm_id): Path<Uuid>,
) -> impl IntoResponse {
    let service = BoundaryService::new(state.db.clone());

    match service
        .create_link(current_user.0.grower_id, farm_id, &state.config)
        .await
    {
        Ok(link) => (StatusCode::CREATED, Json(link)).into_response(),
        Err(e) => e.into_response(),
    }
}
