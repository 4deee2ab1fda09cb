//! Seasonal stage handlers

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Serialize;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::season::{current_month, DedupeReport, MonthQuery, SeasonalStage};
use crate::services::SeasonService;
use crate::AppState;
use shared::{resolve_month, SeasonalStageInfo, StageTimelineEntry};

#[derive(Serialize)]
pub struct TimelineResponse {
    pub current_month: u32,
    pub months: Vec<StageTimelineEntry>,
}

pub async fn list_stages(
    State(state): State<AppState>,
    _current_user: CurrentUser,
) -> AppResult<Json<Vec<SeasonalStage>>> {
    let stages = SeasonService::new(state.db.clone()).list_stages().await?;
    Ok(Json(stages))
}

/// Stage for `?month=`, or for the current month
pub async fn current_stage(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(query): Query<MonthQuery>,
) -> AppResult<Json<SeasonalStageInfo>> {
    let stage = SeasonService::new(state.db.clone())
        .resolve_stage(query.month.as_deref())
        .await?;
    Ok(Json(stage))
}

pub async fn timeline(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(query): Query<MonthQuery>,
) -> AppResult<Json<TimelineResponse>> {
    let (month, _) = resolve_month(query.month.as_deref(), current_month());
    let months = SeasonService::new(state.db.clone()).timeline(month).await?;

    Ok(Json(TimelineResponse {
        current_month: month,
        months,
    }))
}

/// Remove stages whose name is repeated, keeping the oldest. Staff only.
pub async fn deduplicate_stages(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<DedupeReport>> {
    current_user.require_staff()?;

    let report = SeasonService::new(state.db.clone())
        .delete_duplicate_stages()
        .await?;
    Ok(Json(report))
}
