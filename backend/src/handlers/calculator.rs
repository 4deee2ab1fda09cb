//! Surveillance calculator handlers

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::models::RawParam;
use crate::services::calculation::{CalculationInput, CalculationOutcome};
use crate::services::season::{current_month, MonthQuery};
use crate::services::{CalculationService, SeasonService};
use crate::AppState;
use shared::{resolve_month, ConfidenceLevel, SeasonalStageInfo, StageTimelineEntry};

#[derive(Debug, Deserialize)]
pub struct PreviewQuery {
    pub farm_id: Uuid,
    pub confidence_level: Option<u8>,
    pub month: Option<String>,
}

impl From<PreviewQuery> for CalculationInput {
    fn from(query: PreviewQuery) -> Self {
        Self {
            farm_id: query.farm_id,
            confidence_level: query.confidence_level,
            month: query.month.map(RawParam::Text),
            notes: None,
        }
    }
}

/// Choices for the calculator form
#[derive(Serialize)]
pub struct CalculatorOptions {
    pub confidence_levels: Vec<ConfidenceLevel>,
    pub default_confidence_level: ConfidenceLevel,
    pub current_month: u32,
    pub current_stage: SeasonalStageInfo,
    pub timeline: Vec<StageTimelineEntry>,
}

/// Run the calculator and save the result as the farm's current one
pub async fn calculate(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CalculationInput>,
) -> impl IntoResponse {
    let service = CalculationService::new(state.db.clone());

    match service
        .calculate_and_save(current_user.0.grower_id, input)
        .await
    {
        Ok(outcome) => (StatusCode::CREATED, Json(outcome)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Run the calculator without saving
pub async fn preview(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<PreviewQuery>,
) -> AppResult<Json<CalculationOutcome>> {
    let input = CalculationInput::from(query);
    let outcome = CalculationService::new(state.db.clone())
        .preview(current_user.0.grower_id, &input)
        .await?;
    Ok(Json(outcome))
}

pub async fn options(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(query): Query<MonthQuery>,
) -> AppResult<Json<CalculatorOptions>> {
    let (month, _) = resolve_month(query.month.as_deref(), current_month());
    let seasons = SeasonService::new(state.db.clone());
    let current_stage = seasons.stage_for_month(month).await?;
    let timeline = seasons.timeline(month).await?;

    Ok(Json(CalculatorOptions {
        confidence_levels: ConfidenceLevel::all().collect(),
        default_confidence_level: ConfidenceLevel::default(),
        current_month: month,
        current_stage,
        timeline,
    }))
}
