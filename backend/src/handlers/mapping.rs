//! Public boundary mapping handlers
//!
//! These routes are reached through a mapping link and take no bearer token.

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::boundary::{BoundarySaved, BoundarySubmission, MappingContext};
use crate::services::BoundaryService;
use crate::AppState;

/// Malformed tokens are reported like unknown ones
fn parse_token(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::InvalidLink("Invalid mapping link.".to_string()))
}

pub async fn open_mapping_link(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> AppResult<Json<MappingContext>> {
    let token = parse_token(&token)?;
    let context = BoundaryService::new(state.db.clone())
        .validate_token(token)
        .await?;
    Ok(Json(context))
}

pub async fn submit_boundary(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(body): Json<BoundarySubmission>,
) -> AppResult<Json<BoundarySaved>> {
    let token = parse_token(&token)?;
    let saved = BoundaryService::new(state.db.clone())
        .submit_boundary(token, body)
        .await?;
    Ok(Json(saved))
}
