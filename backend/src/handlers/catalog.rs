//! Reference data handlers: regions, plant types, parts, pests and diseases

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::catalog::{CatalogItem, CatalogKind, HarmfulAgent, Region};
use crate::services::CatalogService;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct PlantTypeFilter {
    pub plant_type_id: Option<Uuid>,
}

pub async fn list_regions(
    State(state): State<AppState>,
    _current_user: CurrentUser,
) -> AppResult<Json<Vec<Region>>> {
    let regions = CatalogService::new(state.db.clone()).list_regions().await?;
    Ok(Json(regions))
}

pub async fn list_plant_types(
    State(state): State<AppState>,
    _current_user: CurrentUser,
) -> AppResult<Json<Vec<CatalogItem>>> {
    let items = CatalogService::new(state.db.clone())
        .list(CatalogKind::PlantType)
        .await?;
    Ok(Json(items))
}

pub async fn list_plant_parts(
    State(state): State<AppState>,
    _current_user: CurrentUser,
) -> AppResult<Json<Vec<CatalogItem>>> {
    let items = CatalogService::new(state.db.clone())
        .list(CatalogKind::PlantPart)
        .await?;
    Ok(Json(items))
}

/// Pests, optionally limited to those affecting a plant type
pub async fn list_pests(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(filter): Query<PlantTypeFilter>,
) -> AppResult<Json<Vec<HarmfulAgent>>> {
    let pests = CatalogService::new(state.db.clone())
        .list_pests(filter.plant_type_id)
        .await?;
    Ok(Json(pests))
}

/// Diseases, optionally limited to those affecting a plant type
pub async fn list_diseases(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(filter): Query<PlantTypeFilter>,
) -> AppResult<Json<Vec<HarmfulAgent>>> {
    let diseases = CatalogService::new(state.db.clone())
        .list_diseases(filter.plant_type_id)
        .await?;
    Ok(Json(diseases))
}
