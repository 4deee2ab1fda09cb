//! Grower profile handlers

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::middleware::CurrentUser;
use crate::services::grower::UpdateProfileInput;
use crate::services::GrowerService;
use crate::AppState;

pub async fn get_profile(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> impl IntoResponse {
    let service = GrowerService::new(state.db.clone());

    match service.get_profile(current_user.0.user_id).await {
        Ok(profile) => (StatusCode::OK, Json(profile)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn update_profile(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<UpdateProfileInput>,
) -> impl IntoResponse {
    let service = GrowerService::new(state.db.clone());

    match service.update_profile(current_user.0.user_id, input).await {
        Ok(profile) => (StatusCode::OK, Json(profile)).into_response(),
        Err(e) => e.into_response(),
    }
}
