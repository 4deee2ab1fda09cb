//! Dashboard handler

use axum::{extract::State, Json};

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::dashboard::Dashboard;
use crate::services::DashboardService;
use crate::AppState;

pub async fn get_dashboard(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<Dashboard>> {
    let dashboard = DashboardService::new(state.db.clone())
        .dashboard(current_user.0.user_id, current_user.0.grower_id)
        .await?;
    Ok(Json(dashboard))
}
