//! Survey session and observation handlers

use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::CurrentUser;
use crate::services::media::{ImageUpload, UploadReport};
use crate::services::survey::{
    ActiveSessionView, ObservationInput, SessionDetail, SessionListItem, StartSessionInput,
};
use crate::services::{MediaService, SurveyService};
use crate::AppState;

/// Multipart field holding observation images
const IMAGE_FIELD: &str = "images";

pub async fn list_sessions(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(farm_id): Path<Uuid>,
) -> AppResult<Json<Vec<SessionListItem>>> {
    let sessions = SurveyService::new(state.db.clone())
        .list_sessions(current_user.0.grower_id, farm_id)
        .await?;
    Ok(Json(sessions))
}

/// Start a session on a farm
pub async fn start_session(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(farm_id): Path<Uuid>,
    body: Option<Json<StartSessionInput>>,
) -> impl IntoResponse {
    let service = SurveyService::new(state.db.clone());
    let input = body.map(|Json(input)| input).unwrap_or_default();

    match service
        .start_session(current_user.0.user_id, current_user.0.grower_id, farm_id, input)
        .await
    {
        Ok(session) => (StatusCode::CREATED, Json(session)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn get_session(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(session_id): Path<Uuid>,
) -> AppResult<Json<SessionDetail>> {
    let detail = SurveyService::new(state.db.clone())
        .session_detail(current_user.0.user_id, session_id)
        .await?;
    Ok(Json(detail))
}

/// Progress view while surveying
pub async fn active_session(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(session_id): Path<Uuid>,
) -> AppResult<Json<ActiveSessionView>> {
    let view = SurveyService::new(state.db.clone())
        .active_session_view(current_user.0.user_id, session_id)
        .await?;
    Ok(Json(view))
}

pub async fn finish_session(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(session_id): Path<Uuid>,
) -> impl IntoResponse {
    let service = SurveyService::new(state.db.clone());

    match service
        .finish_session(current_user.0.user_id, session_id)
        .await
    {
        Ok(finished) => (StatusCode::OK, Json(finished)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn abandon_session(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(session_id): Path<Uuid>,
) -> impl IntoResponse {
    let service = SurveyService::new(state.db.clone());

    match service
        .abandon_session(current_user.0.user_id, session_id)
        .await
    {
        Ok(session) => (StatusCode::OK, Json(session)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn delete_session(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(session_id): Path<Uuid>,
) -> impl IntoResponse {
    let service = SurveyService::new(state.db.clone());

    match service
        .delete_session(current_user.0.user_id, session_id)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

/// Completed observations as a CSV download
pub async fn export_session_csv(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(session_id): Path<Uuid>,
) -> impl IntoResponse {
    let service = SurveyService::new(state.db.clone());

    match service
        .export_observations_csv(current_user.0.user_id, session_id)
        .await
    {
        Ok((filename, csv)) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", filename),
                ),
            ],
            csv,
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Auto-save the observation being edited
pub async fn autosave_observation(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<ObservationInput>,
) -> impl IntoResponse {
    let service = SurveyService::new(state.db.clone());

    match service.autosave_draft(current_user.0.user_id, input).await {
        Ok(saved) => (StatusCode::OK, Json(saved)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Submit an observation, finalizing the draft when one is given
pub async fn create_observation(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<ObservationInput>,
) -> impl IntoResponse {
    let service = SurveyService::new(state.db.clone());

    match service
        .create_observation(current_user.0.user_id, input)
        .await
    {
        Ok(saved) => (StatusCode::CREATED, Json(saved)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Upload images for an observation. Use key `images`, repeated per file.
#[tracing::instrument(skip(state, current_user, multipart), fields(user_id = %current_user.0.user_id))]
pub async fn upload_observation_images(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(observation_id): Path<Uuid>,
    mut multipart: Multipart,
) -> AppResult<Json<UploadReport>> {
    let uploads = read_image_fields(&mut multipart).await?;

    let report = MediaService::new(state.db.clone(), &state.config.media)
        .store_observation_images(current_user.0.user_id, observation_id, uploads)
        .await?;

    Ok(Json(report))
}

async fn read_image_fields(multipart: &mut Multipart) -> AppResult<Vec<ImageUpload>> {
    let mut uploads = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::error!(error = %e, "unable to read multipart field");
        AppError::field(IMAGE_FIELD, "Malformed multipart body")
    })? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.map_err(|e| {
            tracing::error!(error = %e, "unable to read image bytes");
            AppError::field(IMAGE_FIELD, "Could not read uploaded image")
        })?;

        uploads.push(ImageUpload {
            filename,
            content_type,
            data: data.to_vec(),
        });
    }

    Ok(uploads)
}
