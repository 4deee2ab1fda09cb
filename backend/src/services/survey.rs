//! Survey sessions and field observations

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::RawParam;
use crate::services::calculation::CalculationService;
use crate::services::catalog::{CatalogItem, CatalogKind, CatalogService};
use crate::services::farm::FarmService;
use crate::services::media::ObservationImage;
use crate::services::season::SeasonService;
use shared::{
    duration_minutes, next_sequence_number, parse_sequence_number, progress_percent,
    GpsCoordinates, MapPoint, ObservationStatus, SeasonalStageInfo, SessionStatus, SessionSummary,
};

#[derive(Clone)]
pub struct SurveyService {
    db: PgPool,
}

const SESSION_COLUMNS: &str = r#"
    s.id, s.farm_id, s.surveyor_id, s.status, s.start_time, s.end_time,
    s.target_plants_surveyed, s.notes, s.created_at, s.updated_at
"#;

const OBSERVATION_SELECT: &str = r#"
    SELECT o.id, o.session_id, o.status, o.observation_time, o.latitude, o.longitude,
           o.gps_accuracy, o.plant_sequence_number, o.notes,
           COALESCE((SELECT ARRAY_AGG(x.pest_id ORDER BY p.name) FROM observation_pests x
                     JOIN pests p ON p.id = x.pest_id
                     WHERE x.observation_id = o.id), '{}') AS pest_ids,
           COALESCE((SELECT ARRAY_AGG(p.name ORDER BY p.name) FROM observation_pests x
                     JOIN pests p ON p.id = x.pest_id
                     WHERE x.observation_id = o.id), '{}') AS pest_names,
           COALESCE((SELECT ARRAY_AGG(x.disease_id ORDER BY d.name) FROM observation_diseases x
                     JOIN diseases d ON d.id = x.disease_id
                     WHERE x.observation_id = o.id), '{}') AS disease_ids,
           COALESCE((SELECT ARRAY_AGG(d.name ORDER BY d.name) FROM observation_diseases x
                     JOIN diseases d ON d.id = x.disease_id
                     WHERE x.observation_id = o.id), '{}') AS disease_names,
           (SELECT COUNT(*) FROM observation_images i WHERE i.observation_id = o.id) AS image_count
    FROM observations o
"#;

/// Overwrites every editable field of a draft; a cleared plant number is stored as NULL
const UPDATE_DRAFT: &str = r#"
    UPDATE observations
    SET observation_time = NOW(), latitude = $3, longitude = $4, gps_accuracy = $5,
        notes = $6, plant_sequence_number = $7, updated_at = NOW()
    WHERE id = $1 AND session_id = $2 AND status = 'draft'
    RETURNING id
"#;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SurveySession {
    pub id: Uuid,
    pub farm_id: Uuid,
    pub surveyor_id: Uuid,
    pub status: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub target_plants_surveyed: Option<i32>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SurveySession {
    pub fn status(&self) -> AppResult<SessionStatus> {
        self.status.parse().map_err(AppError::Internal)
    }
}

/// Session row with its farm name and completed observation count
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SessionListItem {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub session: SurveySession,
    pub farm_name: String,
    pub observation_count: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Observation {
    pub id: Uuid,
    pub session_id: Uuid,
    pub status: String,
    pub observation_time: DateTime<Utc>,
    pub latitude: Option<Decimal>,
    pub longitude: Option<Decimal>,
    pub gps_accuracy: Option<Decimal>,
    pub plant_sequence_number: Option<i32>,
    pub notes: Option<String>,
    pub pest_ids: Vec<Uuid>,
    pub pest_names: Vec<String>,
    pub disease_ids: Vec<Uuid>,
    pub disease_names: Vec<String>,
    pub image_count: i64,
}

impl Observation {
    pub fn coordinates(&self) -> Option<GpsCoordinates> {
        GpsCoordinates::from_parts(self.latitude, self.longitude)
    }

    fn map_point(&self) -> Option<MapPoint> {
        self.coordinates().map(|coords| MapPoint {
            observation_id: self.id,
            lat: coords.latitude,
            lon: coords.longitude,
            time: self.observation_time,
            pests: self.pest_names.clone(),
            diseases: self.disease_names.clone(),
            has_image: self.image_count > 0,
        })
    }
}

/// Draft auto-save and observation submit body
#[derive(Debug, Deserialize)]
pub struct ObservationInput {
    pub session_id: Uuid,
    /// Draft to update or finalize
    #[serde(alias = "observation_id")]
    pub draft_id: Option<Uuid>,
    pub latitude: Option<Decimal>,
    pub longitude: Option<Decimal>,
    pub gps_accuracy: Option<Decimal>,
    #[serde(default)]
    pub pests_observed: Vec<Uuid>,
    #[serde(default)]
    pub diseases_observed: Vec<Uuid>,
    pub notes: Option<String>,
    pub plant_sequence_number: Option<RawParam>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StartSessionInput {
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ActiveSessionView {
    pub session: SurveySession,
    pub farm_name: String,
    pub observations: Vec<Observation>,
    pub draft: Option<Observation>,
    pub completed_count: i64,
    pub progress_percent: i32,
    pub unique_pests_count: i64,
    pub unique_diseases_count: i64,
    pub stage: SeasonalStageInfo,
    pub recommended_parts: Vec<CatalogItem>,
    pub priority_pests: Vec<CatalogItem>,
    pub priority_diseases: Vec<CatalogItem>,
}

#[derive(Debug, Serialize)]
pub struct DraftSaved {
    pub observation_id: Uuid,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ObservationSaved {
    pub observation_id: Uuid,
    pub plant_number: i32,
    pub progress_percent: i32,
    pub observation_count: i64,
}

#[derive(Debug, Serialize)]
pub struct SessionFinished {
    pub session: SurveySession,
    #[serde(flatten)]
    pub summary: SessionSummary,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ObservationDetail {
    #[serde(flatten)]
    pub observation: Observation,
    pub images: Vec<ObservationImage>,
}

#[derive(Debug, Serialize)]
pub struct SessionDetail {
    pub session: SurveySession,
    pub farm_name: String,
    pub observations: Vec<ObservationDetail>,
    pub completed_count: i64,
    pub map_points: Vec<MapPoint>,
    pub unique_pests: Vec<String>,
    pub unique_diseases: Vec<String>,
    pub duration_minutes: Option<i64>,
    pub boundary: Option<serde_json::Value>,
}

/// One CSV line per completed observation
#[derive(Debug, Serialize)]
struct ObservationCsvRow {
    plant_number: Option<i32>,
    observation_time: String,
    latitude: Option<Decimal>,
    longitude: Option<Decimal>,
    gps_accuracy: Option<Decimal>,
    pests: String,
    diseases: String,
    images: i64,
    notes: String,
}

impl From<&Observation> for ObservationCsvRow {
    fn from(o: &Observation) -> Self {
        Self {
            plant_number: o.plant_sequence_number,
            observation_time: o.observation_time.to_rfc3339(),
            latitude: o.latitude,
            longitude: o.longitude,
            gps_accuracy: o.gps_accuracy,
            pests: o.pest_names.join("; "),
            diseases: o.disease_names.join("; "),
            images: o.image_count,
            notes: o.notes.clone().unwrap_or_default(),
        }
    }
}

/// Observation fields after validation
struct ObservationFields {
    coordinates: Option<GpsCoordinates>,
    gps_accuracy: Option<Decimal>,
    notes: Option<String>,
    sequence_number: Option<i32>,
}

impl ObservationInput {
    fn fields(&self) -> AppResult<ObservationFields> {
        let coordinates = GpsCoordinates::from_parts(self.latitude, self.longitude);
        if let Some(coords) = &coordinates {
            coords.validate().map_err(|m| AppError::field("latitude", m))?;
        }
        if let Some(accuracy) = self.gps_accuracy {
            shared::validate_gps_accuracy(accuracy)
                .map_err(|m| AppError::field("gps_accuracy", m))?;
        }

        let raw_sequence = self.plant_sequence_number.as_ref().map(RawParam::to_string);
        let sequence_number = parse_sequence_number(raw_sequence.as_deref());
        if sequence_number.is_none() {
            if let Some(raw) = raw_sequence.filter(|r| !r.trim().is_empty()) {
                tracing::warn!(session_id = %self.session_id, raw = %raw, "Ignoring invalid plant sequence number");
            }
        }

        Ok(ObservationFields {
            coordinates,
            gps_accuracy: self.gps_accuracy,
            notes: self
                .notes
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string),
            sequence_number,
        })
    }
}

impl SurveyService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Start an in-progress session targeting the farm's current sample size
    pub async fn start_session(
        &self,
        user_id: Uuid,
        grower_id: Uuid,
        farm_id: Uuid,
        input: StartSessionInput,
    ) -> AppResult<SurveySession> {
        let farm = FarmService::new(self.db.clone())
            .get_farm(grower_id, farm_id)
            .await?;

        let target = CalculationService::new(self.db.clone())
            .current_for_farm(farm.id)
            .await?
            .and_then(|c| i32::try_from(c.required_plants).ok());

        let session = sqlx::query_as::<_, SurveySession>(&format!(
            r#"
            INSERT INTO survey_sessions AS s (farm_id, surveyor_id, status, target_plants_surveyed, notes)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            SESSION_COLUMNS
        ))
        .bind(farm.id)
        .bind(user_id)
        .bind(SessionStatus::InProgress.as_str())
        .bind(target)
        .bind(input.notes.as_deref().map(str::trim).filter(|n| !n.is_empty()))
        .fetch_one(&self.db)
        .await?;

        tracing::info!(session_id = %session.id, farm_id = %farm.id, ?target, "Started survey session");

        Ok(session)
    }

    /// Sessions for a farm, newest first
    pub async fn list_sessions(
        &self,
        grower_id: Uuid,
        farm_id: Uuid,
    ) -> AppResult<Vec<SessionListItem>> {
        FarmService::new(self.db.clone())
            .get_farm(grower_id, farm_id)
            .await?;

        self.session_items("s.farm_id = $1", farm_id, None, None).await
    }

    pub async fn recent_completed_sessions(
        &self,
        farm_id: Uuid,
        limit: i64,
    ) -> AppResult<Vec<SessionListItem>> {
        self.session_items(
            "s.farm_id = $1",
            farm_id,
            Some(SessionStatus::Completed),
            Some(limit),
        )
        .await
    }

    /// Most recent session still open on the farm, if any
    pub async fn latest_unfinished_session(
        &self,
        farm_id: Uuid,
    ) -> AppResult<Option<SurveySession>> {
        let session = sqlx::query_as::<_, SurveySession>(&format!(
            r#"
            SELECT {}
            FROM survey_sessions s
            WHERE s.farm_id = $1 AND s.status IN ('not_started', 'in_progress')
            ORDER BY s.start_time DESC
            LIMIT 1
            "#,
            SESSION_COLUMNS
        ))
        .bind(farm_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(session)
    }

    /// Sessions surveyed by a user across all farms, newest first
    pub async fn sessions_for_user(
        &self,
        user_id: Uuid,
        status: Option<SessionStatus>,
        limit: Option<i64>,
    ) -> AppResult<Vec<SessionListItem>> {
        self.session_items("s.surveyor_id = $1", user_id, status, limit)
            .await
    }

    async fn session_items(
        &self,
        filter: &str,
        id: Uuid,
        status: Option<SessionStatus>,
        limit: Option<i64>,
    ) -> AppResult<Vec<SessionListItem>> {
        let items = sqlx::query_as::<_, SessionListItem>(&format!(
            r#"
            SELECT {}, f.name AS farm_name,
                   (SELECT COUNT(*) FROM observations o
                    WHERE o.session_id = s.id AND o.status = 'completed') AS observation_count
            FROM survey_sessions s
            JOIN farms f ON f.id = s.farm_id
            WHERE {} AND ($2::TEXT IS NULL OR s.status = $2)
            ORDER BY s.start_time DESC
            LIMIT $3
            "#,
            SESSION_COLUMNS, filter
        ))
        .bind(id)
        .bind(status.map(|s| s.as_str()))
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        Ok(items)
    }

    /// Session owned by the user, or 404
    pub async fn get_session(&self, user_id: Uuid, session_id: Uuid) -> AppResult<SurveySession> {
        find_session(&mut *self.db.acquire().await?, user_id, session_id, false).await
    }

    /// Progress view for an active session
    pub async fn active_session_view(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> AppResult<ActiveSessionView> {
        let session = self.get_session(user_id, session_id).await?;
        ensure_active(&session)?;

        let observations = self
            .observations(session.id, ObservationStatus::Completed, "o.observation_time DESC")
            .await?;
        let draft = self
            .observations(session.id, ObservationStatus::Draft, "o.updated_at DESC")
            .await?
            .into_iter()
            .next();

        let completed_count = observations.len() as i64;
        let (unique_pests_count, unique_diseases_count) =
            unique_counts(&mut *self.db.acquire().await?, session.id).await?;
        let farm_name = self.farm_name(session.farm_id).await?;

        let stage = SeasonService::new(self.db.clone())
            .resolve_stage(None)
            .await?;
        let catalog = CatalogService::new(self.db.clone());
        let recommended_parts = catalog
            .find_by_names(CatalogKind::PlantPart, &stage.part_names)
            .await?;
        let priority_pests = catalog.find_by_names(CatalogKind::Pest, &stage.pest_names).await?;
        let priority_diseases = catalog
            .find_by_names(CatalogKind::Disease, &stage.disease_names)
            .await?;

        Ok(ActiveSessionView {
            progress_percent: progress_percent(completed_count, session.target_plants_surveyed),
            session,
            farm_name,
            observations,
            draft,
            completed_count,
            unique_pests_count,
            unique_diseases_count,
            stage,
            recommended_parts,
            priority_pests,
            priority_diseases,
        })
    }

    /// Save the in-progress observation; updates the given draft or starts a new one
    pub async fn autosave_draft(&self, user_id: Uuid, input: ObservationInput) -> AppResult<DraftSaved> {
        let fields = input.fields()?;
        let mut tx = self.db.begin().await?;

        let session = find_session(&mut *tx, user_id, input.session_id, true).await?;
        let status = ensure_active(&session)?;

        let existing = match input.draft_id {
            Some(draft_id) => {
                sqlx::query_scalar::<_, Uuid>(UPDATE_DRAFT)
                .bind(draft_id)
                .bind(session.id)
                .bind(fields.coordinates.as_ref().map(|c| c.latitude))
                .bind(fields.coordinates.as_ref().map(|c| c.longitude))
                .bind(fields.gps_accuracy)
                .bind(&fields.notes)
                .bind(fields.sequence_number)
                .fetch_optional(&mut *tx)
                .await?
            }
            None => None,
        };

        let observation_id = match existing {
            Some(id) => id,
            None => {
                insert_observation(&mut *tx, session.id, ObservationStatus::Draft, &fields, fields.sequence_number)
                    .await?
            }
        };

        replace_links(&mut *tx, observation_id, &input.pests_observed, &input.diseases_observed).await?;
        advance_status(&mut *tx, session.id, status).await?;

        tx.commit().await?;

        tracing::debug!(%observation_id, session_id = %session.id, "Auto-saved draft observation");

        Ok(DraftSaved {
            observation_id,
            saved_at: Utc::now(),
        })
    }

    /// Finalize a draft, or record a new completed observation
    pub async fn create_observation(
        &self,
        user_id: Uuid,
        input: ObservationInput,
    ) -> AppResult<ObservationSaved> {
        let fields = input.fields()?;
        let mut tx = self.db.begin().await?;

        let session = find_session(&mut *tx, user_id, input.session_id, true).await?;
        let status = ensure_active(&session)?;

        let plant_number = match fields.sequence_number {
            Some(n) => n,
            None => {
                let current_max = sqlx::query_scalar::<_, Option<i32>>(
                    "SELECT MAX(plant_sequence_number) FROM observations WHERE session_id = $1 AND status = 'completed'",
                )
                .bind(session.id)
                .fetch_one(&mut *tx)
                .await?;
                next_sequence_number(current_max)
            }
        };

        let observation_id = match input.draft_id {
            Some(draft_id) => sqlx::query_scalar::<_, Uuid>(
                r#"
                UPDATE observations
                SET status = 'completed', observation_time = NOW(), latitude = $3, longitude = $4,
                    gps_accuracy = $5, notes = $6, plant_sequence_number = $7, updated_at = NOW()
                WHERE id = $1 AND session_id = $2 AND status = 'draft'
                RETURNING id
                "#,
            )
            .bind(draft_id)
            .bind(session.id)
            .bind(fields.coordinates.as_ref().map(|c| c.latitude))
            .bind(fields.coordinates.as_ref().map(|c| c.longitude))
            .bind(fields.gps_accuracy)
            .bind(&fields.notes)
            .bind(plant_number)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Draft observation".to_string()))?,
            None => {
                insert_observation(&mut *tx, session.id, ObservationStatus::Completed, &fields, Some(plant_number))
                    .await?
            }
        };

        replace_links(&mut *tx, observation_id, &input.pests_observed, &input.diseases_observed).await?;
        advance_status(&mut *tx, session.id, status).await?;

        let observation_count = completed_count(&mut *tx, session.id).await?;

        tx.commit().await?;

        tracing::info!(
            %observation_id,
            session_id = %session.id,
            plant_number,
            "Recorded observation"
        );

        Ok(ObservationSaved {
            observation_id,
            plant_number,
            progress_percent: progress_percent(observation_count, session.target_plants_surveyed),
            observation_count,
        })
    }

    /// Complete an active session that has at least one observation
    pub async fn finish_session(&self, user_id: Uuid, session_id: Uuid) -> AppResult<SessionFinished> {
        let mut tx = self.db.begin().await?;

        let session = find_session(&mut *tx, user_id, session_id, true).await?;
        session
            .status()?
            .transition_to(SessionStatus::Completed)
            .map_err(AppError::InvalidStateTransition)?;

        let completed = completed_count(&mut *tx, session.id).await?;
        if completed == 0 {
            return Err(AppError::InvalidStateTransition(
                "Cannot complete session with no observations.".to_string(),
            ));
        }

        let drafts = sqlx::query("DELETE FROM observations WHERE session_id = $1 AND status = 'draft'")
            .bind(session.id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let session = set_terminal_status(&mut *tx, session.id, SessionStatus::Completed).await?;
        let (unique_pests_count, unique_diseases_count) = unique_counts(&mut *tx, session.id).await?;

        let farm_name = sqlx::query_scalar::<_, String>("SELECT name FROM farms WHERE id = $1")
            .bind(session.farm_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        let summary = SessionSummary {
            farm_name,
            completed_observations: completed,
            target_plants: session.target_plants_surveyed,
            unique_pests_count,
            unique_diseases_count,
            duration_minutes: duration_minutes(session.start_time, session.end_time),
        };

        tracing::info!(
            session_id = %session.id,
            completed,
            drafts_removed = drafts,
            "Finished survey session"
        );

        Ok(SessionFinished {
            message: summary.describe(),
            summary,
            session,
        })
    }

    pub async fn abandon_session(&self, user_id: Uuid, session_id: Uuid) -> AppResult<SurveySession> {
        let mut tx = self.db.begin().await?;

        let session = find_session(&mut *tx, user_id, session_id, true).await?;
        session
            .status()?
            .transition_to(SessionStatus::Abandoned)
            .map_err(AppError::InvalidStateTransition)?;

        let session = set_terminal_status(&mut *tx, session.id, SessionStatus::Abandoned).await?;
        tx.commit().await?;

        tracing::info!(session_id = %session.id, "Abandoned survey session");

        Ok(session)
    }

    /// Delete an unfinished session with its observations
    pub async fn delete_session(&self, user_id: Uuid, session_id: Uuid) -> AppResult<()> {
        let session = self.get_session(user_id, session_id).await?;
        let status = session.status()?;
        if !status.can_delete() {
            return Err(AppError::InvalidStateTransition(format!(
                "Cannot delete a {} session.",
                status
            )));
        }

        sqlx::query("DELETE FROM survey_sessions WHERE id = $1")
            .bind(session.id)
            .execute(&self.db)
            .await?;

        tracing::info!(session_id = %session.id, "Deleted survey session");

        Ok(())
    }

    /// Full session view with observations, images and map points
    pub async fn session_detail(&self, user_id: Uuid, session_id: Uuid) -> AppResult<SessionDetail> {
        let session = self.get_session(user_id, session_id).await?;

        let observations = self
            .observations(session.id, ObservationStatus::Completed, "o.observation_time ASC")
            .await?;

        let images = sqlx::query_as::<_, ObservationImage>(
            r#"
            SELECT i.id, i.observation_id, i.file_path, i.content_type, i.size_bytes, i.uploaded_at
            FROM observation_images i
            JOIN observations o ON o.id = i.observation_id
            WHERE o.session_id = $1
            ORDER BY i.uploaded_at
            "#,
        )
        .bind(session.id)
        .fetch_all(&self.db)
        .await?;

        let mut images_by_observation: HashMap<Uuid, Vec<ObservationImage>> = HashMap::new();
        for image in images {
            images_by_observation
                .entry(image.observation_id)
                .or_default()
                .push(image);
        }

        let map_points: Vec<MapPoint> = observations.iter().filter_map(Observation::map_point).collect();
        let unique_pests = unique_names(observations.iter().map(|o| &o.pest_names));
        let unique_diseases = unique_names(observations.iter().map(|o| &o.disease_names));

        let (farm_name, boundary) = sqlx::query_as::<_, (String, Option<serde_json::Value>)>(
            "SELECT name, boundary FROM farms WHERE id = $1",
        )
        .bind(session.farm_id)
        .fetch_one(&self.db)
        .await?;

        let observations: Vec<ObservationDetail> = observations
            .into_iter()
            .map(|observation| ObservationDetail {
                images: images_by_observation.remove(&observation.id).unwrap_or_default(),
                observation,
            })
            .collect();

        Ok(SessionDetail {
            completed_count: observations.len() as i64,
            duration_minutes: duration_minutes(session.start_time, session.end_time),
            session,
            farm_name,
            observations,
            map_points,
            unique_pests,
            unique_diseases,
            boundary,
        })
    }

    /// Completed observations of a session as CSV, with a suggested file name
    pub async fn export_observations_csv(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> AppResult<(String, String)> {
        let session = self.get_session(user_id, session_id).await?;
        let observations = self
            .observations(session.id, ObservationStatus::Completed, "o.plant_sequence_number ASC NULLS LAST, o.observation_time ASC")
            .await?;

        let rows: Vec<ObservationCsvRow> = observations.iter().map(ObservationCsvRow::from).collect();
        let csv = to_csv(&rows)?;
        let filename = format!(
            "session-{}-{}.csv",
            session.start_time.format("%Y%m%d"),
            session.id.simple()
        );

        Ok((filename, csv))
    }

    async fn observations(
        &self,
        session_id: Uuid,
        status: ObservationStatus,
        order_by: &str,
    ) -> AppResult<Vec<Observation>> {
        let observations = sqlx::query_as::<_, Observation>(&format!(
            "{} WHERE o.session_id = $1 AND o.status = $2 ORDER BY {}",
            OBSERVATION_SELECT, order_by
        ))
        .bind(session_id)
        .bind(status.as_str())
        .fetch_all(&self.db)
        .await?;

        Ok(observations)
    }

    async fn farm_name(&self, farm_id: Uuid) -> AppResult<String> {
        let name = sqlx::query_scalar::<_, String>("SELECT name FROM farms WHERE id = $1")
            .bind(farm_id)
            .fetch_one(&self.db)
            .await?;
        Ok(name)
    }
}

async fn find_session(
    conn: &mut PgConnection,
    user_id: Uuid,
    session_id: Uuid,
    for_update: bool,
) -> AppResult<SurveySession> {
    sqlx::query_as::<_, SurveySession>(&format!(
        "SELECT {} FROM survey_sessions s WHERE s.id = $1 AND s.surveyor_id = $2{}",
        SESSION_COLUMNS,
        if for_update { " FOR UPDATE" } else { "" }
    ))
    .bind(session_id)
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Survey session".to_string()))
}

fn ensure_active(session: &SurveySession) -> AppResult<SessionStatus> {
    let status = session.status()?;
    if !status.is_active() {
        return Err(AppError::InvalidStateTransition(
            "This survey session is no longer active.".to_string(),
        ));
    }
    Ok(status)
}

async fn insert_observation(
    conn: &mut PgConnection,
    session_id: Uuid,
    status: ObservationStatus,
    fields: &ObservationFields,
    sequence_number: Option<i32>,
) -> AppResult<Uuid> {
    let id = sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO observations (session_id, status, latitude, longitude, gps_accuracy, notes, plant_sequence_number)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id
        "#,
    )
    .bind(session_id)
    .bind(status.as_str())
    .bind(fields.coordinates.as_ref().map(|c| c.latitude))
    .bind(fields.coordinates.as_ref().map(|c| c.longitude))
    .bind(fields.gps_accuracy)
    .bind(&fields.notes)
    .bind(sequence_number)
    .fetch_one(&mut *conn)
    .await?;

    Ok(id)
}

/// Replace an observation's pests and diseases; unknown IDs are dropped
async fn replace_links(
    conn: &mut PgConnection,
    observation_id: Uuid,
    pest_ids: &[Uuid],
    disease_ids: &[Uuid],
) -> AppResult<()> {
    for (link_table, column, catalog_table, ids) in [
        ("observation_pests", "pest_id", "pests", pest_ids),
        ("observation_diseases", "disease_id", "diseases", disease_ids),
    ] {
        sqlx::query(&format!("DELETE FROM {} WHERE observation_id = $1", link_table))
            .bind(observation_id)
            .execute(&mut *conn)
            .await?;

        if ids.is_empty() {
            continue;
        }

        sqlx::query(&format!(
            "INSERT INTO {} (observation_id, {}) SELECT $1, c.id FROM {} c WHERE c.id = ANY($2) ON CONFLICT DO NOTHING",
            link_table, column, catalog_table
        ))
        .bind(observation_id)
        .bind(ids)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Move a not-started session to in-progress once it has an observation
async fn advance_status(
    conn: &mut PgConnection,
    session_id: Uuid,
    status: SessionStatus,
) -> AppResult<()> {
    let next = status.on_observation();
    if next != status {
        sqlx::query("UPDATE survey_sessions SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(session_id)
            .bind(next.as_str())
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

async fn set_terminal_status(
    conn: &mut PgConnection,
    session_id: Uuid,
    status: SessionStatus,
) -> AppResult<SurveySession> {
    let session = sqlx::query_as::<_, SurveySession>(&format!(
        r#"
        UPDATE survey_sessions AS s
        SET status = $2, end_time = NOW(), updated_at = NOW()
        WHERE s.id = $1
        RETURNING {}
        "#,
        SESSION_COLUMNS
    ))
    .bind(session_id)
    .bind(status.as_str())
    .fetch_one(&mut *conn)
    .await?;

    Ok(session)
}

async fn completed_count(conn: &mut PgConnection, session_id: Uuid) -> AppResult<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM observations WHERE session_id = $1 AND status = 'completed'",
    )
    .bind(session_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(count)
}

/// Distinct pests and diseases across a session's completed observations
async fn unique_counts(conn: &mut PgConnection, session_id: Uuid) -> AppResult<(i64, i64)> {
    let counts = sqlx::query_as::<_, (i64, i64)>(
        r#"
        SELECT
            (SELECT COUNT(DISTINCT x.pest_id) FROM observation_pests x
             JOIN observations o ON o.id = x.observation_id
             WHERE o.session_id = $1 AND o.status = 'completed'),
            (SELECT COUNT(DISTINCT x.disease_id) FROM observation_diseases x
             JOIN observations o ON o.id = x.observation_id
             WHERE o.session_id = $1 AND o.status = 'completed')
        "#,
    )
    .bind(session_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(counts)
}

/// Sorted, de-duplicated names
fn unique_names<'a>(lists: impl Iterator<Item = &'a Vec<String>>) -> Vec<String> {
    let mut names: Vec<String> = lists.flatten().cloned().collect();
    names.sort();
    names.dedup();
    names
}

fn to_csv<T: Serialize>(rows: &[T]) -> AppResult<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    for row in rows {
        wtr.serialize(row)
            .map_err(|e| AppError::Internal(format!("CSV serialization error: {}", e)))?;
    }
    let bytes = wtr
        .into_inner()
        .map_err(|e| AppError::Internal(format!("CSV writer error: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| AppError::Internal(format!("UTF-8 conversion error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn observation(pests: &[&str], lat: Option<Decimal>) -> Observation {
        Observation {
            id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            status: "completed".to_string(),
            observation_time: Utc.with_ymd_and_hms(2024, 9, 3, 7, 30, 0).unwrap(),
            latitude: lat,
            longitude: lat.map(|_| Decimal::new(131_044_000, 6)),
            gps_accuracy: None,
            plant_sequence_number: Some(3),
            notes: Some("Leaf spots on lower canopy".to_string()),
            pest_ids: Vec::new(),
            pest_names: pests.iter().map(|p| p.to_string()).collect(),
            disease_ids: Vec::new(),
            disease_names: Vec::new(),
            image_count: 1,
        }
    }

    fn input(sequence: Option<RawParam>) -> ObservationInput {
        ObservationInput {
            session_id: Uuid::new_v4(),
            draft_id: None,
            latitude: None,
            longitude: None,
            gps_accuracy: None,
            pests_observed: Vec::new(),
            diseases_observed: Vec::new(),
            notes: Some("   ".to_string()),
            plant_sequence_number: sequence,
        }
    }

    #[test]
    fn test_map_point_requires_coordinates() {
        assert!(observation(&[], None).map_point().is_none());

        let point = observation(&["Mango Seed Weevil"], Some(Decimal::new(-12_463_000, 6)))
            .map_point()
            .unwrap();
        assert_eq!(point.pests, vec!["Mango Seed Weevil".to_string()]);
        assert!(point.has_image);
    }

    #[test]
    fn test_unique_names_sorted_and_deduplicated() {
        let a = observation(&["Thrips", "Fruit Fly"], None);
        let b = observation(&["Fruit Fly"], None);
        let names = unique_names([&a.pest_names, &b.pest_names].into_iter());
        assert_eq!(names, vec!["Fruit Fly".to_string(), "Thrips".to_string()]);
    }

    #[test]
    fn test_fields_ignore_invalid_sequence_and_blank_notes() {
        let fields = input(Some(RawParam::Text("abc".to_string()))).fields().unwrap();
        assert_eq!(fields.sequence_number, None);
        assert_eq!(fields.notes, None);

        let fields = input(Some(RawParam::Number(12))).fields().unwrap();
        assert_eq!(fields.sequence_number, Some(12));
    }

    #[test]
    fn test_fields_reject_out_of_range_latitude() {
        let mut body = input(None);
        body.latitude = Some(Decimal::from(95));
        body.longitude = Some(Decimal::from(131));
        assert!(body.fields().is_err());
    }

    #[test]
    fn test_fields_reject_oversized_gps_accuracy() {
        let mut body = input(None);
        body.gps_accuracy = Some(Decimal::from(1_000_000));
        match body.fields() {
            Err(AppError::Validation { field, .. }) => assert_eq!(field, "gps_accuracy"),
            other => panic!("expected a gps_accuracy error, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_cleared_plant_number_overwrites_draft() {
        let fields = input(Some(RawParam::Text(String::new()))).fields().unwrap();
        assert_eq!(fields.sequence_number, None);
        assert!(UPDATE_DRAFT.contains("plant_sequence_number = $7,"));
        assert!(!UPDATE_DRAFT.contains("COALESCE"));
    }

    #[test]
    fn test_csv_export_has_header_and_joined_names() {
        let rows = vec![ObservationCsvRow::from(&observation(&["Thrips", "Fruit Fly"], None))];
        let csv = to_csv(&rows).unwrap();
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with("plant_number,observation_time"));
        assert!(lines.next().unwrap().contains("Thrips; Fruit Fly"));
    }
}
