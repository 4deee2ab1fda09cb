//! Manual surveillance records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::catalog::{CatalogKind, CatalogService};
use crate::services::farm::FarmService;
use shared::types::{PaginatedResponse, Pagination};

#[derive(Clone)]
pub struct RecordService {
    db: PgPool,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SurveillanceRecord {
    pub id: Uuid,
    pub farm_id: Uuid,
    pub performed_by: Option<Uuid>,
    pub date_performed: DateTime<Utc>,
    pub plants_surveyed: i32,
    pub notes: Option<String>,
    pub parts_checked: Vec<String>,
    pub pests_found: Vec<String>,
    pub diseases_found: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl SurveillanceRecord {
    pub fn found_anything(&self) -> bool {
        !self.pests_found.is_empty() || !self.diseases_found.is_empty()
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateRecordInput {
    pub date_performed: Option<DateTime<Utc>>,
    pub plants_surveyed: i32,
    #[serde(default)]
    pub plant_parts_checked: Vec<Uuid>,
    #[serde(default)]
    pub pests_found: Vec<Uuid>,
    #[serde(default)]
    pub diseases_found: Vec<Uuid>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RecordCreated {
    pub record: SurveillanceRecord,
    pub message: String,
}

const RECORD_SELECT: &str = r#"
    SELECT r.id, r.farm_id, r.performed_by, r.date_performed, r.plants_surveyed, r.notes,
           COALESCE((SELECT ARRAY_AGG(pp.name ORDER BY pp.name) FROM record_parts x
                     JOIN plant_parts pp ON pp.id = x.plant_part_id
                     WHERE x.record_id = r.id), '{}') AS parts_checked,
           COALESCE((SELECT ARRAY_AGG(p.name ORDER BY p.name) FROM record_pests x
                     JOIN pests p ON p.id = x.pest_id
                     WHERE x.record_id = r.id), '{}') AS pests_found,
           COALESCE((SELECT ARRAY_AGG(d.name ORDER BY d.name) FROM record_diseases x
                     JOIN diseases d ON d.id = x.disease_id
                     WHERE x.record_id = r.id), '{}') AS diseases_found,
           r.created_at
    FROM surveillance_records r
"#;

impl RecordService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn create_record(
        &self,
        grower_id: Uuid,
        farm_id: Uuid,
        input: CreateRecordInput,
    ) -> AppResult<RecordCreated> {
        let farm = FarmService::new(self.db.clone())
            .get_farm(grower_id, farm_id)
            .await?;

        shared::validate_plants_surveyed(input.plants_surveyed, farm.total_plants())
            .map_err(|m| AppError::field("plants_surveyed", m))?;

        let catalog = CatalogService::new(self.db.clone());
        catalog
            .ensure_exist(CatalogKind::PlantPart, &input.plant_parts_checked)
            .await?;
        catalog.ensure_exist(CatalogKind::Pest, &input.pests_found).await?;
        catalog
            .ensure_exist(CatalogKind::Disease, &input.diseases_found)
            .await?;

        let mut tx = self.db.begin().await?;

        let record_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO surveillance_records (farm_id, performed_by, date_performed, plants_surveyed, notes)
            VALUES ($1, $2, COALESCE($3, NOW()), $4, $5)
            RETURNING id
            "#,
        )
        .bind(farm.id)
        .bind(grower_id)
        .bind(input.date_performed)
        .bind(input.plants_surveyed)
        .bind(input.notes.as_deref().map(str::trim).filter(|n| !n.is_empty()))
        .fetch_one(&mut *tx)
        .await?;

        for (table, column, ids) in [
            ("record_parts", "plant_part_id", &input.plant_parts_checked),
            ("record_pests", "pest_id", &input.pests_found),
            ("record_diseases", "disease_id", &input.diseases_found),
        ] {
            if ids.is_empty() {
                continue;
            }
            sqlx::query(&format!(
                "INSERT INTO {} (record_id, {}) SELECT $1, UNNEST($2::UUID[]) ON CONFLICT DO NOTHING",
                table, column
            ))
            .bind(record_id)
            .bind(ids.as_slice())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        let record = sqlx::query_as::<_, SurveillanceRecord>(&format!(
            "{} WHERE r.id = $1",
            RECORD_SELECT
        ))
        .bind(record_id)
        .fetch_one(&self.db)
        .await?;

        let message = if record.found_anything() {
            "Surveillance record saved. Pests or diseases were found; review the farm's recommendations."
        } else {
            "Surveillance record saved. No pests or diseases were found."
        };

        tracing::info!(%record_id, farm_id = %farm.id, "Recorded surveillance");

        Ok(RecordCreated {
            record,
            message: message.to_string(),
        })
    }

    /// Records for a farm, newest first
    pub async fn list_records(
        &self,
        grower_id: Uuid,
        farm_id: Uuid,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<SurveillanceRecord>> {
        FarmService::new(self.db.clone())
            .get_farm(grower_id, farm_id)
            .await?;

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM surveillance_records WHERE farm_id = $1",
        )
        .bind(farm_id)
        .fetch_one(&self.db)
        .await?;

        let records = sqlx::query_as::<_, SurveillanceRecord>(&format!(
            "{} WHERE r.farm_id = $1 ORDER BY r.date_performed DESC LIMIT $2 OFFSET $3",
            RECORD_SELECT
        ))
        .bind(farm_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok(PaginatedResponse::new(records, &pagination, total.max(0) as u64))
    }
}
