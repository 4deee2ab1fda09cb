//! Farm management service

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::calculation::{CalculationService, SurveillanceCalculation};
use crate::services::catalog::{CatalogItem, CatalogKind, CatalogService};
use crate::services::season::SeasonService;
use crate::services::survey::{SessionListItem, SurveySession, SurveyService};
use shared::{
    calculate_sample_size, is_surveillance_due, next_due_date, total_plants, ConfidenceLevel,
    DistributionPattern, FarmAddress, SampleSizeResult, SeasonalStageInfo, DEFAULT_PLANT_TYPE,
};

#[derive(Clone)]
pub struct FarmService {
    db: PgPool,
}

/// Columns selected for every farm read, joined with region and plant type names
const FARM_SELECT: &str = r#"
    SELECT f.id, f.owner_id, f.name,
           f.region_id, r.name AS region_name, r.state_abbreviation,
           f.plant_type_id, pt.name AS plant_type_name,
           f.size_hectares, f.stocking_rate, f.distribution_pattern,
           f.has_exact_address, f.geoscape_address_id, f.formatted_address,
           f.location_description, f.boundary, f.created_at, f.updated_at
    FROM farms f
    LEFT JOIN regions r ON r.id = f.region_id
    LEFT JOIN plant_types pt ON pt.id = f.plant_type_id
"#;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Farm {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub region_id: Option<Uuid>,
    pub region_name: Option<String>,
    pub state_abbreviation: Option<String>,
    pub plant_type_id: Option<Uuid>,
    pub plant_type_name: Option<String>,
    pub size_hectares: Option<Decimal>,
    pub stocking_rate: Option<i32>,
    pub distribution_pattern: String,
    pub has_exact_address: bool,
    pub geoscape_address_id: Option<String>,
    pub formatted_address: Option<String>,
    pub location_description: Option<String>,
    /// GeoJSON Polygon
    pub boundary: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Farm {
    pub fn total_plants(&self) -> Option<i64> {
        total_plants(self.size_hectares, self.stocking_rate)
    }
}

/// Farm list entry with surveillance status
#[derive(Debug, Serialize)]
pub struct FarmSummary {
    #[serde(flatten)]
    pub farm: Farm,
    pub total_plants: Option<i64>,
    pub last_surveillance_date: Option<DateTime<Utc>>,
    pub next_due_date: NaiveDate,
    pub is_due: bool,
}

/// Create or replace a farm
#[derive(Debug, Deserialize, Validate)]
pub struct FarmInput {
    #[validate(length(min = 1, max = 255, message = "Farm name is required"))]
    pub name: String,
    pub region_id: Option<Uuid>,
    pub plant_type_id: Option<Uuid>,
    pub size_hectares: Option<Decimal>,
    pub stocking_rate: Option<i32>,
    #[serde(default)]
    pub distribution_pattern: DistributionPattern,
    #[serde(flatten)]
    pub address: FarmAddress,
}

/// Sample size shown on the farm page: the saved one, a fallback, or why neither exists
#[derive(Debug, Serialize)]
pub struct FarmCalculationView {
    pub current: Option<SurveillanceCalculation>,
    /// Computed at the default confidence when nothing is saved
    pub fallback: Option<SampleSizeResult>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FarmDetail {
    pub farm: Farm,
    pub total_plants: Option<i64>,
    pub stage: SeasonalStageInfo,
    pub calculation: FarmCalculationView,
    pub priority_pests: Vec<CatalogItem>,
    pub priority_diseases: Vec<CatalogItem>,
    pub recommended_parts: Vec<CatalogItem>,
    pub last_surveillance_date: Option<DateTime<Utc>>,
    pub next_due_date: NaiveDate,
    pub recent_sessions: Vec<SessionListItem>,
    pub unfinished_session: Option<SurveySession>,
}

/// What to inspect on the next visit
#[derive(Debug, Serialize)]
pub struct Recommendations {
    pub farm_id: Uuid,
    pub stage: SeasonalStageInfo,
    pub recommended_parts: Vec<CatalogItem>,
    pub priority_pests: Vec<CatalogItem>,
    pub priority_diseases: Vec<CatalogItem>,
    pub last_surveillance_date: Option<DateTime<Utc>>,
    pub next_due_date: NaiveDate,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct PestCount {
    pub name: String,
    pub occurrences: i64,
}

#[derive(Debug, Serialize)]
pub struct FarmStats {
    pub farm_id: Uuid,
    pub completed_sessions: i64,
    pub completed_observations: i64,
    pub sessions_last_30_days: i64,
    pub top_pests: Vec<PestCount>,
}

#[derive(Debug, Deserialize)]
pub struct BoundaryInput {
    /// `null` clears the boundary
    pub boundary: Option<serde_json::Value>,
}

impl FarmService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Farms of a grower: never-surveyed first, then longest since last visit, then by name
    pub async fn list_farms(&self, grower_id: Uuid) -> AppResult<Vec<FarmSummary>> {
        let farms = sqlx::query_as::<_, Farm>(&format!(
            "{} WHERE f.owner_id = $1 ORDER BY f.name ASC",
            FARM_SELECT
        ))
        .bind(grower_id)
        .fetch_all(&self.db)
        .await?;

        let today = Utc::now().date_naive();
        let mut summaries = Vec::with_capacity(farms.len());
        for farm in farms {
            let last = self.last_surveillance_date(farm.id).await?;
            summaries.push(FarmSummary {
                total_plants: farm.total_plants(),
                last_surveillance_date: last,
                next_due_date: next_due_date(last, today),
                is_due: is_surveillance_due(last, today),
                farm,
            });
        }

        summaries.sort_by(|a, b| {
            a.last_surveillance_date
                .is_some()
                .cmp(&b.last_surveillance_date.is_some())
                .then(a.last_surveillance_date.cmp(&b.last_surveillance_date))
                .then_with(|| a.farm.name.cmp(&b.farm.name))
        });

        Ok(summaries)
    }

    /// Fetch a farm owned by the grower; other growers' farms are reported as missing
    pub async fn get_farm(&self, grower_id: Uuid, farm_id: Uuid) -> AppResult<Farm> {
        sqlx::query_as::<_, Farm>(&format!(
            "{} WHERE f.id = $1 AND f.owner_id = $2",
            FARM_SELECT
        ))
        .bind(farm_id)
        .bind(grower_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Farm".to_string()))
    }

    pub async fn create_farm(&self, grower_id: Uuid, input: FarmInput) -> AppResult<Farm> {
        let (input, address) = self.check_input(input).await?;

        let plant_type_id = match input.plant_type_id {
            Some(id) => id,
            None => CatalogService::new(self.db.clone())
                .plant_type_by_name(DEFAULT_PLANT_TYPE)
                .await?
                .ok_or_else(|| {
                    AppError::field(
                        "plant_type_id",
                        format!("Default '{}' plant type not found.", DEFAULT_PLANT_TYPE),
                    )
                })?,
        };

        let farm_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO farms (owner_id, name, region_id, plant_type_id, size_hectares,
                               stocking_rate, distribution_pattern, has_exact_address,
                               geoscape_address_id, formatted_address, location_description)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id
            "#,
        )
        .bind(grower_id)
        .bind(input.name.trim())
        .bind(input.region_id)
        .bind(plant_type_id)
        .bind(input.size_hectares)
        .bind(input.stocking_rate)
        .bind(input.distribution_pattern.as_str())
        .bind(address.has_exact_address)
        .bind(&address.geoscape_address_id)
        .bind(&address.formatted_address)
        .bind(&address.location_description)
        .fetch_one(&self.db)
        .await?;

        tracing::info!(%farm_id, %grower_id, "Created farm {}", input.name.trim());

        self.get_farm(grower_id, farm_id).await
    }

    /// Replace a farm's details. A changed address ID clears the stored boundary.
    pub async fn update_farm(
        &self,
        grower_id: Uuid,
        farm_id: Uuid,
        input: FarmInput,
    ) -> AppResult<Farm> {
        let existing = self.get_farm(grower_id, farm_id).await?;
        let (input, address) = self.check_input(input).await?;

        let address_changed = existing.geoscape_address_id != address.geoscape_address_id;
        if address_changed && existing.boundary.is_some() {
            tracing::info!(%farm_id, "Address changed, clearing stored boundary");
        }

        sqlx::query(
            r#"
            UPDATE farms SET
                name = $3,
                region_id = $4,
                plant_type_id = COALESCE($5, plant_type_id),
                size_hectares = $6,
                stocking_rate = $7,
                distribution_pattern = $8,
                has_exact_address = $9,
                geoscape_address_id = $10,
                formatted_address = $11,
                location_description = $12,
                boundary = CASE WHEN $13 THEN NULL ELSE boundary END,
                updated_at = NOW()
            WHERE id = $1 AND owner_id = $2
            "#,
        )
        .bind(farm_id)
        .bind(grower_id)
        .bind(input.name.trim())
        .bind(input.region_id)
        .bind(input.plant_type_id)
        .bind(input.size_hectares)
        .bind(input.stocking_rate)
        .bind(input.distribution_pattern.as_str())
        .bind(address.has_exact_address)
        .bind(&address.geoscape_address_id)
        .bind(&address.formatted_address)
        .bind(&address.location_description)
        .bind(address_changed)
        .execute(&self.db)
        .await?;

        self.get_farm(grower_id, farm_id).await
    }

    pub async fn delete_farm(&self, grower_id: Uuid, farm_id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM farms WHERE id = $1 AND owner_id = $2")
            .bind(farm_id)
            .bind(grower_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Farm".to_string()));
        }

        tracing::info!(%farm_id, "Deleted farm");
        Ok(())
    }

    /// Set or clear the boundary directly
    pub async fn set_boundary(
        &self,
        grower_id: Uuid,
        farm_id: Uuid,
        input: BoundaryInput,
    ) -> AppResult<Farm> {
        self.get_farm(grower_id, farm_id).await?;

        if let Some(boundary) = &input.boundary {
            shared::validate_polygon(boundary)
                .map_err(|e| AppError::field("boundary", e.to_string()))?;
        }

        sqlx::query("UPDATE farms SET boundary = $2, updated_at = NOW() WHERE id = $1")
            .bind(farm_id)
            .bind(&input.boundary)
            .execute(&self.db)
            .await?;

        self.get_farm(grower_id, farm_id).await
    }

    pub async fn farm_detail(
        &self,
        grower_id: Uuid,
        farm_id: Uuid,
        month_override: Option<&str>,
    ) -> AppResult<FarmDetail> {
        let farm = self.get_farm(grower_id, farm_id).await?;
        let total = farm.total_plants();

        let stage = SeasonService::new(self.db.clone())
            .resolve_stage(month_override)
            .await?;

        let current = CalculationService::new(self.db.clone())
            .current_for_farm(farm.id)
            .await?;
        let calculation = match current {
            Some(saved) => FarmCalculationView {
                current: Some(saved),
                fallback: None,
                error: None,
            },
            None => match calculate_sample_size(total, ConfidenceLevel::default(), stage.prevalence_p) {
                Ok(result) => FarmCalculationView {
                    current: None,
                    fallback: Some(result),
                    error: None,
                },
                Err(e) => FarmCalculationView {
                    current: None,
                    fallback: None,
                    error: Some(e.to_string()),
                },
            },
        };

        let catalog = CatalogService::new(self.db.clone());
        let priority_pests = catalog.find_by_names(CatalogKind::Pest, &stage.pest_names).await?;
        let priority_diseases = catalog
            .find_by_names(CatalogKind::Disease, &stage.disease_names)
            .await?;
        let recommended_parts = catalog
            .find_by_names(CatalogKind::PlantPart, &stage.part_names)
            .await?;

        let last = self.last_surveillance_date(farm.id).await?;

        let surveys = SurveyService::new(self.db.clone());
        let recent_sessions = surveys.recent_completed_sessions(farm.id, 5).await?;
        let unfinished_session = surveys.latest_unfinished_session(farm.id).await?;

        Ok(FarmDetail {
            total_plants: total,
            stage,
            calculation,
            priority_pests,
            priority_diseases,
            recommended_parts,
            last_surveillance_date: last,
            next_due_date: next_due_date(last, Utc::now().date_naive()),
            recent_sessions,
            unfinished_session,
            farm,
        })
    }

    pub async fn recommendations(
        &self,
        grower_id: Uuid,
        farm_id: Uuid,
        month_override: Option<&str>,
    ) -> AppResult<Recommendations> {
        let farm = self.get_farm(grower_id, farm_id).await?;
        let stage = SeasonService::new(self.db.clone())
            .resolve_stage(month_override)
            .await?;

        let catalog = CatalogService::new(self.db.clone());
        let recommended_parts = catalog
            .find_by_names(CatalogKind::PlantPart, &stage.part_names)
            .await?;
        let priority_pests = catalog.find_by_names(CatalogKind::Pest, &stage.pest_names).await?;
        let priority_diseases = catalog
            .find_by_names(CatalogKind::Disease, &stage.disease_names)
            .await?;

        let last = self.last_surveillance_date(farm.id).await?;

        Ok(Recommendations {
            farm_id: farm.id,
            stage,
            recommended_parts,
            priority_pests,
            priority_diseases,
            last_surveillance_date: last,
            next_due_date: next_due_date(last, Utc::now().date_naive()),
        })
    }

    pub async fn farm_stats(&self, grower_id: Uuid, farm_id: Uuid) -> AppResult<FarmStats> {
        let farm = self.get_farm(grower_id, farm_id).await?;

        let (completed_sessions, sessions_last_30_days) = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE end_time >= NOW() - INTERVAL '30 days')
            FROM survey_sessions
            WHERE farm_id = $1 AND status = 'completed'
            "#,
        )
        .bind(farm.id)
        .fetch_one(&self.db)
        .await?;

        let completed_observations = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM observations o
            JOIN survey_sessions s ON s.id = o.session_id
            WHERE s.farm_id = $1 AND s.status = 'completed' AND o.status = 'completed'
            "#,
        )
        .bind(farm.id)
        .fetch_one(&self.db)
        .await?;

        let top_pests = sqlx::query_as::<_, PestCount>(
            r#"
            SELECT p.name, COUNT(*) AS occurrences
            FROM observation_pests op
            JOIN pests p ON p.id = op.pest_id
            JOIN observations o ON o.id = op.observation_id
            JOIN survey_sessions s ON s.id = o.session_id
            WHERE s.farm_id = $1 AND o.status = 'completed'
            GROUP BY p.name
            ORDER BY occurrences DESC, p.name
            LIMIT 5
            "#,
        )
        .bind(farm.id)
        .fetch_all(&self.db)
        .await?;

        Ok(FarmStats {
            farm_id: farm.id,
            completed_sessions,
            completed_observations,
            sessions_last_30_days,
            top_pests,
        })
    }

    /// Most recent of the last completed session and the last manual record
    pub async fn last_surveillance_date(&self, farm_id: Uuid) -> AppResult<Option<DateTime<Utc>>> {
        let last = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            r#"
            SELECT GREATEST(
                (SELECT MAX(COALESCE(end_time, start_time)) FROM survey_sessions
                 WHERE farm_id = $1 AND status = 'completed'),
                (SELECT MAX(date_performed) FROM surveillance_records WHERE farm_id = $1)
            )
            "#,
        )
        .bind(farm_id)
        .fetch_one(&self.db)
        .await?;

        Ok(last)
    }

    /// Validate farm input and apply the address rule
    async fn check_input(&self, input: FarmInput) -> AppResult<(FarmInput, FarmAddress)> {
        input.validate()?;

        if let Some(size) = input.size_hectares {
            shared::validate_size_hectares(size)
                .map_err(|m| AppError::field("size_hectares", m))?;
        }
        if let Some(rate) = input.stocking_rate {
            shared::validate_stocking_rate(rate)
                .map_err(|m| AppError::field("stocking_rate", m))?;
        }

        let catalog = CatalogService::new(self.db.clone());
        if let Some(region_id) = input.region_id {
            if !catalog.region_exists(region_id).await? {
                return Err(AppError::field("region_id", "Selected region does not exist"));
            }
        }
        if let Some(plant_type_id) = input.plant_type_id {
            catalog
                .ensure_exist(CatalogKind::PlantType, &[plant_type_id])
                .await?;
        }

        let address = input
            .address
            .clone()
            .normalize()
            .map_err(|m| AppError::field("has_exact_address", m))?;

        Ok((input, address))
    }
}
