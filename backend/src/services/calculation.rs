//! Surveillance effort calculator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::RawParam;
use crate::services::farm::{Farm, FarmService};
use crate::services::season::SeasonService;
use shared::{calculate_sample_size, ConfidenceLevel, SampleSizeResult, SeasonalStageInfo};

#[derive(Clone)]
pub struct CalculationService {
    db: PgPool,
}

/// A saved calculation
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SurveillanceCalculation {
    pub id: Uuid,
    pub farm_id: Uuid,
    pub created_by: Option<Uuid>,
    /// Stage name the prevalence came from
    pub season: String,
    pub confidence_level: i32,
    pub population_size: i64,
    pub prevalence_percent: f64,
    pub margin_of_error: f64,
    pub required_plants: i64,
    pub percentage_of_total: f64,
    pub survey_frequency: Option<i64>,
    pub is_current: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CalculationInput {
    pub farm_id: Uuid,
    pub confidence_level: Option<u8>,
    pub month: Option<RawParam>,
    pub notes: Option<String>,
}

/// Result of running the calculator for a farm
#[derive(Debug, Serialize)]
pub struct CalculationOutcome {
    pub farm_id: Uuid,
    pub farm_name: String,
    #[serde(flatten)]
    pub result: SampleSizeResult,
    pub stage: SeasonalStageInfo,
    pub month_used: u32,
    /// Set when the calculation was saved
    pub calculation_id: Option<Uuid>,
}

/// Run the calculation for a farm with a resolved stage
pub fn compute(
    farm: &Farm,
    confidence: ConfidenceLevel,
    stage: &SeasonalStageInfo,
) -> AppResult<SampleSizeResult> {
    Ok(calculate_sample_size(
        farm.total_plants(),
        confidence,
        stage.prevalence_p,
    )?)
}

impl CalculationService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Compute without saving
    pub async fn preview(
        &self,
        grower_id: Uuid,
        input: &CalculationInput,
    ) -> AppResult<CalculationOutcome> {
        let (farm, stage, result) = self.prepare(grower_id, input).await?;

        Ok(CalculationOutcome {
            farm_id: farm.id,
            farm_name: farm.name,
            month_used: stage.month_used,
            result,
            stage,
            calculation_id: None,
        })
    }

    /// Compute and store as the farm's current calculation
    pub async fn calculate_and_save(
        &self,
        grower_id: Uuid,
        input: CalculationInput,
    ) -> AppResult<CalculationOutcome> {
        let (farm, stage, result) = self.prepare(grower_id, &input).await?;

        let mut tx = self.db.begin().await?;

        // Serializes saves for one farm so only one row stays current
        sqlx::query("SELECT id FROM farms WHERE id = $1 FOR UPDATE")
            .bind(farm.id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE surveillance_calculations SET is_current = FALSE WHERE farm_id = $1 AND is_current",
        )
        .bind(farm.id)
        .execute(&mut *tx)
        .await?;

        let calculation_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO surveillance_calculations (
                farm_id, created_by, season, confidence_level, population_size,
                prevalence_percent, margin_of_error, required_plants,
                percentage_of_total, survey_frequency, is_current, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, TRUE, $11)
            RETURNING id
            "#,
        )
        .bind(farm.id)
        .bind(grower_id)
        .bind(&stage.stage_name)
        .bind(result.confidence_level_percent as i32)
        .bind(result.population_size)
        .bind(result.prevalence_percent())
        .bind(result.margin_of_error_percent())
        .bind(result.required_plants_to_survey)
        .bind(result.percentage_of_total)
        .bind(result.survey_frequency)
        .bind(input.notes.as_deref().map(str::trim).filter(|n| !n.is_empty()))
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::conflict_on_unique(
                e,
                "calculation",
                "Another calculation for this farm was saved at the same time",
            )
        })?;

        tx.commit().await?;

        tracing::info!(
            %calculation_id,
            farm_id = %farm.id,
            required = result.required_plants_to_survey,
            "Saved surveillance calculation"
        );

        Ok(CalculationOutcome {
            farm_id: farm.id,
            farm_name: farm.name,
            month_used: stage.month_used,
            result,
            stage,
            calculation_id: Some(calculation_id),
        })
    }

    /// Calculation history for a farm, newest first
    pub async fn history(
        &self,
        grower_id: Uuid,
        farm_id: Uuid,
    ) -> AppResult<Vec<SurveillanceCalculation>> {
        FarmService::new(self.db.clone())
            .get_farm(grower_id, farm_id)
            .await?;

        let calculations = sqlx::query_as::<_, SurveillanceCalculation>(
            r#"
            SELECT id, farm_id, created_by, season, confidence_level, population_size,
                   prevalence_percent, margin_of_error, required_plants, percentage_of_total,
                   survey_frequency, is_current, notes, created_at
            FROM surveillance_calculations
            WHERE farm_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(farm_id)
        .fetch_all(&self.db)
        .await?;

        Ok(calculations)
    }

    pub async fn current_for_farm(
        &self,
        farm_id: Uuid,
    ) -> AppResult<Option<SurveillanceCalculation>> {
        let calculation = sqlx::query_as::<_, SurveillanceCalculation>(
            r#"
            SELECT id, farm_id, created_by, season, confidence_level, population_size,
                   prevalence_percent, margin_of_error, required_plants, percentage_of_total,
                   survey_frequency, is_current, notes, created_at
            FROM surveillance_calculations
            WHERE farm_id = $1 AND is_current
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(farm_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(calculation)
    }

    async fn prepare(
        &self,
        grower_id: Uuid,
        input: &CalculationInput,
    ) -> AppResult<(Farm, SeasonalStageInfo, SampleSizeResult)> {
        let confidence = match input.confidence_level {
            Some(level) => ConfidenceLevel::new(level)?,
            None => ConfidenceLevel::default(),
        };

        let farm = FarmService::new(self.db.clone())
            .get_farm(grower_id, input.farm_id)
            .await?;

        let month = input.month.as_ref().map(RawParam::to_string);
        let stage = SeasonService::new(self.db.clone())
            .resolve_stage(month.as_deref())
            .await?;

        let result = compute(&farm, confidence, &stage)?;

        Ok((farm, stage, result))
    }
}
