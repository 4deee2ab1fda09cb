//! Seasonal stage lookup and maintenance

use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppResult;
use shared::{
    default_stage_definitions, default_stage_for_month, parse_months, resolve_month,
    stage_timeline, SeasonalStageInfo, StageDefinition, StageTimelineEntry,
};

#[derive(Clone)]
pub struct SeasonService {
    db: PgPool,
}

/// Stored seasonal stage with its linked names
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SeasonalStage {
    pub id: Uuid,
    pub name: String,
    pub months: String,
    pub prevalence_p: f64,
    pub pest_names: Vec<String>,
    pub disease_names: Vec<String>,
    pub part_names: Vec<String>,
}

impl SeasonalStage {
    fn info(&self, month: u32) -> SeasonalStageInfo {
        SeasonalStageInfo {
            stage_name: self.name.clone(),
            prevalence_p: self.prevalence_p,
            month_used: month,
            pest_names: self.pest_names.clone(),
            disease_names: self.disease_names.clone(),
            part_names: self.part_names.clone(),
        }
    }
}

/// Optional `?month=` query parameter
#[derive(Debug, Default, Deserialize)]
pub struct MonthQuery {
    pub month: Option<String>,
}

/// Result of the duplicate stage cleanup
#[derive(Debug, Serialize)]
pub struct DedupeReport {
    pub deleted: u64,
    pub remaining: i64,
}

/// Current month in UTC (1-12)
pub fn current_month() -> u32 {
    Utc::now().month()
}

impl SeasonService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// All stages, oldest first
    pub async fn list_stages(&self) -> AppResult<Vec<SeasonalStage>> {
        let stages = sqlx::query_as::<_, SeasonalStage>(
            r#"
            SELECT s.id, s.name, s.months, s.prevalence_p,
                   COALESCE((SELECT ARRAY_AGG(p.name ORDER BY p.name)
                             FROM stage_pests sp JOIN pests p ON p.id = sp.pest_id
                             WHERE sp.stage_id = s.id), '{}') AS pest_names,
                   COALESCE((SELECT ARRAY_AGG(d.name ORDER BY d.name)
                             FROM stage_diseases sd JOIN diseases d ON d.id = sd.disease_id
                             WHERE sd.stage_id = s.id), '{}') AS disease_names,
                   COALESCE((SELECT ARRAY_AGG(pp.name ORDER BY pp.name)
                             FROM stage_parts spp JOIN plant_parts pp ON pp.id = spp.plant_part_id
                             WHERE spp.stage_id = s.id), '{}') AS part_names
            FROM seasonal_stages s
            ORDER BY s.created_at, s.id
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(stages)
    }

    /// Stage for a month: the first stored stage covering it, else the built-in default
    pub async fn stage_for_month(&self, month: u32) -> AppResult<SeasonalStageInfo> {
        let stages = self.list_stages().await?;

        let info = stages
            .iter()
            .find(|stage| parse_months(&stage.months).contains(&month))
            .map(|stage| stage.info(month))
            .unwrap_or_else(|| {
                tracing::debug!(month, "No stored stage covers month, using defaults");
                default_stage_for_month(month)
            });

        Ok(info)
    }

    /// Stage for an optional `month` override; invalid overrides fall back to today
    pub async fn resolve_stage(&self, month_override: Option<&str>) -> AppResult<SeasonalStageInfo> {
        let (month, warning) = resolve_month(month_override, current_month());
        if let Some(warning) = warning {
            tracing::warn!("{}", warning);
        }
        self.stage_for_month(month).await
    }

    /// Month-by-month stage timeline for calculator display
    pub async fn timeline(&self, current: u32) -> AppResult<Vec<StageTimelineEntry>> {
        let stored = self.list_stages().await?;
        let definitions = if stored.is_empty() {
            default_stage_definitions()
        } else {
            stored
                .into_iter()
                .map(|stage| StageDefinition {
                    name: stage.name,
                    months: stage.months,
                    prevalence_p: stage.prevalence_p,
                })
                .collect()
        };

        Ok(stage_timeline(&definitions, current))
    }

    /// Delete stages whose name repeats, keeping the oldest of each name
    pub async fn delete_duplicate_stages(&self) -> AppResult<DedupeReport> {
        let mut tx = self.db.begin().await?;

        let deleted = sqlx::query(
            r#"
            DELETE FROM seasonal_stages s
            USING (
                SELECT id, ROW_NUMBER() OVER (PARTITION BY name ORDER BY created_at, id) AS rn
                FROM seasonal_stages
            ) ranked
            WHERE s.id = ranked.id AND ranked.rn > 1
            "#,
        )
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let remaining = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM seasonal_stages")
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        if deleted > 0 {
            tracing::info!(deleted, remaining, "Removed duplicate seasonal stages");
        }

        Ok(DedupeReport { deleted, remaining })
    }
}
