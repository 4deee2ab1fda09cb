//! Farm boundary mapping links
//!
//! A grower creates a short-lived link for a farm. Whoever opens it can draw
//! the farm boundary without logging in; a successful submit spends the link.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::services::farm::FarmService;
use shared::{mapping_token_expiry, parse_polygon, validate_polygon, BoundaryError, MappingTokenState};

#[derive(Clone)]
pub struct BoundaryService {
    db: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct MappingTokenRow {
    token: Uuid,
    farm_id: Uuid,
    farm_name: String,
    boundary: Option<Value>,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct MappingLink {
    pub token: Uuid,
    pub farm_id: Uuid,
    pub mapping_url: String,
    pub expires_at: DateTime<Utc>,
}

/// What the mapping page needs to draw on
#[derive(Debug, Serialize)]
pub struct MappingContext {
    pub token: Uuid,
    pub farm_id: Uuid,
    pub farm_name: String,
    pub boundary: Option<Value>,
    pub expires_at: DateTime<Utc>,
}

/// Boundary submitted through a mapping link: a Polygon object or its JSON text
#[derive(Debug, Deserialize)]
pub struct BoundarySubmission {
    #[serde(default)]
    pub boundary: Value,
}

#[derive(Debug, Serialize)]
pub struct BoundarySaved {
    pub farm_id: Uuid,
    pub message: String,
}

/// Validate a submitted boundary, accepting either form
pub fn polygon_from(value: Value) -> Result<Value, BoundaryError> {
    match value {
        Value::Null => Err(BoundaryError::Missing),
        Value::String(raw) => parse_polygon(&raw),
        other => {
            validate_polygon(&other)?;
            Ok(other)
        }
    }
}

/// A link that could not be spent was used up or expired in the meantime
fn ensure_spent(rows_affected: u64) -> AppResult<()> {
    if rows_affected == 0 {
        return Err(expired_link());
    }
    Ok(())
}

fn expired_link() -> AppError {
    AppError::ExpiredLink("This mapping link has expired.".to_string())
}

impl BoundaryService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Issue a 24 hour mapping link for an owned farm
    pub async fn create_link(
        &self,
        grower_id: Uuid,
        farm_id: Uuid,
        config: &Config,
    ) -> AppResult<MappingLink> {
        let farm = FarmService::new(self.db.clone())
            .get_farm(grower_id, farm_id)
            .await?;

        let expires_at = mapping_token_expiry(Utc::now());
        let token = sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO boundary_mapping_tokens (farm_id, expires_at) VALUES ($1, $2) RETURNING token",
        )
        .bind(farm.id)
        .bind(expires_at)
        .fetch_one(&self.db)
        .await?;

        tracing::info!(farm_id = %farm.id, %expires_at, "Created boundary mapping link");

        Ok(MappingLink {
            token,
            farm_id: farm.id,
            mapping_url: config.mapping_url(token),
            expires_at,
        })
    }

    /// Look up a link that is still usable
    pub async fn validate_token(&self, token: Uuid) -> AppResult<MappingContext> {
        let row = self.find_token(token).await?;

        Ok(MappingContext {
            token: row.token,
            farm_id: row.farm_id,
            farm_name: row.farm_name,
            boundary: row.boundary,
            expires_at: row.expires_at,
        })
    }

    /// Save the boundary drawn through a link and expire the link
    pub async fn submit_boundary(
        &self,
        token: Uuid,
        submission: BoundarySubmission,
    ) -> AppResult<BoundarySaved> {
        let row = self.find_token(token).await?;
        let polygon =
            polygon_from(submission.boundary).map_err(|e| AppError::field("boundary", e.to_string()))?;

        let mut tx = self.db.begin().await?;

        // Spending the link first makes a concurrent submit find nothing left to spend
        let spent = sqlx::query(
            "UPDATE boundary_mapping_tokens SET expires_at = NOW() WHERE token = $1 AND expires_at > NOW()",
        )
        .bind(row.token)
        .execute(&mut *tx)
        .await?;
        ensure_spent(spent.rows_affected())?;

        sqlx::query("UPDATE farms SET boundary = $2, updated_at = NOW() WHERE id = $1")
            .bind(row.farm_id)
            .bind(&polygon)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(farm_id = %row.farm_id, "Saved farm boundary from mapping link");

        Ok(BoundarySaved {
            farm_id: row.farm_id,
            message: format!("Boundary saved for {}.", row.farm_name),
        })
    }

    async fn find_token(&self, token: Uuid) -> AppResult<MappingTokenRow> {
        let row = sqlx::query_as::<_, MappingTokenRow>(
            r#"
            SELECT t.token, t.farm_id, f.name AS farm_name, f.boundary, t.expires_at
            FROM boundary_mapping_tokens t
            JOIN farms f ON f.id = t.farm_id
            WHERE t.token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::InvalidLink("Invalid mapping link.".to_string()))?;

        match MappingTokenState::at(row.expires_at, Utc::now()) {
            MappingTokenState::Valid => Ok(row),
            MappingTokenState::Expired => {
                tracing::debug!(farm_id = %row.farm_id, "Rejected expired mapping link");
                Err(expired_link())
            }
        }
    }
}
