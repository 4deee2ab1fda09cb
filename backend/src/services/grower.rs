//! Grower profile service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct GrowerService {
    db: PgPool,
}

/// Account and grower details shown on the profile page
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Profile {
    pub user_id: Uuid,
    pub grower_id: Uuid,
    pub username: String,
    pub email: String,
    pub farm_name: String,
    pub contact_number: Option<String>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileInput {
    #[validate(length(min = 1, max = 150, message = "Username must be 1-150 characters"))]
    pub username: Option<String>,
    #[validate(email(message = "Enter a valid email address"))]
    pub email: Option<String>,
    #[validate(length(min = 1, max = 255, message = "Farm or business name is required"))]
    pub farm_name: Option<String>,
    /// Empty string clears the number
    pub contact_number: Option<String>,
}

impl GrowerService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn get_profile(&self, user_id: Uuid) -> AppResult<Profile> {
        sqlx::query_as::<_, Profile>(
            r#"
            SELECT u.id AS user_id, g.id AS grower_id, u.username, u.email,
                   g.farm_name, g.contact_number, u.last_login_at, u.created_at
            FROM users u
            JOIN growers g ON g.user_id = u.id
            WHERE u.id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Grower profile".to_string()))
    }

    /// Update the user and grower halves of a profile together
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        input: UpdateProfileInput,
    ) -> AppResult<Profile> {
        input.validate()?;

        if let Some(username) = &input.username {
            shared::validate_username(username).map_err(|m| AppError::field("username", m))?;
            let taken = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM users WHERE LOWER(username) = LOWER($1) AND id <> $2",
            )
            .bind(username)
            .bind(user_id)
            .fetch_one(&self.db)
            .await?;
            if taken > 0 {
                return Err(AppError::Conflict {
                    resource: "username".to_string(),
                    message: "A user with that username already exists".to_string(),
                });
            }
        }

        let contact_number = input.contact_number.map(|c| c.trim().to_string());
        if let Some(phone) = contact_number.as_deref().filter(|c| !c.is_empty()) {
            shared::validate_contact_number(phone)
                .map_err(|m| AppError::field("contact_number", m))?;
        }

        let mut tx = self.db.begin().await?;

        sqlx::query(
            r#"
            UPDATE users SET
                username = COALESCE($2, username),
                email = COALESCE($3, email),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(&input.username)
        .bind(&input.email)
        .execute(&mut *tx)
        .await?;

        let updated = sqlx::query(
            r#"
            UPDATE growers SET
                farm_name = COALESCE($2, farm_name),
                contact_number = CASE
                    WHEN $3::TEXT IS NULL THEN contact_number
                    WHEN $3 = '' THEN NULL
                    ELSE $3
                END,
                updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(input.farm_name.as_deref().map(str::trim))
        .bind(&contact_number)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(AppError::NotFound("Grower profile".to_string()));
        }

        tx.commit().await?;

        self.get_profile(user_id).await
    }
}
