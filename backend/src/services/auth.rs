//! Authentication service for grower registration, login, and token management

use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::config::Config;
use crate::error::{AppError, AppResult};

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    db: PgPool,
    jwt_secret: String,
    access_token_expiry: i64,
    refresh_token_expiry: i64,
}

/// Input for registering a grower account
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterInput {
    #[validate(length(min = 1, max = 150, message = "Username must be 1-150 characters"))]
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    /// Business name of the grower
    #[validate(length(min = 1, max = 255, message = "Farm or business name is required"))]
    pub farm_name: String,
    pub contact_number: Option<String>,
}

/// Response after successful registration
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub grower_id: Uuid,
    #[serde(flatten)]
    pub tokens: AuthTokens,
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // User ID
    pub grower_id: String,
    pub username: String,
    #[serde(default)]
    pub is_staff: bool,
    pub exp: i64,
    pub iat: i64,
}

/// Authentication tokens
#[derive(Debug, Serialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// User info from database
#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    grower_id: Uuid,
    username: String,
    password_hash: String,
    is_active: bool,
    is_staff: bool,
}

impl RegisterInput {
    /// Field checks run before touching the database
    fn check(&self) -> AppResult<()> {
        self.validate()?;
        shared::validate_username(&self.username).map_err(|m| AppError::field("username", m))?;
        shared::validate_email(&self.email).map_err(|m| AppError::field("email", m))?;
        shared::validate_password(&self.password).map_err(|m| AppError::field("password", m))?;
        shared::validate_passwords_match(&self.password, &self.confirm_password)
            .map_err(|m| AppError::field("confirm_password", m))?;
        Ok(())
    }
}

impl AuthService {
    /// Create a new AuthService instance
    pub fn new(db: PgPool, config: &Config) -> Self {
        Self {
            db,
            jwt_secret: config.jwt.secret.clone(),
            access_token_expiry: config.jwt.access_token_expiry,
            refresh_token_expiry: config.jwt.refresh_token_expiry,
        }
    }

    /// Register a user together with their grower profile
    pub async fn register(&self, input: RegisterInput) -> AppResult<RegisterResponse> {
        input.check()?;

        let contact_number = input
            .contact_number
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        if let Some(phone) = &contact_number {
            shared::validate_contact_number(phone)
                .map_err(|m| AppError::field("contact_number", m))?;
        }

        let existing = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM users WHERE LOWER(username) = LOWER($1)",
        )
        .bind(&input.username)
        .fetch_one(&self.db)
        .await?;

        if existing > 0 {
            return Err(AppError::Conflict {
                resource: "username".to_string(),
                message: "A user with that username already exists".to_string(),
            });
        }

        let password_hash = hash(&input.password, DEFAULT_COST)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?;

        let mut tx = self.db.begin().await?;

        let user_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO users (username, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(&input.username)
        .bind(&input.email)
        .bind(&password_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::conflict_on_unique(e, "username", "A user with that username already exists")
        })?;

        let grower_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO growers (user_id, farm_name, contact_number)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(input.farm_name.trim())
        .bind(&contact_number)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(%user_id, %grower_id, "Registered grower {}", input.username);

        let tokens = self.generate_tokens(user_id, grower_id, &input.username, false)?;
        self.store_refresh_token(user_id, &tokens.refresh_token).await?;

        Ok(RegisterResponse {
            user_id,
            grower_id,
            tokens,
        })
    }

    /// Authenticate with username and password
    pub async fn login(&self, username: &str, password: &str) -> AppResult<AuthTokens> {
        let user = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT u.id, g.id AS grower_id, u.username, u.password_hash, u.is_active, u.is_staff
            FROM users u
            JOIN growers g ON g.user_id = u.id
            WHERE u.username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

        if !user.is_active {
            return Err(AppError::Unauthorized {
                message: "Account is disabled".to_string(),
            });
        }

        let valid = verify(password, &user.password_hash)
            .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))?;

        if !valid {
            return Err(AppError::InvalidCredentials);
        }

        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(user.id)
            .execute(&self.db)
            .await?;

        let tokens =
            self.generate_tokens(user.id, user.grower_id, &user.username, user.is_staff)?;
        self.store_refresh_token(user.id, &tokens.refresh_token).await?;

        Ok(tokens)
    }

    /// Exchange a refresh token for a new token pair; the old token is revoked
    pub async fn refresh_token(&self, refresh_token: &str) -> AppResult<AuthTokens> {
        let token_hash = hash_token(refresh_token);

        let row = sqlx::query_as::<_, (Uuid, Uuid, String, bool)>(
            r#"
            SELECT rt.user_id, g.id, u.username, u.is_staff
            FROM refresh_tokens rt
            JOIN users u ON u.id = rt.user_id
            JOIN growers g ON g.user_id = u.id
            WHERE rt.token_hash = $1
              AND rt.expires_at > NOW()
              AND rt.revoked_at IS NULL
              AND u.is_active = true
            "#,
        )
        .bind(&token_hash)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::Unauthorized {
            message: "Invalid or expired refresh token".to_string(),
        })?;
        let (user_id, grower_id, username, is_staff) = row;

        sqlx::query("UPDATE refresh_tokens SET revoked_at = NOW() WHERE token_hash = $1")
            .bind(&token_hash)
            .execute(&self.db)
            .await?;

        let tokens = self.generate_tokens(user_id, grower_id, &username, is_staff)?;
        self.store_refresh_token(user_id, &tokens.refresh_token).await?;

        Ok(tokens)
    }

    /// Generate access and refresh tokens
    fn generate_tokens(
        &self,
        user_id: Uuid,
        grower_id: Uuid,
        username: &str,
        is_staff: bool,
    ) -> AppResult<AuthTokens> {
        let now = Utc::now();
        let access_exp = now + Duration::seconds(self.access_token_expiry);

        let access_claims = Claims {
            sub: user_id.to_string(),
            grower_id: grower_id.to_string(),
            username: username.to_string(),
            is_staff,
            exp: access_exp.timestamp(),
            iat: now.timestamp(),
        };

        let access_token = encode(
            &Header::default(),
            &access_claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))?;

        Ok(AuthTokens {
            access_token,
            refresh_token: Uuid::new_v4().to_string(),
            token_type: "Bearer".to_string(),
            expires_in: self.access_token_expiry,
        })
    }

    async fn store_refresh_token(&self, user_id: Uuid, token: &str) -> AppResult<()> {
        let expires_at = Utc::now() + Duration::seconds(self.refresh_token_expiry);

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(user_id)
        .bind(hash_token(token))
        .bind(expires_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }
}

/// Hex SHA-256 of a token for storage
fn hash_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> RegisterInput {
        RegisterInput {
            username: "katherine_grower".to_string(),
            email: "grower@example.com".to_string(),
            password: "mangoes123".to_string(),
            confirm_password: "mangoes123".to_string(),
            farm_name: "Katherine Mangoes".to_string(),
            contact_number: None,
        }
    }

    fn rejected_field(input: RegisterInput) -> String {
        match input.check() {
            Err(AppError::Validation { field, .. }) => field,
            other => panic!("expected a field error, got {:?}", other),
        }
    }

    #[test]
    fn test_register_input_valid() {
        assert!(input().check().is_ok());
    }

    #[test]
    fn test_register_input_rejects_bad_email() {
        let mut bad = input();
        bad.email = "not-an-email".to_string();
        assert_eq!(rejected_field(bad), "email");
    }

    #[test]
    fn test_register_input_rejects_short_or_mismatched_password() {
        let mut bad = input();
        bad.password = "short".to_string();
        bad.confirm_password = "short".to_string();
        assert_eq!(rejected_field(bad), "password");

        let mut bad = input();
        bad.confirm_password = "mangoes124".to_string();
        assert_eq!(rejected_field(bad), "confirm_password");
    }

    #[test]
    fn test_register_input_rejects_spaces_in_username() {
        let mut bad = input();
        bad.username = "katherine grower".to_string();
        assert_eq!(rejected_field(bad), "username");
    }

    #[test]
    fn test_hash_token_is_stable_sha256() {
        let hashed = hash_token("abc");
        assert_eq!(hashed.len(), 64);
        assert_eq!(
            hashed,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_ne!(hash_token("abd"), hashed);
    }
}
