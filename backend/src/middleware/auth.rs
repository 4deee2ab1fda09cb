//! Authentication middleware
//!
//! JWT bearer authentication for protected route groups

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;

use crate::error::{AppError, AppResult, ErrorDetail, ErrorResponse};
use crate::services::auth::Claims;
use crate::AppState;

/// Authenticated user information extracted from JWT
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub grower_id: Uuid,
    pub username: String,
    /// Operators may run catalog maintenance
    pub is_staff: bool,
}

/// Authentication middleware that validates JWT tokens against the
/// configured signing secret
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
        Some(token) => token,
        None => return unauthorized_response("Missing or invalid Authorization header"),
    };

    let claims = match decode_jwt(token, &state.config.jwt.secret) {
        Ok(claims) => claims,
        Err(msg) => return unauthorized_response(&msg),
    };

    let user_id = match Uuid::parse_str(&claims.sub) {
        Ok(id) => id,
        Err(_) => return unauthorized_response("Invalid user ID in token"),
    };

    let grower_id = match Uuid::parse_str(&claims.grower_id) {
        Ok(id) => id,
        Err(_) => return unauthorized_response("Invalid grower ID in token"),
    };

    request.extensions_mut().insert(AuthUser {
        user_id,
        grower_id,
        username: claims.username,
        is_staff: claims.is_staff,
    });

    next.run(request).await
}

/// Decode and validate JWT token
fn decode_jwt(token: &str, secret: &str) -> Result<Claims, String> {
    use jsonwebtoken::{decode, DecodingKey, Validation};

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| format!("Invalid token: {}", e))
}

fn unauthorized_response(message: &str) -> Response {
    let error = ErrorResponse {
        error: ErrorDetail::new("UNAUTHORIZED", message),
    };

    (StatusCode::UNAUTHORIZED, Json(error)).into_response()
}

/// Extractor for authenticated user
/// Use this in handlers to get the current user
#[derive(Clone, Debug)]
pub struct CurrentUser(pub AuthUser);

impl CurrentUser {
    pub fn require_staff(&self) -> AppResult<()> {
        if self.0.is_staff {
            Ok(())
        } else {
            tracing::warn!(user_id = %self.0.user_id, "Staff-only action refused");
            Err(AppError::InsufficientPermissions)
        }
    }
}

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| {
                let error = ErrorResponse {
                    error: ErrorDetail::new("UNAUTHORIZED", "Authentication required"),
                };
                (StatusCode::UNAUTHORIZED, Json(error))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request as HttpRequest, routing::get, Router};
    use chrono::{Duration, Utc};
    use jsonwebtoken::{encode, EncodingKey, Header};
    use sqlx::postgres::PgPoolOptions;
    use std::sync::Arc;
    use tower::ServiceExt;

    use crate::config::test_config;

    fn token_for(secret: &str, exp_offset: i64) -> String {
        let now = Utc::now();
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            grower_id: Uuid::new_v4().to_string(),
            username: "grower".to_string(),
            is_staff: false,
            exp: (now + Duration::seconds(exp_offset)).timestamp(),
            iat: now.timestamp(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn protected_app() -> Router {
        let config = test_config();
        let db = PgPoolOptions::new()
            .min_connections(0)
            .connect_lazy(&config.database.url)
            .unwrap();
        let state = AppState {
            db,
            config: Arc::new(config),
        };

        Router::new()
            .route("/whoami", get(|user: CurrentUser| async move { user.0.username }))
            .route_layer(axum::middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            ))
            .with_state(state)
    }

    async fn status_with(token: Option<String>) -> StatusCode {
        let mut request = HttpRequest::builder().uri("/whoami");
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        protected_app()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[test]
    fn test_decode_valid_token() {
        let token = token_for("secret", 600);
        let claims = decode_jwt(&token, "secret").unwrap();
        assert_eq!(claims.username, "grower");
        assert!(!claims.is_staff);
    }

    #[test]
    fn test_decode_rejects_wrong_secret_and_expired() {
        assert!(decode_jwt(&token_for("secret", 600), "other").is_err());
        assert!(decode_jwt(&token_for("secret", -3600), "secret").is_err());
    }

    #[tokio::test]
    async fn test_configured_secret_is_accepted() {
        let secret = test_config().jwt.secret;
        assert_eq!(status_with(Some(token_for(&secret, 600))).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_tokens_signed_with_other_keys_are_rejected() {
        assert_eq!(
            status_with(Some(token_for("development-secret-key", 600))).await,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(status_with(None).await, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_require_staff() {
        let mut user = CurrentUser(AuthUser {
            user_id: Uuid::new_v4(),
            grower_id: Uuid::new_v4(),
            username: "grower".to_string(),
            is_staff: false,
        });
        assert!(matches!(
            user.require_staff(),
            Err(AppError::InsufficientPermissions)
        ));
        user.0.is_staff = true;
        assert!(user.require_staff().is_ok());
    }
}
