//! Observation image storage on the local filesystem

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::MediaConfig;
use crate::error::{AppError, AppResult};
use shared::{image_extension, validate_image_content_type};

#[derive(Clone)]
pub struct MediaService {
    db: PgPool,
    root: PathBuf,
    max_image_bytes: usize,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ObservationImage {
    pub id: Uuid,
    pub observation_id: Uuid,
    /// Relative to the media root
    pub file_path: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub uploaded_at: DateTime<Utc>,
}

/// One uploaded file pulled out of a multipart body
#[derive(Debug)]
pub struct ImageUpload {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

#[derive(Debug, Serialize)]
pub struct RejectedUpload {
    pub filename: Option<String>,
    pub reason: String,
}

#[derive(Debug, Default, Serialize)]
pub struct UploadReport {
    pub saved: Vec<ObservationImage>,
    pub rejected: Vec<RejectedUpload>,
}

impl MediaService {
    pub fn new(db: PgPool, config: &MediaConfig) -> Self {
        Self {
            db,
            root: PathBuf::from(&config.root),
            max_image_bytes: config.max_image_bytes,
        }
    }

    /// Store images for an observation in a session the user surveyed.
    ///
    /// Each upload is handled on its own; a failing one is reported and skipped.
    pub async fn store_observation_images(
        &self,
        user_id: Uuid,
        observation_id: Uuid,
        uploads: Vec<ImageUpload>,
    ) -> AppResult<UploadReport> {
        let owned = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT o.id FROM observations o
            JOIN survey_sessions s ON s.id = o.session_id
            WHERE o.id = $1 AND s.surveyor_id = $2
            "#,
        )
        .bind(observation_id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        if owned.is_none() {
            return Err(AppError::NotFound("Observation".to_string()));
        }

        if uploads.is_empty() {
            return Err(AppError::field("images", "No images were uploaded"));
        }

        let mut report = UploadReport::default();
        let mut storage_failure = None;
        for upload in uploads {
            match self.store_one(observation_id, &upload).await {
                Ok(image) => report.saved.push(image),
                Err(e) => {
                    tracing::warn!(
                        %observation_id,
                        filename = ?upload.filename,
                        error = %e,
                        "Skipping observation image"
                    );
                    report.rejected.push(RejectedUpload {
                        filename: upload.filename,
                        reason: rejection_reason(&e),
                    });
                    if matches!(e, AppError::StorageError(_)) {
                        storage_failure = Some(e);
                    }
                }
            }
        }

        if report.saved.is_empty() {
            if let Some(e) = storage_failure {
                return Err(e);
            }
        }

        tracing::info!(
            %observation_id,
            saved = report.saved.len(),
            rejected = report.rejected.len(),
            "Processed observation images"
        );

        Ok(report)
    }

    async fn store_one(
        &self,
        observation_id: Uuid,
        upload: &ImageUpload,
    ) -> AppResult<ObservationImage> {
        let content_type = check_upload(upload, self.max_image_bytes)
            .map_err(|reason| AppError::field("images", reason))?;

        let relative = relative_image_path(Utc::now(), Uuid::new_v4(), content_type);
        let absolute = self.root.join(&relative);
        write_file(&absolute, &upload.data).await.map_err(|e| {
            tracing::error!(path = %absolute.display(), error = %e, "Failed to write image");
            AppError::StorageError(e.to_string())
        })?;

        let inserted = sqlx::query_as::<_, ObservationImage>(
            r#"
            INSERT INTO observation_images (observation_id, file_path, content_type, size_bytes)
            VALUES ($1, $2, $3, $4)
            RETURNING id, observation_id, file_path, content_type, size_bytes, uploaded_at
            "#,
        )
        .bind(observation_id)
        .bind(&relative)
        .bind(content_type)
        .bind(upload.data.len() as i64)
        .fetch_one(&self.db)
        .await;

        match inserted {
            Ok(image) => Ok(image),
            Err(e) => {
                if let Err(io) = tokio::fs::remove_file(&absolute).await {
                    tracing::warn!(path = %absolute.display(), error = %io, "Failed to remove orphaned image");
                }
                Err(e.into())
            }
        }
    }
}

/// Message reported back to the client for a skipped upload
fn rejection_reason(e: &AppError) -> String {
    match e {
        AppError::Validation { message, .. } => message.clone(),
        AppError::StorageError(_) => "Could not store image".to_string(),
        _ => "Could not save image".to_string(),
    }
}

/// Content type of an acceptable upload, or why it was refused
pub fn check_upload(upload: &ImageUpload, max_image_bytes: usize) -> Result<&str, String> {
    let content_type = upload
        .content_type
        .as_deref()
        .ok_or_else(|| "Missing content type".to_string())?;
    validate_image_content_type(content_type).map_err(str::to_string)?;

    if upload.data.is_empty() {
        return Err("Image is empty".to_string());
    }
    if upload.data.len() > max_image_bytes {
        return Err(format!("Image exceeds the {} byte limit", max_image_bytes));
    }
    Ok(content_type)
}

/// `observations/YYYY/MM/DD/<id>.<ext>`
fn relative_image_path(now: DateTime<Utc>, id: Uuid, content_type: &str) -> String {
    format!(
        "observations/{}/{}.{}",
        now.format("%Y/%m/%d"),
        id.simple(),
        image_extension(content_type)
    )
}

async fn write_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, data).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn upload(content_type: Option<&str>, size: usize) -> ImageUpload {
        ImageUpload {
            filename: Some("leaf.jpg".to_string()),
            content_type: content_type.map(str::to_string),
            data: vec![0u8; size],
        }
    }

    #[test]
    fn test_check_upload_rules() {
        assert_eq!(check_upload(&upload(Some("image/jpeg"), 10), 1024), Ok("image/jpeg"));
        assert!(check_upload(&upload(Some("application/pdf"), 10), 1024).is_err());
        assert!(check_upload(&upload(None, 10), 1024).is_err());
        assert!(check_upload(&upload(Some("image/png"), 0), 1024).is_err());
        assert!(check_upload(&upload(Some("image/png"), 2048), 1024).is_err());
    }

    #[test]
    fn test_rejection_reason_hides_storage_details() {
        let e = AppError::field("images", "Image is empty");
        assert_eq!(rejection_reason(&e), "Image is empty");
        let e = AppError::StorageError("No space left on device".into());
        assert_eq!(rejection_reason(&e), "Could not store image");
    }

    #[test]
    fn test_relative_image_path_layout() {
        let now = Utc.with_ymd_and_hms(2024, 9, 3, 7, 30, 0).unwrap();
        assert_eq!(
            relative_image_path(now, Uuid::nil(), "image/png"),
            "observations/2024/09/03/00000000000000000000000000000000.png"
        );
    }

    #[tokio::test]
    async fn test_write_file_creates_parent_dirs() {
        let dir = std::env::temp_dir().join(format!("fsv-media-{}", Uuid::new_v4().simple()));
        let path = dir.join("a/b/photo.jpg");
        write_file(&path, b"jpeg").await.unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"jpeg");
        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
