//! Profile endpoints: combined user+company view, profile/company upsert,
//! and the profile photo upload.

use axum::{
    extract::{Multipart, State},
    Extension, Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::AppState;

use super::auth::AuthUser;
use super::error::{ApiError, SERVER_ERROR_MESSAGE};

const ALLOWED_IMAGE_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/jpg"];

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ProfileResponse {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub role: String,
    pub phone: Option<String>,
    pub description: Option<String>,
    pub profile_photo: Option<String>,
    #[serde(rename = "companyName")]
    pub company_name: Option<String>,
    #[serde(rename = "companyDescription")]
    pub company_description: Option<String>,
    #[serde(rename = "companyLocation")]
    pub company_location: Option<String>,
    #[serde(rename = "companyPhone")]
    pub company_phone: Option<String>,
    #[serde(rename = "companyPhoto")]
    pub company_photo: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProfileUpdateRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub description: Option<String>,
    pub phone: Option<String>,
    pub profile_photo: Option<String>,
    #[serde(rename = "companyName")]
    pub company_name: Option<String>,
    #[serde(rename = "companyDescription")]
    pub company_description: Option<String>,
    #[serde(rename = "companyLocation")]
    pub company_location: Option<String>,
    #[serde(rename = "companyPhone")]
    pub company_phone: Option<String>,
    #[serde(rename = "companyPhoto")]
    pub company_photo: Option<String>,
}

/// Get the authenticated user's profile together with their company
///
/// GET /api/profile
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let profile: Option<ProfileResponse> = sqlx::query_as(
        "SELECT u.user_id, u.name, u.email, u.role, u.phone, u.description, u.profile_photo,
                c.name AS company_name, c.description AS company_description,
                c.location AS company_location, c.phone AS company_phone, c.photo AS company_photo
         FROM users u
         LEFT JOIN companies c ON u.user_id = c.user_id
         WHERE u.user_id = ?",
    )
    .bind(&auth.user_id)
    .fetch_optional(&state.db)
    .await?;

    profile
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Usuario no encontrado."))
}

/// Replace the profile fields and upsert the company row
///
/// PUT /api/profile
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<ProfileUpdateRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        "UPDATE users SET name = COALESCE(?, name), email = COALESCE(?, email),
                          description = ?, phone = ?, profile_photo = COALESCE(?, profile_photo),
                          updated_at = ?
         WHERE user_id = ?",
    )
    .bind(&req.name)
    .bind(&req.email)
    .bind(&req.description)
    .bind(&req.phone)
    .bind(&req.profile_photo)
    .bind(&now)
    .bind(&auth.user_id)
    .execute(&state.db)
    .await?;

    let existing: Option<(String,)> =
        sqlx::query_as("SELECT company_id FROM companies WHERE user_id = ?")
            .bind(&auth.user_id)
            .fetch_optional(&state.db)
            .await?;

    match existing {
        Some((company_id,)) => {
            sqlx::query(
                "UPDATE companies SET name = ?, description = ?, location = ?, phone = ?,
                                      photo = ?, updated_at = ?
                 WHERE company_id = ?",
            )
            .bind(&req.company_name)
            .bind(&req.company_description)
            .bind(&req.company_location)
            .bind(&req.company_phone)
            .bind(&req.company_photo)
            .bind(&now)
            .bind(&company_id)
            .execute(&state.db)
            .await?;
        }
        None => {
            sqlx::query(
                "INSERT INTO companies (company_id, user_id, name, description, location, phone, photo, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&auth.user_id)
            .bind(&req.company_name)
            .bind(&req.company_description)
            .bind(&req.company_location)
            .bind(&req.company_phone)
            .bind(&req.company_photo)
            .bind(&now)
            .bind(&now)
            .execute(&state.db)
            .await?;
        }
    }

    Ok(Json(
        json!({ "message": "Perfil y empresa actualizados exitosamente." }),
    ))
}

/// Upload a profile photo and point `profile_photo` at its public URL
///
/// POST /api/upload
pub async fn upload_photo(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::error!("Failed to read multipart field: {}", e);
        ApiError::validation("No se subió ninguna imagen.")
    })? {
        if field.name() != Some("file") {
            continue;
        }

        let content_type = field.content_type().unwrap_or_default().to_string();
        if !ALLOWED_IMAGE_TYPES.contains(&content_type.as_str()) {
            return Err(ApiError::validation(
                "Formato de archivo no permitido para perfil",
            ));
        }

        let original_name = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await.map_err(|e| {
            tracing::error!("Failed to read upload body: {}", e);
            ApiError::validation("No se subió ninguna imagen.")
        })?;

        let filename = unique_filename(&original_name);
        let upload_dir = state.config.server.data_dir.join("uploads");
        tokio::fs::create_dir_all(&upload_dir).await.map_err(|e| {
            tracing::error!("Failed to create upload directory: {}", e);
            ApiError::internal(SERVER_ERROR_MESSAGE)
        })?;
        tokio::fs::write(upload_dir.join(&filename), &data)
            .await
            .map_err(|e| {
                tracing::error!("Failed to store upload: {}", e);
                ApiError::internal(SERVER_ERROR_MESSAGE)
            })?;

        let file_url = format!(
            "{}/uploads/{}",
            state.config.server.backend_url.trim_end_matches('/'),
            filename
        );
        sqlx::query("UPDATE users SET profile_photo = ?, updated_at = ? WHERE user_id = ?")
            .bind(&file_url)
            .bind(Utc::now().to_rfc3339())
            .bind(&auth.user_id)
            .execute(&state.db)
            .await?;

        return Ok(Json(
            json!({ "message": "Imagen subida correctamente", "fileUrl": file_url }),
        ));
    }

    Err(ApiError::validation("No se subió ninguna imagen."))
}

/// Millisecond timestamp plus the original extension, so names never
/// collide with earlier uploads and stay shell-safe.
fn unique_filename(original: &str) -> String {
    let extension = std::path::Path::new(original)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default();
    format!("{}{}", Utc::now().timestamp_millis(), extension)
}
