//! User administration and profile-field updates.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::db::{User, UserResponse};
use crate::AppState;

use super::auth::AuthUser;
use super::error::ApiError;
use super::validation;

#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub description: Option<String>,
    pub profile_photo: Option<String>,
    pub company_id: Option<String>,
    pub company_name: Option<String>,
    #[serde(rename = "companyLocation")]
    pub company_location: Option<String>,
    #[serde(rename = "companyPhone")]
    pub company_phone: Option<String>,
}

/// List all users (admin only)
///
/// GET /api/users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let users: Vec<UserResponse> = sqlx::query_as(
        "SELECT user_id, name, email, role, phone, description, profile_photo FROM users
         ORDER BY created_at",
    )
    .fetch_all(&state.db)
    .await?;

    Ok(Json(users))
}

/// Get a single user by id
///
/// GET /api/users/:id
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    let user: Option<UserResponse> = sqlx::query_as(
        "SELECT user_id, name, email, role, phone, description, profile_photo FROM users
         WHERE user_id = ?",
    )
    .bind(&id)
    .fetch_optional(&state.db)
    .await?;

    user.map(Json)
        .ok_or_else(|| ApiError::not_found("Usuario no encontrado."))
}

/// Partially update the caller's own profile. Absent fields keep their
/// current values; company fields are only touched when a company_id is
/// supplied.
///
/// PUT /api/users/update-profile
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if let Some(ref email) = req.email {
        validation::validate_email(email).map_err(ApiError::validation)?;
    }
    validation::validate_phone(&req.phone).map_err(ApiError::validation)?;

    let result = sqlx::query(
        "UPDATE users
         SET name = COALESCE(?, name),
             email = COALESCE(?, email),
             phone = COALESCE(?, phone),
             description = COALESCE(?, description),
             profile_photo = COALESCE(?, profile_photo),
             updated_at = ?
         WHERE user_id = ?",
    )
    .bind(&req.name)
    .bind(&req.email)
    .bind(&req.phone)
    .bind(&req.description)
    .bind(&req.profile_photo)
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(&auth.user_id)
    .execute(&state.db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Usuario no encontrado."));
    }

    // Company fields only when the caller names their own company row
    if let (Some(company_id), Some(_)) = (&req.company_id, &req.company_name) {
        sqlx::query(
            "UPDATE companies
             SET name = COALESCE(?, name),
                 location = COALESCE(?, location),
                 phone = COALESCE(?, phone),
                 updated_at = ?
             WHERE company_id = ? AND user_id = ?",
        )
        .bind(&req.company_name)
        .bind(&req.company_location)
        .bind(&req.company_phone)
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(company_id)
        .bind(&auth.user_id)
        .execute(&state.db)
        .await?;
    }

    Ok(Json(
        serde_json::json!({ "message": "Perfil actualizado correctamente" }),
    ))
}

/// Delete a user account. Allowed for the owner or an admin; an admin
/// cannot remove their own account this way. Company rows and reset
/// tokens go with the user via ON DELETE CASCADE.
///
/// DELETE /api/users/:id
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE user_id = ?")
        .bind(&id)
        .fetch_optional(&state.db)
        .await?;
    let user = user.ok_or_else(|| ApiError::not_found("Usuario no encontrado."))?;

    if auth.role.is_admin() && auth.user_id == user.user_id {
        return Err(ApiError::authorization("No puedes eliminar tu propia cuenta."));
    }
    if !auth.role.is_admin() && auth.user_id != user.user_id {
        return Err(ApiError::authorization(
            "No tienes permiso para eliminar este usuario.",
        ));
    }

    sqlx::query("DELETE FROM users WHERE user_id = ?")
        .bind(&user.user_id)
        .execute(&state.db)
        .await?;

    info!(user_id = %user.user_id, deleted_by = %auth.user_id, "User deleted");

    Ok(Json(
        serde_json::json!({ "message": "Usuario eliminado exitosamente" }),
    ))
}
