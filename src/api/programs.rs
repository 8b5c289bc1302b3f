//! Program scheduling records.

use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::Program;
use crate::AppState;

use super::error::ApiError;

#[derive(Debug, Default, Deserialize)]
pub struct StartProgramRequest {
    pub duration: Option<i64>,
    pub mode: Option<String>,
}

/// Start a program; it begins active
///
/// POST /api/programs/start
pub async fn start_program(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartProgramRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let mode = req.mode.unwrap_or_default();
    let duration = req.duration.unwrap_or(0);
    if duration <= 0 || mode.is_empty() {
        return Err(ApiError::validation("Duración y modo son obligatorios."));
    }

    let program_id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO programs (program_id, duration, mode, active, created_at) VALUES (?, ?, ?, 1, ?)",
    )
    .bind(&program_id)
    .bind(duration)
    .bind(&mode)
    .bind(Utc::now().to_rfc3339())
    .execute(&state.db)
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Programa iniciado exitosamente",
            "program_id": program_id,
        })),
    ))
}

/// List programs still marked active
///
/// GET /api/programs/active
pub async fn active_programs(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Program>>, ApiError> {
    let programs: Vec<Program> =
        sqlx::query_as("SELECT * FROM programs WHERE active = 1 ORDER BY created_at DESC")
            .fetch_all(&state.db)
            .await?;
    Ok(Json(programs))
}
