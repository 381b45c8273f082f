// src/handlers/admin.rs

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};

use crate::{error::AppError, services::versioning::QuizService, state::AppState};

/// Fetches the quiz sources and reconciles them with the stored versions.
/// Admin only.
pub async fn sync_quizzes(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let sync = state
        .sync
        .ok_or_else(|| AppError::InvalidArgument("no quiz source is configured".to_string()))?;

    let stats = sync.sync().await?;
    Ok(Json(stats))
}

/// Every stored version of a source file, newest first.
/// Admin only.
pub async fn list_versions(
    State(quizzes): State<QuizService>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let versions = quizzes.list_versions(&filename).await?;
    Ok(Json(versions))
}

/// Makes one stored version the only active one (rollback).
/// Admin only.
pub async fn activate_version(
    State(quizzes): State<QuizService>,
    Path((filename, version)): Path<(String, i32)>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = quizzes.activate_version(&filename, version).await?;
    Ok(Json(quiz))
}
