// src/handlers/quiz.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};

use crate::{
    error::AppError,
    models::{page::PageParams, user::Viewer},
    services::versioning::QuizService,
};

/// Lists the active version of every quiz, without questions.
pub async fn list_quizzes(
    State(quizzes): State<QuizService>,
    Query(page): Query<PageParams>,
) -> Result<impl IntoResponse, AppError> {
    let page = quizzes.list_active(page).await?;
    Ok(Json(page))
}

/// Returns one quiz version with its questions and answers.
///
/// The `valid` flag of each answer is only included for admins.
pub async fn get_quiz(
    State(quizzes): State<QuizService>,
    Extension(viewer): Extension<Viewer>,
    Path(sha1): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = quizzes.get_quiz(&sha1, &viewer).await?;
    Ok(Json(quiz))
}
