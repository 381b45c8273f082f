// src/handlers/session.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        page::PageParams,
        session::{SessionAnswerRequest, SessionListParams, StartSessionRequest},
        user::Viewer,
    },
    services::session::SessionService,
};

/// Starts a session on a quiz for the caller, or returns the one they already have.
pub async fn start_session(
    State(sessions): State<SessionService>,
    Extension(viewer): Extension<Viewer>,
    Json(payload): Json<StartSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let id = sessions.start_session(&viewer.user_id, &payload.quiz_sha1).await?;
    Ok(Json(serde_json::json!({"id": id})))
}

/// Lists sessions. Non-admins only ever see their own.
pub async fn list_sessions(
    State(sessions): State<SessionService>,
    Extension(viewer): Extension<Viewer>,
    Query(params): Query<SessionListParams>,
) -> Result<impl IntoResponse, AppError> {
    let page = PageParams {
        limit: params.limit,
        offset: params.offset,
    };
    let result = sessions
        .find_all_sessions(
            params.quiz_active.unwrap_or(true),
            params.user_id,
            &viewer,
            page,
        )
        .await?;

    Ok(Json(result))
}

/// One session with its remaining time, and its score once it is over.
pub async fn get_session(
    State(sessions): State<SessionService>,
    Extension(viewer): Extension<Viewer>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let session = sessions.find_session(id, &viewer).await?;
    Ok(Json(session))
}

/// Every active quiz, each with the caller's session if they started one.
pub async fn list_quiz_sessions(
    State(sessions): State<SessionService>,
    Extension(viewer): Extension<Viewer>,
    Query(page): Query<PageParams>,
) -> Result<impl IntoResponse, AppError> {
    let result = sessions.find_all_quiz_sessions(&viewer, page).await?;
    Ok(Json(result))
}

pub async fn list_session_answers(
    State(sessions): State<SessionService>,
    Extension(viewer): Extension<Viewer>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let answers = sessions.find_session_answers(id, &viewer).await?;
    Ok(Json(answers))
}

/// Checks or unchecks one answer while the session is running.
pub async fn put_session_answer(
    State(sessions): State<SessionService>,
    Extension(viewer): Extension<Viewer>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SessionAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    sessions
        .add_session_answer(
            id,
            &viewer.user_id,
            &payload.question_sha1,
            &payload.answer_sha1,
            payload.checked,
        )
        .await?;

    Ok(StatusCode::CREATED)
}
