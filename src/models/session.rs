// src/models/session.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::{models::quiz::Quiz, utils::hash::is_sha1_hex};

/// Seconds left in a session: `duration - elapsed`, clamped to `[0, duration]`.
///
/// Elapsed time is truncated to whole seconds, so a session started at `t`
/// with a 60 s duration still accepts writes at `t + 59.9s` and is over at `t + 60s`.
pub fn remaining_seconds(duration: i32, created_at: DateTime<Utc>, now: DateTime<Utc>) -> i32 {
    let elapsed = (now - created_at).num_seconds();
    let remaining = i64::from(duration) - elapsed;
    remaining.clamp(0, i64::from(duration.max(0))) as i32
}

/// Lifecycle of a session, derived from the wall clock on every read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Expired,
}

impl SessionStatus {
    pub fn from_remaining(remaining_sec: i32) -> Self {
        if remaining_sec > 0 {
            SessionStatus::Running
        } else {
            SessionStatus::Expired
        }
    }
}

/// Score of an expired session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionResult {
    /// Checked answers that are valid.
    pub good_answer: i64,
    /// All checked answers, valid or not.
    pub total_answer: i64,
}

/// Row of the session view: the session joined with its quiz, with
/// remaining time and score aggregates computed at query time.
#[derive(Debug, Clone, FromRow)]
pub struct SessionView {
    pub uuid: Uuid,
    pub quiz_sha1: String,
    pub quiz_name: String,
    pub quiz_active: bool,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub remaining_sec: i32,
    pub checked_answers: i64,
    pub good_answers: i64,
}

/// A user's timed attempt at one quiz, as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub id: Uuid,
    pub quiz_sha1: String,
    pub quiz_name: String,
    pub quiz_active: bool,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub remaining_sec: i32,
    pub status: SessionStatus,
    /// Withheld while the session is running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<SessionResult>,
}

impl From<SessionView> for Session {
    fn from(view: SessionView) -> Self {
        let status = SessionStatus::from_remaining(view.remaining_sec);
        let result = match status {
            SessionStatus::Running => None,
            SessionStatus::Expired => Some(SessionResult {
                good_answer: view.good_answers,
                total_answer: view.checked_answers,
            }),
        };

        Self {
            id: view.uuid,
            quiz_sha1: view.quiz_sha1,
            quiz_name: view.quiz_name,
            quiz_active: view.quiz_active,
            user_id: view.user_id,
            created_at: view.created_at,
            remaining_sec: view.remaining_sec,
            status,
            result,
        }
    }
}

/// An active quiz as seen by one user: not started when `session` is `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuizSession {
    #[serde(flatten)]
    pub quiz: Quiz,
    pub session: Option<Session>,
}

/// The fact "answer A of question Q was (un)checked in session S".
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct SessionAnswer {
    pub session_uuid: Uuid,
    pub question_sha1: String,
    pub answer_sha1: String,
    pub checked: bool,
}

/// What the store did with a session answer write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerWrite {
    Recorded,
    SessionNotFound,
    SessionExpired,
    /// The question or answer does not belong to the session's quiz.
    NotInQuiz,
}

/// Which sessions a listing covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFilter {
    pub quiz_active: bool,
    /// `None` lists every user's sessions.
    pub user_id: Option<String>,
}

/// DTO for starting a session.
#[derive(Debug, Deserialize, Validate)]
pub struct StartSessionRequest {
    #[validate(custom(function = validate_sha1))]
    pub quiz_sha1: String,
}

/// DTO for checking or unchecking one answer.
#[derive(Debug, Deserialize, Validate)]
pub struct SessionAnswerRequest {
    #[validate(custom(function = validate_sha1))]
    pub question_sha1: String,
    #[validate(custom(function = validate_sha1))]
    pub answer_sha1: String,
    pub checked: bool,
}

/// Query parameters for listing sessions.
#[derive(Debug, Deserialize)]
pub struct SessionListParams {
    /// Only sessions of active (default) or inactive quizzes.
    pub quiz_active: Option<bool>,
    /// Admin only: restrict to one user.
    pub user_id: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

fn validate_sha1(value: &str) -> Result<(), validator::ValidationError> {
    if !is_sha1_hex(value) {
        return Err(validator::ValidationError::new("invalid_sha1"));
    }
    Ok(())
}
