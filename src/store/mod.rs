// src/store/mod.rs

//! Persistence behind the versioning and session engines.
//!
//! The two read-then-write operations that must be atomic live here as
//! single calls: [`QuizStore::create_version`] (insert a version and make it
//! the only active one) and [`QuizStore::record_session_answer`] (check the
//! session is still running, then upsert the answer).

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        quiz::Quiz,
        session::{AnswerWrite, SessionAnswer, SessionFilter, SessionView},
    },
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type DynStore = Arc<dyn QuizStore>;

#[async_trait]
pub trait QuizStore: Send + Sync {
    /// Highest version stored for `filename`, active or not. No questions.
    async fn find_latest_version_by_filename(&self, filename: &str) -> Result<Option<Quiz>, AppError>;

    /// Stores `quiz` with its questions and answers and makes it the only
    /// active version of its filename, in one transaction.
    ///
    /// `previous_version` is the latest version the caller saw; if another
    /// writer moved it in the meantime this fails with `Conflict`. If the
    /// same content is already stored under this filename (a revert), that
    /// row is moved to the new version instead of being duplicated.
    async fn create_version(&self, quiz: &Quiz, previous_version: Option<i32>) -> Result<(), AppError>;

    /// Makes `version` the only active version of `filename`.
    /// Returns `false` when that version does not exist.
    async fn activate_only_version(&self, filename: &str, version: i32) -> Result<bool, AppError>;

    async fn find_quiz_by_sha1(&self, sha1: &str) -> Result<Option<Quiz>, AppError>;

    /// Quiz with its questions (by position) and answers (in source order).
    async fn find_full_quiz_by_sha1(&self, sha1: &str) -> Result<Option<Quiz>, AppError>;

    async fn find_active_quiz_by_filename(&self, filename: &str) -> Result<Option<Quiz>, AppError>;

    /// Every version of `filename`, newest first. A reverted row carries
    /// its new number only.
    async fn find_all_versions_by_filename(&self, filename: &str) -> Result<Vec<Quiz>, AppError>;

    async fn find_all_active(&self, limit: i64, offset: i64) -> Result<Vec<Quiz>, AppError>;

    async fn count_all_active(&self) -> Result<i64, AppError>;

    async fn find_session_id(&self, quiz_sha1: &str, user_id: &str) -> Result<Option<Uuid>, AppError>;

    /// Creates the session of `user_id` on `quiz_sha1`, or returns the existing one.
    async fn create_or_get_session(
        &self,
        quiz_sha1: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Uuid, AppError>;

    /// Upserts one answer fact if, at `now`, the session belongs to `user_id`,
    /// is still running, and the question/answer pair is part of its quiz.
    async fn record_session_answer(
        &self,
        answer: &SessionAnswer,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<AnswerWrite, AppError>;

    async fn find_session_view(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionView>, AppError>;

    /// Sessions matching `filter`, newest first.
    async fn find_all_session_views(
        &self,
        filter: &SessionFilter,
        limit: i64,
        offset: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<SessionView>, AppError>;

    async fn count_all_sessions(&self, filter: &SessionFilter) -> Result<i64, AppError>;

    /// Sessions of `user_id` on any of `quiz_sha1s`, at most one per quiz.
    async fn find_user_session_views(
        &self,
        user_id: &str,
        quiz_sha1s: &[String],
        now: DateTime<Utc>,
    ) -> Result<Vec<SessionView>, AppError>;

    async fn find_session_answers(&self, session_id: Uuid) -> Result<Vec<SessionAnswer>, AppError>;
}
