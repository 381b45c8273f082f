// src/store/postgres.rs

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        quiz::{Answer, Question, Quiz},
        session::{AnswerWrite, SessionAnswer, SessionFilter, SessionView, remaining_seconds},
    },
    store::QuizStore,
};

const QUIZ_COLUMNS: &str = "sha1, filename, name, duration, version, active, created_at";

/// Session joined with its quiz; remaining time and score are computed at
/// query time from `$1` (now). Callers append the WHERE and GROUP BY clauses.
const SESSION_VIEW_SELECT: &str = r#"
    SELECT
        s.uuid,
        s.quiz_sha1,
        q.name AS quiz_name,
        q.active AS quiz_active,
        s.user_id,
        s.created_at,
        GREATEST(
            LEAST(
                q.duration::BIGINT - FLOOR(EXTRACT(EPOCH FROM ($1 - s.created_at)))::BIGINT,
                q.duration::BIGINT
            ),
            0
        )::INTEGER AS remaining_sec,
        COUNT(sa.answer_sha1) FILTER (WHERE sa.checked) AS checked_answers,
        COUNT(sa.answer_sha1) FILTER (WHERE sa.checked AND a.valid) AS good_answers
    FROM session s
    JOIN quiz q ON q.sha1 = s.quiz_sha1
    LEFT JOIN session_answer sa ON sa.session_uuid = s.uuid
    LEFT JOIN answer a ON a.sha1 = sa.answer_sha1
"#;

/// Helper struct for fetching answers together with the question they belong to.
#[derive(FromRow)]
struct LinkedAnswer {
    question_sha1: String,
    sha1: String,
    content: String,
    valid: bool,
}

/// Helper struct for the session row locked while an answer is written.
#[derive(FromRow)]
struct SessionClock {
    user_id: String,
    quiz_sha1: String,
    created_at: DateTime<Utc>,
    duration: i32,
}

/// Postgres-backed store. Schema lives in `migrations/`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Flips the active flag so only `version` stays active for `filename`.
/// Deactivation runs first so the partial unique index never sees two active rows.
async fn activate_only(
    tx: &mut Transaction<'_, Postgres>,
    filename: &str,
    version: i32,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE quiz SET active = FALSE WHERE filename = $1 AND version <> $2 AND active")
        .bind(filename)
        .bind(version)
        .execute(&mut **tx)
        .await?;

    sqlx::query("UPDATE quiz SET active = TRUE WHERE filename = $1 AND version = $2")
        .bind(filename)
        .bind(version)
        .execute(&mut **tx)
        .await?;

    Ok(())
}

async fn insert_questions(tx: &mut Transaction<'_, Postgres>, quiz: &Quiz) -> Result<(), sqlx::Error> {
    for question in &quiz.questions {
        sqlx::query(
            r#"
            INSERT INTO question (sha1, content, code, code_language)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (sha1) DO NOTHING
            "#,
        )
        .bind(&question.sha1)
        .bind(&question.content)
        .bind(&question.code)
        .bind(&question.code_language)
        .execute(&mut **tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO quiz_question (quiz_sha1, question_sha1, position)
            VALUES ($1, $2, $3)
            ON CONFLICT (quiz_sha1, question_sha1) DO NOTHING
            "#,
        )
        .bind(&quiz.sha1)
        .bind(&question.sha1)
        .bind(question.position)
        .execute(&mut **tx)
        .await?;

        for (answer, position) in question.answers.iter().zip(1i32..) {
            sqlx::query(
                r#"
                INSERT INTO answer (sha1, content, valid)
                VALUES ($1, $2, $3)
                ON CONFLICT (sha1) DO NOTHING
                "#,
            )
            .bind(&answer.sha1)
            .bind(&answer.content)
            .bind(answer.valid)
            .execute(&mut **tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO question_answer (question_sha1, answer_sha1, position)
                VALUES ($1, $2, $3)
                ON CONFLICT (question_sha1, answer_sha1) DO NOTHING
                "#,
            )
            .bind(&question.sha1)
            .bind(&answer.sha1)
            .bind(position)
            .execute(&mut **tx)
            .await?;
        }
    }

    Ok(())
}

#[async_trait]
impl QuizStore for PgStore {
    async fn find_latest_version_by_filename(&self, filename: &str) -> Result<Option<Quiz>, AppError> {
        let quiz = sqlx::query_as::<_, Quiz>(&format!(
            "SELECT {} FROM quiz WHERE filename = $1 ORDER BY version DESC LIMIT 1",
            QUIZ_COLUMNS
        ))
        .bind(filename)
        .fetch_optional(&self.pool)
        .await?;

        Ok(quiz)
    }

    async fn create_version(&self, quiz: &Quiz, previous_version: Option<i32>) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        // Serialises writers of the same filename until commit.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&quiz.filename)
            .execute(&mut *tx)
            .await?;

        let latest: Option<i32> = sqlx::query_scalar("SELECT MAX(version) FROM quiz WHERE filename = $1")
            .bind(&quiz.filename)
            .fetch_one(&mut *tx)
            .await?;
        if latest != previous_version {
            return Err(AppError::Conflict(format!(
                "{} was modified concurrently",
                quiz.filename
            )));
        }

        let owner: Option<String> = sqlx::query_scalar("SELECT filename FROM quiz WHERE sha1 = $1")
            .bind(&quiz.sha1)
            .fetch_optional(&mut *tx)
            .await?;

        match owner {
            Some(other) if other != quiz.filename => {
                return Err(AppError::Conflict(format!(
                    "content of {} is already published as {}",
                    quiz.filename, other
                )));
            }
            Some(_) => {
                sqlx::query(
                    r#"
                    UPDATE quiz
                    SET name = $2, duration = $3, version = $4, created_at = $5
                    WHERE sha1 = $1
                    "#,
                )
                .bind(&quiz.sha1)
                .bind(&quiz.name)
                .bind(quiz.duration)
                .bind(quiz.version)
                .bind(quiz.created_at)
                .execute(&mut *tx)
                .await?;
            }
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO quiz (sha1, filename, name, duration, version, active, created_at)
                    VALUES ($1, $2, $3, $4, $5, FALSE, $6)
                    "#,
                )
                .bind(&quiz.sha1)
                .bind(&quiz.filename)
                .bind(&quiz.name)
                .bind(quiz.duration)
                .bind(quiz.version)
                .bind(quiz.created_at)
                .execute(&mut *tx)
                .await?;
            }
        }

        insert_questions(&mut tx, quiz).await?;
        activate_only(&mut tx, &quiz.filename, quiz.version).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn activate_only_version(&self, filename: &str, version: i32) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(filename)
            .execute(&mut *tx)
            .await?;

        let exists: Option<i32> =
            sqlx::query_scalar("SELECT 1 FROM quiz WHERE filename = $1 AND version = $2")
                .bind(filename)
                .bind(version)
                .fetch_optional(&mut *tx)
                .await?;
        if exists.is_none() {
            return Ok(false);
        }

        activate_only(&mut tx, filename, version).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn find_quiz_by_sha1(&self, sha1: &str) -> Result<Option<Quiz>, AppError> {
        let quiz = sqlx::query_as::<_, Quiz>(&format!("SELECT {} FROM quiz WHERE sha1 = $1", QUIZ_COLUMNS))
            .bind(sha1)
            .fetch_optional(&self.pool)
            .await?;

        Ok(quiz)
    }

    async fn find_full_quiz_by_sha1(&self, sha1: &str) -> Result<Option<Quiz>, AppError> {
        let Some(mut quiz) = self.find_quiz_by_sha1(sha1).await? else {
            return Ok(None);
        };

        quiz.questions = sqlx::query_as::<_, Question>(
            r#"
            SELECT q.sha1, qq.position, q.content, q.code, q.code_language
            FROM quiz_question qq
            JOIN question q ON q.sha1 = qq.question_sha1
            WHERE qq.quiz_sha1 = $1
            ORDER BY qq.position
            "#,
        )
        .bind(sha1)
        .fetch_all(&self.pool)
        .await?;

        let linked = sqlx::query_as::<_, LinkedAnswer>(
            r#"
            SELECT qa.question_sha1, a.sha1, a.content, a.valid
            FROM quiz_question qq
            JOIN question_answer qa ON qa.question_sha1 = qq.question_sha1
            JOIN answer a ON a.sha1 = qa.answer_sha1
            WHERE qq.quiz_sha1 = $1
            ORDER BY qa.question_sha1, qa.position
            "#,
        )
        .bind(sha1)
        .fetch_all(&self.pool)
        .await?;

        let mut by_question: HashMap<String, Vec<Answer>> = HashMap::new();
        for row in linked {
            by_question.entry(row.question_sha1).or_default().push(Answer {
                sha1: row.sha1,
                content: row.content,
                valid: row.valid,
            });
        }
        for question in &mut quiz.questions {
            question.answers = by_question.remove(&question.sha1).unwrap_or_default();
        }

        Ok(Some(quiz))
    }

    async fn find_active_quiz_by_filename(&self, filename: &str) -> Result<Option<Quiz>, AppError> {
        let quiz = sqlx::query_as::<_, Quiz>(&format!(
            "SELECT {} FROM quiz WHERE filename = $1 AND active",
            QUIZ_COLUMNS
        ))
        .bind(filename)
        .fetch_optional(&self.pool)
        .await?;

        Ok(quiz)
    }

    async fn find_all_versions_by_filename(&self, filename: &str) -> Result<Vec<Quiz>, AppError> {
        let quizzes = sqlx::query_as::<_, Quiz>(&format!(
            "SELECT {} FROM quiz WHERE filename = $1 ORDER BY version DESC",
            QUIZ_COLUMNS
        ))
        .bind(filename)
        .fetch_all(&self.pool)
        .await?;

        Ok(quizzes)
    }

    async fn find_all_active(&self, limit: i64, offset: i64) -> Result<Vec<Quiz>, AppError> {
        let quizzes = sqlx::query_as::<_, Quiz>(&format!(
            "SELECT {} FROM quiz WHERE active ORDER BY name, filename LIMIT $1 OFFSET $2",
            QUIZ_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(quizzes)
    }

    async fn count_all_active(&self) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM quiz WHERE active")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn find_session_id(&self, quiz_sha1: &str, user_id: &str) -> Result<Option<Uuid>, AppError> {
        let uuid = sqlx::query_scalar("SELECT uuid FROM session WHERE quiz_sha1 = $1 AND user_id = $2")
            .bind(quiz_sha1)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(uuid)
    }

    async fn create_or_get_session(
        &self,
        quiz_sha1: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Uuid, AppError> {
        sqlx::query(
            r#"
            INSERT INTO session (uuid, quiz_sha1, user_id, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (quiz_sha1, user_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(quiz_sha1)
        .bind(user_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let uuid = sqlx::query_scalar("SELECT uuid FROM session WHERE quiz_sha1 = $1 AND user_id = $2")
            .bind(quiz_sha1)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(uuid)
    }

    async fn record_session_answer(
        &self,
        answer: &SessionAnswer,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<AnswerWrite, AppError> {
        let mut tx = self.pool.begin().await?;

        let session = sqlx::query_as::<_, SessionClock>(
            r#"
            SELECT s.user_id, s.quiz_sha1, s.created_at, q.duration
            FROM session s
            JOIN quiz q ON q.sha1 = s.quiz_sha1
            WHERE s.uuid = $1
            FOR SHARE OF s
            "#,
        )
        .bind(answer.session_uuid)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(session) = session else {
            return Ok(AnswerWrite::SessionNotFound);
        };
        if session.user_id != user_id {
            return Ok(AnswerWrite::SessionNotFound);
        }
        if remaining_seconds(session.duration, session.created_at, now) == 0 {
            return Ok(AnswerWrite::SessionExpired);
        }

        let belongs: Option<i32> = sqlx::query_scalar(
            r#"
            SELECT 1
            FROM quiz_question qq
            JOIN question_answer qa ON qa.question_sha1 = qq.question_sha1
            WHERE qq.quiz_sha1 = $1 AND qq.question_sha1 = $2 AND qa.answer_sha1 = $3
            "#,
        )
        .bind(&session.quiz_sha1)
        .bind(&answer.question_sha1)
        .bind(&answer.answer_sha1)
        .fetch_optional(&mut *tx)
        .await?;
        if belongs.is_none() {
            return Ok(AnswerWrite::NotInQuiz);
        }

        sqlx::query(
            r#"
            INSERT INTO session_answer (session_uuid, question_sha1, answer_sha1, checked, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (session_uuid, question_sha1, answer_sha1) DO UPDATE SET
                checked = EXCLUDED.checked,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(answer.session_uuid)
        .bind(&answer.question_sha1)
        .bind(&answer.answer_sha1)
        .bind(answer.checked)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(AnswerWrite::Recorded)
    }

    async fn find_session_view(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionView>, AppError> {
        let view = sqlx::query_as::<_, SessionView>(&format!(
            "{} WHERE s.uuid = $2 GROUP BY s.uuid, q.sha1",
            SESSION_VIEW_SELECT
        ))
        .bind(now)
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(view)
    }

    async fn find_all_session_views(
        &self,
        filter: &SessionFilter,
        limit: i64,
        offset: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<SessionView>, AppError> {
        let views = sqlx::query_as::<_, SessionView>(&format!(
            r#"{}
            WHERE q.active = $2 AND ($3::TEXT IS NULL OR s.user_id = $3)
            GROUP BY s.uuid, q.sha1
            ORDER BY s.created_at DESC, s.uuid
            LIMIT $4 OFFSET $5"#,
            SESSION_VIEW_SELECT
        ))
        .bind(now)
        .bind(filter.quiz_active)
        .bind(filter.user_id.as_deref())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(views)
    }

    async fn find_user_session_views(
        &self,
        user_id: &str,
        quiz_sha1s: &[String],
        now: DateTime<Utc>,
    ) -> Result<Vec<SessionView>, AppError> {
        if quiz_sha1s.is_empty() {
            return Ok(Vec::new());
        }

        let views = sqlx::query_as::<_, SessionView>(&format!(
            "{} WHERE s.user_id = $2 AND s.quiz_sha1 = ANY($3) GROUP BY s.uuid, q.sha1",
            SESSION_VIEW_SELECT
        ))
        .bind(now)
        .bind(user_id)
        .bind(quiz_sha1s)
        .fetch_all(&self.pool)
        .await?;

        Ok(views)
    }

    async fn count_all_sessions(&self, filter: &SessionFilter) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM session s
            JOIN quiz q ON q.sha1 = s.quiz_sha1
            WHERE q.active = $1 AND ($2::TEXT IS NULL OR s.user_id = $2)
            "#,
        )
        .bind(filter.quiz_active)
        .bind(filter.user_id.as_deref())
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn find_session_answers(&self, session_id: Uuid) -> Result<Vec<SessionAnswer>, AppError> {
        let answers = sqlx::query_as::<_, SessionAnswer>(
            r#"
            SELECT session_uuid, question_sha1, answer_sha1, checked
            FROM session_answer
            WHERE session_uuid = $1
            ORDER BY question_sha1, answer_sha1
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(answers)
    }
}
