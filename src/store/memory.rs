// src/store/memory.rs

use std::{
    collections::{BTreeMap, HashMap},
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        quiz::{Answer, Question, Quiz},
        session::{AnswerWrite, SessionAnswer, SessionFilter, SessionView, remaining_seconds},
    },
    store::QuizStore,
};

#[derive(Debug, Clone)]
struct QuestionRow {
    content: String,
    code: Option<String>,
    code_language: Option<String>,
}

#[derive(Debug, Clone)]
struct SessionRow {
    uuid: Uuid,
    quiz_sha1: String,
    user_id: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Tables {
    /// Keyed by sha1; `questions` is always empty here.
    quizzes: HashMap<String, Quiz>,
    questions: HashMap<String, QuestionRow>,
    answers: HashMap<String, Answer>,
    /// quiz sha1 -> (question sha1, position)
    quiz_questions: HashMap<String, Vec<(String, i32)>>,
    /// question sha1 -> answer sha1s in source order
    question_answers: HashMap<String, Vec<String>>,
    sessions: HashMap<Uuid, SessionRow>,
    /// (session, question, answer) -> checked
    session_answers: BTreeMap<(Uuid, String, String), bool>,
}

impl Tables {
    fn versions_of(&self, filename: &str) -> impl Iterator<Item = &Quiz> {
        self.quizzes.values().filter(move |q| q.filename == filename)
    }

    fn activate_only(&mut self, filename: &str, version: i32) {
        for quiz in self.quizzes.values_mut().filter(|q| q.filename == filename) {
            quiz.active = quiz.version == version;
        }
    }

    fn quiz_contains(&self, quiz_sha1: &str, question_sha1: &str, answer_sha1: &str) -> bool {
        let has_question = self
            .quiz_questions
            .get(quiz_sha1)
            .is_some_and(|links| links.iter().any(|(sha1, _)| sha1 == question_sha1));
        let has_answer = self
            .question_answers
            .get(question_sha1)
            .is_some_and(|links| links.iter().any(|sha1| sha1 == answer_sha1));
        has_question && has_answer
    }

    fn session_view(&self, session: &SessionRow, now: DateTime<Utc>) -> Option<SessionView> {
        let quiz = self.quizzes.get(&session.quiz_sha1)?;

        let mut checked_answers = 0;
        let mut good_answers = 0;
        let facts = self
            .session_answers
            .range((session.uuid, String::new(), String::new())..)
            .take_while(|((uuid, _, _), _)| *uuid == session.uuid);
        for ((_, _, answer_sha1), checked) in facts {
            if !checked {
                continue;
            }
            checked_answers += 1;
            if self.answers.get(answer_sha1).is_some_and(|a| a.valid) {
                good_answers += 1;
            }
        }

        Some(SessionView {
            uuid: session.uuid,
            quiz_sha1: quiz.sha1.clone(),
            quiz_name: quiz.name.clone(),
            quiz_active: quiz.active,
            user_id: session.user_id.clone(),
            created_at: session.created_at,
            remaining_sec: remaining_seconds(quiz.duration, session.created_at, now),
            checked_answers,
            good_answers,
        })
    }

    fn matching_sessions(&self, filter: &SessionFilter) -> Vec<&SessionRow> {
        let mut sessions: Vec<&SessionRow> = self
            .sessions
            .values()
            .filter(|s| filter.user_id.as_deref().is_none_or(|user| s.user_id == user))
            .filter(|s| {
                self.quizzes
                    .get(&s.quiz_sha1)
                    .is_some_and(|q| q.active == filter.quiz_active)
            })
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.uuid.cmp(&b.uuid)));
        sessions
    }
}

fn page<T>(items: impl IntoIterator<Item = T>, limit: i64, offset: i64) -> Vec<T> {
    items
        .into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

/// In-process store with the same semantics as [`crate::store::PgStore`].
///
/// Every operation holds the table lock for its whole duration, which gives
/// the same atomicity the Postgres store gets from transactions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    writes: AtomicU64,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of mutating operations applied so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Makes every following write fail with `StorageFailure`, as a broken
    /// connection would.
    pub fn inject_write_failure(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn begin_write(&self) -> Result<(), AppError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::StorageFailure("injected write failure".to_string()));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl QuizStore for MemoryStore {
    async fn find_latest_version_by_filename(&self, filename: &str) -> Result<Option<Quiz>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables.versions_of(filename).max_by_key(|q| q.version).cloned())
    }

    async fn create_version(&self, quiz: &Quiz, previous_version: Option<i32>) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;

        let latest = tables.versions_of(&quiz.filename).map(|q| q.version).max();
        if latest != previous_version {
            return Err(AppError::Conflict(format!(
                "{} was modified concurrently",
                quiz.filename
            )));
        }
        match tables.quizzes.get(&quiz.sha1) {
            Some(existing) if existing.filename != quiz.filename => {
                return Err(AppError::Conflict(format!(
                    "content of {} is already published as {}",
                    quiz.filename, existing.filename
                )));
            }
            _ => {}
        }

        self.begin_write()?;

        let mut row = quiz.clone();
        row.questions = Vec::new();
        row.active = false;
        tables.quizzes.insert(quiz.sha1.clone(), row);

        for question in &quiz.questions {
            tables
                .questions
                .entry(question.sha1.clone())
                .or_insert_with(|| QuestionRow {
                    content: question.content.clone(),
                    code: question.code.clone(),
                    code_language: question.code_language.clone(),
                });
            let links = tables.quiz_questions.entry(quiz.sha1.clone()).or_default();
            if !links.iter().any(|(sha1, _)| *sha1 == question.sha1) {
                links.push((question.sha1.clone(), question.position));
            }

            for answer in &question.answers {
                tables
                    .answers
                    .entry(answer.sha1.clone())
                    .or_insert_with(|| answer.clone());
                let links = tables.question_answers.entry(question.sha1.clone()).or_default();
                if !links.contains(&answer.sha1) {
                    links.push(answer.sha1.clone());
                }
            }
        }

        tables.activate_only(&quiz.filename, quiz.version);
        Ok(())
    }

    async fn activate_only_version(&self, filename: &str, version: i32) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        if !tables.versions_of(filename).any(|q| q.version == version) {
            return Ok(false);
        }
        self.begin_write()?;
        tables.activate_only(filename, version);
        Ok(true)
    }

    async fn find_quiz_by_sha1(&self, sha1: &str) -> Result<Option<Quiz>, AppError> {
        Ok(self.tables.read().await.quizzes.get(sha1).cloned())
    }

    async fn find_full_quiz_by_sha1(&self, sha1: &str) -> Result<Option<Quiz>, AppError> {
        let tables = self.tables.read().await;
        let Some(mut quiz) = tables.quizzes.get(sha1).cloned() else {
            return Ok(None);
        };

        let mut links = tables.quiz_questions.get(sha1).cloned().unwrap_or_default();
        links.sort_by_key(|(_, position)| *position);

        for (question_sha1, position) in links {
            let Some(row) = tables.questions.get(&question_sha1) else {
                continue;
            };
            let answers = tables
                .question_answers
                .get(&question_sha1)
                .into_iter()
                .flatten()
                .filter_map(|answer_sha1| tables.answers.get(answer_sha1).cloned())
                .collect();
            quiz.questions.push(Question {
                sha1: question_sha1,
                position,
                content: row.content.clone(),
                code: row.code.clone(),
                code_language: row.code_language.clone(),
                answers,
            });
        }

        Ok(Some(quiz))
    }

    async fn find_active_quiz_by_filename(&self, filename: &str) -> Result<Option<Quiz>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables.versions_of(filename).find(|q| q.active).cloned())
    }

    async fn find_all_versions_by_filename(&self, filename: &str) -> Result<Vec<Quiz>, AppError> {
        let tables = self.tables.read().await;
        let mut versions: Vec<Quiz> = tables.versions_of(filename).cloned().collect();
        versions.sort_by(|a, b| b.version.cmp(&a.version));
        Ok(versions)
    }

    async fn find_all_active(&self, limit: i64, offset: i64) -> Result<Vec<Quiz>, AppError> {
        let tables = self.tables.read().await;
        let mut active: Vec<Quiz> = tables.quizzes.values().filter(|q| q.active).cloned().collect();
        active.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.filename.cmp(&b.filename)));
        Ok(page(active, limit, offset))
    }

    async fn count_all_active(&self) -> Result<i64, AppError> {
        let tables = self.tables.read().await;
        Ok(tables.quizzes.values().filter(|q| q.active).count() as i64)
    }

    async fn find_session_id(&self, quiz_sha1: &str, user_id: &str) -> Result<Option<Uuid>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .sessions
            .values()
            .find(|s| s.quiz_sha1 == quiz_sha1 && s.user_id == user_id)
            .map(|s| s.uuid))
    }

    async fn create_or_get_session(
        &self,
        quiz_sha1: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Uuid, AppError> {
        let mut tables = self.tables.write().await;

        if let Some(existing) = tables
            .sessions
            .values()
            .find(|s| s.quiz_sha1 == quiz_sha1 && s.user_id == user_id)
        {
            return Ok(existing.uuid);
        }
        if !tables.quizzes.contains_key(quiz_sha1) {
            return Err(AppError::InvalidArgument(format!(
                "quiz {} does not exist",
                quiz_sha1
            )));
        }

        self.begin_write()?;
        let uuid = Uuid::new_v4();
        tables.sessions.insert(
            uuid,
            SessionRow {
                uuid,
                quiz_sha1: quiz_sha1.to_string(),
                user_id: user_id.to_string(),
                created_at: now,
            },
        );
        Ok(uuid)
    }

    async fn record_session_answer(
        &self,
        answer: &SessionAnswer,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<AnswerWrite, AppError> {
        let mut tables = self.tables.write().await;

        let Some(session) = tables.sessions.get(&answer.session_uuid) else {
            return Ok(AnswerWrite::SessionNotFound);
        };
        if session.user_id != user_id {
            return Ok(AnswerWrite::SessionNotFound);
        }
        let Some(quiz) = tables.quizzes.get(&session.quiz_sha1) else {
            return Ok(AnswerWrite::SessionNotFound);
        };
        if remaining_seconds(quiz.duration, session.created_at, now) == 0 {
            return Ok(AnswerWrite::SessionExpired);
        }
        if !tables.quiz_contains(&quiz.sha1, &answer.question_sha1, &answer.answer_sha1) {
            return Ok(AnswerWrite::NotInQuiz);
        }

        self.begin_write()?;
        tables.session_answers.insert(
            (
                answer.session_uuid,
                answer.question_sha1.clone(),
                answer.answer_sha1.clone(),
            ),
            answer.checked,
        );
        Ok(AnswerWrite::Recorded)
    }

    async fn find_session_view(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionView>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .sessions
            .get(&session_id)
            .and_then(|s| tables.session_view(s, now)))
    }

    async fn find_all_session_views(
        &self,
        filter: &SessionFilter,
        limit: i64,
        offset: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<SessionView>, AppError> {
        let tables = self.tables.read().await;
        let views = tables
            .matching_sessions(filter)
            .into_iter()
            .filter_map(|s| tables.session_view(s, now));
        Ok(page(views, limit, offset))
    }

    async fn count_all_sessions(&self, filter: &SessionFilter) -> Result<i64, AppError> {
        let tables = self.tables.read().await;
        Ok(tables.matching_sessions(filter).len() as i64)
    }

    async fn find_user_session_views(
        &self,
        user_id: &str,
        quiz_sha1s: &[String],
        now: DateTime<Utc>,
    ) -> Result<Vec<SessionView>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .sessions
            .values()
            .filter(|s| s.user_id == user_id && quiz_sha1s.contains(&s.quiz_sha1))
            .filter_map(|s| tables.session_view(s, now))
            .collect())
    }

    async fn find_session_answers(&self, session_id: Uuid) -> Result<Vec<SessionAnswer>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .session_answers
            .range((session_id, String::new(), String::new())..)
            .take_while(|((uuid, _, _), _)| *uuid == session_id)
            .map(|((uuid, question_sha1, answer_sha1), checked)| SessionAnswer {
                session_uuid: *uuid,
                question_sha1: question_sha1.clone(),
                answer_sha1: answer_sha1.clone(),
                checked: *checked,
            })
            .collect())
    }
}
