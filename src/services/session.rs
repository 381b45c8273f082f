// src/services/session.rs

use std::{collections::HashMap, sync::Arc};

use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        page::{Page, PageParams},
        session::{AnswerWrite, QuizSession, Session, SessionAnswer, SessionFilter},
        user::Viewer,
    },
    store::DynStore,
    utils::{clock::Clock, hash::is_sha1_hex},
};

/// Timed attempts at quizzes.
///
/// A session runs from its creation until `created_at + duration`; there is
/// no close operation. Remaining time is recomputed from the clock on every
/// read and every write.
#[derive(Clone)]
pub struct SessionService {
    store: DynStore,
    clock: Arc<dyn Clock>,
}

impl SessionService {
    pub fn new(store: DynStore, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Starts the session of `user_id` on a quiz, or returns the one already started.
    pub async fn start_session(&self, user_id: &str, quiz_sha1: &str) -> Result<Uuid, AppError> {
        if !is_sha1_hex(quiz_sha1) {
            return Err(AppError::InvalidArgument(format!("invalid quiz sha1: {}", quiz_sha1)));
        }
        if let Some(existing) = self.store.find_session_id(quiz_sha1, user_id).await? {
            return Ok(existing);
        }

        let quiz = self
            .store
            .find_quiz_by_sha1(quiz_sha1)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("quiz with sha1: {} was not found.", quiz_sha1)))?;
        if !quiz.active {
            return Err(AppError::InvalidArgument(format!(
                "quiz {} version {} is no longer active",
                quiz.filename, quiz.version
            )));
        }

        let session_id = self
            .store
            .create_or_get_session(quiz_sha1, user_id, self.clock.now())
            .await?;
        tracing::info!("User {} started session {} on quiz {}", user_id, session_id, quiz.filename);

        Ok(session_id)
    }

    /// Records that `user_id` checked or unchecked one answer.
    ///
    /// Rejected once the session is over, and when the question or answer is
    /// not part of the session's quiz.
    pub async fn add_session_answer(
        &self,
        session_id: Uuid,
        user_id: &str,
        question_sha1: &str,
        answer_sha1: &str,
        checked: bool,
    ) -> Result<(), AppError> {
        if !is_sha1_hex(question_sha1) || !is_sha1_hex(answer_sha1) {
            return Err(AppError::InvalidArgument("invalid question or answer sha1".to_string()));
        }

        let answer = SessionAnswer {
            session_uuid: session_id,
            question_sha1: question_sha1.to_string(),
            answer_sha1: answer_sha1.to_string(),
            checked,
        };

        match self
            .store
            .record_session_answer(&answer, user_id, self.clock.now())
            .await?
        {
            AnswerWrite::Recorded => Ok(()),
            AnswerWrite::SessionNotFound => Err(AppError::NotFound(format!(
                "session {} was not found.",
                session_id
            ))),
            AnswerWrite::SessionExpired => {
                tracing::warn!("Rejected answer for expired session {}", session_id);
                Err(AppError::InvalidArgument("session is over".to_string()))
            }
            AnswerWrite::NotInQuiz => Err(AppError::InvalidArgument(format!(
                "answer {} of question {} is not part of this quiz",
                answer_sha1, question_sha1
            ))),
        }
    }

    /// One session. Non-admins can only read their own.
    pub async fn find_session(&self, session_id: Uuid, viewer: &Viewer) -> Result<Session, AppError> {
        let view = self
            .store
            .find_session_view(session_id, self.clock.now())
            .await?
            .filter(|v| viewer.is_admin() || v.user_id == viewer.user_id)
            .ok_or_else(|| AppError::NotFound(format!("session {} was not found.", session_id)))?;

        Ok(view.into())
    }

    /// Sessions on active (or inactive) quizzes.
    ///
    /// Admins may list everyone's sessions or pick one user; everyone else
    /// only gets their own.
    pub async fn find_all_sessions(
        &self,
        quiz_active: bool,
        user_id: Option<String>,
        viewer: &Viewer,
        page: PageParams,
    ) -> Result<Page<Session>, AppError> {
        let filter = SessionFilter {
            quiz_active,
            user_id: if viewer.is_admin() {
                user_id
            } else {
                Some(viewer.user_id.clone())
            },
        };
        let (limit, offset) = page.bounds();

        let items = self
            .store
            .find_all_session_views(&filter, limit, offset, self.clock.now())
            .await?;
        let total = self.store.count_all_sessions(&filter).await?;

        Ok(Page { items, total }.map(Session::from))
    }

    /// The active catalogue with the caller's own session on each quiz.
    pub async fn find_all_quiz_sessions(
        &self,
        viewer: &Viewer,
        page: PageParams,
    ) -> Result<Page<QuizSession>, AppError> {
        let (limit, offset) = page.bounds();
        let quizzes = self.store.find_all_active(limit, offset).await?;
        let total = self.store.count_all_active().await?;

        let sha1s: Vec<String> = quizzes.iter().map(|q| q.sha1.clone()).collect();
        let mut sessions: HashMap<String, Session> = self
            .store
            .find_user_session_views(&viewer.user_id, &sha1s, self.clock.now())
            .await?
            .into_iter()
            .map(|view| (view.quiz_sha1.clone(), Session::from(view)))
            .collect();

        Ok(Page {
            items: quizzes,
            total,
        }
        .map(|quiz| {
            let session = sessions.remove(&quiz.sha1);
            QuizSession { quiz, session }
        }))
    }

    /// Raw answer facts of a session, for restoring a client's checkboxes.
    pub async fn find_session_answers(
        &self,
        session_id: Uuid,
        viewer: &Viewer,
    ) -> Result<Vec<SessionAnswer>, AppError> {
        self.find_session(session_id, viewer).await?;
        self.store.find_session_answers(session_id).await
    }
}
