// src/services/versioning.rs

use std::sync::Arc;

use crate::{
    error::AppError,
    models::{
        page::{Page, PageParams},
        quiz::{Quiz, QuizDetail, ReconcileOutcome},
        user::Viewer,
    },
    services::parser::ParsedQuiz,
    store::DynStore,
    utils::clock::Clock,
};

/// Quiz catalogue and the versioning rules applied when sources change.
#[derive(Clone)]
pub struct QuizService {
    store: DynStore,
    clock: Arc<dyn Clock>,
}

impl QuizService {
    pub fn new(store: DynStore, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Decides whether a freshly parsed quiz is new, a new version, or unchanged.
    ///
    /// * No stored version for the filename: stored as version 1, active.
    /// * Latest stored version has another hash: stored as latest + 1 and made
    ///   the only active version, in one store transaction.
    /// * Same hash as the latest version: nothing is written.
    pub async fn reconcile(&self, parsed: ParsedQuiz) -> Result<ReconcileOutcome, AppError> {
        let latest = self
            .store
            .find_latest_version_by_filename(&parsed.filename)
            .await?;

        match latest {
            None => {
                let quiz = parsed.into_quiz(1, self.clock.now());
                tracing::info!("Creating quiz {}", quiz.filename);
                self.store.create_version(&quiz, None).await?;
                Ok(ReconcileOutcome::Created)
            }
            Some(latest) if latest.sha1 == parsed.sha1 => {
                tracing::debug!("Quiz {} is unchanged (version {})", latest.filename, latest.version);
                Ok(ReconcileOutcome::Unchanged)
            }
            Some(latest) => {
                let quiz = parsed.into_quiz(latest.version + 1, self.clock.now());
                tracing::info!("Updating quiz {} to version {}", quiz.filename, quiz.version);
                self.store.create_version(&quiz, Some(latest.version)).await?;
                Ok(ReconcileOutcome::Updated)
            }
        }
    }

    /// Active quizzes, one page at a time.
    pub async fn list_active(&self, page: PageParams) -> Result<Page<Quiz>, AppError> {
        let (limit, offset) = page.bounds();
        let items = self.store.find_all_active(limit, offset).await?;
        let total = self.store.count_all_active().await?;
        Ok(Page { items, total })
    }

    /// Full quiz. Answer validity is only shown to admins.
    pub async fn get_quiz(&self, sha1: &str, viewer: &Viewer) -> Result<QuizDetail, AppError> {
        let quiz = self
            .store
            .find_full_quiz_by_sha1(sha1)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("quiz with sha1: {} was not found.", sha1)))?;

        if viewer.is_admin() {
            Ok(QuizDetail::Full(quiz))
        } else {
            Ok(QuizDetail::Public(quiz.into()))
        }
    }

    /// Every stored version of a source file, newest first.
    ///
    /// Content is keyed by its sha1, so reverting a file to earlier content
    /// renumbers that earlier row as the newest version rather than storing a
    /// copy. Its former number no longer appears here (A, B, A lists 3 and 2).
    pub async fn list_versions(&self, filename: &str) -> Result<Vec<Quiz>, AppError> {
        let versions = self.store.find_all_versions_by_filename(filename).await?;
        if versions.is_empty() {
            return Err(AppError::NotFound(format!("no quiz stored for {}", filename)));
        }
        Ok(versions)
    }

    /// Serves an existing version again (rollback or roll forward).
    pub async fn activate_version(&self, filename: &str, version: i32) -> Result<Quiz, AppError> {
        if !self.store.activate_only_version(filename, version).await? {
            return Err(AppError::NotFound(format!(
                "{} has no version {}",
                filename, version
            )));
        }
        tracing::info!("Activated version {} of quiz {}", version, filename);

        self.store
            .find_active_quiz_by_filename(filename)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("no active version of {}", filename)))
    }
}
