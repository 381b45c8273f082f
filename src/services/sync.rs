// src/services/sync.rs

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    error::AppError,
    models::sync::{SourceFile, SyncStats},
    services::{parser, versioning::QuizService},
};

/// Hands over the current set of quiz source files.
///
/// Fetching (e.g. pulling a git repository) happens behind this seam; the
/// sync only ever sees filenames and raw contents.
#[async_trait]
pub trait QuizSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<SourceFile>, AppError>;
}

/// Reads every `*suffix` file directly under `root`.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
    suffix: String,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>, suffix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            suffix: suffix.into(),
        }
    }
}

#[async_trait]
impl QuizSource for DirectorySource {
    async fn fetch(&self) -> Result<Vec<SourceFile>, AppError> {
        let mut entries = tokio::fs::read_dir(&self.root).await.map_err(|e| {
            AppError::StorageFailure(format!("cannot read {}: {}", self.root.display(), e))
        })?;

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AppError::StorageFailure(e.to_string()))?
        {
            let Ok(filename) = entry.file_name().into_string() else {
                continue;
            };
            if !filename.ends_with(&self.suffix) {
                continue;
            }
            let is_file = entry
                .file_type()
                .await
                .map_err(|e| AppError::StorageFailure(e.to_string()))?
                .is_file();
            if !is_file {
                continue;
            }

            let content = tokio::fs::read_to_string(entry.path())
                .await
                .map_err(|e| AppError::StorageFailure(format!("cannot read {}: {}", filename, e)))?;
            files.push(SourceFile::new(filename, content));
        }

        files.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(files)
    }
}

/// Runs the fetch, parse and reconcile pipeline over a whole batch.
pub struct SyncService {
    quizzes: QuizService,
    source: Arc<dyn QuizSource>,
    running: Mutex<()>,
}

impl SyncService {
    pub fn new(quizzes: QuizService, source: Arc<dyn QuizSource>) -> Self {
        Self {
            quizzes,
            source,
            running: Mutex::new(()),
        }
    }

    /// Fetches the sources and reconciles every file. Runs never overlap.
    pub async fn sync(&self) -> Result<SyncStats, AppError> {
        let _running = self.running.lock().await;
        let files = self.source.fetch().await?;
        tracing::info!("Syncing {} quiz files", files.len());
        self.reconcile_all(files).await
    }

    /// Files that fail to parse, or that the store rejects (e.g. content
    /// already owned by another file), are skipped and counted. A storage
    /// failure stops the batch.
    async fn reconcile_all(&self, files: Vec<SourceFile>) -> Result<SyncStats, AppError> {
        let mut stats = SyncStats::default();

        for file in files {
            let parsed = match parser::parse(&file.filename, &file.content) {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", file.filename, e);
                    stats.failed += 1;
                    continue;
                }
            };

            match self.quizzes.reconcile(parsed).await {
                Ok(outcome) => stats.record(outcome),
                Err(e) if e.is_client_error() => {
                    tracing::warn!("Skipping {}: {}", file.filename, e);
                    stats.failed += 1;
                }
                Err(e) => {
                    tracing::error!("Sync aborted at {}: {} ({:?} so far)", file.filename, e, stats);
                    return Err(e);
                }
            }
        }

        if stats.has_changes() {
            tracing::info!(
                "Quizzes synced ({} created, {} updated, {} unchanged, {} failed)",
                stats.created,
                stats.updated,
                stats.unchanged,
                stats.failed
            );
        } else {
            tracing::info!("Quizzes synced, no changes ({} failed)", stats.failed);
        }

        Ok(stats)
    }
}
