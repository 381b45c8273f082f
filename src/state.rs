use std::sync::Arc;

use axum::extract::FromRef;

use crate::{
    config::Config,
    services::{
        session::SessionService,
        sync::{DirectorySource, SyncService},
        versioning::QuizService,
    },
    store::DynStore,
    utils::clock::Clock,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub quizzes: QuizService,
    pub sessions: SessionService,
    /// `None` when no quiz source is configured.
    pub sync: Option<Arc<SyncService>>,
}

impl AppState {
    /// Wires the services over one store and one clock.
    pub fn new(config: Config, store: DynStore, clock: Arc<dyn Clock>) -> Self {
        let quizzes = QuizService::new(store.clone(), clock.clone());
        let sessions = SessionService::new(store, clock);
        let sync = config.quiz_dir.as_ref().map(|dir| {
            let source = DirectorySource::new(dir, config.quiz_suffix.clone());
            Arc::new(SyncService::new(quizzes.clone(), Arc::new(source)))
        });

        Self {
            config,
            quizzes,
            sessions,
            sync,
        }
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for QuizService {
    fn from_ref(state: &AppState) -> Self {
        state.quizzes.clone()
    }
}

impl FromRef<AppState> for SessionService {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}
