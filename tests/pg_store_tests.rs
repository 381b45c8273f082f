// tests/pg_store_tests.rs
//
// Runs against a real database when DATABASE_URL is set, and is a no-op otherwise.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use quiz_backend::{
    error::AppError,
    models::{quiz::ReconcileOutcome, user::Role, user::Viewer},
    services::{parser::parse, session::SessionService, versioning::QuizService},
    store::{PgStore, QuizStore},
    utils::{
        clock::{Clock, ManualClock},
        hash::sha1_hex,
    },
};
use sqlx::postgres::PgPoolOptions;

async fn pg_store() -> Option<Arc<PgStore>> {
    let database_url = std::env::var("DATABASE_URL").ok()?;

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    Some(Arc::new(PgStore::new(pool)))
}

/// Unique filename and content so runs do not collide in a shared database.
fn unique_quiz(minutes: u32) -> (String, String) {
    let tag = uuid::Uuid::new_v4().simple().to_string();
    let filename = format!("{}.quiz.md", tag);
    let raw = format!(
        "# Quiz {} (duration: {}min)\nQ {}?\n- [x] Yes {}\n- [ ] No {}\n",
        tag, minutes, tag, tag, tag
    );
    (filename, raw)
}

#[tokio::test]
async fn pg_versioning_keeps_one_active_version() {
    let Some(store) = pg_store().await else {
        return;
    };
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let quizzes = QuizService::new(store.clone(), clock);

    let (filename, v1) = unique_quiz(1);
    let (_, v2) = unique_quiz(2);

    let outcome = quizzes.reconcile(parse(&filename, &v1).unwrap()).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Created);
    let outcome = quizzes.reconcile(parse(&filename, &v1).unwrap()).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Unchanged);
    let outcome = quizzes.reconcile(parse(&filename, &v2).unwrap()).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Updated);

    let versions = store.find_all_versions_by_filename(&filename).await.unwrap();
    assert_eq!(versions.iter().map(|q| q.version).collect::<Vec<_>>(), vec![2, 1]);
    assert_eq!(versions.iter().filter(|q| q.active).count(), 1);
    assert!(versions[0].active);

    // Revert moves the old row forward
    quizzes.reconcile(parse(&filename, &v1).unwrap()).await.unwrap();
    let active = store.find_active_quiz_by_filename(&filename).await.unwrap().unwrap();
    assert_eq!(active.version, 3);
    assert_eq!(active.sha1, sha1_hex(&v1));

    let full = store.find_full_quiz_by_sha1(&active.sha1).await.unwrap().unwrap();
    assert_eq!(full.questions.len(), 1);
    assert_eq!(full.questions[0].answers.len(), 2);
    assert!(full.questions[0].answers[0].valid);
}

#[tokio::test]
async fn pg_stale_previous_version_conflicts() {
    let Some(store) = pg_store().await else {
        return;
    };
    let (filename, v1) = unique_quiz(1);
    let quiz = parse(&filename, &v1).unwrap().into_quiz(1, Utc::now());

    store.create_version(&quiz, None).await.unwrap();
    let err = store.create_version(&quiz, None).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn pg_session_expiry_and_scoring() {
    let Some(store) = pg_store().await else {
        return;
    };
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap()));
    let quizzes = QuizService::new(store.clone(), clock.clone());
    let sessions = SessionService::new(store.clone(), clock.clone());

    let (filename, raw) = unique_quiz(1);
    let parsed = parse(&filename, &raw).unwrap();
    let quiz_sha1 = parsed.sha1.clone();
    let question = parsed.questions[0].clone();
    quizzes.reconcile(parsed).await.unwrap();

    let user = format!("user-{}", uuid::Uuid::new_v4());
    let viewer = Viewer::new(user.clone(), Role::Student);
    let id = sessions.start_session(&user, &quiz_sha1).await.unwrap();
    assert_eq!(sessions.start_session(&user, &quiz_sha1).await.unwrap(), id);

    for answer in &question.answers {
        sessions
            .add_session_answer(id, &user, &question.sha1, &answer.sha1, true)
            .await
            .unwrap();
    }

    clock.advance(Duration::seconds(30));
    let running = sessions.find_session(id, &viewer).await.unwrap();
    assert_eq!(running.remaining_sec, 30);
    assert!(running.result.is_none());

    clock.advance(Duration::seconds(30));
    let err = sessions
        .add_session_answer(id, &user, &question.sha1, &question.answers[0].sha1, false)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidArgument(_)));

    let expired = sessions.find_session(id, &viewer).await.unwrap();
    let result = expired.result.unwrap();
    assert_eq!(result.good_answer, 1);
    assert_eq!(result.total_answer, 2);

    let views = store
        .find_user_session_views(&user, &[quiz_sha1.clone()], clock.now())
        .await
        .unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].uuid, id);
    assert_eq!(views[0].good_answers, 1);
    assert!(
        store
            .find_user_session_views("nobody", &[quiz_sha1], clock.now())
            .await
            .unwrap()
            .is_empty()
    );
}
