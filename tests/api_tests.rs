// tests/api_tests.rs

use std::{path::PathBuf, sync::Arc};

use chrono::{Duration, TimeZone, Utc};
use quiz_backend::{
    config::{Config, DEFAULT_QUIZ_SUFFIX},
    models::user::{Role, Viewer},
    routes,
    state::AppState,
    store::MemoryStore,
    utils::{clock::ManualClock, hash::sha1_hex, jwt::sign_jwt},
};
use serde_json::Value;

const JWT_SECRET: &str = "test_secret_for_integration_tests";

const SAMPLE: &str = "# Sample (duration: 1min)\nQ1?\n- [x] Yes\n- [ ] No\n";
const SAMPLE_V2: &str = "# Sample (duration: 2min)\nQ1?\n- [x] Yes\n- [ ] No\n---\nQ2?\n- [x] a\n";

struct TestApp {
    address: String,
    clock: Arc<ManualClock>,
    quiz_dir: PathBuf,
    client: reqwest::Client,
}

impl TestApp {
    fn token(&self, user_id: &str, role: &str) -> String {
        sign_jwt(&Viewer::new(user_id, Role::parse(role)), JWT_SECRET, 600).expect("Failed to sign token")
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    fn write_quiz(&self, filename: &str, content: &str) {
        std::fs::write(self.quiz_dir.join(filename), content).expect("Failed to write quiz file");
    }

    async fn get(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request")
    }

    async fn sync(&self) -> Value {
        let response = self
            .client
            .post(self.url("/api/admin/sync"))
            .bearer_auth(self.token("root", "admin"))
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status().as_u16(), 200);
        response.json().await.unwrap()
    }

    async fn start_session(&self, token: &str, quiz_sha1: &str) -> reqwest::Response {
        self.client
            .post(self.url("/api/sessions"))
            .bearer_auth(token)
            .json(&serde_json::json!({ "quiz_sha1": quiz_sha1 }))
            .send()
            .await
            .expect("Failed to execute request")
    }

    async fn put_answer(&self, token: &str, session_id: &str, answer_line: &str) -> u16 {
        self.client
            .put(self.url(&format!("/api/sessions/{}/answers", session_id)))
            .bearer_auth(token)
            .json(&serde_json::json!({
                "question_sha1": sha1_hex("Q1?\n- [x] Yes\n- [ ] No\n"),
                "answer_sha1": sha1_hex(answer_line),
                "checked": true
            }))
            .send()
            .await
            .expect("Failed to execute request")
            .status()
            .as_u16()
    }
}

/// Spawns the app on a random port over the in-memory store.
async fn spawn_app(with_quiz_dir: bool) -> TestApp {
    let quiz_dir = std::env::temp_dir().join(format!("quiz-backend-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&quiz_dir).expect("Failed to create quiz dir");

    let config = Config {
        database_url: None,
        jwt_secret: JWT_SECRET.to_string(),
        rust_log: "error".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        quiz_dir: with_quiz_dir.then(|| quiz_dir.to_string_lossy().into_owned()),
        quiz_suffix: DEFAULT_QUIZ_SUFFIX.to_string(),
        sync_interval_secs: None,
    };

    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap()));
    let state = AppState::new(config, Arc::new(MemoryStore::new()), clock.clone());
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        clock,
        quiz_dir,
        client: reqwest::Client::new(),
    }
}

#[tokio::test]
async fn health_check_works() {
    let app = spawn_app(false).await;

    let response = app.client.get(app.url("/health")).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let response = app
        .client
        .get(app.url("/random_path_that_does_not_exist"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn api_requires_a_valid_token() {
    let app = spawn_app(false).await;

    let response = app.client.get(app.url("/api/quizzes")).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 401);

    let forged = sign_jwt(&Viewer::new("u1", Role::Admin), "another_secret", 600).unwrap();
    let response = app.get("/api/quizzes", &forged).await;
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn admin_routes_reject_students() {
    let app = spawn_app(true).await;

    let response = app
        .client
        .post(app.url("/api/admin/sync"))
        .bearer_auth(app.token("u1", "student"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
async fn sync_without_source_is_rejected() {
    let app = spawn_app(false).await;

    let response = app
        .client
        .post(app.url("/api/admin/sync"))
        .bearer_auth(app.token("root", "admin"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn session_flow() {
    let app = spawn_app(true).await;
    app.write_quiz("sample.quiz.md", SAMPLE);
    app.write_quiz("README.md", "not a quiz");

    let stats = app.sync().await;
    assert_eq!(stats["created"], 1);
    assert_eq!(stats["failed"], 0);

    let student = app.token("u1", "student");

    // Catalogue
    let page: Value = app.get("/api/quizzes", &student).await.json().await.unwrap();
    assert_eq!(page["total"], 1);
    let quiz_sha1 = page["items"][0]["sha1"].as_str().unwrap().to_string();
    assert_eq!(quiz_sha1, sha1_hex(SAMPLE));

    let quiz: Value = app
        .get(&format!("/api/quizzes/{}", quiz_sha1), &student)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(quiz["questions"][0]["content"], "Q1?");
    assert!(quiz["questions"][0]["answers"][0].get("valid").is_none());

    // Start is idempotent
    let first: Value = app.start_session(&student, &quiz_sha1).await.json().await.unwrap();
    let second: Value = app.start_session(&student, &quiz_sha1).await.json().await.unwrap();
    assert_eq!(first["id"], second["id"]);
    let session_id = first["id"].as_str().unwrap().to_string();

    assert_eq!(app.put_answer(&student, &session_id, "- [x] Yes").await, 201);
    assert_eq!(app.put_answer(&student, &session_id, "- [ ] No").await, 201);
    assert_eq!(app.put_answer(&student, &session_id, "- [x] Maybe").await, 400);

    // Running: result withheld
    app.clock.advance(Duration::seconds(20));
    let session: Value = app
        .get(&format!("/api/sessions/{}", session_id), &student)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(session["status"], "running");
    assert_eq!(session["remaining_sec"], 40);
    assert!(session.get("result").is_none());

    let catalogue: Value = app.get("/api/quiz-sessions", &student).await.json().await.unwrap();
    assert_eq!(catalogue["total"], 1);
    assert_eq!(catalogue["items"][0]["filename"], "sample.quiz.md");
    assert_eq!(catalogue["items"][0]["session"]["id"], session_id.as_str());
    assert!(catalogue["items"][0]["session"].get("result").is_none());

    let catalogue: Value = app
        .get("/api/quiz-sessions", &app.token("u2", "student"))
        .await
        .json()
        .await
        .unwrap();
    assert!(catalogue["items"][0]["session"].is_null());

    // Over: writes rejected, result revealed
    app.clock.advance(Duration::seconds(40));
    assert_eq!(app.put_answer(&student, &session_id, "- [x] Yes").await, 400);

    let session: Value = app
        .get(&format!("/api/sessions/{}", session_id), &student)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(session["status"], "expired");
    assert_eq!(session["remaining_sec"], 0);
    assert_eq!(session["result"]["good_answer"], 1);
    assert_eq!(session["result"]["total_answer"], 2);

    let answers: Value = app
        .get(&format!("/api/sessions/{}/answers", session_id), &student)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(answers.as_array().unwrap().len(), 2);

    // Another student cannot see it
    let response = app
        .get(&format!("/api/sessions/{}", session_id), &app.token("u2", "student"))
        .await;
    assert_eq!(response.status().as_u16(), 404);

    let listing: Value = app.get("/api/sessions", &student).await.json().await.unwrap();
    assert_eq!(listing["total"], 1);

    let catalogue: Value = app.get("/api/quiz-sessions", &student).await.json().await.unwrap();
    assert_eq!(catalogue["items"][0]["session"]["result"]["good_answer"], 1);
}

#[tokio::test]
async fn start_session_validates_input() {
    let app = spawn_app(false).await;
    let student = app.token("u1", "student");

    let response = app.start_session(&student, "not-a-sha1").await;
    assert_eq!(response.status().as_u16(), 400);

    let response = app.start_session(&student, &"0".repeat(40)).await;
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn versions_and_rollback() {
    let app = spawn_app(true).await;
    let admin = app.token("root", "admin");

    app.write_quiz("sample.quiz.md", SAMPLE);
    app.sync().await;
    app.write_quiz("sample.quiz.md", SAMPLE_V2);
    let stats = app.sync().await;
    assert_eq!(stats["updated"], 1);

    let versions: Value = app
        .get("/api/admin/quizzes/sample.quiz.md/versions", &admin)
        .await
        .json()
        .await
        .unwrap();
    let versions = versions.as_array().unwrap();
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[0]["version"], 2);
    assert_eq!(versions[0]["active"], true);
    assert_eq!(versions[1]["active"], false);

    let response = app
        .client
        .put(app.url("/api/admin/quizzes/sample.quiz.md/versions/1/activate"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let quiz: Value = response.json().await.unwrap();
    assert_eq!(quiz["version"], 1);

    let page: Value = app.get("/api/quizzes", &admin).await.json().await.unwrap();
    assert_eq!(page["items"][0]["sha1"], sha1_hex(SAMPLE));

    let response = app
        .client
        .put(app.url("/api/admin/quizzes/sample.quiz.md/versions/9/activate"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);

    let response = app.get("/api/admin/quizzes/missing.quiz.md/versions", &admin).await;
    assert_eq!(response.status().as_u16(), 404);
}
