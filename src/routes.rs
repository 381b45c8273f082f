// src/routes.rs

use axum::{
    Router,
    http::{Method, header},
    middleware,
    routing::{get, post, put},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    handlers::{self, admin, quiz, session},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Every `/api` route requires a bearer token.
/// * `/api/admin` additionally requires the admin role.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let quiz_routes = Router::new()
        .route("/", get(quiz::list_quizzes))
        .route("/{sha1}", get(quiz::get_quiz));

    let session_routes = Router::new()
        .route("/", get(session::list_sessions).post(session::start_session))
        .route("/{id}", get(session::get_session))
        .route(
            "/{id}/answers",
            get(session::list_session_answers).put(session::put_session_answer),
        );

    // Double middleware protection: Auth first, then Admin check
    let admin_routes = Router::new()
        .route("/sync", post(admin::sync_quizzes))
        .route("/quizzes/{filename}/versions", get(admin::list_versions))
        .route(
            "/quizzes/{filename}/versions/{version}/activate",
            put(admin::activate_version),
        )
        .layer(middleware::from_fn(admin_middleware));

    let api_routes = Router::new()
        .nest("/quizzes", quiz_routes)
        .nest("/sessions", session_routes)
        .route("/quiz-sessions", get(session::list_quiz_sessions))
        .nest("/admin", admin_routes)
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api", api_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
