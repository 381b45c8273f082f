// src/handlers/mod.rs

use axum::{Json, response::IntoResponse};

pub mod admin;
pub mod quiz;
pub mod session;

/// Liveness probe.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}
