// src/utils/jwt.rs

use axum::{
    Extension,
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{
    config::Config,
    error::AppError,
    models::user::{Role, Viewer},
};

/// Claims of the bearer tokens minted by the identity provider.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Claims {
    /// User id.
    pub sub: String,
    /// 'admin', 'teacher' or 'student'. Anything else is treated as a student.
    pub role: String,
    /// Expiration time as Unix timestamp.
    pub exp: i64,
}

impl From<Claims> for Viewer {
    fn from(claims: Claims) -> Self {
        Viewer::new(claims.sub, Role::parse(&claims.role))
    }
}

/// Mints a token for `viewer`, valid for `ttl_seconds`.
///
/// Only tooling and tests need this; production tokens come from the
/// identity provider sharing `JWT_SECRET`.
pub fn sign_jwt(viewer: &Viewer, secret: &str, ttl_seconds: i64) -> Result<String, AppError> {
    let claims = Claims {
        sub: viewer.user_id.clone(),
        role: viewer.role.as_str().to_string(),
        exp: (Utc::now() + Duration::seconds(ttl_seconds)).timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(signing_failure)
}

fn signing_failure(err: jsonwebtoken::errors::Error) -> AppError {
    AppError::StorageFailure(format!("token signing failed: {}", err))
}

/// Verifies signature and expiry and returns the caller.
pub fn verify_jwt(token: &str, secret: &str) -> Result<Viewer, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))?;

    Ok(token_data.claims.into())
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Axum Middleware: Authentication.
///
/// Resolves the `Authorization: Bearer <token>` header into a [`Viewer`]
/// stored in the request extensions.
pub async fn auth_middleware(
    State(config): State<Config>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(req.headers())
        .ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?;
    let viewer = verify_jwt(token, &config.jwt_secret)?;

    req.extensions_mut().insert(viewer);
    Ok(next.run(req).await)
}

/// Axum Middleware: Admin Authorization.
///
/// Must run after `auth_middleware`.
pub async fn admin_middleware(
    Extension(viewer): Extension<Viewer>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    if !viewer.is_admin() {
        tracing::warn!("User {} denied admin access to {}", viewer.user_id, req.uri().path());
        return Err(StatusCode::FORBIDDEN);
    }

    Ok(next.run(req).await)
}
