//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for registration, login, and logout. Tokens are
//! opaque bearer strings valid for 30 days.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use classroom_core::ports::{AccountService, PortError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::middleware::bearer_token;
use crate::web::state::AppState;

const TOKEN_LIFETIME_DAYS: i64 = 30;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct CredentialsRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct TokenResponse {
    pub token: String,
    pub user_id: Uuid,
    pub username: String,
}

//=========================================================================================
// Helpers
//=========================================================================================

fn accounts(state: &AppState) -> Result<&Arc<dyn AccountService>, (StatusCode, String)> {
    state.accounts.as_ref().ok_or((
        StatusCode::SERVICE_UNAVAILABLE,
        "Accounts are not available while the server runs offline".to_string(),
    ))
}

fn validate(req: &CredentialsRequest) -> Result<(), (StatusCode, String)> {
    if req.username.trim().is_empty() || req.password.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Username and password are required".to_string(),
        ));
    }
    Ok(())
}

/// Creates a fresh token for `user_id`.
async fn issue_token(
    accounts: &Arc<dyn AccountService>,
    user_id: Uuid,
) -> Result<String, (StatusCode, String)> {
    let token = Uuid::new_v4().to_string();
    let expires_at = Utc::now() + Duration::days(TOKEN_LIFETIME_DAYS);
    accounts
        .create_auth_token(&token, user_id, expires_at)
        .await
        .map_err(|e| {
            error!("Failed to create auth token: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create session".to_string())
        })?;
    Ok(token)
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/register - Create a new account and sign it in
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = CredentialsRequest,
    responses(
        (status = 201, description = "Account created", body = TokenResponse),
        (status = 400, description = "Missing username or password"),
        (status = 409, description = "Username already taken"),
        (status = 503, description = "Server is running offline")
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CredentialsRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let accounts = accounts(&state)?;
    validate(&req)?;
    let username = req.username.trim();

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to hash password".to_string())
        })?
        .to_string();

    let account = accounts
        .register(username, &password_hash)
        .await
        .map_err(|e| match e {
            PortError::Conflict(message) => (StatusCode::CONFLICT, message),
            other => {
                error!("Failed to create account: {:?}", other);
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create account".to_string())
            }
        })?;

    let token = issue_token(accounts, account.user_id).await?;
    info!(user_id = %account.user_id, "Account registered");

    Ok((
        StatusCode::CREATED,
        Json(TokenResponse {
            token,
            user_id: account.user_id,
            username: account.username,
        }),
    ))
}

/// POST /auth/login - Sign in with an existing account
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = CredentialsRequest,
    responses(
        (status = 200, description = "Login successful", body = TokenResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 503, description = "Server is running offline")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CredentialsRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let accounts = accounts(&state)?;
    validate(&req)?;
    let invalid = || {
        (
            StatusCode::UNAUTHORIZED,
            "Invalid username or password".to_string(),
        )
    };

    let credentials = accounts
        .find_credentials(req.username.trim())
        .await
        .map_err(|e| match e {
            PortError::NotFound(_) => invalid(),
            other => {
                error!("Failed to look up account: {:?}", other);
                (StatusCode::INTERNAL_SERVER_ERROR, "Authentication error".to_string())
            }
        })?;

    let parsed_hash = PasswordHash::new(&credentials.password_hash).map_err(|e| {
        error!("Failed to parse password hash: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Authentication error".to_string())
    })?;
    if Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .is_err()
    {
        return Err(invalid());
    }

    let token = issue_token(accounts, credentials.user_id).await?;
    info!(user_id = %credentials.user_id, "Login successful");

    Ok((
        StatusCode::OK,
        Json(TokenResponse {
            token,
            user_id: credentials.user_id,
            username: credentials.username,
        }),
    ))
}

/// POST /auth/logout - Invalidate the presented token
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 204, description = "Logout successful"),
        (status = 401, description = "No token presented")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let accounts = accounts(&state)?;
    let token = bearer_token(&headers)
        .ok_or((StatusCode::UNAUTHORIZED, "No session found".to_string()))?;

    accounts.delete_auth_token(&token).await.map_err(|e| {
        error!("Failed to delete auth token: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to logout".to_string())
    })?;

    Ok(StatusCode::NO_CONTENT)
}
