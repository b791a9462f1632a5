//! services/api/src/web/middleware.rs
//!
//! Learner resolution for every protected route.

use axum::{
    extract::{Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use classroom_core::ports::PortError;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

use crate::adapters::LOCAL_LEARNER_ID;
use crate::web::state::AppState;

pub const GUEST_PROGRESS_MESSAGE: &str = "Guest progress is not saved";

/// Who is behind a request.
#[derive(Clone, PartialEq, Eq)]
pub enum Learner {
    /// A signed-in account and the token it presented.
    Account { user_id: Uuid, token: String },
    /// The single profile of an offline server.
    Local,
    /// Nothing is ever persisted for a guest.
    Guest,
}

impl Learner {
    /// The id progress is stored under, `None` for guests.
    pub fn progress_id(&self) -> Option<Uuid> {
        match self {
            Learner::Account { user_id, .. } => Some(*user_id),
            Learner::Local => Some(LOCAL_LEARNER_ID),
            Learner::Guest => None,
        }
    }

    /// Like `progress_id`, but as a handler error for guests.
    pub fn require_progress_id(&self) -> Result<Uuid, (StatusCode, String)> {
        self.progress_id()
            .ok_or((StatusCode::FORBIDDEN, GUEST_PROGRESS_MESSAGE.to_string()))
    }

    pub fn is_guest(&self) -> bool {
        matches!(self, Learner::Guest)
    }

    /// A log-safe label; never includes the token.
    pub fn label(&self) -> String {
        match self {
            Learner::Account { user_id, .. } => user_id.to_string(),
            Learner::Local => "local".to_string(),
            Learner::Guest => "guest".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LearnerParams {
    /// Browsers cannot set headers on WebSocket upgrades, so the token may come here.
    pub token: Option<String>,
    #[serde(default)]
    pub guest: bool,
}

/// Pulls the token out of `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Middleware that works out the learner and inserts it into the request extensions.
///
/// `guest=true` always yields a guest. Otherwise a server with accounts needs a
/// live token (401 when missing or expired, so the client signs out), and an
/// offline server maps everything to the local profile.
pub async fn resolve_learner(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LearnerParams>,
    mut req: Request,
    next: Next,
) -> Result<Response, (StatusCode, String)> {
    let learner = if params.guest {
        Learner::Guest
    } else if let Some(accounts) = &state.accounts {
        let token = bearer_token(req.headers())
            .or(params.token)
            .ok_or((StatusCode::UNAUTHORIZED, "Please sign in".to_string()))?;
        let user_id = accounts.validate_auth_token(&token).await.map_err(|e| match e {
            PortError::Unauthorized | PortError::NotFound(_) => {
                warn!("Rejected an invalid or expired auth token");
                (
                    StatusCode::UNAUTHORIZED,
                    "Your session has expired. Please sign in again.".to_string(),
                )
            }
            other => {
                error!("Failed to validate auth token: {:?}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to validate session".to_string(),
                )
            }
        })?;
        Learner::Account { user_id, token }
    } else {
        Learner::Local
    };

    req.extensions_mut().insert(learner);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_is_extracted() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc123"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc123"));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn guests_have_no_progress_id() {
        assert_eq!(Learner::Local.progress_id(), Some(LOCAL_LEARNER_ID));
        let (status, message) = Learner::Guest.require_progress_id().unwrap_err();
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(message, GUEST_PROGRESS_MESSAGE);
    }
}
