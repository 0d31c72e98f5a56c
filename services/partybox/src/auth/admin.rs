//! Administrator login endpoint and bearer-token checks for handlers.
use crate::api::error::{ApiError, api_internal_message, api_unauthorized};
use crate::api::types::{LoginRequest, LoginResponse};
use crate::app::AppState;
use crate::auth::session::SessionError;
use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;

#[utoipa::path(
    post,
    path = "/v1/session",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Administrator session token", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = crate::api::types::ErrorResponse)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    match state.sessions.login(&body.username, &body.password) {
        Ok(session) => {
            tracing::info!(user = %body.username, "administrator session issued");
            Ok(Json(LoginResponse {
                token: session.token,
                expires_at: session.expires_at,
            }))
        }
        Err(SessionError::InvalidCredentials) => {
            metrics::counter!("partybox_login_failures_total").increment(1);
            tracing::warn!(user = %body.username, "rejected administrator login");
            Err(api_unauthorized("invalid credentials"))
        }
        Err(err) => {
            tracing::error!(error = %err, "failed to mint session token");
            Err(api_internal_message("failed to issue session"))
        }
    }
}

/// Whether the request carries a valid administrator session.
pub fn is_admin(state: &AppState, headers: &HeaderMap) -> bool {
    extract_bearer(headers)
        .map(|token| state.sessions.verify(token).is_ok())
        .unwrap_or(false)
}

/// Reject the request with 401 unless it carries an administrator session.
pub fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let bearer = extract_bearer(headers).ok_or_else(|| api_unauthorized("missing bearer token"))?;
    state
        .sessions
        .verify(bearer)
        .map(|_| ())
        .map_err(|_| api_unauthorized("invalid session"))
}

pub fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(axum::http::header::AUTHORIZATION)?;
    let value = value.to_str().ok()?;
    value.strip_prefix("Bearer ").map(str::trim).filter(|t| !t.is_empty())
}
