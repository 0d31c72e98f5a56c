//! API error type and constructors.
//!
//! Every handler returns [`ApiError`] so clients always see the same
//! `{code, message, request_id}` body. Internal failures are logged here and
//! answered with a generic message.
use crate::ledger::LedgerError;
use crate::store::StoreError;
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use partybox_common::ErrorResponse;

/// HTTP status plus JSON error body.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ApiError {
    fn new(status: StatusCode, code: &str, message: &str) -> Self {
        Self {
            status,
            body: ErrorResponse {
                code: code.to_string(),
                message: message.to_string(),
                request_id: None,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self.body)).into_response()
    }
}

pub fn api_not_found(message: &str) -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "not_found", message)
}

pub fn api_conflict(code: &str, message: &str) -> ApiError {
    ApiError::new(StatusCode::CONFLICT, code, message)
}

/// 500 for a store failure. The store error is logged, never returned.
pub fn api_internal(message: &str, err: &StoreError) -> ApiError {
    tracing::error!(error = ?err, "partybox storage error");
    ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}

pub fn api_internal_message(message: &str) -> ApiError {
    ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}

pub fn api_unauthorized(message: &str) -> ApiError {
    ApiError::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
}

pub fn api_validation_error(message: &str) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, "validation_error", message)
}

/// 400 for a body that failed to decode. Handlers take the body as
/// `Result<Json<T>, JsonRejection>` so authorization is decided first.
pub fn api_body_rejection(rejection: JsonRejection) -> ApiError {
    api_validation_error(&rejection.body_text())
}

/// Map a store failure on a keyed resource: missing rows become 404 with
/// `what` in the message, conflicts 409, everything else 500.
pub fn api_store_error(what: &str, err: StoreError) -> ApiError {
    match err {
        StoreError::NotFound(_) => api_not_found(&format!("{what} not found")),
        StoreError::Conflict(_) => api_conflict("already_exists", &format!("{what} already exists")),
        other => api_internal(&format!("failed to access {what}"), &other),
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Unauthorized => api_unauthorized("administrator session required"),
            LedgerError::Invalid(err) => api_validation_error(&err.to_string()),
            LedgerError::NotFound(_) => api_not_found("participant not found"),
            LedgerError::Storage(err) => api_internal("failed to update quota", &err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use partybox_common::ids::ParticipantId;

    #[test]
    fn api_error_helpers_build_expected_codes() {
        let not_found = api_not_found("missing");
        assert_eq!(not_found.status, StatusCode::NOT_FOUND);
        assert_eq!(not_found.body.code, "not_found");

        let conflict = api_conflict("already_exists", "conflict");
        assert_eq!(conflict.status, StatusCode::CONFLICT);
        assert_eq!(conflict.body.code, "already_exists");

        let internal = api_internal_message("oops");
        assert_eq!(internal.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(internal.body.code, "internal");

        let unauthorized = api_unauthorized("nope");
        assert_eq!(unauthorized.status, StatusCode::UNAUTHORIZED);

        let validation = api_validation_error("bad");
        assert_eq!(validation.status, StatusCode::BAD_REQUEST);
        assert_eq!(validation.body.code, "validation_error");
    }

    #[test]
    fn store_errors_map_by_kind() {
        let err = api_store_error("party", StoreError::NotFound("party".into()));
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.body.message, "party not found");

        let err = api_store_error("party", StoreError::Unexpected(anyhow::anyhow!("boom")));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.body.message.contains("boom"));
    }

    #[test]
    fn ledger_errors_map_to_statuses() {
        let cases = [
            (LedgerError::Unauthorized, StatusCode::UNAUTHORIZED),
            (
                LedgerError::Invalid(partybox_common::Error::NegativeQuota {
                    field: "quota",
                    value: -1,
                }),
                StatusCode::BAD_REQUEST,
            ),
            (
                LedgerError::NotFound(ParticipantId::new()),
                StatusCode::NOT_FOUND,
            ),
            (
                LedgerError::Storage(StoreError::Unexpected(anyhow::anyhow!("db down"))),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }
}
