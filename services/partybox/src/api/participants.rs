//! Participant roster and quota API handlers.
//!
//! # Purpose
//! Serves the roster read path from the roster cache and routes quota changes
//! through the quota ledger. Every participant mutation invalidates the cache.
//!
//! # Ordering
//! Write endpoints decide authorization before they look at the body or the
//! path id, so an anonymous caller always sees 401 and nothing else.
use crate::api::error::{
    ApiError, api_body_rejection, api_internal, api_not_found, api_store_error,
    api_validation_error,
};
use crate::api::types::{
    NormalizeResponse, ParticipantCreateRequest, ParticipantListResponse, QuotaUpdateRequest,
    QuotaUpdateResponse,
};
use crate::app::AppState;
use crate::auth::admin::{is_admin, require_admin};
use crate::ledger::LedgerError;
use crate::model::NewParticipant;
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use partybox_common::ParticipantView;
use partybox_common::ids::ParticipantId;

#[utoipa::path(
    get,
    path = "/v1/participants",
    tag = "participants",
    responses(
        (status = 200, description = "Participants by name, history newest first", body = ParticipantListResponse)
    )
)]
pub(crate) async fn list_participants(
    State(state): State<AppState>,
) -> Result<Json<ParticipantListResponse>, ApiError> {
    let rendered = state
        .roster
        .render(state.store.as_ref())
        .await
        .map_err(|err| api_internal("failed to list participants", &err))?;
    Ok(Json(ParticipantListResponse {
        items: rendered.as_ref().clone(),
    }))
}

#[utoipa::path(
    post,
    path = "/v1/participants",
    tag = "participants",
    request_body = ParticipantCreateRequest,
    responses(
        (status = 201, description = "Participant created with zeroed quotas", body = ParticipantView),
        (status = 400, description = "Missing name or surname", body = crate::api::types::ErrorResponse),
        (status = 401, description = "Administrator session required", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn create_participant(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ParticipantCreateRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&state, &headers)?;
    let Json(body) = body.map_err(api_body_rejection)?;
    let participant = NewParticipant::validated(&body.name, &body.surname)
        .map_err(|msg| api_validation_error(&msg))?;
    let created = state
        .store
        .create_participant(participant)
        .await
        .map_err(|err| api_store_error("participant", err))?;
    state.roster.invalidate();
    tracing::info!(participant = %created.id, "participant created");
    Ok((StatusCode::CREATED, Json(created.view())))
}

#[utoipa::path(
    delete,
    path = "/v1/participants/{id}",
    tag = "participants",
    params(("id" = String, Path, description = "Participant identifier")),
    responses(
        (status = 204, description = "Participant and history deleted"),
        (status = 401, description = "Administrator session required", body = crate::api::types::ErrorResponse),
        (status = 404, description = "Participant not found", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn delete_participant(
    Path(id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    require_admin(&state, &headers)?;
    let id: ParticipantId = id
        .parse()
        .map_err(|_| api_not_found("participant not found"))?;
    state
        .store
        .delete_participant(id)
        .await
        .map_err(|err| api_store_error("participant", err))?;
    state.roster.invalidate();
    tracing::info!(participant = %id, "participant deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/v1/participants/{id}/quota",
    tag = "participants",
    params(("id" = String, Path, description = "Participant identifier")),
    request_body = QuotaUpdateRequest,
    responses(
        (status = 200, description = "Change applied or already in effect", body = QuotaUpdateResponse),
        (status = 400, description = "Negative or out-of-range values", body = crate::api::types::ErrorResponse),
        (status = 401, description = "Administrator session required", body = crate::api::types::ErrorResponse),
        (status = 404, description = "Participant not found", body = crate::api::types::ErrorResponse),
        (status = 500, description = "Storage failure; nothing applied", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn update_quota(
    Path(id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<QuotaUpdateRequest>, JsonRejection>,
) -> Result<Json<QuotaUpdateResponse>, ApiError> {
    if !is_admin(&state, &headers) {
        metrics::counter!("partybox_quota_changes_total", "outcome" => "unauthorized").increment(1);
        return Err(LedgerError::Unauthorized.into());
    }
    let Json(body) = body.map_err(api_body_rejection)?;
    let id: ParticipantId = id
        .parse()
        .map_err(|_| api_not_found("participant not found"))?;
    let result = state
        .ledger
        .apply_quota_change(true, id, body.base_quota, body.quota)
        .await?;
    Ok(Json(QuotaUpdateResponse {
        outcome: result.outcome,
        participant: result.participant.view(),
    }))
}

#[utoipa::path(
    post,
    path = "/v1/maintenance/normalize-history",
    tag = "participants",
    responses(
        (status = 200, description = "Legacy participants backfilled", body = NormalizeResponse),
        (status = 401, description = "Administrator session required", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn normalize_history(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<NormalizeResponse>, ApiError> {
    require_admin(&state, &headers)?;
    let normalized = state
        .store
        .normalize_legacy_history()
        .await
        .map_err(|err| api_internal("failed to normalize history", &err))?;
    if normalized > 0 {
        state.roster.invalidate();
    }
    tracing::info!(normalized, "legacy quota history normalized");
    Ok(Json(NormalizeResponse { normalized }))
}
