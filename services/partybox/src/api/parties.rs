//! Party API handlers.
//!
//! Reads are public; writes require an administrator session. Path ids that
//! do not parse are treated as missing parties.
use crate::api::error::{
    ApiError, api_body_rejection, api_internal, api_not_found, api_store_error,
    api_validation_error,
};
use crate::api::types::PartyListResponse;
use crate::app::AppState;
use crate::auth::admin::require_admin;
use crate::model::{Party, PartyDraft};
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use partybox_common::ids::PartyId;

fn parse_party_id(raw: &str) -> Result<PartyId, ApiError> {
    raw.parse().map_err(|_| api_not_found("party not found"))
}

#[utoipa::path(
    get,
    path = "/v1/parties",
    tag = "parties",
    responses(
        (status = 200, description = "Parties, soonest first", body = PartyListResponse)
    )
)]
pub(crate) async fn list_parties(
    State(state): State<AppState>,
) -> Result<Json<PartyListResponse>, ApiError> {
    let items = state
        .store
        .list_parties()
        .await
        .map_err(|err| api_internal("failed to list parties", &err))?;
    Ok(Json(PartyListResponse { items }))
}

#[utoipa::path(
    get,
    path = "/v1/parties/{id}",
    tag = "parties",
    params(("id" = String, Path, description = "Party identifier")),
    responses(
        (status = 200, description = "Party", body = Party),
        (status = 404, description = "Party not found", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn get_party(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Party>, ApiError> {
    let id = parse_party_id(&id)?;
    let party = state
        .store
        .get_party(id)
        .await
        .map_err(|err| api_store_error("party", err))?;
    Ok(Json(party))
}

#[utoipa::path(
    post,
    path = "/v1/parties",
    tag = "parties",
    request_body = PartyDraft,
    responses(
        (status = 201, description = "Party created", body = Party),
        (status = 400, description = "Missing required fields", body = crate::api::types::ErrorResponse),
        (status = 401, description = "Administrator session required", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn create_party(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<PartyDraft>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&state, &headers)?;
    let Json(body) = body.map_err(api_body_rejection)?;
    let draft = body.normalized().map_err(|msg| api_validation_error(&msg))?;
    let party = state
        .store
        .create_party(draft)
        .await
        .map_err(|err| api_store_error("party", err))?;
    tracing::info!(party = %party.id, name = %party.name, "party created");
    Ok((StatusCode::CREATED, Json(party)))
}

#[utoipa::path(
    put,
    path = "/v1/parties/{id}",
    tag = "parties",
    params(("id" = String, Path, description = "Party identifier")),
    request_body = PartyDraft,
    responses(
        (status = 200, description = "Party updated", body = Party),
        (status = 400, description = "Missing required fields", body = crate::api::types::ErrorResponse),
        (status = 401, description = "Administrator session required", body = crate::api::types::ErrorResponse),
        (status = 404, description = "Party not found", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn update_party(
    Path(id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<PartyDraft>, JsonRejection>,
) -> Result<Json<Party>, ApiError> {
    require_admin(&state, &headers)?;
    let Json(body) = body.map_err(api_body_rejection)?;
    let id = parse_party_id(&id)?;
    let draft = body.normalized().map_err(|msg| api_validation_error(&msg))?;
    let party = state
        .store
        .update_party(id, draft)
        .await
        .map_err(|err| api_store_error("party", err))?;
    Ok(Json(party))
}

#[utoipa::path(
    delete,
    path = "/v1/parties/{id}",
    tag = "parties",
    params(("id" = String, Path, description = "Party identifier")),
    responses(
        (status = 204, description = "Party deleted"),
        (status = 401, description = "Administrator session required", body = crate::api::types::ErrorResponse),
        (status = 404, description = "Party not found", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn delete_party(
    Path(id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    require_admin(&state, &headers)?;
    let id = parse_party_id(&id)?;
    state
        .store
        .delete_party(id)
        .await
        .map_err(|err| api_store_error("party", err))?;
    tracing::info!(party = %id, "party deleted");
    Ok(StatusCode::NO_CONTENT)
}
