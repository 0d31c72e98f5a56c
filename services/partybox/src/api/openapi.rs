//! OpenAPI document for the partybox HTTP API.
use crate::api::{
    parties, participants, system,
    types::{
        ErrorResponse, HealthStatus, LoginRequest, LoginResponse, NormalizeResponse,
        ParticipantCreateRequest, ParticipantListResponse, PartyListResponse, QuotaUpdateRequest,
        QuotaUpdateResponse, SystemInfo,
    },
};
use crate::auth::admin;
use crate::model::{Party, PartyDraft};
use partybox_common::ids::{ParticipantId, PartyId};
use partybox_common::{Feedback, ParticipantView, QuotaOutcome};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "partybox",
        version = "v1",
        description = "Party management and participant quota ledger"
    ),
    paths(
        system::system_info,
        system::system_health,
        admin::login,
        parties::list_parties,
        parties::get_party,
        parties::create_party,
        parties::update_party,
        parties::delete_party,
        participants::list_participants,
        participants::create_participant,
        participants::delete_participant,
        participants::update_quota,
        participants::normalize_history
    ),
    components(schemas(
        SystemInfo,
        HealthStatus,
        ErrorResponse,
        LoginRequest,
        LoginResponse,
        PartyId,
        Party,
        PartyDraft,
        PartyListResponse,
        ParticipantId,
        ParticipantView,
        ParticipantCreateRequest,
        ParticipantListResponse,
        Feedback,
        QuotaUpdateRequest,
        QuotaUpdateResponse,
        QuotaOutcome,
        NormalizeResponse
    )),
    tags(
        (name = "system", description = "Health and service metadata"),
        (name = "auth", description = "Administrator sessions"),
        (name = "parties", description = "Party management"),
        (name = "participants", description = "Participant roster and quota ledger")
    )
)]
pub struct ApiDoc;
