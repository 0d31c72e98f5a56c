//! HTTP payload shapes owned by the service. Shapes shared with the client
//! live in `partybox_common` and are re-exported here.
use crate::model::Party;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub use partybox_common::{
    ErrorResponse, LoginRequest, LoginResponse, ParticipantCreateRequest, ParticipantListResponse,
    QuotaUpdateRequest, QuotaUpdateResponse,
};

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct SystemInfo {
    pub service: String,
    pub api_version: String,
    pub storage_backend: String,
    pub durable_storage: bool,
    pub history_limit: usize,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct HealthStatus {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PartyListResponse {
    pub items: Vec<Party>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NormalizeResponse {
    /// Participants whose documents were backfilled.
    pub normalized: u64,
}
