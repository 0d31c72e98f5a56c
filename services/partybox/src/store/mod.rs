use crate::ledger::QuotaChangeResult;
use crate::model::{NewParticipant, Participant, Party, PartyDraft};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use partybox_common::QuotaValues;
use partybox_common::ids::{ParticipantId, PartyId};
use thiserror::Error;

pub mod memory;
pub mod postgres;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound("row".into()),
            other => StoreError::Unexpected(other.into()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::Unexpected(err.into())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait PartyStore: Send + Sync {
    /// Parties ordered by start time, soonest first.
    async fn list_parties(&self) -> StoreResult<Vec<Party>>;
    async fn get_party(&self, id: PartyId) -> StoreResult<Party>;
    async fn create_party(&self, draft: PartyDraft) -> StoreResult<Party>;
    async fn update_party(&self, id: PartyId, draft: PartyDraft) -> StoreResult<Party>;
    async fn delete_party(&self, id: PartyId) -> StoreResult<()>;

    /// Participants ordered by name, then surname.
    async fn list_participants(&self) -> StoreResult<Vec<Participant>>;
    async fn get_participant(&self, id: ParticipantId) -> StoreResult<Participant>;
    async fn create_participant(&self, participant: NewParticipant) -> StoreResult<Participant>;
    /// Removes the participant together with its history.
    async fn delete_participant(&self, id: ParticipantId) -> StoreResult<()>;

    /// Move a participant to `target`, recording history bounded to
    /// `history_limit`, as one isolated read-modify-write.
    async fn apply_quota_change(
        &self,
        id: ParticipantId,
        target: QuotaValues,
        at: DateTime<Utc>,
        history_limit: usize,
    ) -> StoreResult<QuotaChangeResult>;

    /// Backfill documents written before history and base quota existed.
    /// Returns the number of participants touched.
    async fn normalize_legacy_history(&self) -> StoreResult<u64>;

    async fn health_check(&self) -> StoreResult<()>;
    fn is_durable(&self) -> bool;
    fn backend_name(&self) -> &'static str;
}
