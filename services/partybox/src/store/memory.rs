//! In-memory implementation of the party store.
//!
//! # Purpose
//! Implements [`PartyStore`] with `HashMap`s guarded by `tokio::sync::RwLock`.
//! Used for local development, tests, and deployments that do not need
//! durability.
//!
//! # Durability and consistency
//! - **Not durable**: all state is lost on process restart.
//! - Participants are kept as raw [`StoredParticipant`] documents and decoded on
//!   read, so legacy shapes behave the same way they do in a durable backend.
//! - A quota change plans and applies under one write lock; concurrent changes
//!   to the same participant serialize and each sees the previous result.
//!
//! # Metrics
//! Keeps `partybox_participants_total` current, matching the durable backend.
use super::{PartyStore, StoreError, StoreResult};
use crate::ledger::{QuotaChangeResult, apply_change, plan_change};
use crate::model::{NewParticipant, Participant, Party, PartyDraft, StoredParticipant};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use partybox_common::ids::{ParticipantId, PartyId};
use partybox_common::{QuotaOutcome, QuotaValues};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct InMemoryStore {
    parties: RwLock<HashMap<PartyId, Party>>,
    participants: RwLock<HashMap<ParticipantId, StoredParticipant>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a raw document as-is, replacing any document with the same id.
    /// Lets callers seed data written by older deployments.
    pub async fn insert_document(&self, doc: StoredParticipant) {
        let mut participants = self.participants.write().await;
        participants.insert(doc.id, doc);
        metrics::gauge!("partybox_participants_total").set(participants.len() as f64);
    }

    /// Raw document for `id`, exactly as stored.
    pub async fn document(&self, id: ParticipantId) -> Option<StoredParticipant> {
        self.participants.read().await.get(&id).cloned()
    }
}

#[async_trait]
impl PartyStore for InMemoryStore {
    async fn list_parties(&self) -> StoreResult<Vec<Party>> {
        let mut parties: Vec<Party> = self.parties.read().await.values().cloned().collect();
        parties.sort_by(|a, b| a.starts_at.cmp(&b.starts_at).then(a.name.cmp(&b.name)));
        Ok(parties)
    }

    async fn get_party(&self, id: PartyId) -> StoreResult<Party> {
        self.parties
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("party".into()))
    }

    async fn create_party(&self, draft: PartyDraft) -> StoreResult<Party> {
        let party = draft.into_party(PartyId::new(), Utc::now());
        let mut parties = self.parties.write().await;
        if parties.contains_key(&party.id) {
            return Err(StoreError::Conflict("party".into()));
        }
        parties.insert(party.id, party.clone());
        Ok(party)
    }

    async fn update_party(&self, id: PartyId, draft: PartyDraft) -> StoreResult<Party> {
        let mut parties = self.parties.write().await;
        let existing = parties
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound("party".into()))?;
        let mut updated = draft.into_party(id, Utc::now());
        updated.created_at = existing.created_at;
        *existing = updated.clone();
        Ok(updated)
    }

    async fn delete_party(&self, id: PartyId) -> StoreResult<()> {
        self.parties
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound("party".into()))
    }

    async fn list_participants(&self) -> StoreResult<Vec<Participant>> {
        let mut participants: Vec<Participant> = self
            .participants
            .read()
            .await
            .values()
            .cloned()
            .map(Participant::from_stored)
            .collect();
        participants.sort_by(|a, b| a.name.cmp(&b.name).then(a.surname.cmp(&b.surname)));
        Ok(participants)
    }

    async fn get_participant(&self, id: ParticipantId) -> StoreResult<Participant> {
        self.participants
            .read()
            .await
            .get(&id)
            .cloned()
            .map(Participant::from_stored)
            .ok_or_else(|| StoreError::NotFound("participant".into()))
    }

    async fn create_participant(&self, participant: NewParticipant) -> StoreResult<Participant> {
        let doc = participant.into_stored(ParticipantId::new(), Utc::now());
        let mut participants = self.participants.write().await;
        if participants.contains_key(&doc.id) {
            return Err(StoreError::Conflict("participant".into()));
        }
        participants.insert(doc.id, doc.clone());
        metrics::gauge!("partybox_participants_total").set(participants.len() as f64);
        Ok(Participant::from_stored(doc))
    }

    async fn delete_participant(&self, id: ParticipantId) -> StoreResult<()> {
        let mut participants = self.participants.write().await;
        if participants.remove(&id).is_none() {
            return Err(StoreError::NotFound("participant".into()));
        }
        metrics::gauge!("partybox_participants_total").set(participants.len() as f64);
        Ok(())
    }

    async fn apply_quota_change(
        &self,
        id: ParticipantId,
        target: QuotaValues,
        at: DateTime<Utc>,
        history_limit: usize,
    ) -> StoreResult<QuotaChangeResult> {
        let mut participants = self.participants.write().await;
        let doc = participants
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound("participant".into()))?;
        let participant = Participant::from_stored(doc.clone());
        let Some(update) = plan_change(&participant, target, at) else {
            return Ok(QuotaChangeResult {
                outcome: QuotaOutcome::Unchanged,
                participant,
            });
        };
        apply_change(doc, &update, history_limit);
        Ok(QuotaChangeResult {
            outcome: QuotaOutcome::Applied,
            participant: Participant::from_stored(doc.clone()),
        })
    }

    async fn normalize_legacy_history(&self) -> StoreResult<u64> {
        let mut participants = self.participants.write().await;
        let touched = participants
            .values_mut()
            .map(StoredParticipant::normalize)
            .filter(|changed| *changed)
            .count();
        Ok(touched as u64)
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
