//! Quota ledger: validated, audited changes to a participant's counters.
//!
//! # Purpose
//! Applies a requested `(base_quota, quota)` pair to a participant and records
//! one [`Feedback`] entry per effective change in a bounded, newest-first
//! history kept alongside the participant.
//!
//! # Key invariants
//! - Authorization and input validation happen before any store access, so a
//!   rejected request never writes.
//! - Submitting the current values is a no-op: nothing is written and no
//!   history entry is recorded.
//! - A change to either counter produces exactly one history entry carrying
//!   both post-change values and the signed quota delta.
//! - History never exceeds the configured limit; the oldest entries go first.
//! - Field updates and the history append are one logical write. Backends run
//!   [`plan_change`] and the write under a single lock or transaction.
//! - Entries already in the history are never rewritten, including legacy
//!   ones; only the counters that moved are written.
//!
//! # Side effects
//! Every applied change invalidates the roster cache.
use crate::model::{Participant, StoredFeedback, StoredParticipant};
use crate::roster::RosterCache;
use crate::store::{PartyStore, StoreError};
use chrono::{DateTime, Utc};
use partybox_common::ids::ParticipantId;
use partybox_common::{Feedback, QuotaOutcome, QuotaValues};
use std::sync::Arc;
use thiserror::Error;

/// Field writes plus the history entry for one effective change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaUpdate {
    /// `Some` only when base quota actually moves.
    pub base_quota: Option<u32>,
    /// `Some` only when quota actually moves.
    pub quota: Option<u32>,
    pub feedback: Feedback,
}

/// Result of a change as seen by the backend.
#[derive(Debug, Clone)]
pub struct QuotaChangeResult {
    pub outcome: QuotaOutcome,
    pub participant: Participant,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("administrator session required")]
    Unauthorized,
    #[error(transparent)]
    Invalid(#[from] partybox_common::Error),
    #[error("participant not found: {0}")]
    NotFound(ParticipantId),
    #[error("storage failure: {0}")]
    Storage(#[source] StoreError),
}

/// Compute the update needed to move `current` to `target`, or `None` when
/// nothing would change.
pub fn plan_change(
    current: &Participant,
    target: QuotaValues,
    at: DateTime<Utc>,
) -> Option<QuotaUpdate> {
    let changed_base = target.base_quota != current.base_quota;
    let changed_quota = target.quota != current.quota;
    if !changed_base && !changed_quota {
        return None;
    }
    Some(QuotaUpdate {
        base_quota: changed_base.then_some(target.base_quota),
        quota: changed_quota.then_some(target.quota),
        feedback: Feedback::recorded(at, target, current.quota),
    })
}

/// Apply a planned update to the stored document.
///
/// Only the fields that moved are written. Existing history entries are kept
/// exactly as stored; the new entry goes in front and the tail is trimmed.
pub fn apply_change(doc: &mut StoredParticipant, update: &QuotaUpdate, history_limit: usize) {
    if let Some(base_quota) = update.base_quota {
        doc.base_quota = Some(i64::from(base_quota));
    }
    if let Some(quota) = update.quota {
        doc.quota = Some(i64::from(quota));
    }
    doc.updated_at = update.feedback.timestamp;
    let history = doc.quota_history.get_or_insert_with(Vec::new);
    prepend_bounded(
        history,
        StoredFeedback::from_feedback(&update.feedback),
        history_limit,
    );
}

/// Insert `entry` at the front and drop the oldest entries beyond `limit`.
pub fn prepend_bounded<T>(history: &mut Vec<T>, entry: T, limit: usize) {
    history.insert(0, entry);
    history.truncate(limit);
}

/// Entry point for quota mutations.
#[derive(Clone)]
pub struct QuotaLedger {
    store: Arc<dyn PartyStore>,
    roster: Arc<RosterCache>,
    history_limit: usize,
}

impl QuotaLedger {
    pub fn new(store: Arc<dyn PartyStore>, roster: Arc<RosterCache>, history_limit: usize) -> Self {
        Self {
            store,
            roster,
            history_limit: history_limit.max(1),
        }
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    /// Validate and apply a quota change for `participant_id`.
    ///
    /// `is_admin` is the caller's authorization as decided by the auth layer.
    ///
    /// # Errors
    /// - [`LedgerError::Unauthorized`] when `is_admin` is false.
    /// - [`LedgerError::Invalid`] when either value is negative or too large.
    /// - [`LedgerError::NotFound`] when the participant does not exist.
    /// - [`LedgerError::Storage`] when the backend fails; nothing is applied.
    pub async fn apply_quota_change(
        &self,
        is_admin: bool,
        participant_id: ParticipantId,
        base_quota: i64,
        quota: i64,
    ) -> Result<QuotaChangeResult, LedgerError> {
        if !is_admin {
            metrics::counter!("partybox_quota_changes_total", "outcome" => "unauthorized")
                .increment(1);
            return Err(LedgerError::Unauthorized);
        }
        let target = QuotaValues::try_from_raw(base_quota, quota).inspect_err(|_| {
            metrics::counter!("partybox_quota_changes_total", "outcome" => "invalid")
                .increment(1);
        })?;

        let result = self
            .store
            .apply_quota_change(participant_id, target, Utc::now(), self.history_limit)
            .await
            .map_err(|err| match err {
                StoreError::NotFound(_) => LedgerError::NotFound(participant_id),
                other => LedgerError::Storage(other),
            });

        let result = match result {
            Ok(result) => result,
            Err(err) => {
                let label = match err {
                    LedgerError::NotFound(_) => "not_found",
                    _ => "storage_error",
                };
                metrics::counter!("partybox_quota_changes_total", "outcome" => label)
                    .increment(1);
                return Err(err);
            }
        };

        match result.outcome {
            QuotaOutcome::Applied => {
                self.roster.invalidate();
                metrics::counter!("partybox_quota_changes_total", "outcome" => "applied")
                    .increment(1);
                tracing::info!(
                    participant = %participant_id,
                    base_quota = result.participant.base_quota,
                    quota = result.participant.quota,
                    "quota change applied"
                );
            }
            QuotaOutcome::Unchanged => {
                metrics::counter!("partybox_quota_changes_total", "outcome" => "unchanged")
                    .increment(1);
                tracing::debug!(participant = %participant_id, "quota change was a no-op");
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewParticipant;
    use crate::store::memory::InMemoryStore;
    use partybox_common::MAX_HISTORY_ITEMS;

    fn participant(base_quota: u32, quota: u32) -> Participant {
        let now = Utc::now();
        Participant {
            id: ParticipantId::new(),
            name: "Ada".to_string(),
            surname: "Lovelace".to_string(),
            base_quota,
            quota,
            quota_history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    async fn ledger_with(
        base_quota: u32,
        quota: u32,
    ) -> (QuotaLedger, Arc<InMemoryStore>, ParticipantId) {
        let store = Arc::new(InMemoryStore::new());
        let mut doc = NewParticipant::validated("Ada", "Lovelace")
            .expect("valid")
            .into_stored(ParticipantId::new(), Utc::now());
        doc.base_quota = Some(i64::from(base_quota));
        doc.quota = Some(i64::from(quota));
        let id = doc.id;
        store.insert_document(doc).await;
        let ledger = QuotaLedger::new(
            store.clone(),
            Arc::new(RosterCache::new()),
            MAX_HISTORY_ITEMS,
        );
        (ledger, store, id)
    }

    #[test]
    fn plan_returns_none_when_values_match() {
        let current = participant(5, 5);
        assert!(plan_change(&current, QuotaValues::new(5, 5), Utc::now()).is_none());
    }

    #[test]
    fn plan_only_sets_fields_that_move() {
        let current = participant(5, 5);
        let update = plan_change(&current, QuotaValues::new(5, 8), Utc::now()).expect("update");
        assert_eq!(update.base_quota, None);
        assert_eq!(update.quota, Some(8));
        assert_eq!(update.feedback.base_quota, Some(5));
        assert_eq!(update.feedback.quota, Some(8));
        assert_eq!(update.feedback.difference, Some(3));

        let update = plan_change(&current, QuotaValues::new(9, 5), Utc::now()).expect("update");
        assert_eq!(update.base_quota, Some(9));
        assert_eq!(update.quota, None);
        assert_eq!(update.feedback.difference, Some(0));
    }

    #[test]
    fn apply_prepends_and_bounds_history() {
        let mut doc = NewParticipant::validated("Ada", "Lovelace")
            .expect("valid")
            .into_stored(ParticipantId::new(), Utc::now());
        let start = Utc::now();
        for quota in 1..=25u32 {
            let current = Participant::from_stored(doc.clone());
            let at = start + chrono::Duration::seconds(i64::from(quota));
            let update = plan_change(&current, QuotaValues::new(0, quota), at).expect("update");
            apply_change(&mut doc, &update, MAX_HISTORY_ITEMS);
            assert_eq!(
                doc.quota_history.as_ref().map(Vec::len),
                Some((quota as usize).min(MAX_HISTORY_ITEMS))
            );
        }
        let current = Participant::from_stored(doc);
        assert_eq!(current.quota, 25);
        let quotas: Vec<u32> = current
            .quota_history
            .iter()
            .filter_map(|entry| entry.quota)
            .collect();
        let expected: Vec<u32> = (6..=25).rev().collect();
        assert_eq!(quotas, expected);
    }

    #[test]
    fn apply_leaves_existing_entries_and_unchanged_fields_alone() {
        let at = Utc::now();
        let legacy = StoredFeedback {
            timestamp: at - chrono::Duration::days(30),
            base_quota: None,
            quota: None,
            difference: Some(3),
            new_quota: Some(3),
            field: Some("quota".to_string()),
        };
        let mut doc = NewParticipant::validated("Ada", "Lovelace")
            .expect("valid")
            .into_stored(ParticipantId::new(), at);
        doc.quota = Some(3);
        doc.base_quota = None;
        doc.quota_history = Some(vec![legacy.clone()]);

        let current = Participant::from_stored(doc.clone());
        let update = plan_change(&current, QuotaValues::new(3, 5), at).expect("update");
        apply_change(&mut doc, &update, MAX_HISTORY_ITEMS);

        assert_eq!(doc.quota, Some(5));
        assert_eq!(doc.base_quota, None);
        let history = doc.quota_history.expect("history");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].quota, Some(5));
        assert_eq!(history[0].base_quota, Some(3));
        assert_eq!(history[1], legacy);
    }

    #[test]
    fn prepend_bounded_evicts_single_oldest() {
        let mut history: Vec<u32> = (1..=20).rev().collect();
        prepend_bounded(&mut history, 21, 20);
        assert_eq!(history.len(), 20);
        assert_eq!(history.first(), Some(&21));
        assert_eq!(history.last(), Some(&2));
    }

    #[tokio::test]
    async fn applied_then_unchanged_scenario() {
        let (ledger, _store, id) = ledger_with(5, 5).await;

        let first = ledger.apply_quota_change(true, id, 5, 8).await.expect("apply");
        assert_eq!(first.outcome, QuotaOutcome::Applied);
        assert_eq!(first.participant.quota, 8);
        assert_eq!(first.participant.quota_history.len(), 1);
        let entry = &first.participant.quota_history[0];
        assert_eq!(entry.base_quota, Some(5));
        assert_eq!(entry.quota, Some(8));
        assert_eq!(entry.difference, Some(3));

        let second = ledger.apply_quota_change(true, id, 5, 8).await.expect("repeat");
        assert_eq!(second.outcome, QuotaOutcome::Unchanged);
        assert_eq!(second.participant.quota_history.len(), 1);
    }

    #[tokio::test]
    async fn unauthorized_caller_never_mutates() {
        let (ledger, store, id) = ledger_with(2, 2).await;
        let err = ledger
            .apply_quota_change(false, id, 3, 9)
            .await
            .expect_err("unauthorized");
        assert!(matches!(err, LedgerError::Unauthorized));
        let stored = store.get_participant(id).await.expect("participant");
        assert_eq!(stored.values(), QuotaValues::new(2, 2));
        assert!(stored.quota_history.is_empty());
    }

    #[tokio::test]
    async fn negative_values_are_rejected_without_writes() {
        let (ledger, store, id) = ledger_with(1, 1).await;
        for (base, quota) in [(-1, 1), (1, -1), (-3, -3)] {
            for is_admin in [true, false] {
                assert!(ledger.apply_quota_change(is_admin, id, base, quota).await.is_err());
            }
            let err = ledger
                .apply_quota_change(true, id, base, quota)
                .await
                .expect_err("invalid");
            assert!(matches!(err, LedgerError::Invalid(_)));
        }
        let stored = store.get_participant(id).await.expect("participant");
        assert_eq!(stored.values(), QuotaValues::new(1, 1));
        assert!(stored.quota_history.is_empty());
    }

    #[tokio::test]
    async fn missing_participant_is_not_found() {
        let (ledger, _store, _id) = ledger_with(0, 0).await;
        let missing = ParticipantId::new();
        let err = ledger
            .apply_quota_change(true, missing, 1, 1)
            .await
            .expect_err("missing");
        assert!(matches!(err, LedgerError::NotFound(id) if id == missing));
    }

    #[tokio::test]
    async fn full_history_evicts_oldest_on_next_change() {
        let (ledger, _store, id) = ledger_with(0, 0).await;
        for quota in 1..=20 {
            ledger.apply_quota_change(true, id, 0, quota).await.expect("fill");
        }
        let before = ledger.apply_quota_change(true, id, 0, 20).await.expect("noop");
        assert_eq!(before.participant.quota_history.len(), 20);
        assert_eq!(
            before.participant.quota_history.last().and_then(|e| e.quota),
            Some(1)
        );

        let after = ledger.apply_quota_change(true, id, 0, 21).await.expect("21st");
        let history = &after.participant.quota_history;
        assert_eq!(history.len(), 20);
        assert_eq!(history.first().and_then(|e| e.quota), Some(21));
        assert_eq!(history.last().and_then(|e| e.quota), Some(2));
    }

    #[tokio::test]
    async fn applied_change_invalidates_roster() {
        let (ledger, store, id) = ledger_with(0, 0).await;
        let roster = ledger.roster.clone();
        let first = roster.render(store.as_ref()).await.expect("render");
        assert_eq!(first[0].quota, 0);

        ledger.apply_quota_change(true, id, 0, 4).await.expect("apply");
        let second = roster.render(store.as_ref()).await.expect("render");
        assert_eq!(second[0].quota, 4);
        assert_eq!(second[0].quota_history.len(), 1);
    }
}
