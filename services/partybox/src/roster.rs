//! Roster read path and its rendering cache.
//!
//! # Purpose
//! Serves the participant list sorted by name with each history decoded and
//! ordered newest first, and caches the rendered list between mutations.
//!
//! # Concurrency
//! A generation counter guards the cache: a render that started before an
//! invalidation is returned to its caller but never stored, so a stale list
//! cannot outlive the mutation that invalidated it.
use crate::store::{PartyStore, StoreResult};
use partybox_common::ParticipantView;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

type Rendered = Arc<Vec<ParticipantView>>;

#[derive(Debug, Default)]
pub struct RosterCache {
    generation: AtomicU64,
    rendered: RwLock<Option<(u64, Rendered)>>,
}

impl RosterCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the cached rendering; the next read goes to the store.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut slot) = self.rendered.write() {
            *slot = None;
        }
    }

    /// Return the rendered roster, loading it from `store` on a miss.
    pub async fn render(&self, store: &dyn PartyStore) -> StoreResult<Rendered> {
        let generation = self.generation.load(Ordering::SeqCst);
        if let Ok(slot) = self.rendered.read()
            && let Some((cached_generation, list)) = slot.as_ref()
            && *cached_generation == generation
        {
            metrics::counter!("partybox_roster_cache_total", "result" => "hit").increment(1);
            return Ok(list.clone());
        }

        metrics::counter!("partybox_roster_cache_total", "result" => "miss").increment(1);
        let participants = store.list_participants().await?;
        let list: Rendered = Arc::new(participants.iter().map(|p| p.view()).collect());
        if let Ok(mut slot) = self.rendered.write()
            && self.generation.load(Ordering::SeqCst) == generation
        {
            *slot = Some((generation, list.clone()));
        }
        Ok(list)
    }

    #[cfg(test)]
    fn is_warm(&self) -> bool {
        self.rendered
            .read()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }
}
