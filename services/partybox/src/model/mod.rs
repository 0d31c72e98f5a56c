//! Partybox data model module.
//!
//! # Purpose
//! Re-exports the party and participant records used by the API, the quota
//! ledger, and the store backends, along with the raw persisted shapes that are
//! decoded once at the storage boundary.
mod participant;
mod party;

pub use participant::{
    NewParticipant, Participant, StoredFeedback, StoredParticipant, decode_history, decode_stored_entries,
};
pub use party::{Party, PartyDraft};
