//! Per-participant quota editor.
//!
//! The widget shows edits immediately and reconciles with the server when a
//! save finishes. `committed` is the last value the server accepted;
//! `displayed` is what the operator sees. A failed save, whatever the cause,
//! puts `displayed` back to `committed`.
use crate::error::TransportError;
use crate::transport::SubmitOutcome;
use chrono::{DateTime, Utc};
use partybox_common::ids::ParticipantId;
use partybox_common::{Feedback, MAX_HISTORY_ITEMS, ParticipantView, QuotaOutcome, QuotaValues};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WidgetPhase {
    Clean,
    Dirty,
    Saving,
}

/// Handed out by [`QuotaWidget::begin_save`]; carries what must be submitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SaveTicket {
    pub participant_id: ParticipantId,
    pub values: QuotaValues,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SaveStatus {
    /// Server recorded the change; a history entry was added locally.
    Applied,
    /// Server already held these values.
    Unchanged,
    /// Displayed values were reset to the committed baseline.
    RolledBack { message: String },
}

#[derive(Clone, Debug)]
pub struct QuotaWidget {
    participant_id: ParticipantId,
    name: String,
    surname: String,
    committed: QuotaValues,
    displayed: QuotaValues,
    history: Vec<Feedback>,
    phase: WidgetPhase,
    pending: Option<QuotaValues>,
    last_error: Option<String>,
}

impl QuotaWidget {
    pub fn from_view(view: ParticipantView) -> Self {
        let values = view.values();
        let mut history = view.quota_history;
        history.truncate(MAX_HISTORY_ITEMS);
        Self {
            participant_id: view.id,
            name: view.name,
            surname: view.surname,
            committed: values,
            displayed: values,
            history,
            phase: WidgetPhase::Clean,
            pending: None,
            last_error: None,
        }
    }

    pub fn participant_id(&self) -> ParticipantId {
        self.participant_id
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.name, self.surname)
    }

    pub fn committed(&self) -> QuotaValues {
        self.committed
    }

    pub fn displayed(&self) -> QuotaValues {
        self.displayed
    }

    /// Newest first.
    pub fn history(&self) -> &[Feedback] {
        &self.history
    }

    pub fn phase(&self) -> WidgetPhase {
        self.phase
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn stage_base(&mut self, base_quota: u32) {
        self.displayed.base_quota = base_quota;
        self.after_edit();
    }

    pub fn stage_quota(&mut self, quota: u32) {
        self.displayed.quota = quota;
        self.after_edit();
    }

    pub fn increment(&mut self) {
        self.stage_quota(self.displayed.quota.saturating_add(1));
    }

    /// Stops at zero.
    pub fn decrement(&mut self) {
        self.stage_quota(self.displayed.quota.saturating_sub(1));
    }

    pub fn can_save(&self) -> bool {
        self.phase == WidgetPhase::Dirty
    }

    /// Enter `Saving`. Returns `None` when there is nothing to save or a save
    /// is already in flight.
    pub fn begin_save(&mut self) -> Option<SaveTicket> {
        if !self.can_save() {
            return None;
        }
        self.phase = WidgetPhase::Saving;
        self.pending = Some(self.displayed);
        self.last_error = None;
        Some(SaveTicket {
            participant_id: self.participant_id,
            values: self.displayed,
        })
    }

    pub fn finish_save(&mut self, result: Result<SubmitOutcome, TransportError>) -> SaveStatus {
        self.finish_save_at(result, Utc::now())
    }

    pub(crate) fn finish_save_at(
        &mut self,
        result: Result<SubmitOutcome, TransportError>,
        now: DateTime<Utc>,
    ) -> SaveStatus {
        let Some(submitted) = self.pending.take() else {
            return SaveStatus::RolledBack {
                message: "no save in progress".to_string(),
            };
        };
        match result {
            Ok(outcome) => {
                let previous = self.committed;
                self.committed = submitted;
                self.settle();
                match outcome.outcome {
                    QuotaOutcome::Applied => {
                        // The server's record wins; it saw the true previous quota.
                        let entry = outcome
                            .participant
                            .quota_history
                            .into_iter()
                            .next()
                            .unwrap_or_else(|| Feedback::recorded(now, submitted, previous.quota));
                        self.history.insert(0, entry);
                        self.history.truncate(MAX_HISTORY_ITEMS);
                        SaveStatus::Applied
                    }
                    QuotaOutcome::Unchanged => SaveStatus::Unchanged,
                }
            }
            Err(err) => {
                let message = err.user_message();
                tracing::warn!(
                    participant_id = %self.participant_id,
                    error = %err,
                    "quota save rolled back"
                );
                self.displayed = self.committed;
                self.phase = WidgetPhase::Clean;
                self.last_error = Some(message.clone());
                SaveStatus::RolledBack { message }
            }
        }
    }

    fn after_edit(&mut self) {
        if self.phase != WidgetPhase::Saving {
            self.settle();
        }
    }

    fn settle(&mut self) {
        self.phase = if self.displayed == self.committed {
            WidgetPhase::Clean
        } else {
            WidgetPhase::Dirty
        };
    }
}
