//! Admin-side client for the partybox API.
//!
//! Edits to a participant's quota are shown immediately by a [`QuotaWidget`]
//! and then confirmed or rolled back once the server answers. [`save`] drives
//! one round trip through any [`QuotaTransport`].
pub mod error;
pub mod transport;
pub mod widget;

pub use error::TransportError;
pub use transport::{HttpTransport, QuotaTransport, SubmitOutcome};
pub use widget::{QuotaWidget, SaveStatus, SaveTicket, WidgetPhase};

/// Submit the widget's pending edit and reconcile with the answer.
///
/// Returns `None` when the widget had nothing to save or was already saving.
pub async fn save(widget: &mut QuotaWidget, transport: &dyn QuotaTransport) -> Option<SaveStatus> {
    let ticket = widget.begin_save()?;
    tracing::debug!(
        participant_id = %ticket.participant_id,
        base_quota = ticket.values.base_quota,
        quota = ticket.values.quota,
        "submitting quota"
    );
    let result = transport
        .submit_quota(ticket.participant_id, ticket.values)
        .await;
    Some(widget.finish_save(result))
}

/// Load the roster and build one widget per participant.
pub async fn fetch_roster(transport: &HttpTransport) -> Result<Vec<QuotaWidget>, TransportError> {
    let views = transport.fetch_roster().await?;
    Ok(views.into_iter().map(QuotaWidget::from_view).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use partybox_common::ids::ParticipantId;
    use partybox_common::{ParticipantView, QuotaOutcome, QuotaValues};
    use reqwest::StatusCode;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeTransport {
        fail: bool,
        calls: Mutex<Vec<(ParticipantId, QuotaValues)>>,
    }

    #[async_trait]
    impl QuotaTransport for FakeTransport {
        async fn submit_quota(
            &self,
            participant_id: ParticipantId,
            values: QuotaValues,
        ) -> Result<SubmitOutcome, TransportError> {
            self.calls
                .lock()
                .expect("calls lock")
                .push((participant_id, values));
            if self.fail {
                return Err(TransportError::Rejected {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "internal".to_string(),
                    message: "internal error".to_string(),
                });
            }
            Ok(SubmitOutcome {
                outcome: QuotaOutcome::Applied,
                participant: ParticipantView {
                    id: participant_id,
                    name: "Grace".to_string(),
                    surname: "Hopper".to_string(),
                    base_quota: values.base_quota,
                    quota: values.quota,
                    quota_history: Vec::new(),
                },
            })
        }
    }

    fn widget() -> QuotaWidget {
        QuotaWidget::from_view(ParticipantView {
            id: ParticipantId::new(),
            name: "Grace".to_string(),
            surname: "Hopper".to_string(),
            base_quota: 4,
            quota: 4,
            quota_history: Vec::new(),
        })
    }

    #[tokio::test]
    async fn save_skips_clean_widget() {
        let transport = FakeTransport::default();
        let mut widget = widget();
        assert!(save(&mut widget, &transport).await.is_none());
        assert!(transport.calls.lock().expect("calls lock").is_empty());
    }

    #[tokio::test]
    async fn save_submits_displayed_values() {
        let transport = FakeTransport::default();
        let mut widget = widget();
        widget.increment();
        let status = save(&mut widget, &transport).await;
        assert_eq!(status, Some(SaveStatus::Applied));
        let calls = transport.calls.lock().expect("calls lock");
        assert_eq!(calls.as_slice(), &[(widget.participant_id(), QuotaValues::new(4, 5))]);
    }

    #[tokio::test]
    async fn save_rolls_back_on_server_error() {
        let transport = FakeTransport {
            fail: true,
            ..FakeTransport::default()
        };
        let mut widget = widget();
        widget.stage_quota(10);
        let status = save(&mut widget, &transport).await;
        assert!(matches!(status, Some(SaveStatus::RolledBack { .. })));
        assert_eq!(widget.displayed(), QuotaValues::new(4, 4));
        assert!(widget.history().is_empty());
    }
}
