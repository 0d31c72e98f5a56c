//! Client side of the HTTP API.
//!
//! [`QuotaTransport`] is the seam the save driver talks to; [`HttpTransport`]
//! implements it over `reqwest` and adds the few calls an admin console needs
//! around it (login, roster, participant creation).
use crate::error::TransportError;
use async_trait::async_trait;
use partybox_common::ids::ParticipantId;
use partybox_common::{
    ErrorResponse, LoginRequest, LoginResponse, ParticipantCreateRequest, ParticipantListResponse,
    ParticipantView, QuotaOutcome, QuotaUpdateRequest, QuotaUpdateResponse, QuotaValues,
};
use serde::de::DeserializeOwned;
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Server answer to an accepted quota submission.
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub outcome: QuotaOutcome,
    pub participant: ParticipantView,
}

#[async_trait]
pub trait QuotaTransport: Send + Sync {
    async fn submit_quota(
        &self,
        participant_id: ParticipantId,
        values: QuotaValues,
    ) -> Result<SubmitOutcome, TransportError>;
}

#[derive(Clone)]
pub struct HttpTransport {
    base_url: String,
    client: reqwest::Client,
    token: Option<String>,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            token: None,
        })
    }

    /// Use an existing session token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn has_session(&self) -> bool {
        self.token.is_some()
    }

    /// Log in as the administrator and keep the session for later calls.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<(), TransportError> {
        let request = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let response = self
            .client
            .post(self.url("/v1/session"))
            .json(&request)
            .send()
            .await?;
        let session: LoginResponse = read_body(response).await?;
        self.token = Some(session.token);
        tracing::debug!(user = username, "partybox session established");
        Ok(())
    }

    /// Current roster, sorted by name with history newest first.
    pub async fn fetch_roster(&self) -> Result<Vec<ParticipantView>, TransportError> {
        let response = self.client.get(self.url("/v1/participants")).send().await?;
        let list: ParticipantListResponse = read_body(response).await?;
        Ok(list.items)
    }

    pub async fn create_participant(
        &self,
        name: &str,
        surname: &str,
    ) -> Result<ParticipantView, TransportError> {
        let token = self.token()?;
        let response = self
            .client
            .post(self.url("/v1/participants"))
            .bearer_auth(token)
            .json(&ParticipantCreateRequest {
                name: name.to_string(),
                surname: surname.to_string(),
            })
            .send()
            .await?;
        read_body(response).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn token(&self) -> Result<&str, TransportError> {
        self.token.as_deref().ok_or(TransportError::MissingSession)
    }
}

#[async_trait]
impl QuotaTransport for HttpTransport {
    async fn submit_quota(
        &self,
        participant_id: ParticipantId,
        values: QuotaValues,
    ) -> Result<SubmitOutcome, TransportError> {
        let token = self.token()?;
        let response = self
            .client
            .put(self.url(&format!("/v1/participants/{participant_id}/quota")))
            .bearer_auth(token)
            .json(&QuotaUpdateRequest::from(values))
            .send()
            .await?;
        let body: QuotaUpdateResponse = read_body(response).await?;
        Ok(SubmitOutcome {
            outcome: body.outcome,
            participant: body.participant,
        })
    }
}

/// Decode a success body, or turn an error status into [`TransportError::Rejected`].
async fn read_body<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, TransportError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|err| TransportError::Decode(err.to_string()));
    }
    let text = response.text().await.unwrap_or_default();
    let (code, message) = match serde_json::from_str::<ErrorResponse>(&text) {
        Ok(body) => (body.code, body.message),
        Err(_) => (
            "http_error".to_string(),
            status
                .canonical_reason()
                .unwrap_or("request rejected")
                .to_string(),
        ),
    };
    Err(TransportError::Rejected {
        status,
        code,
        message,
    })
}
