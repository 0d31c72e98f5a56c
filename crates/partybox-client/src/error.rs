use reqwest::StatusCode;
use thiserror::Error;

/// Anything that stops a request from producing a usable answer.
///
/// A save treats every variant the same way: the widget rolls back.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The server answered with a non-success status.
    #[error("{message} ({status}, {code})")]
    Rejected {
        status: StatusCode,
        code: String,
        message: String,
    },
    /// The request never completed: connect failure, timeout, reset.
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// The server answered 2xx with a body we could not read.
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("not logged in")]
    MissingSession,
}

impl TransportError {
    /// Short text suitable for showing next to the widget.
    pub fn user_message(&self) -> String {
        match self {
            TransportError::Rejected { status, message, .. }
                if *status == StatusCode::UNAUTHORIZED =>
            {
                format!("Not authorized: {message}")
            }
            TransportError::Rejected { message, .. } => format!("Save failed: {message}"),
            TransportError::Network(_) => "Save failed: server unreachable".to_string(),
            TransportError::Decode(_) => "Save failed: unexpected server response".to_string(),
            TransportError::MissingSession => "Not authorized: log in first".to_string(),
        }
    }
}
