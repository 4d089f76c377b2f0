use thiserror::Error;

/// Failures at the collaborator boundary. None of these are fatal to the
/// engine: fetch errors wait for the next interval, ack errors are logged
/// after the local state already moved on, malformed payloads degrade to
/// whatever fields did parse.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification fetch failed: {reason}")]
    Fetch { reason: String },

    #[error("acknowledge failed for '{id}': {reason}")]
    Ack { id: String, reason: String },

    #[error("malformed {channel} payload: {reason}")]
    MalformedPayload {
        channel: &'static str,
        reason: String,
    },
}

impl NotifyError {
    pub fn fetch(reason: impl Into<String>) -> Self {
        Self::Fetch {
            reason: reason.into(),
        }
    }

    pub fn ack(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Ack {
            id: id.into(),
            reason: reason.into(),
        }
    }
}
