// Error taxonomy. Nothing here is fatal: every variant is recovered where it
// is raised and at worst degrades the engine to visual-only operation.

/// A snapshot or prediction request to the provider failed.
#[derive(Debug, thiserror::Error)]
pub enum FetchFailure {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider answered with a non-2xx status.
    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The payload was not the JSON shape we expect.
    #[error("malformed payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0}")]
    Provider(String),
}

/// The sound-producing device could not be created.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("audio output unavailable: {reason}")]
pub struct AudioUnavailable {
    pub reason: String,
}

impl AudioUnavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// A zone or alert record that was dropped from a snapshot.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvalidSnapshot {
    #[error("{kind} record #{index} could not be decoded: {reason}")]
    Malformed {
        kind: &'static str,
        index: usize,
        reason: String,
    },

    #[error("{kind} record '{id}' has an empty {field}")]
    MissingField {
        kind: &'static str,
        id: String,
        field: &'static str,
    },

    #[error("zone '{id}' reports a non-finite {field}")]
    NonFinite { id: String, field: &'static str },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("settings I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings are not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
