mod transport;
mod orchestrator;
mod auth;

#[cfg(any(test, feature = "mock"))]
mod mock;

pub use transport::{
    HttpRequest, HttpResponse, HttpTransport, Method, RequestBody, ReqwestTransport, TransportError,
};
pub use orchestrator::OrchestratorClient;
pub use auth::{AuthClient, AuthConfig, AuthError, HandshakeStep, StepDelay};

#[cfg(any(test, feature = "mock"))]
pub use mock::MockTransport;

use prover_protocol::ProtocolError;
use thiserror::Error;

/// Outcome classes the worker cycle reacts to.
///
/// Classification happens once, where an HTTP response (or the lack of one)
/// is turned into an error; nothing downstream inspects status codes or
/// message text again.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    #[error("Rate limited by orchestrator")]
    RateLimited,

    #[error("Proof rejected: {0}")]
    Rejected(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Unexpected status {status}: {body}")]
    Unknown { status: u16, body: String },

    #[error("Malformed task response: {0}")]
    Decode(ProtocolError),

    #[error("Task response has no task id")]
    MissingTaskId,

    #[error("Request encoding failed: {0}")]
    Encode(ProtocolError),
}

pub type Result<T> = std::result::Result<T, ClientError>;

impl From<TransportError> for ClientError {
    fn from(e: TransportError) -> Self {
        ClientError::Transient(e.to_string())
    }
}

impl ClientError {
    /// Short stable label for logs and reports
    pub fn kind(&self) -> &'static str {
        match self {
            ClientError::RateLimited => "rate_limited",
            ClientError::Rejected(_) => "rejected",
            ClientError::Unauthorized => "unauthorized",
            ClientError::Transient(_) => "transient",
            ClientError::Unknown { .. } => "unknown",
            ClientError::Decode(_) => "decode",
            ClientError::MissingTaskId => "missing_task_id",
            ClientError::Encode(_) => "encode",
        }
    }
}

// Bodies are truncated in error messages to keep logs readable.
const MAX_BODY_IN_ERROR: usize = 256;

/// Map a non-success response onto a [`ClientError`].
///
/// Status codes take precedence; body text is only consulted for statuses
/// that carry no specific meaning on their own.
pub fn classify_response(status: u16, body: &[u8]) -> ClientError {
    let text = String::from_utf8_lossy(body);
    let lower = text.to_lowercase();

    match status {
        429 => ClientError::RateLimited,
        422 => ClientError::Rejected(truncate(&text)),
        401 | 403 => ClientError::Unauthorized,
        500..=599 => ClientError::Transient(format!("status {}: {}", status, truncate(&text))),
        _ if lower.contains("rate limit") || lower.contains("too many requests") => {
            ClientError::RateLimited
        }
        _ if lower.contains("proof verification failed")
            || lower.contains("unprocessable entity") =>
        {
            ClientError::Rejected(truncate(&text))
        }
        _ => ClientError::Unknown {
            status,
            body: truncate(&text),
        },
    }
}

fn truncate(text: &str) -> String {
    if text.len() <= MAX_BODY_IN_ERROR {
        return text.to_string();
    }
    let mut end = MAX_BODY_IN_ERROR;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
