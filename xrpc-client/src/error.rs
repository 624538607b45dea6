//! Client error types.

use thiserror::Error;
use xrpc_protocol::{Fault, ProtocolError};

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("HTTP status {status}: expected 200")]
    HttpStatus { status: u16 },

    #[error("unexpected Content-Type {0:?}: expected text/xml")]
    ContentType(Option<String>),

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("call canceled")]
    Canceled,

    #[error("server fault {0}")]
    Fault(Fault),

    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("{0}")]
    InvalidHeader(String),

    #[error("header {0:?} is managed by the client and cannot be overridden")]
    ReservedHeader(String),

    #[error("TLS configuration error: {0}")]
    TlsConfig(String),
}

impl ClientError {
    pub(crate) fn invalid_url(url: &str, reason: impl Into<String>) -> Self {
        ClientError::InvalidUrl {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    /// Returns whether retrying the same call could succeed.
    ///
    /// The client never retries on its own.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport(_) => true,
            ClientError::HttpStatus { status } => matches!(status, 502..=504),
            _ => false,
        }
    }

    /// Returns the fault if the server reported one.
    pub fn as_fault(&self) -> Option<&Fault> {
        match self {
            ClientError::Fault(fault) => Some(fault),
            _ => None,
        }
    }
}
