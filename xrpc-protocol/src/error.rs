//! Protocol error types.

use thiserror::Error;

/// Errors raised while encoding calls or decoding responses.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid method name {0:?}: only A-Z a-z 0-9 . _ : / are allowed")]
    InvalidMethodName(String),

    #[error("unsupported value: {0}")]
    UnsupportedValue(String),

    #[error("malformed value: {0}")]
    MalformedValue(String),

    #[error("malformed XML: {0}")]
    MalformedXml(#[from] roxmltree::Error),

    #[error("invalid UTF-8 in response body")]
    InvalidUtf8,

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ProtocolError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        ProtocolError::MalformedValue(reason.into())
    }

    pub(crate) fn unsupported(reason: impl Into<String>) -> Self {
        ProtocolError::UnsupportedValue(reason.into())
    }

    pub(crate) fn invalid_response(reason: impl Into<String>) -> Self {
        ProtocolError::InvalidResponse(reason.into())
    }

    /// Returns whether the error was raised before anything was sent.
    ///
    /// Method name validation and capability gating happen while the request
    /// is being built, so no network traffic is involved.
    pub fn is_request_side(&self) -> bool {
        matches!(
            self,
            ProtocolError::InvalidMethodName(_) | ProtocolError::UnsupportedValue(_)
        )
    }
}
