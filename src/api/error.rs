use thiserror::Error;

/// Errors returned by the order backend client.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApiError {
    /// The request never produced a response (connect, TLS, reset).
    #[error("HTTP error: {0}")]
    Http(String),
    /// The request did not complete within the configured timeout.
    #[error("Request timed out after {0} ms")]
    Timeout(u64),
    /// The backend answered with a non-success envelope code.
    #[error("Rejected by server ({code}): {message}")]
    Rejected { code: u16, message: String },
    /// The response body could not be understood.
    #[error("Decode error: {0}")]
    Decode(String),
}

impl ApiError {
    /// Failures that say nothing about the order itself.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Timeout(_))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::Decode(error.to_string())
        } else {
            Self::Http(error.to_string())
        }
    }
}
