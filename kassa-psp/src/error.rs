//! Error types for PSP communication

use thiserror::Error;

/// PSP error types
#[derive(Error, Debug)]
pub enum PspError {
    /// Request rejected locally before it was sent
    #[error("Validation error: {0}")]
    Validation(String),

    /// Signature missing or not matching the shared secret
    #[error("Signature verification failed: {0}")]
    Hmac(String),

    /// Network failure, timeout or unreadable HTTP exchange
    #[error("Transport error: {0}")]
    Transport(String),

    /// PSP answered with a non-success status
    #[error("PSP rejected the request with status {status}: {message}")]
    Rejected { status: u16, message: String },

    /// Response body did not match the expected shape
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Client misconfiguration (bad base URL, empty credentials)
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PspError {
    /// Status code the PSP assigned, when it answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// "Not directly refundable": the PSP wants an e-mail refund instead.
    pub fn is_not_refundable(&self) -> bool {
        self.status() == Some(NOT_REFUNDABLE_STATUS)
    }
}

/// Status the PSP answers when a payment cannot be refunded directly.
pub const NOT_REFUNDABLE_STATUS: u16 = 422;

impl From<reqwest::Error> for PspError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PspError::Transport(format!("request timed out: {}", err))
        } else if err.is_decode() {
            PspError::Serialization(err.to_string())
        } else {
            PspError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for PspError {
    fn from(err: serde_json::Error) -> Self {
        PspError::Serialization(err.to_string())
    }
}

impl From<url::ParseError> for PspError {
    fn from(err: url::ParseError) -> Self {
        PspError::Config(format!("invalid URL: {}", err))
    }
}

/// Result type for PSP operations
pub type PspResult<T> = Result<T, PspError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_refundable_detection() {
        let err = PspError::Rejected {
            status: 422,
            message: "Payment not refundable".into(),
        };
        assert!(err.is_not_refundable());
        assert_eq!(err.status(), Some(422));

        let other = PspError::Rejected {
            status: 400,
            message: "Bad request".into(),
        };
        assert!(!other.is_not_refundable());
        assert!(!PspError::Transport("down".into()).is_not_refundable());
    }
}
