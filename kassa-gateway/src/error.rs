//! Gateway error types

use http::StatusCode;
use kassa_config::ConfigError;
use kassa_psp::PspError;
use thiserror::Error;

/// Gateway error types
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Request malformed before it was sent, or bad callback input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Signature mismatch, inbound or outbound
    #[error("Signature verification failed: {0}")]
    Hmac(String),

    /// Network or HTTP failure talking to the PSP
    #[error("Transport error: {0}")]
    Transport(String),

    /// Item total differs from the order total by more than the item count
    #[error("Rounding error: items differ from order total by {delta} (tolerance {tolerance})")]
    Rounding { delta: i64, tolerance: i64 },

    /// Order, refund or token lookup miss
    #[error("Not found: {0}")]
    NotFound(String),

    /// PSP declined the operation
    #[error("Rejected by payment service ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Host store failure
    #[error("Store error: {0}")]
    Store(String),

    /// Advisory lock I/O failure
    #[error("Lock error: {0}")]
    Lock(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl GatewayError {
    /// HTTP status for responses and error page titles
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Hmac(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Rejected { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Self::Transport(_) => StatusCode::BAD_GATEWAY,
            Self::Rounding { .. } | Self::Store(_) | Self::Lock(_) | Self::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// "Not directly refundable"
    pub fn is_not_refundable(&self) -> bool {
        matches!(self, Self::Rejected { status, .. } if *status == kassa_psp::NOT_REFUNDABLE_STATUS)
    }

    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

impl From<PspError> for GatewayError {
    fn from(err: PspError) -> Self {
        match err {
            PspError::Validation(msg) => Self::Validation(msg),
            PspError::Hmac(msg) => Self::Hmac(msg),
            PspError::Transport(msg) => Self::Transport(msg),
            PspError::Rejected { status, message } => Self::Rejected { status, message },
            PspError::Serialization(msg) => {
                Self::Transport(format!("unreadable response: {}", msg))
            }
            PspError::Config(msg) => Self::Config(msg),
        }
    }
}

impl From<ConfigError> for GatewayError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        Self::Lock(err.to_string())
    }
}

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            GatewayError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(GatewayError::Hmac("x".into()).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            GatewayError::not_found("refund").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            GatewayError::Rejected {
                status: 422,
                message: "no".into()
            }
            .status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            GatewayError::Transport("down".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            GatewayError::Rounding {
                delta: 5,
                tolerance: 2
            }
            .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_psp_errors_convert() {
        let err: GatewayError = PspError::Rejected {
            status: 422,
            message: "Refund not supported".into(),
        }
        .into();
        assert!(err.is_not_refundable());

        let err: GatewayError = PspError::Hmac("bad".into()).into();
        assert!(matches!(err, GatewayError::Hmac(_)));
    }
}
