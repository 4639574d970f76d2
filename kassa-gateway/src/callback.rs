//! Callback endpoint
//!
//! Browser returns, payment webhooks and refund webhooks all arrive at the
//! same URL. The query string decides which flow handles them.

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::Gateway;
use crate::host::CartSession;
use http::StatusCode;
use kassa_psp::params;
use std::collections::HashMap;

/// Value of a required query parameter
pub(crate) fn required<'q>(query: &'q HashMap<String, String>, key: &str) -> GatewayResult<&'q str> {
    query
        .get(key)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| GatewayError::Validation(format!("missing parameter {}", key)))
}

/// What the shop sends back to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackResponse {
    /// Browser return: continue to the order page
    Redirect { location: String },
    /// Plain-text answer ending the request
    Text { status: StatusCode, body: String },
    /// Blocking error page
    ErrorPage {
        status: StatusCode,
        title: String,
        message: String,
    },
}

impl CallbackResponse {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Redirect { .. } => StatusCode::FOUND,
            Self::Text { status, .. } | Self::ErrorPage { status, .. } => *status,
        }
    }

    fn text(status: StatusCode, body: impl Into<String>) -> Self {
        Self::Text {
            status,
            body: body.into(),
        }
    }

    fn error_page(err: &GatewayError) -> Self {
        let status = err.status_code();
        let message = match err {
            GatewayError::Hmac(_) => "The payment response could not be verified.".to_string(),
            GatewayError::NotFound(_) => "The order could not be found.".to_string(),
            _ => "The payment response could not be processed.".to_string(),
        };
        Self::ErrorPage {
            status,
            title: format!("Payment error ({})", status.as_u16()),
            message,
        }
    }
}

/// Routes callbacks to the payment or refund flow
#[derive(Clone)]
pub struct CallbackDispatcher {
    gateway: Gateway,
}

impl CallbackDispatcher {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    /// Handle one callback request.
    ///
    /// `refund_callback` selects the refund flow, `checkout-status` the
    /// payment flow; anything else is a bad request.
    pub async fn dispatch(
        &self,
        query: &HashMap<String, String>,
        session: &dyn CartSession,
    ) -> CallbackResponse {
        if query.contains_key(params::REFUND_CALLBACK) {
            return self.refund(query).await;
        }
        if query.contains_key(params::STATUS) {
            return self.payment(query, session).await;
        }
        kassa_log::warn!("Callback without refund or payment parameters");
        CallbackResponse::text(StatusCode::BAD_REQUEST, "Bad request")
    }

    async fn payment(
        &self,
        query: &HashMap<String, String>,
        session: &dyn CartSession,
    ) -> CallbackResponse {
        match self
            .gateway
            .payments()
            .handle_payment_response(query, session)
            .await
        {
            Ok(callback) => CallbackResponse::Redirect {
                location: callback.redirect,
            },
            Err(err) => {
                kassa_log::error!("Payment callback rejected: {}", err);
                CallbackResponse::error_page(&err)
            }
        }
    }

    async fn refund(&self, query: &HashMap<String, String>) -> CallbackResponse {
        match self.gateway.refunds().handle_refund_response(query).await {
            Ok(ack) => CallbackResponse::text(StatusCode::OK, ack.body()),
            Err(GatewayError::NotFound(what)) => {
                kassa_log::warn!("Refund callback for unknown {}", what);
                CallbackResponse::text(StatusCode::NOT_FOUND, "Not found")
            }
            Err(err) => {
                kassa_log::error!("Refund callback rejected: {}", err);
                CallbackResponse::error_page(&err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_parameter() {
        let mut query = HashMap::new();
        query.insert("checkout-status".to_string(), "ok".to_string());
        query.insert("checkout-provider".to_string(), String::new());

        assert_eq!(required(&query, "checkout-status").unwrap(), "ok");
        assert!(matches!(
            required(&query, "checkout-provider"),
            Err(GatewayError::Validation(_))
        ));
        assert!(required(&query, "signature").is_err());
    }

    #[test]
    fn test_error_page_carries_status() {
        let page = CallbackResponse::error_page(&GatewayError::Hmac("mismatch".into()));
        assert_eq!(page.status(), StatusCode::FORBIDDEN);
        match page {
            CallbackResponse::ErrorPage { title, .. } => assert_eq!(title, "Payment error (403)"),
            other => panic!("expected error page, got {:?}", other),
        }
    }
}
