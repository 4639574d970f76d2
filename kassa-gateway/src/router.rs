//! Gateway routes under `/kassa/<route>/<action>`

use crate::callback::{CallbackDispatcher, CallbackResponse};
use crate::card::{CardContext, Notice};
use crate::error::GatewayError;
use crate::gateway::Gateway;
use crate::host::{CartSession, OrderId};
use crate::payment::HostedForm;
use http::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

pub const ADD_CARD_FORM: &str = "add-card-form";
pub const CARD_SUCCESS: &str = "card-success";
pub const CARD_CANCEL: &str = "card-cancel";
pub const CARD: &str = "card";
pub const PAY: &str = "pay";
pub const CALLBACK: &str = "callback";

/// One routed request
pub struct RouteRequest<'a> {
    pub query: &'a HashMap<String, String>,
    pub body: Option<&'a str>,
    /// Logged-in customer, if any
    pub customer_id: Option<u64>,
    pub session: &'a dyn CartSession,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RouteResponse {
    Redirect {
        location: String,
        notice: Option<Notice>,
    },
    Json(Value),
    Form(HostedForm),
    Text { status: StatusCode, body: String },
    ErrorPage {
        status: StatusCode,
        title: String,
        message: String,
    },
}

impl RouteResponse {
    pub fn not_found() -> Self {
        Self::Text {
            status: StatusCode::NOT_FOUND,
            body: "Not found".to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Redirect { .. } => StatusCode::FOUND,
            Self::Json(_) | Self::Form(_) => StatusCode::OK,
            Self::Text { status, .. } | Self::ErrorPage { status, .. } => *status,
        }
    }

    fn failure(err: GatewayError) -> Self {
        match err {
            GatewayError::NotFound(_) => Self::not_found(),
            other => {
                let status = other.status_code();
                Self::ErrorPage {
                    status,
                    title: format!("Error ({})", status.as_u16()),
                    message: other.to_string(),
                }
            }
        }
    }
}

impl From<CallbackResponse> for RouteResponse {
    fn from(response: CallbackResponse) -> Self {
        match response {
            CallbackResponse::Redirect { location } => Self::Redirect {
                location,
                notice: None,
            },
            CallbackResponse::Text { status, body } => Self::Text { status, body },
            CallbackResponse::ErrorPage {
                status,
                title,
                message,
            } => Self::ErrorPage {
                status,
                title,
                message,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct DeleteCard {
    token_id: u64,
}

/// Dispatches gateway routes to their handlers
#[derive(Clone)]
pub struct Router {
    gateway: Gateway,
}

impl Router {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    pub async fn dispatch(&self, route: &str, action: &str, request: RouteRequest<'_>) -> RouteResponse {
        let action = if action.is_empty() { "index" } else { action };
        kassa_log::debug!("Route {}/{}", route, action);

        match route {
            ADD_CARD_FORM => self.add_card_form(action, &request),
            CARD_SUCCESS => self.card_success(action, &request).await,
            CARD_CANCEL => self.card_cancel(action),
            CARD => self.card(action, &request).await,
            PAY => self.pay(action, &request),
            CALLBACK if action == "index" => {
                CallbackDispatcher::new(self.gateway.clone())
                    .dispatch(request.query, request.session)
                    .await
                    .into()
            }
            _ => RouteResponse::not_found(),
        }
    }

    fn add_card_form(&self, action: &str, request: &RouteRequest<'_>) -> RouteResponse {
        // the saved payment methods page links to `index`
        let context = match action {
            "index" => CardContext::MyAccount,
            other => match CardContext::parse(other) {
                Some(context) => context,
                None => return RouteResponse::not_found(),
            },
        };
        match self
            .gateway
            .cards()
            .add_card_form(context, &request.session.locale())
        {
            Ok(form) => RouteResponse::Form(form),
            Err(err) => {
                kassa_log::error!("Could not build add card form: {}", err);
                RouteResponse::failure(err)
            }
        }
    }

    async fn card_success(&self, action: &str, request: &RouteRequest<'_>) -> RouteResponse {
        let Some(context) = CardContext::parse(action) else {
            return RouteResponse::not_found();
        };
        let Some(customer_id) = request.customer_id else {
            return RouteResponse::failure(GatewayError::Validation(
                "adding a card requires a customer".into(),
            ));
        };
        let outcome = self
            .gateway
            .cards()
            .process_card_token(context, request.query, customer_id)
            .await;
        RouteResponse::Redirect {
            location: outcome.redirect,
            notice: Some(outcome.notice),
        }
    }

    fn card_cancel(&self, action: &str) -> RouteResponse {
        let context = match CardContext::parse(action) {
            Some(context @ (CardContext::Checkout | CardContext::MyAccount)) => context,
            _ => return RouteResponse::not_found(),
        };
        let outcome = self.gateway.cards().card_cancel(context);
        RouteResponse::Redirect {
            location: outcome.redirect,
            notice: Some(outcome.notice),
        }
    }

    async fn card(&self, action: &str, request: &RouteRequest<'_>) -> RouteResponse {
        if action != "delete" {
            return RouteResponse::not_found();
        }
        let parsed = request
            .body
            .map(serde_json::from_str::<DeleteCard>)
            .transpose();
        let (Some(customer_id), Ok(Some(body))) = (request.customer_id, parsed) else {
            return RouteResponse::Json(serde_json::json!({ "success": false }));
        };
        RouteResponse::Json(
            self.gateway
                .cards()
                .delete_card(body.token_id, customer_id)
                .await,
        )
    }

    fn pay(&self, action: &str, request: &RouteRequest<'_>) -> RouteResponse {
        let Ok(order_id) = action.parse::<OrderId>() else {
            return RouteResponse::not_found();
        };
        match self.gateway.payments().pay_page(order_id, request.session) {
            Ok(form) => RouteResponse::Form(form),
            Err(err) => RouteResponse::failure(err),
        }
    }
}
