//! Payment orchestration
//!
//! Drives a payment attempt from checkout submission to the PSP and back:
//!
//! ```text
//! standard: created → request_sent → provider_selected | pending | failed | completed
//! token:    created → charge_sent  → completed | requires_3ds_redirect | failed
//! ```

use crate::callback::required;
use crate::error::{GatewayError, GatewayResult};
use crate::gateway::Gateway;
use crate::host::{
    CartSession, Order, OrderId, OrderStatus, PaySelection, StoredCardToken, Transition, meta,
};
use crate::mapper::{RequestMapper, record_reference};
use http::StatusCode;
use kassa_psp::{FormField, PaymentMethod, params, to_minor_units};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;

/// Where a payment attempt was started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOrigin {
    /// Regular checkout; failures go back to the checkout form
    Checkout,
    /// Dedicated pay-for-order page; failures end the request
    RetryPage,
}

/// Fields of the checkout form
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckoutSubmission {
    /// Provider picked in the in-store list
    pub payment_provider: Option<String>,
    /// Stored card picked instead of a provider
    pub card_token_id: Option<u64>,
}

impl CheckoutSubmission {
    pub fn provider(id: impl Into<String>) -> Self {
        Self {
            payment_provider: Some(id.into()),
            card_token_id: None,
        }
    }

    pub fn card(token_id: u64) -> Self {
        Self {
            payment_provider: None,
            card_token_id: Some(token_id),
        }
    }
}

/// Where the buyer goes after a successful `process_payment`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// Paid without leaving the shop (zero total or stored card)
    Completed { redirect: String },
    /// In-store provider selection: the internal pay page
    PayPage { redirect: String },
    /// PSP-hosted provider selection page
    ProviderSelection { redirect: String },
    /// 3-D Secure challenge of a stored-card charge
    ThreeDSecure { redirect: String },
}

impl PaymentOutcome {
    pub fn redirect_url(&self) -> &str {
        match self {
            Self::Completed { redirect }
            | Self::PayPage { redirect }
            | Self::ProviderSelection { redirect }
            | Self::ThreeDSecure { redirect } => redirect,
        }
    }
}

/// How a failed payment attempt is shown to the buyer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Inline notice; the checkout form stays usable
    CheckoutNotice { message: String },
    /// Full error page ending the request
    BlockingPage {
        status: StatusCode,
        title: String,
        message: String,
    },
}

/// Failed `process_payment`
#[derive(Debug)]
pub struct PaymentFailure {
    pub error: GatewayError,
    pub disposition: FailureDisposition,
}

impl PaymentFailure {
    pub fn new(origin: PaymentOrigin, error: GatewayError) -> Self {
        let message = match &error {
            GatewayError::Validation(msg) => msg.clone(),
            _ => "Payment could not be processed. Please try again or choose another payment method."
                .to_string(),
        };
        let disposition = match origin {
            PaymentOrigin::Checkout => FailureDisposition::CheckoutNotice { message },
            PaymentOrigin::RetryPage => {
                let status = error.status_code();
                FailureDisposition::BlockingPage {
                    status,
                    title: format!("Payment failed ({})", status.as_u16()),
                    message,
                }
            }
        };
        Self { error, disposition }
    }
}

/// Self-submitting form rendered by the shop
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostedForm {
    pub title: String,
    pub action: String,
    pub fields: Vec<FormField>,
}

/// `checkout-status` of a payment callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackStatus {
    Ok,
    Pending,
    Other(String),
}

impl CallbackStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "ok" => Self::Ok,
            "pending" => Self::Pending,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Result of a handled payment callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentCallback {
    pub order_id: OrderId,
    pub status: CallbackStatus,
    /// `Unchanged` for duplicate or stale deliveries
    pub transition: Transition,
    /// Page a returning browser is sent to
    pub redirect: String,
}

/// Payment flows
#[derive(Clone)]
pub struct PaymentOrchestrator {
    gateway: Gateway,
}

impl PaymentOrchestrator {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    /// Start paying `order_id` with what the buyer submitted at checkout
    pub async fn process_payment(
        &self,
        order_id: OrderId,
        submission: &CheckoutSubmission,
        origin: PaymentOrigin,
        session: &dyn CartSession,
    ) -> Result<PaymentOutcome, PaymentFailure> {
        self.start(order_id, submission, session)
            .await
            .map_err(|err| {
                kassa_log::error!(
                    "Payment of order {} failed: {}",
                    order_id,
                    kassa_log::redact(&err.to_string())
                );
                PaymentFailure::new(origin, err)
            })
    }

    async fn start(
        &self,
        order_id: OrderId,
        submission: &CheckoutSubmission,
        session: &dyn CartSession,
    ) -> GatewayResult<PaymentOutcome> {
        let order = self.order(order_id).await?;

        if to_minor_units(order.total, &order.currency) == 0 {
            let orders = self.gateway.orders();
            if orders.mark_paid(order.id, None).await?.applied() {
                orders
                    .add_note(order.id, "Order total is zero; completed without payment.")
                    .await?;
                session.empty_cart();
            }
            kassa_log::info!("Order {} completed without payment", order.id);
            return Ok(PaymentOutcome::Completed {
                redirect: order.return_url,
            });
        }

        match submission.card_token_id {
            Some(token_id) => self.pay_with_card(&order, token_id, session).await,
            None => {
                self.pay_with_provider(&order, submission.payment_provider.as_deref(), session)
                    .await
            }
        }
    }

    async fn pay_with_card(
        &self,
        order: &Order,
        token_id: u64,
        session: &dyn CartSession,
    ) -> GatewayResult<PaymentOutcome> {
        let gw = &self.gateway;
        let card = gw
            .tokens()
            .get(token_id)
            .await?
            .ok_or_else(|| GatewayError::not_found(format!("stored card {}", token_id)))?;
        if order.customer_id != Some(card.customer_id) {
            return Err(GatewayError::Validation(
                "The selected card is not available.".into(),
            ));
        }

        let request = RequestMapper::new(gw.settings()).build_request(
            order,
            PaymentMethod::CustomerInitiatedToken {
                token: card.token.clone(),
            },
            &session.locale(),
        )?;
        record_reference(gw.orders(), order.id, &request.reference).await?;

        let response = gw.psp().create_token_charge(&request).await?;
        if let Some(url) = response.three_d_secure_url {
            gw.orders()
                .add_note(
                    order.id,
                    &format!(
                        "Card payment requires 3-D Secure authentication. Transaction ID: {}",
                        response.transaction_id
                    ),
                )
                .await?;
            return Ok(PaymentOutcome::ThreeDSecure { redirect: url });
        }

        self.complete_card_payment(order, &card, &response.transaction_id)
            .await?;
        session.empty_cart();
        Ok(PaymentOutcome::Completed {
            redirect: order.return_url.clone(),
        })
    }

    async fn complete_card_payment(
        &self,
        order: &Order,
        card: &StoredCardToken,
        transaction_id: &str,
    ) -> GatewayResult<Transition> {
        let orders = self.gateway.orders();
        let transition = orders.mark_paid(order.id, Some(transaction_id)).await?;
        if transition.applied() {
            orders
                .set_meta(order.id, meta::PAYMENT_PROVIDER, &card.brand)
                .await?;
            orders
                .add_note(
                    order.id,
                    &format!(
                        "Payment completed with {} card ending in {}. Transaction ID: {}",
                        card.brand, card.last4, transaction_id
                    ),
                )
                .await?;
        }
        Ok(transition)
    }

    async fn pay_with_provider(
        &self,
        order: &Order,
        provider_id: Option<&str>,
        session: &dyn CartSession,
    ) -> GatewayResult<PaymentOutcome> {
        let gw = &self.gateway;
        let settings = gw.settings();

        if session.contains_subscription() {
            return Err(GatewayError::Validation(
                "Subscriptions must be paid with a saved card.".into(),
            ));
        }
        let provider_id = if settings.provider_selection_in_store {
            match provider_id.map(str::trim).filter(|id| !id.is_empty()) {
                Some(id) => Some(id),
                None => {
                    return Err(GatewayError::Validation(
                        "Please select a payment method.".into(),
                    ));
                }
            }
        } else {
            None
        };

        let request = RequestMapper::new(settings).build_request(
            order,
            PaymentMethod::Standard,
            &session.locale(),
        )?;
        record_reference(gw.orders(), order.id, &request.reference).await?;

        let response = gw.psp().create_payment(&request).await?;
        kassa_log::info!(
            "Created payment {} for order {}",
            response.transaction_id,
            order.id
        );

        let Some(provider_id) = provider_id else {
            return Ok(PaymentOutcome::ProviderSelection {
                redirect: response.href,
            });
        };

        let provider = response
            .providers
            .into_iter()
            .find(|p| p.id == provider_id)
            .ok_or_else(|| {
                GatewayError::Validation("The selected payment method is not available.".into())
            })?;
        gw.orders()
            .set_meta(order.id, meta::PAYMENT_PROVIDER, &provider.name)
            .await?;
        session.set_pay_selection(PaySelection {
            order_id: order.id,
            provider,
        });

        Ok(PaymentOutcome::PayPage {
            redirect: settings.pay_page_url(order.id),
        })
    }

    /// Form posting the session's chosen provider to the PSP.
    ///
    /// Only the order the session is paying can be rendered.
    pub fn pay_page(&self, order_id: OrderId, session: &dyn CartSession) -> GatewayResult<HostedForm> {
        let selection = session
            .pay_selection()
            .filter(|s| s.order_id == order_id)
            .ok_or_else(|| GatewayError::not_found(format!("payment of order {}", order_id)))?;

        Ok(HostedForm {
            title: selection.provider.name,
            action: selection.provider.url,
            fields: selection.provider.parameters,
        })
    }

    /// Apply a payment redirect or webhook.
    ///
    /// The signature is checked before any parameter is used. Deliveries
    /// for an order that is already paid change nothing.
    pub async fn handle_payment_response(
        &self,
        query: &HashMap<String, String>,
        session: &dyn CartSession,
    ) -> GatewayResult<PaymentCallback> {
        let gw = &self.gateway;
        gw.signer().verify_query(query)?;

        let reference = required(query, params::REFERENCE)?;
        let status = CallbackStatus::parse(required(query, params::STATUS)?);
        let transaction_id = query
            .get(params::TRANSACTION_ID)
            .map(String::as_str)
            .unwrap_or_default();

        let order_id = gw
            .orders()
            .find_by_reference(reference)
            .await?
            .ok_or_else(|| GatewayError::not_found(format!("order with reference {}", reference)))?
            .id;

        let _lock = gw.locks().acquire(order_id).await?;
        let order = self.order(order_id).await?;
        let unchanged = |redirect: String| PaymentCallback {
            order_id,
            status: status.clone(),
            transition: Transition::Unchanged,
            redirect,
        };

        if order.status.is_paid() {
            kassa_log::debug!("Order {} already paid, ignoring callback", order_id);
            return Ok(unchanged(order.return_url));
        }
        if status != CallbackStatus::Ok && order.meta(meta::REFERENCE) != Some(reference) {
            kassa_log::info!(
                "Ignoring {:?} callback of an earlier payment attempt on order {}",
                status,
                order_id
            );
            return Ok(unchanged(order.cancel_url));
        }

        let orders = gw.orders();
        let (transition, redirect) = match &status {
            CallbackStatus::Ok => {
                let transition = orders.mark_paid(order_id, Some(transaction_id)).await?;
                if transition.applied() {
                    let provider = self.record_provider(&order, query).await?;
                    let note = match provider {
                        Some(name) => format!(
                            "Payment completed with {}. Transaction ID: {}",
                            name, transaction_id
                        ),
                        None => format!("Payment completed. Transaction ID: {}", transaction_id),
                    };
                    orders.add_note(order_id, &note).await?;
                    session.empty_cart();
                }
                (transition, order.return_url.clone())
            }
            CallbackStatus::Pending => {
                let transition = orders.transition(order_id, OrderStatus::OnHold).await?;
                if transition.applied() {
                    orders
                        .add_note(
                            order_id,
                            &format!(
                                "Payment is pending confirmation. Transaction ID: {}",
                                transaction_id
                            ),
                        )
                        .await?;
                }
                (transition, order.return_url.clone())
            }
            CallbackStatus::Other(raw) => {
                let transition = orders.transition(order_id, OrderStatus::Failed).await?;
                if transition.applied() {
                    orders
                        .add_note(
                            order_id,
                            &format!(
                                "Payment failed with status '{}'. Transaction ID: {}",
                                raw, transaction_id
                            ),
                        )
                        .await?;
                }
                (transition, order.cancel_url.clone())
            }
        };

        kassa_log::info!(
            "Payment callback for order {}: {:?} ({:?})",
            order_id,
            status,
            transition
        );
        Ok(PaymentCallback {
            order_id,
            status,
            transition,
            redirect,
        })
    }

    /// Name of the provider the buyer used.
    ///
    /// With in-store selection it was stored at checkout; otherwise it is
    /// resolved from the callback's `checkout-provider`.
    async fn record_provider(
        &self,
        order: &Order,
        query: &HashMap<String, String>,
    ) -> GatewayResult<Option<String>> {
        if self.gateway.settings().provider_selection_in_store {
            return Ok(order.meta(meta::PAYMENT_PROVIDER).map(str::to_string));
        }
        let Some(provider_id) = query.get(params::PROVIDER).filter(|id| !id.is_empty()) else {
            return Ok(None);
        };

        let amount = query
            .get(params::AMOUNT)
            .and_then(|a| a.parse::<i64>().ok())
            .unwrap_or_else(|| to_minor_units(order.total, &order.currency));
        let name = self
            .gateway
            .catalog()
            .provider_name(amount, provider_id)
            .await;
        self.gateway
            .orders()
            .set_meta(order.id, meta::PAYMENT_PROVIDER, &name)
            .await?;
        Ok(Some(name))
    }

    /// Charge a renewal order with its stored card.
    ///
    /// Failures leave a note on the order and are returned to the
    /// scheduler, which owns retries.
    pub async fn scheduled_subscription_payment(
        &self,
        amount: Decimal,
        order_id: OrderId,
    ) -> GatewayResult<String> {
        let result = self.charge_renewal(amount, order_id).await;
        if let Err(err) = &result {
            kassa_log::error!("Renewal payment of order {} failed: {}", order_id, err);
            let note = format!("Subscription renewal payment failed: {}", err);
            if let Err(note_err) = self.gateway.orders().add_note(order_id, &note).await {
                kassa_log::warn!("Could not add note to order {}: {}", order_id, note_err);
            }
        }
        result
    }

    async fn charge_renewal(&self, amount: Decimal, order_id: OrderId) -> GatewayResult<String> {
        let gw = &self.gateway;
        let order = self.order(order_id).await?;
        let card = gw
            .tokens()
            .token_for_order(order_id)
            .await?
            .ok_or_else(|| GatewayError::not_found(format!("stored card for order {}", order_id)))?;

        let request = RequestMapper::new(gw.settings()).build_request(
            &order,
            PaymentMethod::MerchantInitiatedToken {
                token: card.token.clone(),
            },
            &order.locale,
        )?;
        let charge = to_minor_units(amount, &order.currency);
        if charge != request.amount {
            return Err(GatewayError::Validation(format!(
                "renewal amount {} does not match order total {}",
                charge, request.amount
            )));
        }
        record_reference(gw.orders(), order_id, &request.reference).await?;

        let response = gw.psp().create_token_charge(&request).await?;
        self.complete_card_payment(&order, &card, &response.transaction_id)
            .await?;
        Ok(response.transaction_id)
    }

    async fn order(&self, order_id: OrderId) -> GatewayResult<Order> {
        self.gateway
            .orders()
            .find_order(order_id)
            .await?
            .ok_or_else(|| GatewayError::not_found(format!("order {}", order_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkout_failures_stay_inline() {
        let failure = PaymentFailure::new(
            PaymentOrigin::Checkout,
            GatewayError::Validation("Please select a payment method.".into()),
        );
        assert_eq!(
            failure.disposition,
            FailureDisposition::CheckoutNotice {
                message: "Please select a payment method.".into()
            }
        );
    }

    #[test]
    fn test_retry_page_failures_block_with_code() {
        let failure = PaymentFailure::new(
            PaymentOrigin::RetryPage,
            GatewayError::Rejected {
                status: 401,
                message: "Merchant not found".into(),
            },
        );
        match failure.disposition {
            FailureDisposition::BlockingPage { status, title, .. } => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert_eq!(title, "Payment failed (401)");
            }
            other => panic!("expected blocking page, got {:?}", other),
        }

        let failure = PaymentFailure::new(
            PaymentOrigin::RetryPage,
            GatewayError::Transport("timeout".into()),
        );
        assert!(matches!(
            failure.disposition,
            FailureDisposition::BlockingPage { status, .. } if status == StatusCode::BAD_GATEWAY
        ));
    }

    #[test]
    fn test_callback_status() {
        assert_eq!(CallbackStatus::parse("ok"), CallbackStatus::Ok);
        assert_eq!(CallbackStatus::parse("pending"), CallbackStatus::Pending);
        assert_eq!(
            CallbackStatus::parse("fail"),
            CallbackStatus::Other("fail".into())
        );
    }

    #[test]
    fn test_outcome_redirect() {
        let outcome = PaymentOutcome::ThreeDSecure {
            redirect: "https://3ds.example".into(),
        };
        assert_eq!(outcome.redirect_url(), "https://3ds.example");
    }
}
