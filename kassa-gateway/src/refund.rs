//! Refund orchestration
//!
//! The host refund API is synchronous while the PSP settles refunds
//! asynchronously, so a refund runs in three steps:
//!
//! 1. [`RefundOrchestrator::process_refund`] validates and hands back a
//!    [`RefundTicket`]; the host then creates its refund record carrying
//!    the ticket.
//! 2. [`RefundOrchestrator::execute_refund`] runs once that record exists.
//!    It calls the PSP, falls back to an e-mail refund on 422, and deletes
//!    the record again if the PSP refuses.
//! 3. [`RefundOrchestrator::handle_refund_response`] applies the PSP's
//!    success or cancel webhook.
//!
//! ```text
//! requested → provider_refund_sent → provider_confirmed_pending | email_refund_sent | rejected
//! email_refund_sent → email_pending | rejected
//! *_pending → confirmed | cancelled
//! ```

use crate::callback::required;
use crate::error::{GatewayError, GatewayResult};
use crate::gateway::Gateway;
use crate::host::{Order, OrderId, Refund, meta};
use crate::reference::generate_reference;
use kassa_psp::{CallbackUrls, RefundItem, RefundRequest, params, to_minor_units};
use rust_decimal::Decimal;
use std::collections::HashMap;
use url::Url;

/// Body of every refund webhook answer
pub const REFUND_ACK: &str = "OK";

/// Suffix of the displayed reason while the PSP has not confirmed
pub const PROCESSING_NOTE: &str = "still processing";

/// `refund_callback` value of a refund webhook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundOutcome {
    Success,
    Cancel,
}

impl RefundOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Cancel => "cancel",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "success" => Some(Self::Success),
            "cancel" => Some(Self::Cancel),
            _ => None,
        }
    }
}

/// Accepted refund request, to be attached to the host refund record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundTicket {
    pub order_id: OrderId,
    pub unique_id: String,
    pub amount: Decimal,
    pub reason: String,
    pub callback_urls: CallbackUrls,
}

impl RefundTicket {
    /// Mark `refund` as belonging to this ticket
    pub fn attach(&self, refund: &mut Refund) {
        refund
            .meta
            .insert(meta::REFUND_UNIQUE_ID.to_string(), self.unique_id.clone());
    }
}

/// What became of a refund after the PSP call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefundExecution {
    /// Waiting for the PSP's webhook
    Pending { email: bool },
    /// The PSP refused; the refund record was deleted
    RolledBack { reason: String },
}

/// Result of a handled refund webhook
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundAck {
    pub order_id: OrderId,
    pub outcome: RefundOutcome,
    /// false for a repeated delivery
    pub applied: bool,
}

impl RefundAck {
    pub fn body(&self) -> &'static str {
        REFUND_ACK
    }
}

/// Refund flows
#[derive(Clone)]
pub struct RefundOrchestrator {
    gateway: Gateway,
}

impl RefundOrchestrator {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    /// Accept a refund of `amount` (default: the order total).
    ///
    /// Nothing is sent yet; see [`execute_refund`](Self::execute_refund).
    pub async fn process_refund(
        &self,
        order_id: OrderId,
        amount: Option<Decimal>,
        reason: Option<&str>,
    ) -> GatewayResult<RefundTicket> {
        let order = self.order(order_id).await?;
        let amount = amount.unwrap_or(order.total);
        if amount <= Decimal::ZERO {
            return Err(GatewayError::Validation(
                "Refund amount must be greater than zero.".into(),
            ));
        }
        if order.transaction_id.as_deref().is_none_or(str::is_empty) {
            return Err(GatewayError::Validation(
                "Order has no payment to refund.".into(),
            ));
        }

        let unique_id = generate_reference();
        let ticket = RefundTicket {
            order_id,
            callback_urls: self.callback_urls(&unique_id, order_id)?,
            unique_id,
            amount,
            reason: reason.unwrap_or_default().trim().to_string(),
        };

        self.gateway
            .orders()
            .add_note(
                order_id,
                &format!("Refund of {} {} requested.", amount, order.currency),
            )
            .await?;
        kassa_log::info!("Refund {} accepted for order {}", ticket.unique_id, order_id);
        Ok(ticket)
    }

    fn callback_urls(&self, unique_id: &str, order_id: OrderId) -> GatewayResult<CallbackUrls> {
        let base = Url::parse(&self.gateway.settings().callback_url())
            .map_err(|e| GatewayError::Config(format!("invalid callback URL: {}", e)))?;
        let url_for = |outcome: RefundOutcome| {
            let mut url = base.clone();
            url.query_pairs_mut()
                .append_pair(params::REFUND_CALLBACK, outcome.as_str())
                .append_pair(params::REFUND_UNIQUE_ID, unique_id)
                .append_pair(params::ORDER_ID, &order_id.to_string());
            url.to_string()
        };
        Ok(CallbackUrls {
            success: url_for(RefundOutcome::Success),
            cancel: url_for(RefundOutcome::Cancel),
        })
    }

    /// Send a refund the host has just created.
    ///
    /// Runs under the order lock, so the refund's webhooks wait until it is
    /// either pending or rolled back. PSP refusals are settled here and
    /// never returned as errors: the refund either waits for its webhook or
    /// is deleted with a note.
    pub async fn execute_refund(&self, refund: Refund) -> GatewayResult<RefundExecution> {
        let order_id = refund.order_id;
        let unique_id = refund
            .unique_id()
            .map(str::to_string)
            .ok_or_else(|| GatewayError::Validation("refund has no ticket".into()))?;

        let _lock = self.gateway.locks().acquire(order_id).await?;
        let orders = self.gateway.orders();
        let order = self.order(order_id).await?;
        if orders.find_refund(order_id, &unique_id).await?.is_none() {
            return Err(GatewayError::not_found(format!("refund {}", unique_id)));
        }
        let transaction_id = order.transaction_id.clone().unwrap_or_default();
        let request = self.refund_request(&order, &refund, &unique_id)?;

        // stored as pending before the PSP call
        orders.save_refund(&awaiting_confirmation(&refund)).await?;

        let psp = self.gateway.psp();
        let direct = psp.refund(&transaction_id, &request).await;
        let email = match direct {
            Ok(_) => false,
            Err(err) if err.is_not_refundable() => {
                kassa_log::info!(
                    "Order {} is not directly refundable, trying e-mail refund",
                    order.id
                );
                let Some(address) = non_blank(&order.billing.email) else {
                    return self
                        .roll_back(&order, &refund, "the buyer has no e-mail address for an e-mail refund")
                        .await;
                };
                match psp
                    .email_refund(&transaction_id, &request.into_email_refund(address))
                    .await
                {
                    Ok(_) => true,
                    Err(err) => return self.roll_back(&order, &refund, &err.to_string()).await,
                }
            }
            Err(err) => return self.roll_back(&order, &refund, &err.to_string()).await,
        };

        let via = if email { " as an e-mail refund" } else { "" };
        orders
            .add_note(
                order.id,
                &format!(
                    "Refund of {} {} sent to the payment service{}; waiting for confirmation.",
                    refund.amount, order.currency, via
                ),
            )
            .await?;

        Ok(RefundExecution::Pending { email })
    }

    fn refund_request(
        &self,
        order: &Order,
        refund: &Refund,
        unique_id: &str,
    ) -> GatewayResult<RefundRequest> {
        let amount = to_minor_units(refund.amount, &order.currency);
        let mut items: Vec<RefundItem> = refund
            .lines
            .iter()
            .map(|line| RefundItem {
                amount: to_minor_units(line.amount, &order.currency),
                stamp: line.line_id.to_string(),
            })
            .filter(|item| item.amount > 0)
            .collect();
        // itemized refunds must add up exactly; otherwise refund by amount
        if items.iter().map(|i| i.amount).sum::<i64>() != amount {
            items.clear();
        }

        Ok(RefundRequest {
            amount,
            email: None,
            refund_stamp: unique_id.to_string(),
            refund_reference: order.id.to_string(),
            items,
            callback_urls: self.callback_urls(unique_id, order.id)?,
        })
    }

    async fn roll_back(
        &self,
        order: &Order,
        refund: &Refund,
        reason: &str,
    ) -> GatewayResult<RefundExecution> {
        kassa_log::warn!("Refund for order {} rejected: {}", order.id, reason);
        let orders = self.gateway.orders();
        orders.delete_refund(order.id, refund.id).await?;
        orders
            .add_note(
                order.id,
                &format!(
                    "Refund of {} {} could not be processed and was removed: {}",
                    refund.amount, order.currency, reason
                ),
            )
            .await?;
        Ok(RefundExecution::RolledBack {
            reason: reason.to_string(),
        })
    }

    /// Apply a refund webhook
    pub async fn handle_refund_response(
        &self,
        query: &HashMap<String, String>,
    ) -> GatewayResult<RefundAck> {
        self.gateway.signer().verify_query(query)?;

        let outcome_raw = required(query, params::REFUND_CALLBACK)?;
        let outcome = RefundOutcome::parse(outcome_raw).ok_or_else(|| {
            GatewayError::Validation(format!("unknown refund callback '{}'", outcome_raw))
        })?;
        let unique_id = required(query, params::REFUND_UNIQUE_ID)?;
        let order_id: OrderId = required(query, params::ORDER_ID)?
            .parse()
            .map_err(|_| GatewayError::Validation("order_id is not a number".into()))?;

        let _lock = self.gateway.locks().acquire(order_id).await?;
        let orders = self.gateway.orders();
        let order = self.order(order_id).await?;
        let mut refund = orders
            .find_refund(order_id, unique_id)
            .await?
            .ok_or_else(|| GatewayError::not_found(format!("refund {}", unique_id)))?;

        let applied = match outcome {
            RefundOutcome::Success if !refund.is_pending() => false,
            RefundOutcome::Success => {
                let amount = refund
                    .meta
                    .get(meta::REFUND_AMOUNT)
                    .and_then(|a| a.parse::<Decimal>().ok())
                    .unwrap_or(refund.amount);
                refund.amount = amount;
                refund.reason = refund
                    .meta
                    .get(meta::REFUND_REASON)
                    .cloned()
                    .unwrap_or_default();
                refund.meta.remove(meta::REFUND_PENDING);
                orders.save_refund(&refund).await?;
                orders
                    .add_note(
                        order_id,
                        &format!(
                            "Refund of {} {} confirmed by the payment service.",
                            amount, order.currency
                        ),
                    )
                    .await?;
                true
            }
            RefundOutcome::Cancel if !refund.is_pending() => false,
            RefundOutcome::Cancel => {
                orders.delete_refund(order_id, refund.id).await?;
                orders
                    .add_note(
                        order_id,
                        "Refund was cancelled by the payment service and has been removed.",
                    )
                    .await?;
                true
            }
        };

        kassa_log::info!(
            "Refund {} of order {}: {} (applied: {})",
            unique_id,
            order_id,
            outcome.as_str(),
            applied
        );
        Ok(RefundAck {
            order_id,
            outcome,
            applied,
        })
    }

    async fn order(&self, order_id: OrderId) -> GatewayResult<Order> {
        self.gateway
            .orders()
            .find_order(order_id)
            .await?
            .ok_or_else(|| GatewayError::not_found(format!("order {}", order_id)))
    }
}

/// The refund as stored while the PSP settles it: the requested amount and
/// reason move to meta and the visible amount reads zero.
fn awaiting_confirmation(refund: &Refund) -> Refund {
    let mut pending = refund.clone();
    let reason = refund.reason.clone();
    pending
        .meta
        .insert(meta::REFUND_AMOUNT.to_string(), refund.amount.to_string());
    pending
        .meta
        .insert(meta::REFUND_REASON.to_string(), reason.clone());
    pending
        .meta
        .insert(meta::REFUND_PENDING.to_string(), "1".to_string());
    pending.reason = if reason.is_empty() {
        format!("Refund {}", PROCESSING_NOTE)
    } else {
        format!("{} ({})", reason, PROCESSING_NOTE)
    };
    pending.amount = Decimal::ZERO;
    pending
}

fn non_blank(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_parsing() {
        assert_eq!(RefundOutcome::parse("success"), Some(RefundOutcome::Success));
        assert_eq!(RefundOutcome::parse("cancel"), Some(RefundOutcome::Cancel));
        assert_eq!(RefundOutcome::parse("maybe"), None);
    }

    #[test]
    fn test_ticket_attaches_unique_id() {
        let ticket = RefundTicket {
            order_id: 5,
            unique_id: "f".repeat(40),
            amount: Decimal::from(3),
            reason: String::new(),
            callback_urls: CallbackUrls {
                success: "s".into(),
                cancel: "c".into(),
            },
        };
        let mut refund = Refund {
            id: 1,
            order_id: 5,
            amount: Decimal::from(3),
            reason: String::new(),
            lines: vec![],
            meta: Default::default(),
        };
        ticket.attach(&mut refund);
        assert_eq!(refund.unique_id(), Some(ticket.unique_id.as_str()));
        assert!(!refund.is_pending());
    }

    #[test]
    fn test_awaiting_confirmation_keeps_request_in_meta() {
        let refund = Refund {
            id: 1,
            order_id: 5,
            amount: Decimal::new(325, 2),
            reason: "Shipping".into(),
            lines: vec![],
            meta: Default::default(),
        };

        let pending = awaiting_confirmation(&refund);

        assert!(pending.is_pending());
        assert_eq!(pending.amount, Decimal::ZERO);
        assert_eq!(pending.reason, "Shipping (still processing)");
        assert_eq!(pending.meta[meta::REFUND_AMOUNT], "3.25");
        assert_eq!(pending.meta[meta::REFUND_REASON], "Shipping");
        assert!(!refund.is_pending());
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank("  "), None);
        assert_eq!(non_blank(" a@b.fi "), Some("a@b.fi"));
    }
}
