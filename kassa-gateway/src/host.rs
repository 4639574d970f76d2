//! Host shop collaborators
//!
//! The shop owns orders, refunds, the cart/session and stored cards. The
//! gateway only sees them through the types and traits in this module.

use crate::error::GatewayResult;
use async_trait::async_trait;
use kassa_psp::Provider;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type OrderId = u64;

/// Order meta keys written by the gateway
pub mod meta {
    /// Correlation reference of the latest payment attempt
    pub const REFERENCE: &str = "_checkout_reference";
    /// Prefix of the existence marker `_checkout_reference_<reference>`,
    /// which lets the store find an order by reference through its meta index
    pub const REFERENCE_MARKER_PREFIX: &str = "_checkout_reference_";
    /// Display name of the provider the buyer paid with
    pub const PAYMENT_PROVIDER: &str = "_checkout_payment_provider";

    pub const REFUND_UNIQUE_ID: &str = "_checkout_refund_unique_id";
    pub const REFUND_AMOUNT: &str = "_checkout_refund_amount";
    pub const REFUND_REASON: &str = "_checkout_refund_reason";
    pub const REFUND_PENDING: &str = "_checkout_refund_pending";

    pub fn reference_marker(reference: &str) -> String {
        format!("{}{}", REFERENCE_MARKER_PREFIX, reference)
    }
}

/// Order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderStatus {
    Pending,
    OnHold,
    Processing,
    Completed,
    Failed,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    /// Payment already received; payment callbacks must not touch the order
    pub fn is_paid(&self) -> bool {
        matches!(self, Self::Processing | Self::Completed | Self::Refunded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::OnHold => "on-hold",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }
}

/// Billing or shipping contact; blank strings mean "not given"
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub address_1: String,
    pub address_2: String,
    pub postcode: String,
    pub city: String,
    pub state: String,
    pub country: String,
}

impl Contact {
    /// Every address field is blank
    pub fn has_no_address(&self) -> bool {
        [
            &self.address_1,
            &self.address_2,
            &self.postcode,
            &self.city,
            &self.state,
            &self.country,
        ]
        .iter()
        .all(|field| field.trim().is_empty())
    }
}

/// What an order line charges for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LineKind {
    Product {
        product_id: u64,
        sku: Option<String>,
        name: Option<String>,
    },
    Fee {
        name: String,
    },
    Shipping {
        name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: u64,
    pub kind: LineKind,
    pub quantity: i64,
    /// Line total excluding tax
    pub total: Decimal,
    pub tax: Decimal,
}

impl OrderLine {
    pub fn gross(&self) -> Decimal {
        self.total + self.tax
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub status: OrderStatus,
    pub currency: String,
    /// Grand total including tax
    pub total: Decimal,
    pub billing: Contact,
    pub shipping: Contact,
    pub lines: Vec<OrderLine>,
    pub customer_id: Option<u64>,
    pub transaction_id: Option<String>,
    /// Locale the order was placed in, e.g. `fi_FI`
    pub locale: String,
    /// Thank-you page
    pub return_url: String,
    /// Cancels the order and returns to the cart
    pub cancel_url: String,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

impl Order {
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.meta.get(key).map(String::as_str)
    }
}

/// Refund line: refunded amount of one order line, tax included
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundLine {
    pub line_id: u64,
    pub amount: Decimal,
}

/// Refund sub-entity of an order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refund {
    pub id: u64,
    pub order_id: OrderId,
    pub amount: Decimal,
    pub reason: String,
    #[serde(default)]
    pub lines: Vec<RefundLine>,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

impl Refund {
    pub fn unique_id(&self) -> Option<&str> {
        self.meta.get(meta::REFUND_UNIQUE_ID).map(String::as_str)
    }

    /// Waiting for the PSP to confirm
    pub fn is_pending(&self) -> bool {
        self.meta.get(meta::REFUND_PENDING).is_some_and(|v| v == "1")
    }
}

/// Tokenized card saved on a customer account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCardToken {
    pub id: u64,
    pub customer_id: u64,
    pub token: String,
    pub brand: String,
    pub last4: String,
    pub expiry_month: u32,
    pub expiry_year: u32,
    pub is_default: bool,
}

/// Result of a conditional status update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    /// The order was already paid; nothing was written
    Unchanged,
}

impl Transition {
    pub fn applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// Provider chosen at checkout, kept for the pay page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaySelection {
    pub order_id: OrderId,
    pub provider: Provider,
}

/// Order and refund persistence
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find_order(&self, id: OrderId) -> GatewayResult<Option<Order>>;

    /// Look up through the `_checkout_reference_<reference>` marker
    async fn find_by_reference(&self, reference: &str) -> GatewayResult<Option<Order>>;

    async fn set_meta(&self, id: OrderId, key: &str, value: &str) -> GatewayResult<()>;

    async fn add_note(&self, id: OrderId, note: &str) -> GatewayResult<()>;

    /// Record the payment unless the order is already paid, as one
    /// conditional update.
    async fn mark_paid(&self, id: OrderId, transaction_id: Option<&str>)
    -> GatewayResult<Transition>;

    /// Move to `status` unless the order is already paid
    async fn transition(&self, id: OrderId, status: OrderStatus) -> GatewayResult<Transition>;

    async fn find_refund(&self, order_id: OrderId, unique_id: &str)
    -> GatewayResult<Option<Refund>>;

    async fn save_refund(&self, refund: &Refund) -> GatewayResult<()>;

    /// Returns whether a refund was removed
    async fn delete_refund(&self, order_id: OrderId, refund_id: u64) -> GatewayResult<bool>;
}

/// Buyer session and cart of the current request
pub trait CartSession: Send + Sync {
    fn empty_cart(&self);

    fn contains_subscription(&self) -> bool;

    fn locale(&self) -> String;

    fn set_pay_selection(&self, selection: PaySelection);

    fn pay_selection(&self) -> Option<PaySelection>;
}

/// Stored card tokens
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self, token_id: u64) -> GatewayResult<Option<StoredCardToken>>;

    async fn for_customer(&self, customer_id: u64) -> GatewayResult<Vec<StoredCardToken>>;

    /// Persist a new token; the store assigns the id
    async fn save(&self, token: StoredCardToken) -> GatewayResult<StoredCardToken>;

    async fn delete(&self, token_id: u64) -> GatewayResult<bool>;

    /// Card a subscription renewal order is charged with
    async fn token_for_order(&self, order_id: OrderId) -> GatewayResult<Option<StoredCardToken>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_paid_statuses() {
        assert!(OrderStatus::Processing.is_paid());
        assert!(OrderStatus::Completed.is_paid());
        assert!(!OrderStatus::OnHold.is_paid());
        assert!(!OrderStatus::Failed.is_paid());
        assert_eq!(OrderStatus::OnHold.as_str(), "on-hold");
    }

    #[test]
    fn test_contact_without_address() {
        let contact = Contact {
            email: "buyer@example.com".into(),
            ..Contact::default()
        };
        assert!(contact.has_no_address());

        let contact = Contact {
            city: "Helsinki".into(),
            ..Contact::default()
        };
        assert!(!contact.has_no_address());
    }

    #[test]
    fn test_refund_flags() {
        let mut refund = Refund {
            id: 1,
            order_id: 7,
            amount: dec!(5),
            reason: String::new(),
            lines: vec![],
            meta: BTreeMap::new(),
        };
        assert!(!refund.is_pending());
        refund.meta.insert(meta::REFUND_PENDING.into(), "1".into());
        refund.meta.insert(meta::REFUND_UNIQUE_ID.into(), "abc".into());
        assert!(refund.is_pending());
        assert_eq!(refund.unique_id(), Some("abc"));
    }

    #[test]
    fn test_reference_marker() {
        assert_eq!(meta::reference_marker("ab12"), "_checkout_reference_ab12");
    }
}
