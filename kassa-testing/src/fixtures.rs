// Orders, callbacks and a wired-up gateway for tests

use crate::psp::MockPsp;
use crate::stores::{InMemoryOrderStore, InMemoryTokenStore};
use kassa_config::{GatewaySettings, TEST_MERCHANT_ID, TEST_SECRET_KEY};
use kassa_gateway::{Contact, Gateway, LineKind, Order, OrderId, OrderLine, OrderStatus};
use kassa_psp::{Signer, params};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tempfile::TempDir;

/// Site every test gateway runs on
pub const TEST_SITE: &str = "https://shop.example";

/// Builds orders; the default is the 15.25 EUR order of a Finnish buyer
pub struct OrderBuilder {
    order: Order,
}

impl OrderBuilder {
    pub fn new(id: OrderId) -> Self {
        let billing = Contact {
            first_name: "Matti".into(),
            last_name: "Meikäläinen".into(),
            email: "matti@example.com".into(),
            phone: "+358501234567".into(),
            address_1: "Mannerheimintie 1".into(),
            address_2: String::new(),
            postcode: "00100".into(),
            city: "Helsinki".into(),
            state: String::new(),
            country: "FI".into(),
        };
        Self {
            order: Order {
                id,
                status: OrderStatus::Pending,
                currency: "EUR".into(),
                total: Decimal::new(1525, 2),
                shipping: billing.clone(),
                billing,
                lines: vec![
                    OrderLine {
                        id: 1,
                        kind: LineKind::Product {
                            product_id: 10,
                            sku: Some("SKU-10".into()),
                            name: Some("Coffee mug".into()),
                        },
                        quantity: 1,
                        total: Decimal::new(968, 2),
                        tax: Decimal::new(232, 2),
                    },
                    OrderLine {
                        id: 2,
                        kind: LineKind::Shipping {
                            name: "Posti".into(),
                        },
                        quantity: 1,
                        total: Decimal::new(325, 2),
                        tax: Decimal::ZERO,
                    },
                ],
                customer_id: None,
                transaction_id: None,
                locale: "fi_FI".into(),
                return_url: format!("{}/checkout/order-received/{}", TEST_SITE, id),
                cancel_url: format!("{}/cart?cancel_order={}", TEST_SITE, id),
                meta: BTreeMap::new(),
            },
        }
    }

    pub fn total(mut self, total: Decimal) -> Self {
        self.order.total = total;
        self
    }

    pub fn status(mut self, status: OrderStatus) -> Self {
        self.order.status = status;
        self
    }

    pub fn customer(mut self, customer_id: u64) -> Self {
        self.order.customer_id = Some(customer_id);
        self
    }

    /// Paid order carrying the PSP transaction id
    pub fn paid(mut self, transaction_id: &str) -> Self {
        self.order.status = OrderStatus::Processing;
        self.order.transaction_id = Some(transaction_id.to_string());
        self
    }

    pub fn billing_email(mut self, email: &str) -> Self {
        self.order.billing.email = email.to_string();
        self
    }

    pub fn lines(mut self, lines: Vec<OrderLine>) -> Self {
        self.order.lines = lines;
        self
    }

    pub fn meta(mut self, key: &str, value: &str) -> Self {
        self.order.meta.insert(key.to_string(), value.to_string());
        self
    }

    pub fn build(self) -> Order {
        self.order
    }
}

/// Query string signed with `secret` the way the PSP signs redirects
pub fn signed_query(secret: &str, pairs: &[(&str, &str)]) -> HashMap<String, String> {
    let mut query: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    // only checkout-* parameters are signed; the test secret is a valid key
    if let Ok(signature) = Signer::new(secret).sign_query(&query) {
        query.insert(params::SIGNATURE.to_string(), signature);
    }
    query
}

/// Signed payment redirect for the test merchant
pub fn payment_callback(
    reference: &str,
    status: &str,
    amount: i64,
    provider: &str,
) -> HashMap<String, String> {
    let amount = amount.to_string();
    signed_query(
        TEST_SECRET_KEY,
        &[
            (params::ACCOUNT, TEST_MERCHANT_ID),
            (params::ALGORITHM, "sha256"),
            (params::AMOUNT, &amount),
            (params::STAMP, "1-1-1700000000"),
            (params::REFERENCE, reference),
            (params::TRANSACTION_ID, "4b300af6-9a22-11e8-9184-abb6de7fd2d0"),
            (params::STATUS, status),
            (params::PROVIDER, provider),
        ],
    )
}

/// Signed refund webhook for the test merchant
pub fn refund_callback(outcome: &str, unique_id: &str, order_id: OrderId) -> HashMap<String, String> {
    let order_id = order_id.to_string();
    signed_query(
        TEST_SECRET_KEY,
        &[
            (params::REFUND_CALLBACK, outcome),
            (params::REFUND_UNIQUE_ID, unique_id),
            (params::ORDER_ID, &order_id),
            (params::ACCOUNT, TEST_MERCHANT_ID),
            (params::ALGORITHM, "sha256"),
            (params::AMOUNT, "1525"),
            (params::STAMP, unique_id),
            (params::REFERENCE, &order_id),
            (params::TRANSACTION_ID, "4b300af6-9a22-11e8-9184-abb6de7fd2d0"),
            (params::STATUS, if outcome == "success" { "ok" } else { "fail" }),
            (params::PROVIDER, "nordea"),
        ],
    )
}

/// Test-mode settings on [`TEST_SITE`]
pub fn test_settings() -> GatewaySettings {
    GatewaySettings {
        site_url: TEST_SITE.to_string(),
        ..GatewaySettings::test()
    }
}

/// Gateway wired to a [`MockPsp`] and in-memory stores
pub struct TestGateway {
    pub gateway: Gateway,
    pub psp: MockPsp,
    pub orders: InMemoryOrderStore,
    pub tokens: InMemoryTokenStore,
    _locks: TempDir,
}

impl TestGateway {
    pub fn new() -> std::io::Result<Self> {
        Self::with_settings(test_settings())
    }

    /// Locks always go to a fresh temporary directory
    pub fn with_settings(mut settings: GatewaySettings) -> std::io::Result<Self> {
        let locks = tempfile::tempdir()?;
        settings.lock_dir = locks.path().to_path_buf();

        let psp = MockPsp::new();
        let orders = InMemoryOrderStore::new();
        let tokens = InMemoryTokenStore::new();
        let gateway = Gateway::new(
            settings,
            Arc::new(psp.clone()),
            Arc::new(orders.clone()),
            Arc::new(tokens.clone()),
        );

        Ok(Self {
            gateway,
            psp,
            orders,
            tokens,
            _locks: locks,
        })
    }

    pub fn with_order(self, order: Order) -> Self {
        self.orders.insert_order(order);
        self
    }
}
