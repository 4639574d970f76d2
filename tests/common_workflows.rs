//! Integration tests for common kassa workflows.
//!
//! These tests drive a gateway end to end the way a shop does: settings
//! from a file, checkout, the PSP's callbacks through the routes, refunds.

use http::StatusCode;
use kassa::kassa_config::{FileFormat, SettingsLoader};
use kassa::kassa_psp::{Signer, params, to_minor_units};
use kassa::prelude::*;
use kassa::{RefundExecution, meta};
use kassa_testing::*;
use rust_decimal_macros::dec;
use std::collections::HashMap;

const SETTINGS: &str = r#"
test_mode = "yes"
provider_selection_in_store = "no"
site_url = "https://shop.example"
shop_instance = "7"
default_country = "FI"
"#;

fn shop() -> TestGateway {
    let settings = SettingsLoader::new()
        .source(SETTINGS, FileFormat::Toml)
        .unwrap()
        .build()
        .unwrap();
    TestGateway::with_settings(settings).unwrap()
}

async fn route(
    t: &TestGateway,
    path: &str,
    query: &HashMap<String, String>,
    session: &InMemorySession,
) -> RouteResponse {
    let (route, action) = path.split_once('/').unwrap();
    t.gateway
        .router()
        .dispatch(
            route,
            action,
            RouteRequest {
                query,
                body: None,
                customer_id: None,
                session,
            },
        )
        .await
}

// =============================================================================
// Signatures
// =============================================================================

#[test]
fn test_callback_signature_of_test_merchant() {
    let query: HashMap<String, String> = [
        ("checkout-account", "375917"),
        ("checkout-algorithm", "sha256"),
        ("checkout-amount", "2964"),
        ("checkout-stamp", "15336332710015"),
        ("checkout-reference", "192387192837195"),
        ("checkout-transaction-id", "4b300af6-9a22-11e8-9184-abb6de7fd2d0"),
        ("checkout-status", "ok"),
        ("checkout-provider", "nordea"),
        (
            "signature",
            "b2d3ecdda2c04563a4638fcade3d4e77dfdc58829b429ad2c2cb422d0fc64080",
        ),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    let signer = Signer::new("SAIPPUAKAUPPIAS");
    assert!(signer.verify_query(&query).is_ok());

    let mut tampered = query.clone();
    tampered.insert("checkout-amount".into(), "2965".into());
    assert!(signer.verify_query(&tampered).is_err());
}

#[test]
fn test_minor_unit_rounding() {
    assert_eq!(to_minor_units(dec!(15.25), "EUR"), 1525);
    assert_eq!(to_minor_units(dec!(0.125), "EUR"), 13);
}

// =============================================================================
// Payment lifecycle
// =============================================================================

#[tokio::test]
async fn test_checkout_pay_and_refund() {
    let t = shop().with_order(OrderBuilder::new(42).build());
    let session = InMemorySession::default();

    // checkout redirects to the hosted provider page
    let outcome = t
        .gateway
        .payments()
        .process_payment(42, &CheckoutSubmission::default(), PaymentOrigin::Checkout, &session)
        .await
        .unwrap();
    assert!(matches!(outcome, PaymentOutcome::ProviderSelection { .. }));

    let request = t.psp.payment_requests().remove(0);
    assert!(request.stamp.starts_with("7-42-"));
    assert_eq!(request.amount, 1525);
    assert_eq!(request.language.as_str(), "FI");
    assert_eq!(
        request.callback_urls.success,
        "https://shop.example/kassa/callback/index"
    );

    // browser return and webhook both arrive; the order is paid once
    let callback = payment_callback(&request.reference, "ok", 1525, "nordea");
    for _ in 0..2 {
        let response = route(&t, "callback/index", &callback, &session).await;
        assert_eq!(
            response,
            RouteResponse::Redirect {
                location: "https://shop.example/checkout/order-received/42".into(),
                notice: None,
            }
        );
    }
    let order = t.orders.order(42).unwrap();
    assert_eq!(order.status, OrderStatus::Processing);
    assert_eq!(order.meta(meta::PAYMENT_PROVIDER), Some("Nordea"));
    assert_eq!(session.cart_emptied(), 1);

    // partial refund, confirmed by webhook
    let refunds = t.gateway.refunds();
    let ticket = refunds
        .process_refund(42, Some(dec!(3.25)), Some("Shipping"))
        .await
        .unwrap();
    let mut refund = kassa::Refund {
        id: 0,
        order_id: 42,
        amount: dec!(3.25),
        reason: "Shipping".into(),
        lines: vec![kassa::RefundLine {
            line_id: 2,
            amount: dec!(3.25),
        }],
        meta: Default::default(),
    };
    ticket.attach(&mut refund);
    let refund = t.orders.create_refund(refund);

    assert_eq!(
        refunds.execute_refund(refund).await.unwrap(),
        RefundExecution::Pending { email: false }
    );
    let (_, sent) = t.psp.refund_requests().remove(0);
    assert_eq!(sent.amount, 325);
    assert_eq!(sent.items.len(), 1);
    assert_eq!(sent.items[0].stamp, "2");

    let webhook = refund_callback("success", &ticket.unique_id, 42);
    let response = route(&t, "callback/index", &webhook, &session).await;
    assert_eq!(
        response,
        RouteResponse::Text {
            status: StatusCode::OK,
            body: "OK".into()
        }
    );
    assert_eq!(t.orders.refunds(42)[0].amount, dec!(3.25));
}

#[tokio::test]
async fn test_forged_callback_changes_nothing() {
    let t = shop().with_order(OrderBuilder::new(42).build());
    let session = InMemorySession::default();
    t.gateway
        .payments()
        .process_payment(42, &CheckoutSubmission::default(), PaymentOrigin::Checkout, &session)
        .await
        .unwrap();
    let reference = t.psp.payment_requests()[0].reference.clone();

    let mut forged = payment_callback(&reference, "ok", 1525, "nordea");
    forged.insert(params::SIGNATURE.into(), "0".repeat(64));

    let response = route(&t, "callback/index", &forged, &session).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(t.orders.order(42).unwrap().status, OrderStatus::Pending);
    assert!(t.orders.notes(42).is_empty());
}

#[tokio::test]
async fn test_rounding_row_keeps_totals_equal() {
    // three items at 3.33 for an order total of 10.00
    let line = |id| kassa::OrderLine {
        id,
        kind: kassa::LineKind::Fee {
            name: format!("Fee {}", id),
        },
        quantity: 1,
        total: dec!(3.33),
        tax: dec!(0),
    };
    let t = shop().with_order(
        OrderBuilder::new(5)
            .total(dec!(10.00))
            .lines(vec![line(1), line(2), line(3)])
            .build(),
    );

    t.gateway
        .payments()
        .process_payment(
            5,
            &CheckoutSubmission::default(),
            PaymentOrigin::Checkout,
            &InMemorySession::default(),
        )
        .await
        .unwrap();

    let request = t.psp.payment_requests().remove(0);
    assert_eq!(request.amount, 1000);
    assert_eq!(request.items_total(), 1000);
    let rounding = request.items.last().unwrap();
    assert_eq!(rounding.product_code, "rounding-row");
    assert_eq!(rounding.unit_price * rounding.units, 1);
}
