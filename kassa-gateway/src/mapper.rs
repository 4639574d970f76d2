//! Order to payment request mapping

use crate::error::{GatewayError, GatewayResult};
use crate::host::{Contact, LineKind, Order, OrderId, OrderLine, OrderStore, meta};
use crate::reference::{generate_reference, payment_stamp};
use chrono::{Local, NaiveDate};
use kassa_config::GatewaySettings;
use kassa_psp::{
    Address, CallbackUrls, Customer, Item, Language, PaymentMethod, PaymentRequest, to_minor_units,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Longest item description the PSP accepts, in characters
pub const MAX_DESCRIPTION_CHARS: usize = 1000;

/// Product code of the synthetic row absorbing rounding differences
pub const ROUNDING_PRODUCT_CODE: &str = "rounding-row";

const FEE_PRODUCT_CODE: &str = "fee";
const SHIPPING_PRODUCT_CODE: &str = "shipping";

/// VAT percentage of a line: `round(tax / total * 100)`, 0 without tax.
pub fn vat_percentage(total: Decimal, tax: Decimal) -> u8 {
    if tax.is_zero() || total.is_zero() {
        return 0;
    }
    (tax / total * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u8()
        .map(|vat| vat.min(100))
        .unwrap_or(0)
}

/// First `max` characters of `text`, never splitting a character
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Builds payment requests from orders
#[derive(Debug, Clone)]
pub struct RequestMapper<'a> {
    settings: &'a GatewaySettings,
    delivery_date: NaiveDate,
}

impl<'a> RequestMapper<'a> {
    pub fn new(settings: &'a GatewaySettings) -> Self {
        Self {
            settings,
            delivery_date: Local::now().date_naive(),
        }
    }

    /// Delivery date stamped on every item; defaults to today
    pub fn with_delivery_date(mut self, date: NaiveDate) -> Self {
        self.delivery_date = date;
        self
    }

    /// Build a request of the given variant for `order`.
    ///
    /// Generates a fresh stamp and reference. The reference must be stored
    /// with [`record_reference`] before the request is sent.
    pub fn build_request(
        &self,
        order: &Order,
        method: PaymentMethod,
        locale: &str,
    ) -> GatewayResult<PaymentRequest> {
        let currency = order.currency.as_str();
        let amount = to_minor_units(order.total, currency);
        let items = self.items(order, amount)?;

        let request = PaymentRequest {
            stamp: payment_stamp(&self.settings.shop_instance, order.id),
            reference: generate_reference(),
            amount,
            currency: currency.to_string(),
            language: Language::from_locale(locale),
            items,
            customer: customer(&order.billing),
            invoicing_address: self.address(&order.billing),
            delivery_address: self.address(&order.shipping),
            redirect_urls: CallbackUrls {
                success: order.return_url.clone(),
                cancel: order.cancel_url.clone(),
            },
            callback_urls: CallbackUrls {
                success: self.settings.callback_url(),
                cancel: self.settings.callback_url(),
            },
            method,
        };

        kassa_log::debug!(
            "Built {:?} request for order {}: {} items, amount {}",
            request.kind(),
            order.id,
            request.items.len(),
            request.amount
        );
        Ok(request)
    }

    /// Order lines as items, plus a rounding row when the sum is off
    fn items(&self, order: &Order, amount: i64) -> GatewayResult<Vec<Item>> {
        let mut items: Vec<Item> = order
            .lines
            .iter()
            .filter(|line| line.quantity != 0)
            .map(|line| self.item(line, &order.currency))
            .collect();

        let subtotal: i64 = items.iter().map(Item::total).sum();
        if subtotal == amount {
            return Ok(items);
        }

        let delta = amount - subtotal;
        let tolerance: i64 = items.iter().map(|i| i.units.abs()).sum();
        if delta.abs() > tolerance {
            kassa_log::error!(
                "Order {} items sum to {} but total is {}",
                order.id,
                subtotal,
                amount
            );
            return Err(GatewayError::Rounding { delta, tolerance });
        }

        items.push(Item {
            unit_price: delta.abs(),
            units: if delta < 0 { -1 } else { 1 },
            vat_percentage: 0,
            product_code: ROUNDING_PRODUCT_CODE.to_string(),
            delivery_date: self.delivery_date,
            description: "Rounding".to_string(),
            stamp: None,
        });
        Ok(items)
    }

    fn item(&self, line: &OrderLine, currency: &str) -> Item {
        let (product_code, description) = match &line.kind {
            LineKind::Product {
                product_id,
                sku,
                name,
            } => (
                non_blank(sku.as_deref()).unwrap_or_else(|| product_id.to_string()),
                non_blank(name.as_deref()).unwrap_or_else(|| product_id.to_string()),
            ),
            LineKind::Fee { name } => (FEE_PRODUCT_CODE.to_string(), name.clone()),
            LineKind::Shipping { name } => (SHIPPING_PRODUCT_CODE.to_string(), name.clone()),
        };

        let unit_gross = line.gross() / Decimal::from(line.quantity);

        Item {
            unit_price: to_minor_units(unit_gross, currency),
            units: line.quantity,
            vat_percentage: vat_percentage(line.total, line.tax),
            product_code,
            delivery_date: self.delivery_date,
            description: truncate_chars(&description, MAX_DESCRIPTION_CHARS),
            stamp: Some(line.id.to_string()),
        }
    }

    fn address(&self, contact: &Contact) -> Option<Address> {
        if contact.has_no_address() {
            return None;
        }

        let street = match non_blank(Some(&contact.address_2)) {
            Some(second) => format!("{} {}", contact.address_1.trim(), second),
            None => contact.address_1.trim().to_string(),
        };

        Some(Address {
            street_address: street,
            postal_code: contact.postcode.trim().to_string(),
            city: contact.city.trim().to_string(),
            county: non_blank(Some(&contact.state)),
            country: non_blank(Some(&contact.country))
                .unwrap_or_else(|| self.settings.default_country.clone()),
        })
    }
}

fn customer(billing: &Contact) -> Customer {
    Customer {
        email: non_blank(Some(&billing.email)),
        first_name: non_blank(Some(&billing.first_name)),
        last_name: non_blank(Some(&billing.last_name)),
        phone: non_blank(Some(&billing.phone)),
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Store the request's reference on the order, directly and as the
/// lookup marker.
pub async fn record_reference(
    orders: &dyn OrderStore,
    order_id: OrderId,
    reference: &str,
) -> GatewayResult<()> {
    orders.set_meta(order_id, meta::REFERENCE, reference).await?;
    orders
        .set_meta(order_id, &meta::reference_marker(reference), "1")
        .await?;
    Ok(())
}
