//! PSP wire types
//!
//! Field names follow the PSP's camelCase JSON. Requests are built by the
//! gateway core and sent unmodified; responses are deserialized leniently
//! (unknown fields ignored, optional fields defaulted).

use crate::error::{PspError, PspResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Query parameter names used by PSP redirects and callbacks
pub mod params {
    pub const ACCOUNT: &str = "checkout-account";
    pub const ALGORITHM: &str = "checkout-algorithm";
    pub const AMOUNT: &str = "checkout-amount";
    pub const STAMP: &str = "checkout-stamp";
    pub const REFERENCE: &str = "checkout-reference";
    pub const TRANSACTION_ID: &str = "checkout-transaction-id";
    pub const STATUS: &str = "checkout-status";
    pub const PROVIDER: &str = "checkout-provider";
    pub const TOKENIZATION_ID: &str = "checkout-tokenization-id";
    pub const SIGNATURE: &str = "signature";

    /// Refund callbacks carry these next to the signed parameters; they are
    /// added by the shop and never part of the signature.
    pub const REFUND_CALLBACK: &str = "refund_callback";
    pub const REFUND_UNIQUE_ID: &str = "refund_unique_id";
    pub const ORDER_ID: &str = "order_id";
}

/// Payment page language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Language {
    FI,
    SV,
    EN,
}

impl Language {
    /// `fi_FI` → `FI`, `sv_SE` → `SV`, anything else → `EN`
    pub fn from_locale(locale: &str) -> Self {
        let prefix = locale
            .split(['_', '-'])
            .next()
            .unwrap_or_default()
            .to_lowercase();
        match prefix.as_str() {
            "fi" => Self::FI,
            "sv" => Self::SV,
            _ => Self::EN,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FI => "FI",
            Self::SV => "SV",
            Self::EN => "EN",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment request line item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Price per unit in minor units, VAT included
    pub unit_price: i64,
    /// Quantity; negative for corrective rows
    pub units: i64,
    /// VAT percentage, 0..=100
    pub vat_percentage: u8,
    pub product_code: String,
    pub delivery_date: NaiveDate,
    pub description: String,
    /// Immutable identifier of the source order line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stamp: Option<String>,
}

impl Item {
    /// `unit_price * units`
    pub fn total(&self) -> i64 {
        self.unit_price * self.units
    }
}

/// Customer details; blank fields are omitted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Invoicing or delivery address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub street_address: String,
    pub postal_code: String,
    pub city: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub county: Option<String>,
    pub country: String,
}

/// Success / cancel URL pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackUrls {
    pub success: String,
    pub cancel: String,
}

/// Which payment flow a request belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentKind {
    /// Buyer picks a provider and is redirected
    Standard,
    /// Buyer pays with a stored card during checkout
    CustomerInitiatedToken,
    /// Shop charges a stored card without the buyer (renewals)
    MerchantInitiatedToken,
}

/// Variant-specific part of a [`PaymentRequest`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PaymentMethod {
    Standard,
    CustomerInitiatedToken { token: String },
    MerchantInitiatedToken { token: String },
}

impl PaymentMethod {
    pub fn kind(&self) -> PaymentKind {
        match self {
            Self::Standard => PaymentKind::Standard,
            Self::CustomerInitiatedToken { .. } => PaymentKind::CustomerInitiatedToken,
            Self::MerchantInitiatedToken { .. } => PaymentKind::MerchantInitiatedToken,
        }
    }

    pub fn token(&self) -> Option<&str> {
        match self {
            Self::Standard => None,
            Self::CustomerInitiatedToken { token } | Self::MerchantInitiatedToken { token } => {
                Some(token)
            }
        }
    }
}

/// Create-payment / token-charge request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    /// Unique per request: shop instance, order id and timestamp
    pub stamp: String,
    /// Correlation key stored on the order
    pub reference: String,
    /// Total in minor units; equals the sum of the item totals
    pub amount: i64,
    pub currency: String,
    pub language: Language,
    pub items: Vec<Item>,
    pub customer: Customer,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoicing_address: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_address: Option<Address>,
    pub redirect_urls: CallbackUrls,
    pub callback_urls: CallbackUrls,
    #[serde(flatten)]
    pub method: PaymentMethod,
}

impl PaymentRequest {
    pub fn kind(&self) -> PaymentKind {
        self.method.kind()
    }

    /// Sum of `unit_price * units` over all items
    pub fn items_total(&self) -> i64 {
        self.items.iter().map(Item::total).sum()
    }

    /// Structural checks run before a request leaves the process
    pub fn validate(&self) -> PspResult<()> {
        if self.reference.is_empty() || self.stamp.is_empty() {
            return Err(PspError::Validation(
                "stamp and reference are required".into(),
            ));
        }
        if self.currency.is_empty() {
            return Err(PspError::Validation("currency is required".into()));
        }
        if self.amount <= 0 {
            return Err(PspError::Validation(format!(
                "amount must be positive, got {}",
                self.amount
            )));
        }
        if self.items.is_empty() {
            return Err(PspError::Validation("at least one item is required".into()));
        }
        if let Some(item) = self.items.iter().find(|i| i.vat_percentage > 100) {
            return Err(PspError::Validation(format!(
                "item {} has VAT {}%",
                item.product_code, item.vat_percentage
            )));
        }
        let total = self.items_total();
        if total != self.amount {
            return Err(PspError::Validation(format!(
                "items total {} does not match amount {}",
                total, self.amount
            )));
        }
        if self.method.token().is_some_and(str::is_empty) {
            return Err(PspError::Validation("card token is empty".into()));
        }
        Ok(())
    }
}

/// Name/value pair of a provider or add-card form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    pub value: String,
}

/// Payment method offered by the PSP
///
/// `parameters` are signed by the PSP and must be posted to `url` unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub id: String,
    pub name: String,
    pub group: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub svg: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub parameters: Vec<FormField>,
}

impl Provider {
    pub fn group_tag(&self) -> GroupTag {
        GroupTag::parse(&self.group)
    }
}

/// Provider group tag
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupTag {
    Mobile,
    Bank,
    CreditCard,
    Credit,
    Other(String),
}

impl GroupTag {
    pub fn parse(tag: &str) -> Self {
        match tag {
            "mobile" => Self::Mobile,
            "bank" => Self::Bank,
            "creditcard" => Self::CreditCard,
            "credit" => Self::Credit,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Mobile => "mobile",
            Self::Bank => "bank",
            Self::CreditCard => "creditcard",
            Self::Credit => "credit",
            Self::Other(tag) => tag,
        }
    }
}

/// Group as returned by the grouped provider listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderGroupInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub svg: String,
    #[serde(default)]
    pub providers: Vec<Provider>,
}

/// Grouped provider listing with the PSP's terms text
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GroupedProviders {
    #[serde(default)]
    pub terms: String,
    #[serde(default)]
    pub groups: Vec<ProviderGroupInfo>,
}

/// Create-payment response
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    pub transaction_id: String,
    /// PSP-hosted provider selection page
    pub href: String,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub terms: Option<String>,
    #[serde(default)]
    pub providers: Vec<Provider>,
}

/// Token charge response
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenChargeResponse {
    pub transaction_id: String,
    /// Present when the issuer demands a 3-D Secure challenge
    #[serde(default)]
    pub three_d_secure_url: Option<String>,
}

/// Refund item referencing an original payment item by stamp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundItem {
    pub amount: i64,
    pub stamp: String,
}

/// Refund request; with `email` set it is an e-mail refund
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequest {
    pub amount: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub refund_stamp: String,
    pub refund_reference: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<RefundItem>,
    pub callback_urls: CallbackUrls,
}

impl RefundRequest {
    /// Reuse amount, items and callback URLs for an e-mail refund
    pub fn into_email_refund(self, email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            ..self
        }
    }

    pub fn is_email_refund(&self) -> bool {
        self.email.is_some()
    }

    pub fn validate(&self) -> PspResult<()> {
        if self.amount <= 0 {
            return Err(PspError::Validation(format!(
                "refund amount must be positive, got {}",
                self.amount
            )));
        }
        if !self.items.is_empty() {
            let total: i64 = self.items.iter().map(|i| i.amount).sum();
            if total != self.amount {
                return Err(PspError::Validation(format!(
                    "refund items total {} does not match amount {}",
                    total, self.amount
                )));
            }
        }
        if self.email.as_deref().is_some_and(|e| !e.contains('@')) {
            return Err(PspError::Validation("e-mail refund needs an address".into()));
        }
        Ok(())
    }
}

/// Refund response
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundResponse {
    #[serde(default)]
    pub provider: String,
    pub status: String,
    pub transaction_id: String,
}

/// Add-card form request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddCardFormRequest {
    pub redirect_success_url: String,
    pub redirect_cancel_url: String,
    pub language: Language,
}

/// Signed form the buyer's browser posts to the PSP
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddCardForm {
    pub action: String,
    pub fields: Vec<FormField>,
}

/// Card details of a tokenized card
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    #[serde(rename = "type")]
    pub brand: String,
    #[serde(default)]
    pub bin: String,
    pub partial_pan: String,
    pub expire_year: String,
    pub expire_month: String,
    #[serde(default)]
    pub cvc_required: Option<String>,
    #[serde(default)]
    pub funding: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
}

/// Get-token response
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenResponse {
    pub token: String,
    pub card: Card,
}

/// Error body the PSP returns with non-2xx responses
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub meta: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(unit_price: i64, units: i64) -> Item {
        Item {
            unit_price,
            units,
            vat_percentage: 24,
            product_code: "SKU-1".into(),
            delivery_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            description: "Coffee".into(),
            stamp: Some("17".into()),
        }
    }

    fn request(method: PaymentMethod) -> PaymentRequest {
        PaymentRequest {
            stamp: "1-17-1714550400".into(),
            reference: "a".repeat(40),
            amount: 1200,
            currency: "EUR".into(),
            language: Language::FI,
            items: vec![item(1200, 1)],
            customer: Customer {
                email: Some("buyer@example.com".into()),
                ..Customer::default()
            },
            invoicing_address: None,
            delivery_address: None,
            redirect_urls: CallbackUrls {
                success: "https://shop.example/ok".into(),
                cancel: "https://shop.example/cancel".into(),
            },
            callback_urls: CallbackUrls {
                success: "https://shop.example/cb".into(),
                cancel: "https://shop.example/cb".into(),
            },
            method,
        }
    }

    #[test]
    fn test_language_from_locale() {
        assert_eq!(Language::from_locale("fi"), Language::FI);
        assert_eq!(Language::from_locale("fi_FI"), Language::FI);
        assert_eq!(Language::from_locale("sv-SE"), Language::SV);
        assert_eq!(Language::from_locale("de_DE"), Language::EN);
        assert_eq!(Language::from_locale(""), Language::EN);
    }

    #[test]
    fn test_standard_request_json_shape() {
        let json = serde_json::to_value(request(PaymentMethod::Standard)).unwrap();
        assert_eq!(json["language"], "FI");
        assert_eq!(json["items"][0]["unitPrice"], 1200);
        assert_eq!(json["items"][0]["vatPercentage"], 24);
        assert_eq!(json["items"][0]["deliveryDate"], "2024-05-01");
        assert_eq!(json["redirectUrls"]["success"], "https://shop.example/ok");
        assert!(json.get("token").is_none());
        assert!(json.get("invoicingAddress").is_none());
        assert!(json["customer"].get("phone").is_none());
    }

    #[test]
    fn test_token_request_carries_token() {
        let req = request(PaymentMethod::MerchantInitiatedToken {
            token: "c7441208-c2a1-4a10-8eb6-458bd8eaa64f".into(),
        });
        assert_eq!(req.kind(), PaymentKind::MerchantInitiatedToken);
        let json = serde_json::to_value(req).unwrap();
        assert_eq!(json["token"], "c7441208-c2a1-4a10-8eb6-458bd8eaa64f");
    }

    #[test]
    fn test_validate_rejects_total_mismatch() {
        let mut req = request(PaymentMethod::Standard);
        req.amount = 1300;
        assert!(matches!(req.validate(), Err(PspError::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_empty_token() {
        let req = request(PaymentMethod::CustomerInitiatedToken {
            token: String::new(),
        });
        assert!(req.validate().is_err());
        assert!(request(PaymentMethod::Standard).validate().is_ok());
    }

    #[test]
    fn test_email_refund_reuses_fields() {
        let refund = RefundRequest {
            amount: 500,
            email: None,
            refund_stamp: "stamp".into(),
            refund_reference: "ref".into(),
            items: vec![RefundItem {
                amount: 500,
                stamp: "17".into(),
            }],
            callback_urls: CallbackUrls {
                success: "s".into(),
                cancel: "c".into(),
            },
        };
        let email = refund.clone().into_email_refund("buyer@example.com");
        assert!(email.is_email_refund());
        assert_eq!(email.items, refund.items);
        assert_eq!(email.callback_urls, refund.callback_urls);
        assert!(email.validate().is_ok());
    }

    #[test]
    fn test_token_charge_response_with_3ds() {
        let resp: TokenChargeResponse = serde_json::from_str(
            r#"{"transactionId":"tx-1","threeDSecureUrl":"https://3ds.example/challenge"}"#,
        )
        .unwrap();
        assert_eq!(
            resp.three_d_secure_url.as_deref(),
            Some("https://3ds.example/challenge")
        );
    }

    #[test]
    fn test_group_tag_passthrough() {
        assert_eq!(GroupTag::parse("creditcard"), GroupTag::CreditCard);
        let other = GroupTag::parse("crypto");
        assert_eq!(other.as_str(), "crypto");
    }
}
