//! Stored card flow
//!
//! Buyers add a card on a PSP-hosted form. The PSP redirects back to
//! `card-success/<context>` (or `card-cancel/<context>`) with a signed
//! tokenization id, which is exchanged for a reusable card token.

use crate::callback::required;
use crate::error::{GatewayError, GatewayResult};
use crate::gateway::Gateway;
use crate::host::StoredCardToken;
use crate::payment::HostedForm;
use kassa_psp::{AddCardFormRequest, Language, TokenResponse, params};
use serde_json::{Value, json};
use std::collections::HashMap;

pub const CARD_ADDED: &str = "Card was added successfully";
pub const CARD_NOT_ADDED: &str = "Could not add card details";

/// Page the add-card flow was started from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardContext {
    Checkout,
    MyAccount,
    ChangePaymentMethod,
}

impl CardContext {
    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "checkout" => Some(Self::Checkout),
            "my_account" => Some(Self::MyAccount),
            "change_payment_method" => Some(Self::ChangePaymentMethod),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Checkout => "checkout",
            Self::MyAccount => "my_account",
            Self::ChangePaymentMethod => "change_payment_method",
        }
    }

    /// Shop page the buyer returns to
    pub fn return_path(&self) -> &'static str {
        match self {
            Self::Checkout => "/checkout",
            Self::MyAccount => "/my-account/payment-methods",
            Self::ChangePaymentMethod => "/my-account/subscriptions",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
}

/// One-off message shown on the next page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            message: message.into(),
        }
    }
}

/// Redirect plus notice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardOutcome {
    pub redirect: String,
    pub notice: Notice,
}

/// Add, store and delete cards
#[derive(Clone)]
pub struct CardOrchestrator {
    gateway: Gateway,
}

impl CardOrchestrator {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    fn page(&self, context: CardContext) -> String {
        format!(
            "{}{}",
            self.gateway.settings().site_url.trim_end_matches('/'),
            context.return_path()
        )
    }

    /// Signed PSP form for adding a card
    pub fn add_card_form(&self, context: CardContext, locale: &str) -> GatewayResult<HostedForm> {
        let settings = self.gateway.settings();
        let form = self.gateway.psp().add_card_form(&AddCardFormRequest {
            redirect_success_url: settings.route_url("card-success", context.as_str()),
            redirect_cancel_url: settings.route_url("card-cancel", context.as_str()),
            language: Language::from_locale(locale),
        })?;

        Ok(HostedForm {
            title: "Add new card".to_string(),
            action: form.action,
            fields: form.fields,
        })
    }

    /// Handle the PSP's success redirect
    pub async fn process_card_token(
        &self,
        context: CardContext,
        query: &HashMap<String, String>,
        customer_id: u64,
    ) -> CardOutcome {
        let notice = match self.store_card(query, customer_id).await {
            Ok(card) => {
                kassa_log::info!(
                    "Stored {} card ending in {} for customer {}",
                    card.brand,
                    card.last4,
                    customer_id
                );
                Notice::success(CARD_ADDED)
            }
            Err(err) => {
                kassa_log::error!("Could not store card: {}", err);
                Notice::error(CARD_NOT_ADDED)
            }
        };
        CardOutcome {
            redirect: self.page(context),
            notice,
        }
    }

    async fn store_card(
        &self,
        query: &HashMap<String, String>,
        customer_id: u64,
    ) -> GatewayResult<StoredCardToken> {
        self.gateway.signer().verify_query(query)?;
        let tokenization_id = required(query, params::TOKENIZATION_ID)?;

        let response = self.gateway.psp().get_token(tokenization_id).await?;
        let tokens = self.gateway.tokens();
        let existing = tokens.for_customer(customer_id).await?;
        if let Some(card) = existing.iter().find(|c| c.token == response.token) {
            return Ok(card.clone());
        }

        let card = stored_card(response, customer_id, existing.is_empty())?;
        tokens.save(card).await
    }

    /// Handle the PSP's cancel redirect
    pub fn card_cancel(&self, context: CardContext) -> CardOutcome {
        CardOutcome {
            redirect: self.page(context),
            notice: Notice::error(CARD_NOT_ADDED),
        }
    }

    /// Delete a customer's card; answers `{"success": bool}`
    pub async fn delete_card(&self, token_id: u64, customer_id: u64) -> Value {
        let tokens = self.gateway.tokens();
        let deleted = match tokens.get(token_id).await {
            Ok(Some(card)) if card.customer_id == customer_id => {
                tokens.delete(token_id).await.unwrap_or_else(|err| {
                    kassa_log::error!("Could not delete card {}: {}", token_id, err);
                    false
                })
            }
            Ok(_) => false,
            Err(err) => {
                kassa_log::error!("Could not load card {}: {}", token_id, err);
                false
            }
        };
        json!({ "success": deleted })
    }
}

fn stored_card(
    response: TokenResponse,
    customer_id: u64,
    is_default: bool,
) -> GatewayResult<StoredCardToken> {
    let number = |value: &str, field: &str| {
        value
            .trim()
            .parse::<u32>()
            .map_err(|_| GatewayError::Validation(format!("card {} '{}' is not a number", field, value)))
    };

    Ok(StoredCardToken {
        id: 0,
        customer_id,
        brand: response.card.brand,
        last4: response.card.partial_pan,
        expiry_month: number(&response.card.expire_month, "expiry month")?,
        expiry_year: number(&response.card.expire_year, "expiry year")?,
        token: response.token,
        is_default,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kassa_psp::Card;

    fn token_response(month: &str) -> TokenResponse {
        TokenResponse {
            token: "c7441208-c2a1-4a10-8eb6-458bd8eaa64f".into(),
            card: Card {
                brand: "Visa".into(),
                bin: "415301".into(),
                partial_pan: "0024".into(),
                expire_year: "2030".into(),
                expire_month: month.into(),
                cvc_required: None,
                funding: None,
                country_code: None,
            },
        }
    }

    #[test]
    fn test_context_round_trip() {
        for context in [
            CardContext::Checkout,
            CardContext::MyAccount,
            CardContext::ChangePaymentMethod,
        ] {
            assert_eq!(CardContext::parse(context.as_str()), Some(context));
        }
        assert_eq!(CardContext::parse("index"), None);
    }

    #[test]
    fn test_stored_card_from_token() {
        let card = stored_card(token_response("11"), 3, true).unwrap();
        assert_eq!(card.brand, "Visa");
        assert_eq!(card.last4, "0024");
        assert_eq!(card.expiry_month, 11);
        assert_eq!(card.expiry_year, 2030);
        assert!(card.is_default);
    }

    #[test]
    fn test_bad_expiry_is_rejected() {
        assert!(matches!(
            stored_card(token_response("XI"), 3, false),
            Err(GatewayError::Validation(_))
        ));
    }
}
