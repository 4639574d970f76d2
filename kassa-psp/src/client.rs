//! PSP client trait

use crate::error::PspResult;
use crate::types::*;
use async_trait::async_trait;

/// Operations the gateway needs from the payment service.
///
/// [`CheckoutClient`](crate::CheckoutClient) talks to the real API; tests
/// substitute a scripted implementation.
#[async_trait]
pub trait PspClient: Send + Sync {
    /// Create a standard payment; the response carries the hosted page
    /// and the provider list.
    async fn create_payment(&self, request: &PaymentRequest) -> PspResult<PaymentResponse>;

    /// Charge a stored card. The request must be a token variant.
    ///
    /// A customer-initiated charge that needs 3-D Secure succeeds with
    /// `three_d_secure_url` set instead of failing.
    async fn create_token_charge(&self, request: &PaymentRequest)
    -> PspResult<TokenChargeResponse>;

    /// Providers available for `amount`, limited to `groups` when non-empty
    async fn get_providers(&self, amount: i64, groups: &[GroupTag]) -> PspResult<Vec<Provider>>;

    /// Providers grouped by tag, with localized names and terms
    async fn get_grouped_providers(
        &self,
        amount: i64,
        language: Language,
        groups: &[GroupTag],
    ) -> PspResult<GroupedProviders>;

    /// Refund directly to the payment instrument.
    ///
    /// Fails with status 422 when the payment cannot be refunded that way.
    async fn refund(&self, transaction_id: &str, request: &RefundRequest)
    -> PspResult<RefundResponse>;

    /// Refund through an e-mail link sent to the buyer
    async fn email_refund(
        &self,
        transaction_id: &str,
        request: &RefundRequest,
    ) -> PspResult<RefundResponse>;

    /// Signed form for the PSP-hosted add-card page
    fn add_card_form(&self, request: &AddCardFormRequest) -> PspResult<AddCardForm>;

    /// Exchange a tokenization id from the add-card redirect for a card token
    async fn get_token(&self, tokenization_id: &str) -> PspResult<TokenResponse>;
}
