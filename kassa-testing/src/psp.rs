// Scripted payment service

use crate::stores::lock;
use async_trait::async_trait;
use kassa_psp::{
    AddCardForm, AddCardFormRequest, Card, FormField, GroupTag, GroupedProviders, Language,
    PaymentRequest, PaymentResponse, Provider, ProviderGroupInfo, PspClient, PspError, PspResult,
    RefundRequest, RefundResponse, TokenChargeResponse, TokenResponse,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Token the scripted `get_token` hands out unless told otherwise
pub const MOCK_CARD_TOKEN: &str = "c7441208-c2a1-4a10-8eb6-458bd8eaa64f";

type Script<T> = Arc<Mutex<VecDeque<PspResult<T>>>>;

/// Payment service double.
///
/// Every operation answers with the next scripted result, or with a
/// successful default once its script is used up. Calls and the requests
/// they carried are recorded for assertions.
#[derive(Clone, Default)]
pub struct MockPsp {
    calls: Arc<Mutex<Vec<String>>>,
    payments: Arc<Mutex<Vec<PaymentRequest>>>,
    refunds: Arc<Mutex<Vec<(String, RefundRequest)>>>,
    payment_script: Script<PaymentResponse>,
    token_charge_script: Script<TokenChargeResponse>,
    refund_script: Script<RefundResponse>,
    email_refund_script: Script<RefundResponse>,
    token_script: Script<TokenResponse>,
    providers_unavailable: Arc<Mutex<bool>>,
}

impl MockPsp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_payment(&self, result: PspResult<PaymentResponse>) -> &Self {
        lock(&self.payment_script).push_back(result);
        self
    }

    pub fn script_token_charge(&self, result: PspResult<TokenChargeResponse>) -> &Self {
        lock(&self.token_charge_script).push_back(result);
        self
    }

    pub fn script_refund(&self, result: PspResult<RefundResponse>) -> &Self {
        lock(&self.refund_script).push_back(result);
        self
    }

    pub fn script_email_refund(&self, result: PspResult<RefundResponse>) -> &Self {
        lock(&self.email_refund_script).push_back(result);
        self
    }

    pub fn script_token(&self, result: PspResult<TokenResponse>) -> &Self {
        lock(&self.token_script).push_back(result);
        self
    }

    /// Make provider listings fail with a transport error
    pub fn providers_unavailable(&self) -> &Self {
        *lock(&self.providers_unavailable) = true;
        self
    }

    /// Record a method call
    pub fn record_call(&self, method: &str) {
        lock(&self.calls).push(method.to_string());
    }

    pub fn call_count(&self, method: &str) -> usize {
        lock(&self.calls).iter().filter(|m| *m == method).count()
    }

    pub fn was_called(&self, method: &str) -> bool {
        self.call_count(method) > 0
    }

    pub fn get_calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    /// Payment and token charge requests, in order
    pub fn payment_requests(&self) -> Vec<PaymentRequest> {
        lock(&self.payments).clone()
    }

    /// Direct and e-mail refunds with their transaction ids
    pub fn refund_requests(&self) -> Vec<(String, RefundRequest)> {
        lock(&self.refunds).clone()
    }

    fn next<T>(script: &Script<T>, default: impl FnOnce() -> T) -> PspResult<T> {
        lock(script).pop_front().unwrap_or_else(|| Ok(default()))
    }

    fn transaction_id(&self) -> String {
        format!("mock-tx-{}", lock(&self.payments).len())
    }
}

/// Providers every mock payment offers
pub fn default_providers() -> Vec<Provider> {
    [
        ("osuuspankki", "OP", "bank"),
        ("nordea", "Nordea", "bank"),
        ("mobilepay", "MobilePay", "mobile"),
        ("creditcard", "Visa", "creditcard"),
    ]
    .into_iter()
    .map(|(id, name, group)| Provider {
        id: id.to_string(),
        name: name.to_string(),
        group: group.to_string(),
        icon: format!("https://payment.paytrail.com/static/img/payment-methods/{}-140x75.png", id),
        svg: format!("https://payment.paytrail.com/static/img/payment-methods/{}.svg", id),
        url: format!("https://services.paytrail.com/payments/{}/redirect", id),
        parameters: vec![FormField {
            name: "provider".to_string(),
            value: id.to_string(),
        }],
    })
    .collect()
}

/// Card the scripted `get_token` returns
pub fn default_token() -> TokenResponse {
    TokenResponse {
        token: MOCK_CARD_TOKEN.to_string(),
        card: Card {
            brand: "Visa".to_string(),
            bin: "415301".to_string(),
            partial_pan: "0024".to_string(),
            expire_year: "2030".to_string(),
            expire_month: "11".to_string(),
            cvc_required: Some("no".to_string()),
            funding: Some("debit".to_string()),
            country_code: Some("FI".to_string()),
        },
    }
}

fn filtered(groups: &[GroupTag]) -> Vec<Provider> {
    default_providers()
        .into_iter()
        .filter(|p| groups.is_empty() || groups.contains(&p.group_tag()))
        .collect()
}

#[async_trait]
impl PspClient for MockPsp {
    async fn create_payment(&self, request: &PaymentRequest) -> PspResult<PaymentResponse> {
        self.record_call("create_payment");
        request.validate()?;
        let tx = self.transaction_id();
        lock(&self.payments).push(request.clone());
        Self::next(&self.payment_script, || PaymentResponse {
            href: format!("https://pay.paytrail.com/pay/{}", tx),
            transaction_id: tx,
            reference: Some(request.reference.clone()),
            terms: None,
            providers: default_providers(),
        })
    }

    async fn create_token_charge(
        &self,
        request: &PaymentRequest,
    ) -> PspResult<TokenChargeResponse> {
        self.record_call("create_token_charge");
        request.validate()?;
        let tx = self.transaction_id();
        lock(&self.payments).push(request.clone());
        Self::next(&self.token_charge_script, || TokenChargeResponse {
            transaction_id: tx,
            three_d_secure_url: None,
        })
    }

    async fn get_providers(&self, _amount: i64, groups: &[GroupTag]) -> PspResult<Vec<Provider>> {
        self.record_call("get_providers");
        if *lock(&self.providers_unavailable) {
            return Err(PspError::Transport("operation timed out".into()));
        }
        Ok(filtered(groups))
    }

    async fn get_grouped_providers(
        &self,
        _amount: i64,
        _language: Language,
        groups: &[GroupTag],
    ) -> PspResult<GroupedProviders> {
        self.record_call("get_grouped_providers");
        if *lock(&self.providers_unavailable) {
            return Err(PspError::Transport("operation timed out".into()));
        }
        let mut grouped: Vec<ProviderGroupInfo> = Vec::new();
        for provider in filtered(groups) {
            match grouped.iter_mut().find(|g| g.id == provider.group) {
                Some(group) => group.providers.push(provider),
                None => grouped.push(ProviderGroupInfo {
                    id: provider.group.clone(),
                    name: provider.group.clone(),
                    icon: String::new(),
                    svg: String::new(),
                    providers: vec![provider],
                }),
            }
        }
        Ok(GroupedProviders {
            terms: "By continuing with your payment, you agree to our payment terms.".into(),
            groups: grouped,
        })
    }

    async fn refund(
        &self,
        transaction_id: &str,
        request: &RefundRequest,
    ) -> PspResult<RefundResponse> {
        self.record_call("refund");
        request.validate()?;
        lock(&self.refunds).push((transaction_id.to_string(), request.clone()));
        Self::next(&self.refund_script, || RefundResponse {
            provider: "nordea".into(),
            status: "ok".into(),
            transaction_id: format!("{}-refund", transaction_id),
        })
    }

    async fn email_refund(
        &self,
        transaction_id: &str,
        request: &RefundRequest,
    ) -> PspResult<RefundResponse> {
        self.record_call("email_refund");
        request.validate()?;
        lock(&self.refunds).push((transaction_id.to_string(), request.clone()));
        Self::next(&self.email_refund_script, || RefundResponse {
            provider: "email refund".into(),
            status: "pending".into(),
            transaction_id: format!("{}-email-refund", transaction_id),
        })
    }

    fn add_card_form(&self, request: &AddCardFormRequest) -> PspResult<AddCardForm> {
        self.record_call("add_card_form");
        let field = |name: &str, value: &str| FormField {
            name: name.to_string(),
            value: value.to_string(),
        };
        Ok(AddCardForm {
            action: "https://services.paytrail.com/tokenization/addcard-form".into(),
            fields: vec![
                field("checkout-redirect-success-url", &request.redirect_success_url),
                field("checkout-redirect-cancel-url", &request.redirect_cancel_url),
                field("language", request.language.as_str()),
                field("signature", "mock"),
            ],
        })
    }

    async fn get_token(&self, _tokenization_id: &str) -> PspResult<TokenResponse> {
        self.record_call("get_token");
        Self::next(&self.token_script, default_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_then_default() {
        let psp = MockPsp::new();
        psp.script_token(Err(PspError::Transport("down".into())));

        assert!(psp.get_token("t").await.is_err());
        assert_eq!(psp.get_token("t").await.unwrap().token, MOCK_CARD_TOKEN);
        assert_eq!(psp.call_count("get_token"), 2);
    }

    #[tokio::test]
    async fn test_provider_group_filter() {
        let psp = MockPsp::new();
        let cards = psp
            .get_providers(1000, &[GroupTag::CreditCard])
            .await
            .unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].id, "creditcard");

        psp.providers_unavailable();
        assert!(psp.get_providers(1000, &[]).await.is_err());
    }
}
