//! HTTP client for the payment service API

use crate::client::PspClient;
use crate::error::{PspError, PspResult};
use crate::signature::{Algorithm, Signer};
use crate::types::*;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use reqwest::Method;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Production API endpoint
pub const DEFAULT_BASE_URL: &str = "https://services.paytrail.com";

const SIGNATURE_HEADER: &str = "signature";
const PLATFORM_HEADER: &str = "platform-name";

/// Connection settings for [`CheckoutClient`]
#[derive(Clone)]
pub struct CheckoutConfig {
    pub base_url: String,
    pub merchant_id: String,
    pub secret_key: String,
    pub platform_name: String,
    /// Timeout for payment and refund calls
    pub request_timeout: Duration,
    /// Shorter timeout for provider listings rendered during checkout
    pub metadata_timeout: Duration,
}

impl CheckoutConfig {
    pub fn new(merchant_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            merchant_id: merchant_id.into(),
            secret_key: secret_key.into(),
            platform_name: format!("kassa-{}", env!("CARGO_PKG_VERSION")),
            request_timeout: Duration::from_secs(10),
            metadata_timeout: Duration::from_secs(3),
        }
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn platform_name(mut self, name: impl Into<String>) -> Self {
        self.platform_name = name.into();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn metadata_timeout(mut self, timeout: Duration) -> Self {
        self.metadata_timeout = timeout;
        self
    }
}

/// Signed JSON client for the payment service.
///
/// Every request carries the `checkout-*` headers and an HMAC signature;
/// every successful response must carry a valid signature too.
pub struct CheckoutClient {
    http: reqwest::Client,
    base_url: String,
    merchant_id: String,
    platform_name: String,
    metadata_timeout: Duration,
    signer: Signer,
}

impl CheckoutClient {
    pub fn new(config: CheckoutConfig) -> PspResult<Self> {
        if config.merchant_id.is_empty() || config.secret_key.is_empty() {
            return Err(PspError::Config("merchant id and secret key are required".into()));
        }
        url::Url::parse(&config.base_url)?;

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.request_timeout)
            .build()
            .map_err(|e| PspError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            merchant_id: config.merchant_id,
            platform_name: config.platform_name,
            metadata_timeout: config.metadata_timeout,
            signer: Signer::new(config.secret_key),
        })
    }

    /// Signer sharing this client's secret
    pub fn signer(&self) -> &Signer {
        &self.signer
    }

    fn auth_headers(&self, method: &Method, transaction_id: Option<&str>) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        headers.insert(params::ACCOUNT.to_string(), self.merchant_id.clone());
        headers.insert(
            params::ALGORITHM.to_string(),
            self.signer.algorithm().as_str().to_string(),
        );
        headers.insert("checkout-method".to_string(), method.as_str().to_string());
        headers.insert("checkout-nonce".to_string(), uuid::Uuid::new_v4().to_string());
        headers.insert(
            "checkout-timestamp".to_string(),
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        );
        if let Some(id) = transaction_id {
            headers.insert(params::TRANSACTION_ID.to_string(), id.to_string());
        }
        headers
    }

    async fn exchange<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
        call: Call<'_>,
    ) -> PspResult<Exchange> {
        let url = format!("{}{}", self.base_url, path);
        let body = body.map(serde_json::to_string).transpose()?.unwrap_or_default();
        let mut headers = self.auth_headers(&method, call.transaction_id);
        if let Some(id) = call.tokenization_id {
            headers.insert(params::TOKENIZATION_ID.to_string(), id.to_string());
        }
        let signature = self.signer.sign(
            headers.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            &body,
        )?;

        kassa_log::debug!("PSP {} {}", method, path);

        let mut builder = self
            .http
            .request(method, &url)
            .query(query)
            .header(SIGNATURE_HEADER, signature)
            .header(PLATFORM_HEADER, &self.platform_name);
        for (name, value) in &headers {
            builder = builder.header(name, value);
        }
        if !body.is_empty() {
            builder = builder
                .header("content-type", "application/json; charset=utf-8")
                .body(body);
        }
        if let Some(timeout) = call.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.text().await?;

        Ok(Exchange {
            status,
            headers,
            body,
        })
    }

    /// Send a request and return the verified body of a 2xx response
    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
        call: Call<'_>,
    ) -> PspResult<String> {
        let exchange = self.exchange(method, path, query, body, call).await?;
        if !exchange.is_success() {
            let err = exchange.rejected();
            kassa_log::warn!("PSP {} failed: {}", path, kassa_log::redact(&err.to_string()));
            return Err(err);
        }
        self.verify_response(&exchange.headers, &exchange.body)?;
        Ok(exchange.body)
    }

    fn verify_response(&self, headers: &[(String, String)], body: &str) -> PspResult<()> {
        let find = |name: &str| {
            headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        };
        let signature = find(SIGNATURE_HEADER)
            .ok_or_else(|| PspError::Hmac("response is not signed".into()))?;
        let algorithm = match find(params::ALGORITHM) {
            Some(name) => Algorithm::parse(name)
                .ok_or_else(|| PspError::Hmac(format!("unsupported algorithm: {}", name)))?,
            None => self.signer.algorithm(),
        };

        self.signer.verify(
            algorithm,
            headers.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            body,
            signature,
        )
    }

    fn groups_param(groups: &[GroupTag]) -> Option<(&'static str, String)> {
        if groups.is_empty() {
            return None;
        }
        let joined = groups.iter().map(GroupTag::as_str).collect::<Vec<_>>().join(",");
        Some(("groups", joined))
    }
}

#[derive(Default, Clone, Copy)]
struct Call<'a> {
    transaction_id: Option<&'a str>,
    tokenization_id: Option<&'a str>,
    timeout: Option<Duration>,
}

struct Exchange {
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
}

impl Exchange {
    fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn rejected(&self) -> PspError {
        let message = serde_json::from_str::<ErrorBody>(&self.body)
            .ok()
            .filter(|e| !e.message.is_empty())
            .map(|e| {
                if e.meta.is_empty() {
                    e.message
                } else {
                    format!("{} ({})", e.message, e.meta.join(", "))
                }
            })
            .unwrap_or_else(|| self.body.clone());
        PspError::Rejected {
            status: self.status,
            message,
        }
    }
}

#[async_trait]
impl PspClient for CheckoutClient {
    async fn create_payment(&self, request: &PaymentRequest) -> PspResult<PaymentResponse> {
        if request.kind() != PaymentKind::Standard {
            return Err(PspError::Validation(
                "token payments go through create_token_charge".into(),
            ));
        }
        request.validate()?;
        let text = self
            .send(Method::POST, "/payments", &[], Some(request), Call::default())
            .await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn create_token_charge(
        &self,
        request: &PaymentRequest,
    ) -> PspResult<TokenChargeResponse> {
        let path = match request.kind() {
            PaymentKind::CustomerInitiatedToken => "/payments/token/cit/charge",
            PaymentKind::MerchantInitiatedToken => "/payments/token/mit/charge",
            PaymentKind::Standard => {
                return Err(PspError::Validation("request carries no card token".into()));
            }
        };
        request.validate()?;

        let exchange = self
            .exchange(Method::POST, path, &[], Some(request), Call::default())
            .await?;
        if exchange.is_success() {
            self.verify_response(&exchange.headers, &exchange.body)?;
            return Ok(serde_json::from_str(&exchange.body)?);
        }

        // 403 with a challenge URL means 3-D Secure, not a decline
        if exchange.status == 403
            && request.kind() == PaymentKind::CustomerInitiatedToken
            && let Ok(resp) = serde_json::from_str::<TokenChargeResponse>(&exchange.body)
            && resp.three_d_secure_url.is_some()
        {
            kassa_log::info!("Token charge {} needs 3-D Secure", resp.transaction_id);
            return Ok(resp);
        }

        Err(exchange.rejected())
    }

    async fn get_providers(&self, amount: i64, groups: &[GroupTag]) -> PspResult<Vec<Provider>> {
        let mut query = vec![("amount", amount.to_string())];
        query.extend(Self::groups_param(groups));
        let text = self
            .send::<()>(
                Method::GET,
                "/merchants/payment-providers",
                &query,
                None,
                Call {
                    timeout: Some(self.metadata_timeout),
                    ..Call::default()
                },
            )
            .await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn get_grouped_providers(
        &self,
        amount: i64,
        language: Language,
        groups: &[GroupTag],
    ) -> PspResult<GroupedProviders> {
        let mut query = vec![
            ("amount", amount.to_string()),
            ("language", language.as_str().to_string()),
        ];
        query.extend(Self::groups_param(groups));
        let text = self
            .send::<()>(
                Method::GET,
                "/merchants/grouped-payment-providers",
                &query,
                None,
                Call {
                    timeout: Some(self.metadata_timeout),
                    ..Call::default()
                },
            )
            .await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn refund(
        &self,
        transaction_id: &str,
        request: &RefundRequest,
    ) -> PspResult<RefundResponse> {
        request.validate()?;
        let path = format!("/payments/{}/refund", transaction_id);
        let text = self
            .send(
                Method::POST,
                &path,
                &[],
                Some(request),
                Call {
                    transaction_id: Some(transaction_id),
                    ..Call::default()
                },
            )
            .await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn email_refund(
        &self,
        transaction_id: &str,
        request: &RefundRequest,
    ) -> PspResult<RefundResponse> {
        if !request.is_email_refund() {
            return Err(PspError::Validation("e-mail refund needs an address".into()));
        }
        request.validate()?;
        let path = format!("/payments/{}/refund/email", transaction_id);
        let text = self
            .send(
                Method::POST,
                &path,
                &[],
                Some(request),
                Call {
                    transaction_id: Some(transaction_id),
                    ..Call::default()
                },
            )
            .await?;
        Ok(serde_json::from_str(&text)?)
    }

    fn add_card_form(&self, request: &AddCardFormRequest) -> PspResult<AddCardForm> {
        let mut fields = self.auth_headers(&Method::POST, None);
        fields.insert(
            "checkout-redirect-success-url".to_string(),
            request.redirect_success_url.clone(),
        );
        fields.insert(
            "checkout-redirect-cancel-url".to_string(),
            request.redirect_cancel_url.clone(),
        );
        fields.insert("language".to_string(), request.language.as_str().to_string());

        let signature = self
            .signer
            .sign(fields.iter().map(|(k, v)| (k.as_str(), v.as_str())), "")?;
        fields.insert(SIGNATURE_HEADER.to_string(), signature);

        Ok(AddCardForm {
            action: format!("{}/tokenization/addcard-form", self.base_url),
            fields: fields
                .into_iter()
                .map(|(name, value)| FormField { name, value })
                .collect(),
        })
    }

    async fn get_token(&self, tokenization_id: &str) -> PspResult<TokenResponse> {
        if tokenization_id.is_empty() {
            return Err(PspError::Validation("tokenization id is empty".into()));
        }
        let path = format!("/tokenization/{}", tokenization_id);
        let text = self
            .send::<()>(
                Method::POST,
                &path,
                &[],
                None,
                Call {
                    tokenization_id: Some(tokenization_id),
                    ..Call::default()
                },
            )
            .await?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> CheckoutClient {
        CheckoutClient::new(
            CheckoutConfig::new("375917", "SAIPPUAKAUPPIAS").base_url("https://psp.example/"),
        )
        .unwrap()
    }

    #[test]
    fn test_requires_credentials() {
        assert!(matches!(
            CheckoutClient::new(CheckoutConfig::new("", "secret")),
            Err(PspError::Config(_))
        ));
        assert!(CheckoutClient::new(CheckoutConfig::new("1", "s").base_url("not a url")).is_err());
    }

    #[test]
    fn test_auth_headers() {
        let headers = client().auth_headers(&Method::POST, Some("tx-1"));
        assert_eq!(headers["checkout-account"], "375917");
        assert_eq!(headers["checkout-algorithm"], "sha256");
        assert_eq!(headers["checkout-method"], "POST");
        assert_eq!(headers["checkout-transaction-id"], "tx-1");
        assert!(headers["checkout-timestamp"].ends_with('Z'));
        assert_eq!(headers["checkout-nonce"].len(), 36);
    }

    #[test]
    fn test_add_card_form_is_signed() {
        let client = client();
        let form = client
            .add_card_form(&AddCardFormRequest {
                redirect_success_url: "https://shop.example/kassa/card-success/checkout".into(),
                redirect_cancel_url: "https://shop.example/kassa/card-cancel/checkout".into(),
                language: Language::FI,
            })
            .unwrap();

        assert_eq!(form.action, "https://psp.example/tokenization/addcard-form");
        let fields: std::collections::HashMap<String, String> = form
            .fields
            .into_iter()
            .map(|f| (f.name, f.value))
            .collect();
        assert_eq!(fields["language"], "FI");
        assert!(client.signer().verify_query(&fields).is_ok());
    }

    #[test]
    fn test_groups_param() {
        assert!(CheckoutClient::groups_param(&[]).is_none());
        let (_, value) =
            CheckoutClient::groups_param(&[GroupTag::Bank, GroupTag::CreditCard]).unwrap();
        assert_eq!(value, "bank,creditcard");
    }
}
