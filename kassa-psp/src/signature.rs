//! HMAC signing and verification of PSP traffic
//!
//! Every request, response and callback is authenticated the same way: the
//! `checkout-*` parameters are sorted by name, rendered as `name:value`
//! lines, joined with `\n`, followed by `\n` and the raw body (empty for
//! GET requests and redirect/callback query strings). The hex HMAC of that
//! payload goes into the `signature` header or query parameter.

use crate::error::{PspError, PspResult};
use crate::types::params;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Sha256, Sha512};
use std::collections::HashMap;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

/// Prefix of the parameters covered by a signature
pub const SIGNED_PREFIX: &str = "checkout-";

/// Hash function named by `checkout-algorithm`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Algorithm {
    #[default]
    Sha256,
    Sha512,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "sha256" => Some(Self::Sha256),
            "sha512" => Some(Self::Sha512),
            _ => None,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build the string a signature is computed over.
///
/// Parameters without the `checkout-` prefix are ignored, which also keeps
/// the shop's own refund parameters out of the payload.
pub fn signing_payload<'a>(
    params: impl IntoIterator<Item = (&'a str, &'a str)>,
    body: &str,
) -> String {
    let mut signed: Vec<(&str, &str)> = params
        .into_iter()
        .filter(|(name, _)| name.starts_with(SIGNED_PREFIX))
        .collect();
    signed.sort_by(|a, b| a.0.cmp(b.0));

    let mut payload = signed
        .iter()
        .map(|(name, value)| format!("{}:{}", name, value))
        .collect::<Vec<_>>()
        .join("\n");
    payload.push('\n');
    payload.push_str(body);
    payload
}

/// Signs and verifies with the merchant's shared secret
#[derive(Clone)]
pub struct Signer {
    secret: SecretString,
    algorithm: Algorithm,
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl Signer {
    /// Signer using SHA-256 for outgoing requests
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: SecretString::new(secret.into().into()),
            algorithm: Algorithm::Sha256,
        }
    }

    /// Use another algorithm for outgoing requests
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Hex signature over `params` and `body` with the default algorithm
    pub fn sign<'a>(
        &self,
        params: impl IntoIterator<Item = (&'a str, &'a str)>,
        body: &str,
    ) -> PspResult<String> {
        let mac = self.compute(self.algorithm, &signing_payload(params, body))?;
        Ok(hex::encode(mac))
    }

    /// Signature for a callback or redirect query string
    pub fn sign_query(&self, query: &HashMap<String, String>) -> PspResult<String> {
        let algorithm = match query.get(params::ALGORITHM) {
            Some(name) => Self::algorithm_named(name)?,
            None => self.algorithm,
        };
        let payload = signing_payload(query.iter().map(|(k, v)| (k.as_str(), v.as_str())), "");
        Ok(hex::encode(self.compute(algorithm, &payload)?))
    }

    /// Check `signature` against `params` and `body`
    pub fn verify<'a>(
        &self,
        algorithm: Algorithm,
        params: impl IntoIterator<Item = (&'a str, &'a str)>,
        body: &str,
        signature: &str,
    ) -> PspResult<()> {
        let expected = self.compute(algorithm, &signing_payload(params, body))?;
        let given = hex::decode(signature.trim())
            .map_err(|_| PspError::Hmac("signature is not hex encoded".into()))?;

        if constant_time_eq(&given, &expected) {
            Ok(())
        } else {
            Err(PspError::Hmac("signature does not match".into()))
        }
    }

    /// Verify a redirect or callback query string.
    ///
    /// The algorithm comes from `checkout-algorithm`; the `signature`
    /// parameter is required.
    pub fn verify_query(&self, query: &HashMap<String, String>) -> PspResult<()> {
        let signature = query
            .get(params::SIGNATURE)
            .ok_or_else(|| PspError::Hmac("signature parameter missing".into()))?;
        let algorithm = match query.get(params::ALGORITHM) {
            Some(name) => Self::algorithm_named(name)?,
            None => self.algorithm,
        };

        self.verify(
            algorithm,
            query.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            "",
            signature,
        )
    }

    fn algorithm_named(name: &str) -> PspResult<Algorithm> {
        Algorithm::parse(name)
            .ok_or_else(|| PspError::Hmac(format!("unsupported algorithm: {}", name)))
    }

    fn compute(&self, algorithm: Algorithm, payload: &str) -> PspResult<Vec<u8>> {
        let key = self.secret.expose_secret().as_bytes();
        let digest = match algorithm {
            Algorithm::Sha256 => {
                let mut mac = HmacSha256::new_from_slice(key)
                    .map_err(|e| PspError::Hmac(e.to_string()))?;
                mac.update(payload.as_bytes());
                mac.finalize().into_bytes().to_vec()
            }
            Algorithm::Sha512 => {
                let mut mac = HmacSha512::new_from_slice(key)
                    .map_err(|e| PspError::Hmac(e.to_string()))?;
                mac.update(payload.as_bytes());
                mac.finalize().into_bytes().to_vec()
            }
        };
        Ok(digest)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "SAIPPUAKAUPPIAS";

    fn request_headers() -> Vec<(&'static str, &'static str)> {
        vec![
            ("checkout-timestamp", "2018-07-06T10:01:31.904Z"),
            ("checkout-account", "375917"),
            ("checkout-method", "POST"),
            ("checkout-algorithm", "sha256"),
            ("checkout-nonce", "564635208570151"),
            ("content-type", "application/json; charset=utf-8"),
        ]
    }

    const REQUEST_BODY: &str = r##"{"stamp":"unique-identifier-for-merchant","reference":"3759170","amount":1525,"currency":"EUR","language":"FI","items":[{"unitPrice":1525,"units":1,"vatPercentage":24,"productCode":"#1234","deliveryDate":"2018-09-01"}],"customer":{"email":"test.customer@example.com"},"redirectUrls":{"success":"https://ecom.example.com/cart/success","cancel":"https://ecom.example.com/cart/cancel"}}"##;

    fn callback_query() -> HashMap<String, String> {
        [
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
        .collect()
    }

    #[test]
    fn test_payload_is_sorted_and_filtered() {
        let payload = signing_payload(
            [("checkout-b", "2"), ("other", "x"), ("checkout-a", "1")],
            "{}",
        );
        assert_eq!(payload, "checkout-a:1\ncheckout-b:2\n{}");
    }

    #[test]
    fn test_request_signature_matches_known_vector() {
        let signer = Signer::new(SECRET);
        let signature = signer.sign(request_headers(), REQUEST_BODY).unwrap();
        assert_eq!(
            signature,
            "3708f6497ae7cc55a2e6009fc90aa10c3ad0ef125260ee91b19168750f6d74f6"
        );
    }

    #[test]
    fn test_callback_verifies() {
        let signer = Signer::new(SECRET);
        assert!(signer.verify_query(&callback_query()).is_ok());
    }

    #[test]
    fn test_shop_parameters_do_not_affect_signature() {
        let signer = Signer::new(SECRET);
        let mut query = callback_query();
        query.insert(params::REFUND_CALLBACK.into(), "1".into());
        query.insert(params::REFUND_UNIQUE_ID.into(), "abc".into());
        query.insert(params::ORDER_ID.into(), "17".into());
        assert!(signer.verify_query(&query).is_ok());
    }

    #[test]
    fn test_any_mutation_fails() {
        let signer = Signer::new(SECRET);
        for key in ["checkout-amount", "checkout-status", "checkout-reference"] {
            let mut query = callback_query();
            let value = query.get_mut(key).unwrap();
            value.push('0');
            assert!(matches!(signer.verify_query(&query), Err(PspError::Hmac(_))));
        }

        let mut query = callback_query();
        query.insert(
            "signature".into(),
            "c2d3ecdda2c04563a4638fcade3d4e77dfdc58829b429ad2c2cb422d0fc64080".into(),
        );
        assert!(signer.verify_query(&query).is_err());
    }

    #[test]
    fn test_missing_signature_fails() {
        let mut query = callback_query();
        query.remove("signature");
        assert!(matches!(
            Signer::new(SECRET).verify_query(&query),
            Err(PspError::Hmac(_))
        ));
    }

    #[test]
    fn test_wrong_secret_fails() {
        assert!(Signer::new("other").verify_query(&callback_query()).is_err());
    }

    #[test]
    fn test_sha512_callbacks() {
        let signer = Signer::new(SECRET);
        let mut query = callback_query();
        query.insert("checkout-algorithm".into(), "sha512".into());
        query.remove("signature");
        let signature = signer.sign_query(&query).unwrap();
        assert_eq!(signature.len(), 128);
        query.insert("signature".into(), signature);
        assert!(signer.verify_query(&query).is_ok());

        query.insert("checkout-algorithm".into(), "md5".into());
        assert!(signer.verify_query(&query).is_err());
    }
}
