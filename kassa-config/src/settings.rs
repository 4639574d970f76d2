// Gateway settings

use crate::validation::{ConfigValidator, Validate};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Merchant id of the PSP's public test account.
pub const TEST_MERCHANT_ID: &str = "375917";

/// Secret key of the PSP's public test account.
pub const TEST_SECRET_KEY: &str = "SAIPPUAKAUPPIAS";

/// First path segment of every gateway route (`/kassa/<route>/<action>`).
pub const ROUTE_BASE: &str = "kassa";

/// Settings of one gateway instance.
///
/// Boolean settings accept `true`/`false` as well as the `yes`/`no` strings
/// shop admin forms store; numeric settings accept numeric strings, so the
/// same struct deserializes from files and from environment variables.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    #[serde(deserialize_with = "coerce::flag")]
    pub enabled: bool,
    #[serde(deserialize_with = "coerce::flag")]
    pub test_mode: bool,
    #[serde(deserialize_with = "coerce::flag")]
    pub debug: bool,
    #[serde(deserialize_with = "coerce::text")]
    pub merchant_id: String,
    #[serde(deserialize_with = "coerce::text")]
    pub secret_key: String,
    pub title: String,
    pub description: String,
    /// Show the provider list in the shop instead of the PSP-hosted page.
    #[serde(deserialize_with = "coerce::flag")]
    pub provider_selection_in_store: bool,
    /// Country used for addresses that carry none.
    pub default_country: String,
    /// Prefix of payment stamps; distinguishes shops sharing one merchant.
    #[serde(deserialize_with = "coerce::text")]
    pub shop_instance: String,
    pub api_base_url: String,
    pub platform_name: String,
    pub site_url: String,
    pub callback_path: String,
    #[serde(deserialize_with = "coerce::number")]
    pub request_timeout_secs: u64,
    #[serde(deserialize_with = "coerce::number")]
    pub metadata_timeout_secs: u64,
    pub lock_dir: PathBuf,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            test_mode: false,
            debug: false,
            merchant_id: String::new(),
            secret_key: String::new(),
            title: "OP Payment Service".to_string(),
            description: String::new(),
            provider_selection_in_store: true,
            default_country: "FI".to_string(),
            shop_instance: "1".to_string(),
            api_base_url: "https://services.paytrail.com".to_string(),
            platform_name: format!("kassa-{}", env!("CARGO_PKG_VERSION")),
            site_url: "http://localhost".to_string(),
            callback_path: "/kassa/callback/index".to_string(),
            request_timeout_secs: 10,
            metadata_timeout_secs: 3,
            lock_dir: std::env::temp_dir().join("kassa-locks"),
        }
    }
}

impl fmt::Debug for GatewaySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewaySettings")
            .field("enabled", &self.enabled)
            .field("test_mode", &self.test_mode)
            .field("debug", &self.debug)
            .field("merchant_id", &self.merchant_id)
            .field("secret_key", &"[REDACTED]")
            .field("provider_selection_in_store", &self.provider_selection_in_store)
            .field("default_country", &self.default_country)
            .field("api_base_url", &self.api_base_url)
            .field("site_url", &self.site_url)
            .finish_non_exhaustive()
    }
}

/// Merchant credentials after test-mode substitution.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub merchant_id: String,
    pub secret_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("merchant_id", &self.merchant_id)
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

impl GatewaySettings {
    /// Settings for the PSP's public test account.
    pub fn test() -> Self {
        Self {
            test_mode: true,
            ..Self::default()
        }
    }

    /// Credentials to sign PSP traffic with.
    pub fn credentials(&self) -> Credentials {
        if self.test_mode {
            Credentials {
                merchant_id: TEST_MERCHANT_ID.to_string(),
                secret_key: TEST_SECRET_KEY.to_string(),
            }
        } else {
            Credentials {
                merchant_id: self.merchant_id.clone(),
                secret_key: self.secret_key.clone(),
            }
        }
    }

    fn site(&self) -> &str {
        self.site_url.trim_end_matches('/')
    }

    /// Server-side endpoint receiving every PSP callback.
    pub fn callback_url(&self) -> String {
        format!("{}{}", self.site(), self.callback_path)
    }

    /// URL of a gateway route such as `card-success/checkout`.
    pub fn route_url(&self, route: &str, action: &str) -> String {
        format!("{}/{}/{}/{}", self.site(), ROUTE_BASE, route, action)
    }

    /// Internal page rendering the selected provider's form.
    pub fn pay_page_url(&self, order_id: u64) -> String {
        self.route_url("pay", &order_id.to_string())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Timeout for provider-list and other metadata fetches.
    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_secs(self.metadata_timeout_secs)
    }
}

impl Validate for GatewaySettings {
    fn validate(&self) -> Result<()> {
        if !self.test_mode {
            ConfigValidator::not_empty(&self.merchant_id, "merchant_id")?;
            ConfigValidator::not_empty(&self.secret_key, "secret_key")?;
        }
        ConfigValidator::is_url(&self.api_base_url, "api_base_url")?;
        ConfigValidator::is_url(&self.site_url, "site_url")?;
        ConfigValidator::is_path(&self.callback_path, "callback_path")?;
        ConfigValidator::is_country_code(&self.default_country, "default_country")?;
        ConfigValidator::not_empty(&self.shop_instance, "shop_instance")?;
        ConfigValidator::in_range(self.request_timeout_secs, 1, 120, "request_timeout_secs")?;
        ConfigValidator::in_range(self.metadata_timeout_secs, 1, 30, "metadata_timeout_secs")?;
        Ok(())
    }
}

mod coerce {
    use serde::de::{self, Deserializer};
    use serde::Deserialize;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Int(u64),
        Text(String),
    }

    pub fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Bool(b) => Ok(b),
            Raw::Int(n) => Ok(n != 0),
            Raw::Text(s) => match s.trim().to_lowercase().as_str() {
                "yes" | "true" | "1" | "on" => Ok(true),
                "no" | "false" | "0" | "off" | "" => Ok(false),
                other => Err(de::Error::custom(format!("not a yes/no value: {}", other))),
            },
        }
    }

    pub fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Bool(b) => Ok(b.to_string()),
            Raw::Int(n) => Ok(n.to_string()),
            Raw::Text(s) => Ok(s),
        }
    }

    pub fn number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Int(n) => Ok(n),
            Raw::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| de::Error::custom(format!("not a number: {}", s))),
            Raw::Bool(_) => Err(de::Error::custom("expected a number")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConfigError;

    #[test]
    fn test_defaults_validate_in_test_mode() {
        let settings = GatewaySettings::test();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.metadata_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_live_mode_requires_credentials() {
        let settings = GatewaySettings::default();
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::MissingSetting(field)) if field == "merchant_id"
        ));
    }

    #[test]
    fn test_test_mode_overrides_credentials() {
        let settings = GatewaySettings {
            test_mode: true,
            merchant_id: "123".into(),
            secret_key: "live-secret".into(),
            ..GatewaySettings::default()
        };
        let creds = settings.credentials();
        assert_eq!(creds.merchant_id, TEST_MERCHANT_ID);
        assert_eq!(creds.secret_key, TEST_SECRET_KEY);
    }

    #[test]
    fn test_yes_no_strings_deserialize() {
        let settings: GatewaySettings = serde_json::from_value(serde_json::json!({
            "test_mode": "yes",
            "debug": "no",
            "merchant_id": 375917,
            "request_timeout_secs": "7"
        }))
        .unwrap();
        assert!(settings.test_mode);
        assert!(!settings.debug);
        assert_eq!(settings.merchant_id, "375917");
        assert_eq!(settings.request_timeout_secs, 7);
        assert!(settings.provider_selection_in_store);
    }

    #[test]
    fn test_urls() {
        let settings = GatewaySettings {
            site_url: "https://shop.example/".into(),
            ..GatewaySettings::test()
        };
        assert_eq!(
            settings.callback_url(),
            "https://shop.example/kassa/callback/index"
        );
        assert_eq!(
            settings.route_url("card-success", "checkout"),
            "https://shop.example/kassa/card-success/checkout"
        );
        assert_eq!(settings.pay_page_url(42), "https://shop.example/kassa/pay/42");
    }

    #[test]
    fn test_debug_output_hides_secret() {
        let settings = GatewaySettings {
            secret_key: "very-secret".into(),
            ..GatewaySettings::default()
        };
        let printed = format!("{:?}", settings);
        assert!(!printed.contains("very-secret"));
        assert!(!format!("{:?}", settings.credentials()).contains("very-secret"));
    }
}
