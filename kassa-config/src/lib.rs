// Settings management for the kassa payment gateway

pub mod env;
pub mod error;
pub mod loader;
pub mod settings;
pub mod validation;

pub use env::{ENV_PREFIX, EnvLoader};
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};
pub use settings::{Credentials, GatewaySettings, ROUTE_BASE, TEST_MERCHANT_ID, TEST_SECRET_KEY};
pub use validation::{ConfigValidator, Validate};

use serde_json::{Map, Value};
use std::path::Path;

/// Layers settings sources and produces validated [`GatewaySettings`].
///
/// Later layers win: defaults, then files in load order, then the
/// environment, then explicit overrides.
///
/// ```rust,no_run
/// use kassa_config::SettingsLoader;
///
/// let settings = SettingsLoader::new()
///     .file("config/kassa.toml")?
///     .env()
///     .build()?;
/// # Ok::<(), kassa_config::ConfigError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct SettingsLoader {
    values: Map<String, Value>,
    env_prefix: Option<String>,
}

impl SettingsLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different environment prefix than `KASSA`
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Merge a settings file; the format follows the file name
    pub fn file(mut self, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let loaded = ConfigLoader::auto(path)?.load_file(path)?;
        self.values.extend(loaded);
        Ok(self)
    }

    /// Merge settings from a string in the given format
    pub fn source(mut self, content: &str, format: FileFormat) -> Result<Self> {
        let loaded = ConfigLoader::new(format).parse(content)?;
        self.values.extend(loaded);
        Ok(self)
    }

    /// Load a `.env` file into the process environment, if one exists
    pub fn dotenv(self) -> Self {
        dotenvy::dotenv().ok();
        self
    }

    /// Merge prefixed environment variables
    pub fn env(mut self) -> Self {
        let loader = match &self.env_prefix {
            Some(prefix) => EnvLoader::new(prefix.clone()),
            None => EnvLoader::default(),
        };
        for (key, value) in loader.load() {
            self.values.insert(key, Value::String(value));
        }
        self
    }

    /// Set a single value, overriding every source
    pub fn set(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    /// Deserialize and validate the merged settings
    pub fn build(self) -> Result<GatewaySettings> {
        let settings: GatewaySettings = serde_json::from_value(Value::Object(self.values))
            .map_err(|e| ConfigError::DeserializationError(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_wins_over_source() {
        let settings = SettingsLoader::new()
            .source("test_mode = true\ndefault_country = \"SE\"", FileFormat::Toml)
            .unwrap()
            .set("default_country", "FI")
            .build()
            .unwrap();
        assert_eq!(settings.default_country, "FI");
    }

    #[test]
    fn test_invalid_settings_fail_build() {
        let result = SettingsLoader::new()
            .set("test_mode", true)
            .set("site_url", "shop.example")
            .build();
        assert!(matches!(result, Err(ConfigError::InvalidSetting { key, .. }) if key == "site_url"));
    }

    #[test]
    fn test_malformed_flag_is_reported() {
        let result = SettingsLoader::new().set("test_mode", "maybe").build();
        assert!(matches!(result, Err(ConfigError::DeserializationError(_))));
    }
}
