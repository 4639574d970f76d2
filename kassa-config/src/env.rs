// Environment variable loading

use crate::{ConfigError, Result};
use std::collections::HashMap;
use std::env;

/// Prefix shared by every gateway environment variable.
pub const ENV_PREFIX: &str = "KASSA";

/// Environment variable loader
///
/// `KASSA_MERCHANT_ID=375917` becomes the setting `merchant_id`.
pub struct EnvLoader {
    prefix: String,
}

impl EnvLoader {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Collect every prefixed variable as a lowercase setting name
    pub fn load(&self) -> HashMap<String, String> {
        self.collect(env::vars())
    }

    fn collect(&self, vars: impl Iterator<Item = (String, String)>) -> HashMap<String, String> {
        let marker = format!("{}_", self.prefix);
        vars.filter_map(|(key, value)| {
            key.strip_prefix(&marker)
                .filter(|rest| !rest.is_empty())
                .map(|rest| (rest.to_lowercase(), value))
        })
        .collect()
    }

    /// Load a single setting from the environment
    pub fn load_var(&self, key: &str) -> Result<String> {
        let full_key = format!("{}_{}", self.prefix, key.to_uppercase());
        env::var(&full_key).map_err(ConfigError::EnvError)
    }

    /// Load with default value
    pub fn load_var_or(&self, key: &str, default: &str) -> String {
        self.load_var(key).unwrap_or_else(|_| default.to_string())
    }
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self::new(ENV_PREFIX)
    }
}
