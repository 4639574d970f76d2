// Settings validation

use crate::{ConfigError, Result};

/// Trait for validating loaded settings
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// Validation rules shared by the settings types
pub struct ConfigValidator;

impl ConfigValidator {
    /// Reject blank values
    pub fn not_empty(value: &str, field: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingSetting(field.to_string()));
        }
        Ok(())
    }

    /// Require a number inside an inclusive range
    pub fn in_range<T: PartialOrd + std::fmt::Display>(
        value: T,
        min: T,
        max: T,
        field: &str,
    ) -> Result<()> {
        if value < min || value > max {
            return Err(ConfigError::invalid(
                field,
                format!("{} is outside {}..={}", value, min, max),
            ));
        }
        Ok(())
    }

    /// Require an absolute http(s) URL
    pub fn is_url(value: &str, field: &str) -> Result<()> {
        if !value.starts_with("http://") && !value.starts_with("https://") {
            return Err(ConfigError::invalid(field, "must be an http(s) URL"));
        }
        Ok(())
    }

    /// Require an ISO 3166-1 alpha-2 country code such as `FI`
    pub fn is_country_code(value: &str, field: &str) -> Result<()> {
        if value.len() != 2 || !value.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(ConfigError::invalid(
                field,
                "must be a two-letter uppercase country code",
            ));
        }
        Ok(())
    }

    /// Require a path segment that starts with `/`
    pub fn is_path(value: &str, field: &str) -> Result<()> {
        if !value.starts_with('/') {
            return Err(ConfigError::invalid(field, "must start with '/'"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_empty_validation() {
        assert!(ConfigValidator::not_empty("value", "field").is_ok());
        assert!(matches!(
            ConfigValidator::not_empty("  ", "merchant_id"),
            Err(ConfigError::MissingSetting(field)) if field == "merchant_id"
        ));
    }

    #[test]
    fn test_range_validation() {
        assert!(ConfigValidator::in_range(3, 1, 60, "field").is_ok());
        assert!(ConfigValidator::in_range(0, 1, 60, "field").is_err());
        assert!(ConfigValidator::in_range(61, 1, 60, "field").is_err());
    }

    #[test]
    fn test_url_validation() {
        assert!(ConfigValidator::is_url("https://services.paytrail.com", "field").is_ok());
        assert!(ConfigValidator::is_url("services.paytrail.com", "field").is_err());
    }

    #[test]
    fn test_country_code_validation() {
        assert!(ConfigValidator::is_country_code("FI", "field").is_ok());
        assert!(ConfigValidator::is_country_code("fi", "field").is_err());
        assert!(ConfigValidator::is_country_code("FIN", "field").is_err());
    }
}
