// Settings file loaders

use crate::{ConfigError, Result};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

/// Supported settings file formats
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FileFormat {
    Json,
    Toml,
    Env,
}

impl FileFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "json" => Some(FileFormat::Json),
            "toml" => Some(FileFormat::Toml),
            "env" => Some(FileFormat::Env),
            _ => None,
        }
    }

    /// Detect the format of a path; `.env` files have no extension.
    pub fn detect(path: &Path) -> Option<Self> {
        if path.file_name().and_then(|n| n.to_str()) == Some(".env") {
            return Some(FileFormat::Env);
        }
        path.extension()
            .and_then(|s| s.to_str())
            .and_then(Self::from_extension)
    }
}

/// Reads a settings file into a flat JSON object.
///
/// A `[gateway]` table (TOML) or `"gateway"` object (JSON) is unwrapped so
/// a settings file may be shared with the rest of the shop.
pub struct ConfigLoader {
    format: FileFormat,
}

impl ConfigLoader {
    pub fn new(format: FileFormat) -> Self {
        Self { format }
    }

    /// Auto-detect format from the file name
    pub fn auto(path: &Path) -> Result<Self> {
        let format = FileFormat::detect(path).ok_or_else(|| {
            ConfigError::LoadError(format!("Unsupported settings file: {}", path.display()))
        })?;
        Ok(Self::new(format))
    }

    /// Load settings from file
    pub fn load_file(&self, path: &Path) -> Result<Map<String, Value>> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::LoadError(format!("Failed to read {}: {}", path.display(), e))
        })?;

        self.parse(&content)
    }

    /// Parse settings from a string
    pub fn parse(&self, content: &str) -> Result<Map<String, Value>> {
        let value = match self.format {
            FileFormat::Json => self.parse_json(content)?,
            FileFormat::Toml => self.parse_toml(content)?,
            FileFormat::Env => self.parse_env(content),
        };

        match value {
            Value::Object(mut map) => match map.remove("gateway") {
                Some(Value::Object(section)) => Ok(section),
                Some(other) => {
                    map.insert("gateway".to_string(), other);
                    Ok(map)
                }
                None => Ok(map),
            },
            _ => Err(ConfigError::ParseError(
                "settings must be a table of key/value pairs".to_string(),
            )),
        }
    }

    fn parse_json(&self, content: &str) -> Result<Value> {
        serde_json::from_str(content)
            .map_err(|e| ConfigError::ParseError(format!("JSON parse error: {}", e)))
    }

    fn parse_toml(&self, content: &str) -> Result<Value> {
        let toml_value: toml::Value = toml::from_str(content)
            .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))?;

        serde_json::to_value(toml_value)
            .map_err(|e| ConfigError::ParseError(format!("TOML to JSON conversion error: {}", e)))
    }

    fn parse_env(&self, content: &str) -> Value {
        let mut map = Map::new();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim().trim_start_matches("KASSA_").to_lowercase();
                let value = value.trim().trim_matches('"').trim_matches('\'');
                map.insert(key, Value::String(value.to_string()));
            }
        }

        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toml_gateway_section() {
        let loader = ConfigLoader::new(FileFormat::Toml);
        let toml = r#"
            [gateway]
            merchant_id = "375917"
            test_mode = true
        "#;

        let map = loader.parse(toml).unwrap();
        assert_eq!(map["merchant_id"], "375917");
        assert_eq!(map["test_mode"], true);
    }

    #[test]
    fn test_parse_flat_json() {
        let loader = ConfigLoader::new(FileFormat::Json);
        let map = loader
            .parse(r#"{"secret_key": "abc", "request_timeout_secs": 5}"#)
            .unwrap();
        assert_eq!(map["secret_key"], "abc");
        assert_eq!(map["request_timeout_secs"], 5);
    }

    #[test]
    fn test_parse_env_strips_prefix() {
        let loader = ConfigLoader::new(FileFormat::Env);
        let env = r#"
            # gateway credentials
            KASSA_MERCHANT_ID=375917
            KASSA_SECRET_KEY="SAIPPUAKAUPPIAS"
            DEBUG=yes
        "#;

        let map = loader.parse(env).unwrap();
        assert_eq!(map["merchant_id"], "375917");
        assert_eq!(map["secret_key"], "SAIPPUAKAUPPIAS");
        assert_eq!(map["debug"], "yes");
    }

    #[test]
    fn test_array_root_is_rejected() {
        let loader = ConfigLoader::new(FileFormat::Json);
        assert!(loader.parse("[1, 2]").is_err());
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(
            FileFormat::detect(Path::new("shop/kassa.toml")),
            Some(FileFormat::Toml)
        );
        assert_eq!(FileFormat::detect(Path::new(".env")), Some(FileFormat::Env));
        assert_eq!(FileFormat::detect(Path::new("kassa.yaml")), None);
    }
}
