//! Configuration file loading

use super::schema::ConfigSchema;
use crate::error::{Error, Result};
use std::path::Path;

/// Configuration wrapper
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Parsed settings
    pub schema: ConfigSchema,
    /// File the settings came from, if any
    pub path: Option<String>,
}

impl Config {
    /// Load configuration from a file path, or the first standard location
    /// that exists, or fall back to defaults
    pub fn load(path: Option<&str>) -> Result<Self> {
        if let Some(p) = path {
            if !Path::new(p).exists() {
                return Err(Error::config_not_found(p));
            }
        }

        let config_path = path.map(String::from).or_else(find_config_file);

        let schema = if let Some(ref p) = config_path {
            load_config_file(p)?
        } else {
            ConfigSchema::default()
        };

        Ok(Self {
            schema,
            path: config_path,
        })
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(Self {
            schema: toml::from_str(content)?,
            path: None,
        })
    }
}

/// Find configuration file in standard locations
fn find_config_file() -> Option<String> {
    let candidates = [
        ".caltracker.toml",
        "caltracker.toml",
        ".config/caltracker.toml",
    ];

    candidates
        .into_iter()
        .find(|candidate| Path::new(candidate).exists())
        .map(String::from)
}

/// Load and parse a TOML configuration file
fn load_config_file(path: &str) -> Result<ConfigSchema> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::config(format!("Failed to read config file {path}: {e}")))?;

    toml::from_str(&content)
        .map_err(|e| Error::from(e).with_context(format!("Parsing config file {path}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.path.is_none());
        assert_eq!(config.schema.requests.retry_count, 3);
        assert_eq!(config.schema.requests.cache_ttl_ms, 300_000);
        assert_eq!(config.schema.requests.offline_ttl_ms, 86_400_000);
        assert!(config.schema.requests.offline_queue);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [api]
            base_url = "https://example.supabase.co/rest/v1"

            [requests]
            retry_count = 1
            "#,
        )
        .unwrap();

        assert_eq!(
            config.schema.api.base_url.as_deref(),
            Some("https://example.supabase.co/rest/v1")
        );
        assert_eq!(config.schema.api.timeout_secs, 30);
        assert_eq!(config.schema.requests.retry_count, 1);
        assert_eq!(config.schema.requests.retry_delay_ms, 1000);
        assert!(config.schema.sync.sync_on_reconnect);
    }

    #[test]
    fn test_load_explicit_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("caltracker.toml");
        std::fs::write(&path, "[logging]\nlevel = \"debug\"\n").unwrap();

        let config = Config::load(path.to_str()).unwrap();
        assert_eq!(config.schema.logging.level, "debug");
        assert!(config.path.is_some());
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let err = Config::load(Some("/definitely/not/here.toml")).unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::ConfigNotFound);
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let err = Config::from_toml("[requests]\nretry_count = \"many\"").unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::ConfigParseError);
    }
}
