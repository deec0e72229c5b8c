//! Store connection settings.
//!
//! Loaded from the environment (`MONGODB_URI`, `MONGODB_DATABASE`, `MONGODB_COLLECTION`,
//! `MONGODB_APP_NAME`, `MONGODB_CONNECT_TIMEOUT_MS`, `MONGODB_SERVER_SELECTION_TIMEOUT_MS`)
//! or from a TOML document:
//!
//! ```toml
//! uri = "mongodb://localhost:27017"
//! database = "duofiction"
//! collection = "fanfictions"
//! # connect_timeout_ms = 5000
//! # server_selection_timeout_ms = 5000
//! # app_name = "duofiction-web"
//! ```
//!
//! Timeouts are handed to the driver; the access layer imposes no deadlines of its own.

use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::{DocumentStoreError, DocumentStoreResult};

pub const DEFAULT_URI: &str = "mongodb://localhost";
pub const DEFAULT_DATABASE: &str = "duofiction";
pub const DEFAULT_COLLECTION: &str = "fanfictions";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_uri")]
    pub uri: String,
    #[serde(default = "default_database")]
    pub database: String,
    /// Collection used for fanfiction records.
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_selection_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
}

fn default_uri() -> String {
    DEFAULT_URI.to_string()
}

fn default_database() -> String {
    DEFAULT_DATABASE.to_string()
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            database: default_database(),
            collection: default_collection(),
            connect_timeout_ms: None,
            server_selection_timeout_ms: None,
            app_name: None,
        }
    }
}

impl StoreConfig {
    /// Reads the process environment. Unset variables keep their defaults.
    pub fn from_env() -> DocumentStoreResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> DocumentStoreResult<Self> {
        let mut config = Self::default();

        if let Some(uri) = lookup("MONGODB_URI") {
            config.uri = uri;
        }
        if let Some(database) = lookup("MONGODB_DATABASE") {
            config.database = database;
        }
        if let Some(collection) = lookup("MONGODB_COLLECTION") {
            config.collection = collection;
        }
        config.app_name = lookup("MONGODB_APP_NAME").or(config.app_name);
        config.connect_timeout_ms = parse_millis(&lookup, "MONGODB_CONNECT_TIMEOUT_MS")?;
        config.server_selection_timeout_ms = parse_millis(&lookup, "MONGODB_SERVER_SELECTION_TIMEOUT_MS")?;

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> DocumentStoreResult<Self> {
        let config: StoreConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> DocumentStoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DocumentStoreError::Config(format!("Failed to read config file '{}': {e}", path.display()))
        })?;

        Self::from_toml(&content)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    pub fn server_selection_timeout(&self) -> Option<Duration> {
        self.server_selection_timeout_ms.map(Duration::from_millis)
    }

    fn validate(&self) -> DocumentStoreResult<()> {
        if self.uri.trim().is_empty() {
            return Err(DocumentStoreError::Config("uri must not be empty".to_string()));
        }
        if self.database.trim().is_empty() {
            return Err(DocumentStoreError::Config("database must not be empty".to_string()));
        }
        if self.collection.trim().is_empty() {
            return Err(DocumentStoreError::Config("collection must not be empty".to_string()));
        }

        Ok(())
    }
}

fn parse_millis(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> DocumentStoreResult<Option<u64>> {
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<u64>()
                .map_err(|e| DocumentStoreError::Config(format!("{key}={raw:?}: {e}")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = StoreConfig::from_lookup(|_| None).unwrap();

        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.uri, "mongodb://localhost");
        assert_eq!(config.database, "duofiction");
    }

    #[test]
    fn environment_overrides_defaults() {
        let vars: HashMap<&str, &str> = [
            ("MONGODB_URI", "mongodb://db:27017"),
            ("MONGODB_COLLECTION", "stories"),
            ("MONGODB_CONNECT_TIMEOUT_MS", "2500"),
        ]
        .into_iter()
        .collect();

        let config = StoreConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();

        assert_eq!(config.uri, "mongodb://db:27017");
        assert_eq!(config.collection, "stories");
        assert_eq!(config.connect_timeout(), Some(Duration::from_millis(2500)));
        assert_eq!(config.server_selection_timeout(), None);
    }

    #[test]
    fn rejects_malformed_timeout() {
        let result = StoreConfig::from_lookup(|key| (key == "MONGODB_CONNECT_TIMEOUT_MS").then(|| "soon".to_string()));

        assert!(matches!(result, Err(DocumentStoreError::Config(_))));
    }

    #[test]
    fn parses_toml_with_partial_fields() {
        let config = StoreConfig::from_toml(
            r#"
            database = "catalog"
            server_selection_timeout_ms = 1000
            "#,
        )
        .unwrap();

        assert_eq!(config.database, "catalog");
        assert_eq!(config.uri, DEFAULT_URI);
        assert_eq!(config.server_selection_timeout_ms, Some(1000));
        assert!(matches!(StoreConfig::from_toml("uri = \"\""), Err(DocumentStoreError::Config(_))));
    }
}
