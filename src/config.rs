use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ReweaveError, ReweaveResult};

/// Where persisted state lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum StorageKind {
    /// Kept in memory for as long as the engine lives.
    #[default]
    Session,
    /// One JSON file per storage key under `directory`.
    Durable { directory: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistenceConfig {
    pub storage_key: String,
    #[serde(default)]
    pub backend: StorageKind,
}

/// Engine options. Every field has a default, so a partial JSON object is a
/// valid configuration.
///
/// ```
/// use reweave::EngineConfig;
///
/// let config = EngineConfig::from_json(r#"{ "defaultValue": "N/A", "cacheLimit": 5 }"#).unwrap();
/// assert_eq!(config.default_value, "N/A");
/// assert_eq!(config.cache_limit, 5);
/// assert_eq!(config.cache_expiration_ms, 60_000);
/// assert!(config.persistence.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Substituted for placeholders whose key is absent from the state.
    pub default_value: String,
    /// Maximum number of cached templates.
    pub cache_limit: usize,
    /// How long a cached template stays valid.
    pub cache_expiration_ms: u64,
    pub persistence: Option<PersistenceConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_value: String::new(),
            cache_limit: 100,
            cache_expiration_ms: 60_000,
            persistence: None,
        }
    }
}

impl EngineConfig {
    /// Parses a configuration from a JSON object.
    ///
    /// # Errors
    /// - If `json` is not an object matching the configuration shape.
    pub fn from_json(json: &str) -> ReweaveResult<Self> {
        serde_json::from_str(json).map_err(ReweaveError::Config)
    }
}
