// src/config/file.rs
// File-based configuration from a TOML file, layered under env vars.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Deserialize, Default, Clone)]
pub struct PrometheusConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct DatabaseConfig {
    pub path: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct EmbeddingConfig {
    /// `None` means the file didn't set it; precedence falls through to
    /// env, then the built-in default, rather than baking one in here.
    pub dim: Option<usize>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct QueueConfig {
    /// Lane name -> default max_concurrent.
    #[serde(default)]
    pub lane_defaults: HashMap<String, usize>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct RuntimeConfig {
    /// Task type -> ordered list of "provider/model" refs.
    #[serde(default)]
    pub task_preferences: HashMap<String, Vec<String>>,
    pub max_chain_length: Option<usize>,
    pub allowed_providers: Option<Vec<String>>,
    pub excluded_providers: Option<Vec<String>>,
    pub credential_cooldown_base_ms: Option<u64>,
    pub credential_cooldown_max_ms: Option<u64>,
}

impl PrometheusConfig {
    /// Loads from `path`, falling back to defaults if the file is missing
    /// or fails to parse (logged, not fatal — config files are optional).
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    debug!(path = %path.display(), "loaded config file");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to parse config file, using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                debug!(path = %path.display(), "config file not found, using defaults");
                Self::default()
            }
        }
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".prometheus")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = PrometheusConfig::load(Path::new("/nonexistent/prometheus-config.toml"));
        assert_eq!(config.embedding.dim, None);
        assert!(config.queue.lane_defaults.is_empty());
    }

    #[test]
    fn parses_recognized_sections() {
        let toml_text = r#"
            [database]
            path = "/tmp/prometheus.db"

            [embedding]
            dim = 768

            [queue.lane_defaults]
            indexing = 2

            [runtime]
            max_chain_length = 3
            allowed_providers = ["openai"]
        "#;
        let config: PrometheusConfig = toml::from_str(toml_text).unwrap();
        assert_eq!(config.database.path.as_deref(), Some("/tmp/prometheus.db"));
        assert_eq!(config.embedding.dim, Some(768));
        assert_eq!(config.queue.lane_defaults.get("indexing"), Some(&2));
        assert_eq!(config.runtime.max_chain_length, Some(3));
    }
}
