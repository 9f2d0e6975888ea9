// src/config/mod.rs
// Layered configuration: explicit Options argument > file > environment >
// built-in default, matching the teacher's `from_config`/`from_env` split.

pub mod env;
pub mod file;

pub use env::{ApiKeys, EnvConfig};
pub use file::PrometheusConfig;

use crate::runtime::catalog::ModelRef;
use std::path::PathBuf;

/// Fully resolved configuration, after applying the precedence rule over
/// env vars and an optional TOML file.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub database_path: PathBuf,
    pub embedding_dim: usize,
    pub lane_defaults: std::collections::HashMap<String, usize>,
    pub task_preferences: std::collections::HashMap<String, Vec<ModelRef>>,
    pub max_chain_length: usize,
    pub allowed_providers: Option<Vec<String>>,
    pub excluded_providers: Option<Vec<String>>,
    pub credential_cooldown_base_ms: u64,
    pub credential_cooldown_max_ms: u64,
}

const DEFAULT_DATABASE_PATH: &str = "prometheus.db";
const DEFAULT_MAX_CHAIN_LENGTH: usize = 4;
const DEFAULT_COOLDOWN_BASE_MS: u64 = 5_000;
const DEFAULT_COOLDOWN_MAX_MS: u64 = 600_000;

fn parse_model_ref(s: &str) -> Option<ModelRef> {
    let (provider, model) = s.split_once('/')?;
    Some(ModelRef::new(provider, model))
}

impl ResolvedConfig {
    pub fn load(known_providers: &[&str]) -> Self {
        let file = PrometheusConfig::load(&PrometheusConfig::default_path());
        let env = EnvConfig::load(known_providers);
        Self::merge(file, env)
    }

    fn merge(file: PrometheusConfig, env: EnvConfig) -> Self {
        let database_path = file
            .database
            .path
            .or(env.database_path)
            .unwrap_or_else(|| DEFAULT_DATABASE_PATH.to_string());

        let embedding_dim = file.embedding.dim.or(env.embedding_dim).unwrap_or(1536);

        let task_preferences = file
            .runtime
            .task_preferences
            .into_iter()
            .map(|(task, refs)| (task, refs.iter().filter_map(|s| parse_model_ref(s)).collect()))
            .collect();

        Self {
            database_path: PathBuf::from(database_path),
            embedding_dim,
            lane_defaults: file.queue.lane_defaults,
            task_preferences,
            max_chain_length: file.runtime.max_chain_length.unwrap_or(DEFAULT_MAX_CHAIN_LENGTH),
            allowed_providers: file.runtime.allowed_providers,
            excluded_providers: file.runtime.excluded_providers,
            credential_cooldown_base_ms: file
                .runtime
                .credential_cooldown_base_ms
                .or(env.credential_cooldown_base_ms)
                .unwrap_or(DEFAULT_COOLDOWN_BASE_MS),
            credential_cooldown_max_ms: file
                .runtime
                .credential_cooldown_max_ms
                .or(env.credential_cooldown_max_ms)
                .unwrap_or(DEFAULT_COOLDOWN_MAX_MS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_falls_back_to_builtin_defaults() {
        let resolved = ResolvedConfig::merge(PrometheusConfig::default(), EnvConfig::load(&[]));
        assert_eq!(resolved.database_path, PathBuf::from(DEFAULT_DATABASE_PATH));
        assert_eq!(resolved.embedding_dim, 1536);
        assert_eq!(resolved.max_chain_length, DEFAULT_MAX_CHAIN_LENGTH);
    }

    #[test]
    fn file_database_path_overrides_env() {
        let mut file = PrometheusConfig::default();
        file.database.path = Some("/from/file.db".into());
        let env = EnvConfig {
            api_keys: ApiKeys::default(),
            database_path: Some("/from/env.db".into()),
            embedding_dim: None,
            credential_cooldown_base_ms: None,
            credential_cooldown_max_ms: None,
        };
        let resolved = ResolvedConfig::merge(file, env);
        assert_eq!(resolved.database_path, PathBuf::from("/from/file.db"));
    }

    #[test]
    fn env_database_path_used_when_file_silent() {
        let file = PrometheusConfig::default();
        let env = EnvConfig {
            api_keys: ApiKeys::default(),
            database_path: Some("/from/env.db".into()),
            embedding_dim: None,
            credential_cooldown_base_ms: None,
            credential_cooldown_max_ms: None,
        };
        let resolved = ResolvedConfig::merge(file, env);
        assert_eq!(resolved.database_path, PathBuf::from("/from/env.db"));
    }
}
