// src/config/env.rs
// Environment-based configuration — single source of truth for env vars.

use std::collections::HashMap;
use tracing::{debug, warn};

/// Per-provider credentials loaded from environment variables. The core
/// never logs or surfaces these values, only whether a provider has one.
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    keys: HashMap<String, String>,
}

impl ApiKeys {
    /// Reads `{PROVIDER}_API_KEY` for each of `providers` (provider names
    /// upper-cased, hyphens turned into underscores).
    pub fn from_env(providers: &[&str]) -> Self {
        let mut keys = HashMap::new();
        for provider in providers {
            let var = format!("{}_API_KEY", provider.to_uppercase().replace('-', "_"));
            if let Some(value) = read_key(&var) {
                keys.insert(provider.to_string(), value);
            }
        }
        let found: Vec<&str> = keys.keys().map(|s| s.as_str()).collect();
        if found.is_empty() {
            warn!("no provider API keys configured");
        } else {
            debug!(providers = ?found, "provider API keys loaded");
        }
        Self { keys }
    }

    pub fn get(&self, provider: &str) -> Option<&str> {
        self.keys.get(provider).map(|s| s.as_str())
    }

    pub fn has(&self, provider: &str) -> bool {
        self.keys.contains_key(provider)
    }

    pub fn configured_providers(&self) -> Vec<&str> {
        self.keys.keys().map(|s| s.as_str()).collect()
    }
}

fn read_key(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_usize_env(name: &str) -> Option<usize> {
    std::env::var(name).ok()?.parse().ok()
}

fn parse_u64_env(name: &str) -> Option<u64> {
    std::env::var(name).ok()?.parse().ok()
}

/// Environment configuration — all env vars in one place, loaded once at
/// startup and threaded through as an immutable snapshot.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub api_keys: ApiKeys,
    pub database_path: Option<String>,
    pub embedding_dim: Option<usize>,
    pub credential_cooldown_base_ms: Option<u64>,
    pub credential_cooldown_max_ms: Option<u64>,
}

impl EnvConfig {
    pub fn load(known_providers: &[&str]) -> Self {
        Self {
            api_keys: ApiKeys::from_env(known_providers),
            database_path: std::env::var("PROMETHEUS_DATABASE_PATH").ok().filter(|s| !s.is_empty()),
            embedding_dim: parse_usize_env("PROMETHEUS_EMBEDDING_DIM"),
            credential_cooldown_base_ms: parse_u64_env("PROMETHEUS_CREDENTIAL_COOLDOWN_BASE_MS"),
            credential_cooldown_max_ms: parse_u64_env("PROMETHEUS_CREDENTIAL_COOLDOWN_MAX_MS"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_keys_defaults_to_empty() {
        let keys = ApiKeys::default();
        assert!(!keys.has("openai"));
        assert!(keys.configured_providers().is_empty());
    }
}
