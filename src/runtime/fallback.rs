// src/runtime/fallback.rs
// Fallback Chain Builder: orders a primary model plus alternates into the
// sequence the execute loop will try in turn.

use super::catalog::{ModelCatalog, ModelRef};

#[derive(Debug, Clone)]
pub struct FallbackOptions {
    pub max_chain_length: usize,
    pub allowed_providers: Option<Vec<String>>,
    pub excluded_providers: Option<Vec<String>>,
    pub cross_provider_fallback: bool,
    pub prefer_same_provider: bool,
}

impl Default for FallbackOptions {
    fn default() -> Self {
        Self {
            max_chain_length: 4,
            allowed_providers: None,
            excluded_providers: None,
            cross_provider_fallback: true,
            prefer_same_provider: true,
        }
    }
}

fn provider_allowed(provider: &str, opts: &FallbackOptions) -> bool {
    if let Some(allowed) = &opts.allowed_providers {
        if !allowed.iter().any(|p| p == provider) {
            return false;
        }
    }
    if let Some(excluded) = &opts.excluded_providers {
        if excluded.iter().any(|p| p == provider) {
            return false;
        }
    }
    true
}

/// Builds an ordered, de-duplicated fallback chain: primary, then
/// same-provider alternates (if preferred), then cross-provider alternates,
/// truncated to `max_chain_length`.
pub fn build_chain(catalog: &ModelCatalog, primary: &ModelRef, opts: &FallbackOptions) -> Vec<ModelRef> {
    let mut chain: Vec<ModelRef> = Vec::new();

    if provider_allowed(&primary.provider, opts) {
        chain.push(primary.clone());
    }

    if opts.prefer_same_provider {
        for entry in catalog.entries() {
            if chain.len() >= opts.max_chain_length {
                return chain;
            }
            if entry.model.provider == primary.provider
                && entry.model != *primary
                && provider_allowed(&entry.model.provider, opts)
                && !chain.contains(&entry.model)
            {
                chain.push(entry.model.clone());
            }
        }
    }

    if opts.cross_provider_fallback {
        for entry in catalog.entries() {
            if chain.len() >= opts.max_chain_length {
                return chain;
            }
            if entry.model.provider != primary.provider
                && provider_allowed(&entry.model.provider, opts)
                && !chain.contains(&entry.model)
            {
                chain.push(entry.model.clone());
            }
        }
    }

    chain.truncate(opts.max_chain_length);
    chain
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_always_first() {
        let catalog = ModelCatalog::builtin();
        let primary = ModelRef::new("openai", "gpt-4o-mini");
        let chain = build_chain(&catalog, &primary, &FallbackOptions::default());
        assert_eq!(chain[0], primary);
    }

    #[test]
    fn respects_max_chain_length() {
        let catalog = ModelCatalog::builtin();
        let primary = ModelRef::new("openai", "gpt-4o-mini");
        let opts = FallbackOptions { max_chain_length: 2, ..Default::default() };
        let chain = build_chain(&catalog, &primary, &opts);
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn excludes_cross_provider_when_disabled() {
        let catalog = ModelCatalog::builtin();
        let primary = ModelRef::new("openai", "gpt-4o-mini");
        let opts = FallbackOptions {
            cross_provider_fallback: false,
            max_chain_length: 10,
            ..Default::default()
        };
        let chain = build_chain(&catalog, &primary, &opts);
        assert!(chain.iter().all(|m| m.provider == "openai"));
    }

    #[test]
    fn excluded_providers_never_appear() {
        let catalog = ModelCatalog::builtin();
        let primary = ModelRef::new("openai", "gpt-4o-mini");
        let opts = FallbackOptions {
            excluded_providers: Some(vec!["deepseek".to_string()]),
            max_chain_length: 10,
            ..Default::default()
        };
        let chain = build_chain(&catalog, &primary, &opts);
        assert!(chain.iter().all(|m| m.provider != "deepseek"));
    }

    #[test]
    fn chain_has_no_duplicates() {
        let catalog = ModelCatalog::builtin();
        let primary = ModelRef::new("openai", "gpt-4o-mini");
        let chain = build_chain(&catalog, &primary, &FallbackOptions { max_chain_length: 10, ..Default::default() });
        let mut seen = std::collections::HashSet::new();
        assert!(chain.iter().all(|m| seen.insert(m.clone())));
    }
}
