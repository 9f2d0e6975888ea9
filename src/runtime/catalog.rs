// src/runtime/catalog.rs
// Model Catalog: static registry of known provider/model pairs and their
// capabilities. Grounded on the teacher's `llm::provider::Provider` enum,
// generalized from a fixed set of hardcoded providers to a data table so
// new entries don't require a new enum variant.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostTier {
    Low,
    Medium,
    High,
    Premium,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedTier {
    Slow,
    Standard,
    Fast,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub code: bool,
    pub reasoning: bool,
    pub vision: bool,
    pub tools: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelRef {
    pub provider: String,
    pub model: String,
}

impl ModelRef {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }
}

impl std::fmt::Display for ModelRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    pub model: ModelRef,
    pub context_window: u32,
    pub capabilities: Capabilities,
    pub cost_tier: CostTier,
    pub speed_tier: SpeedTier,
}

/// Registry of known models plus the catalog's last-resort default.
#[derive(Clone)]
pub struct ModelCatalog {
    entries: Vec<ModelEntry>,
    default: ModelRef,
}

impl ModelCatalog {
    pub fn new(entries: Vec<ModelEntry>, default: ModelRef) -> Self {
        Self { entries, default }
    }

    /// A small built-in catalog covering the providers the teacher's `llm`
    /// module already speaks to, useful for tests and as a starting config.
    pub fn builtin() -> Self {
        let entries = vec![
            ModelEntry {
                model: ModelRef::new("openai", "gpt-4o-mini"),
                context_window: 128_000,
                capabilities: Capabilities { code: true, reasoning: true, vision: true, tools: true },
                cost_tier: CostTier::Low,
                speed_tier: SpeedTier::Fast,
            },
            ModelEntry {
                model: ModelRef::new("openai", "gpt-4o"),
                context_window: 128_000,
                capabilities: Capabilities { code: true, reasoning: true, vision: true, tools: true },
                cost_tier: CostTier::High,
                speed_tier: SpeedTier::Standard,
            },
            ModelEntry {
                model: ModelRef::new("deepseek", "deepseek-chat"),
                context_window: 64_000,
                capabilities: Capabilities { code: true, reasoning: false, vision: false, tools: true },
                cost_tier: CostTier::Low,
                speed_tier: SpeedTier::Standard,
            },
            ModelEntry {
                model: ModelRef::new("deepseek", "deepseek-reasoner"),
                context_window: 64_000,
                capabilities: Capabilities { code: true, reasoning: true, vision: false, tools: false },
                cost_tier: CostTier::Medium,
                speed_tier: SpeedTier::Slow,
            },
        ];
        let default = ModelRef::new("openai", "gpt-4o-mini");
        Self::new(entries, default)
    }

    pub fn find(&self, model: &ModelRef) -> Option<&ModelEntry> {
        self.entries.iter().find(|e| &e.model == model)
    }

    pub fn entries(&self) -> &[ModelEntry] {
        &self.entries
    }

    pub fn default_model(&self) -> &ModelRef {
        &self.default
    }

    pub fn default_entry(&self) -> ModelEntry {
        self.find(&self.default).cloned().unwrap_or(ModelEntry {
            model: self.default.clone(),
            context_window: 8_000,
            capabilities: Capabilities::default(),
            cost_tier: CostTier::Low,
            speed_tier: SpeedTier::Standard,
        })
    }
}
