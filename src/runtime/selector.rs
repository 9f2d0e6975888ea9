// src/runtime/selector.rs
// Selector: chooses one model for a task, honoring forced overrides and a
// chain of filters before falling back to the catalog's default.

use super::catalog::{CostTier, ModelCatalog, ModelEntry, ModelRef};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct SelectFilters {
    pub allowed_providers: Option<Vec<String>>,
    pub excluded_providers: Option<Vec<String>>,
    pub min_context_window: Option<u32>,
    pub max_cost_tier: Option<CostTier>,
    pub require_code: bool,
    pub require_reasoning: bool,
    pub require_vision: bool,
    pub require_tools: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SelectOptions {
    pub force_model: Option<ModelRef>,
    pub filters: SelectFilters,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionTag {
    Forced,
    Preference,
    Fallback,
}

#[derive(Debug, Clone)]
pub struct Selection {
    pub entry: ModelEntry,
    pub tag: SelectionTag,
    pub preference_rank: Option<usize>,
    pub filtered_count: usize,
}

fn passes_filters(entry: &ModelEntry, filters: &SelectFilters) -> bool {
    if let Some(allowed) = &filters.allowed_providers {
        if !allowed.iter().any(|p| p == &entry.model.provider) {
            return false;
        }
    }
    if let Some(excluded) = &filters.excluded_providers {
        if excluded.iter().any(|p| p == &entry.model.provider) {
            return false;
        }
    }
    if let Some(min_ctx) = filters.min_context_window {
        if entry.context_window < min_ctx {
            return false;
        }
    }
    if let Some(max_cost) = filters.max_cost_tier {
        if entry.cost_tier > max_cost {
            return false;
        }
    }
    if filters.require_code && !entry.capabilities.code {
        return false;
    }
    if filters.require_reasoning && !entry.capabilities.reasoning {
        return false;
    }
    if filters.require_vision && !entry.capabilities.vision {
        return false;
    }
    if filters.require_tools && !entry.capabilities.tools {
        return false;
    }
    true
}

/// Maps task types to an ordered preference list of models.
#[derive(Clone, Default)]
pub struct Preferences {
    by_task: HashMap<String, Vec<ModelRef>>,
}

impl Preferences {
    pub fn new(by_task: HashMap<String, Vec<ModelRef>>) -> Self {
        Self { by_task }
    }

    pub fn for_task(&self, task_type: &str) -> &[ModelRef] {
        self.by_task.get(task_type).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

pub struct Selector<'a> {
    catalog: &'a ModelCatalog,
    preferences: &'a Preferences,
}

impl<'a> Selector<'a> {
    pub fn new(catalog: &'a ModelCatalog, preferences: &'a Preferences) -> Self {
        Self { catalog, preferences }
    }

    pub fn select(&self, task_type: &str, opts: &SelectOptions) -> Selection {
        if let Some(forced) = &opts.force_model {
            if let Some(entry) = self.catalog.find(forced) {
                if passes_filters(entry, &opts.filters) {
                    return Selection {
                        entry: entry.clone(),
                        tag: SelectionTag::Forced,
                        preference_rank: None,
                        filtered_count: 0,
                    };
                }
            }
        }

        let preferred = self.preferences.for_task(task_type);
        let mut filtered_count = 0;
        for (rank, model_ref) in preferred.iter().enumerate() {
            if let Some(entry) = self.catalog.find(model_ref) {
                if passes_filters(entry, &opts.filters) {
                    return Selection {
                        entry: entry.clone(),
                        tag: SelectionTag::Preference,
                        preference_rank: Some(rank),
                        filtered_count,
                    };
                }
                filtered_count += 1;
            }
        }

        // Last-resort guarantee: the catalog default, even if it violates
        // the caller's constraints.
        Selection {
            entry: self.catalog.default_entry(),
            tag: SelectionTag::Fallback,
            preference_rank: None,
            filtered_count,
        }
    }
}
