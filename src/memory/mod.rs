// src/memory/mod.rs
// Typed operations over the Store: the Memory Engine's public contract.

mod code_index;
mod conversations;
mod decisions;
mod metrics;
mod patterns;

pub use code_index::{IndexCounters, SearchOptions, SearchResult, SearchSource};
pub use conversations::{ConversationSummary, Message, MessageRole};
pub use decisions::{Alternative, Decision, DecisionFilter, NewDecision};
pub use metrics::{MetricAggregations, MetricFilter, MetricRow, NewMetric};
pub use patterns::{NewPattern, Pattern};

use crate::conversation_log::ConversationLog;
use crate::embeddings::EmbeddingProvider;
use crate::error::Result;
use crate::store::Store;
use std::sync::Arc;

/// Typed façade over the Store used by every caller (CLI, lanes, runtime
/// dispatcher callers). Holds a reference to the Store; all mutation passes
/// through `Store::transaction`.
pub struct MemoryEngine {
    pub(crate) store: Store,
    pub(crate) log: ConversationLog,
    pub(crate) embeddings: Arc<dyn EmbeddingProvider>,
}

impl MemoryEngine {
    pub fn new(store: Store, log: ConversationLog, embeddings: Arc<dyn EmbeddingProvider>) -> Self {
        Self { store, log, embeddings }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Row counts per table, for the `stats` CLI command.
    pub async fn stats(&self) -> Result<EngineStats> {
        self.store
            .pool()
            .run(|conn| {
                let count = |sql: &str| -> rusqlite::Result<i64> {
                    conn.query_row(sql, [], |r| r.get(0))
                };
                Ok(EngineStats {
                    conversations: count("SELECT COUNT(*) FROM conversations")?,
                    messages: count("SELECT COUNT(*) FROM messages")?,
                    code_chunks: count("SELECT COUNT(*) FROM code_chunks")?,
                    decisions: count("SELECT COUNT(*) FROM decisions")?,
                    patterns: count("SELECT COUNT(*) FROM patterns")?,
                    metrics: count("SELECT COUNT(*) FROM metrics")?,
                })
            })
            .await
    }

    /// Releases resources held by the engine (closes the log's open file
    /// handles). The Store's pool is dropped along with this struct.
    pub async fn close(self) -> Result<()> {
        self.log.close().await
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct EngineStats {
    pub conversations: i64,
    pub messages: i64,
    pub code_chunks: i64,
    pub decisions: i64,
    pub patterns: i64,
    pub metrics: i64,
}
