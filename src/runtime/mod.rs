// src/runtime/mod.rs
// Runtime Dispatcher: selects a model, acquires a credential, calls the
// provider, and on failure walks the fallback chain. Grounded on the
// teacher's `llm` module (provider routing + circuit breaker), generalized
// per spec into named sub-components (catalog, selector, credentials,
// fallback, classifier) wired together by the execute loop below.

pub mod catalog;
pub mod classifier;
pub mod credentials;
pub mod fallback;
pub mod provider;
pub mod selector;

use catalog::ModelCatalog;
use classifier::{classify, decide, Action};
use credentials::CredentialManager;
use fallback::{build_chain, FallbackOptions};
use provider::{ChatRequest, ChatResponse, LmProvider};
use selector::{Preferences, SelectOptions, Selector};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::{PrometheusError, Result};

/// One entry in a fallback attempt trace. Carries only the credential's
/// opaque id, never its value, per the no-credential-material rule.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    pub model: String,
    pub provider: String,
    pub credential_id: Option<String>,
    pub error_kind: String,
    pub message: String,
}

#[derive(Debug)]
pub struct DispatchOutcome {
    pub response: ChatResponse,
    pub attempts: Vec<AttemptRecord>,
}

pub struct RuntimeDispatcher {
    catalog: ModelCatalog,
    preferences: Preferences,
    credentials: CredentialManager,
    provider: Arc<dyn LmProvider>,
    fallback_opts: FallbackOptions,
}

impl RuntimeDispatcher {
    pub fn new(catalog: ModelCatalog, preferences: Preferences, provider: Arc<dyn LmProvider>) -> Self {
        Self {
            catalog,
            preferences,
            credentials: CredentialManager::new(),
            provider,
            fallback_opts: FallbackOptions::default(),
        }
    }

    pub fn with_fallback_options(mut self, opts: FallbackOptions) -> Self {
        self.fallback_opts = opts;
        self
    }

    pub fn with_credential_cooldown_bounds(mut self, base_ms: u64, max_ms: u64) -> Self {
        self.credentials = CredentialManager::with_cooldown_bounds(
            std::time::Duration::from_millis(base_ms),
            std::time::Duration::from_millis(max_ms),
        );
        self
    }

    pub fn credentials(&self) -> &CredentialManager {
        &self.credentials
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Selects a model for `task_type`, builds its fallback chain, and walks
    /// it per the execute loop in spec. Returns the first successful
    /// response plus the full attempt trace, or `FallbackExhausted`.
    pub async fn execute(
        &self,
        task_type: &str,
        select_opts: &SelectOptions,
        request: ChatRequest,
        cancellation: CancellationToken,
    ) -> Result<DispatchOutcome> {
        let selection = Selector::new(&self.catalog, &self.preferences).select(task_type, select_opts);
        let chain = build_chain(&self.catalog, &selection.entry.model, &self.fallback_opts);

        let mut attempts = Vec::new();

        for model in &chain {
            if cancellation.is_cancelled() {
                return Err(PrometheusError::UserAbort);
            }

            let credential = match self.credentials.acquire(&model.provider) {
                Some(c) => c,
                None => {
                    attempts.push(AttemptRecord {
                        model: model.model.clone(),
                        provider: model.provider.clone(),
                        credential_id: None,
                        error_kind: "no_credential".into(),
                        message: "no credential available for provider".into(),
                    });
                    continue;
                }
            };

            if cancellation.is_cancelled() {
                return Err(PrometheusError::UserAbort);
            }

            match self.provider.call(&request, model, &credential, &cancellation).await {
                Ok(response) => {
                    self.credentials.mark_success(&credential);
                    return Ok(DispatchOutcome { response, attempts });
                }
                Err(PrometheusError::UserAbort) => {
                    return Err(PrometheusError::UserAbort);
                }
                Err(err) => {
                    let kind = classify(&err);
                    attempts.push(AttemptRecord {
                        model: model.model.clone(),
                        provider: model.provider.clone(),
                        credential_id: Some(credential.id.clone()),
                        error_kind: format!("{kind:?}"),
                        message: err.to_string(),
                    });

                    match decide(kind) {
                        Action::RotateCredential => {
                            self.credentials.mark_failure(&credential);
                            continue;
                        }
                        Action::NextModel => continue,
                        Action::AbortChain => return Err(PrometheusError::UserAbort),
                        Action::RethrowFatal => return Err(PrometheusError::Fatal(err.to_string())),
                    }
                }
            }
        }

        Err(PrometheusError::FallbackExhausted { attempts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::catalog::ModelRef;
    use crate::runtime::credentials::CredentialHandle;
    use crate::runtime::provider::{ChatResponse, Usage};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct ScriptedProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LmProvider for ScriptedProvider {
        async fn call(
            &self,
            _request: &ChatRequest,
            model: &ModelRef,
            credential: &CredentialHandle,
            _cancellation: &CancellationToken,
        ) -> Result<ChatResponse> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if model.provider == "openai" {
                Err(PrometheusError::ProviderAuth("bad key".into()))
            } else {
                let _ = n;
                Ok(ChatResponse {
                    content: Some("ok".into()),
                    model: model.clone(),
                    tokens_used: 1,
                    usage: Usage::default(),
                    latency: Duration::from_millis(1),
                    finish_reason: "stop".into(),
                    reasoning: None,
                    tool_calls: None,
                })
            }
            .map_err(|e| {
                let _ = &credential.id;
                e
            })
        }
    }

    fn request() -> ChatRequest {
        ChatRequest {
            messages: vec![],
            max_tokens: None,
            temperature: None,
            deadline: None,
        }
    }

    #[tokio::test]
    async fn fallback_advances_on_auth_failure() {
        let catalog = ModelCatalog::builtin();
        let dispatcher = RuntimeDispatcher::new(
            catalog,
            Preferences::default(),
            Arc::new(ScriptedProvider { calls: AtomicUsize::new(0) }),
        );
        dispatcher.credentials().register("openai", "openai-key-1");
        dispatcher.credentials().register("deepseek", "deepseek-key-1");

        let select_opts = SelectOptions {
            force_model: Some(ModelRef::new("openai", "gpt-4o-mini")),
            ..Default::default()
        };

        let outcome = dispatcher
            .execute("chat", &select_opts, request(), CancellationToken::new())
            .await
            .expect("should succeed via fallback");

        assert_eq!(outcome.response.content.as_deref(), Some("ok"));
        assert!(outcome.attempts.len() >= 1);
        assert_eq!(outcome.attempts[0].provider, "openai");

        let snap = dispatcher.credentials().snapshot("openai-key-1").unwrap();
        assert!(snap.failure_count() >= 1);
        assert!(snap.cooldown_until().is_some());
    }

    #[tokio::test]
    async fn exhausts_chain_when_every_provider_fails() {
        let catalog = ModelCatalog::new(
            vec![catalog::ModelEntry {
                model: ModelRef::new("openai", "gpt-4o-mini"),
                context_window: 128_000,
                capabilities: Default::default(),
                cost_tier: catalog::CostTier::Low,
                speed_tier: catalog::SpeedTier::Fast,
            }],
            ModelRef::new("openai", "gpt-4o-mini"),
        );
        let dispatcher = RuntimeDispatcher::new(
            catalog,
            Preferences::default(),
            Arc::new(ScriptedProvider { calls: AtomicUsize::new(0) }),
        );
        dispatcher.credentials().register("openai", "openai-key-1");

        let select_opts = SelectOptions::default();
        let err = dispatcher
            .execute("chat", &select_opts, request(), CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            PrometheusError::FallbackExhausted { attempts } => {
                assert_eq!(attempts.len(), 1);
            }
            other => panic!("expected FallbackExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancellation_short_circuits_before_any_call() {
        let catalog = ModelCatalog::builtin();
        let dispatcher = RuntimeDispatcher::new(
            catalog,
            Preferences::default(),
            Arc::new(ScriptedProvider { calls: AtomicUsize::new(0) }),
        );
        dispatcher.credentials().register("openai", "openai-key-1");

        let token = CancellationToken::new();
        token.cancel();

        let err = dispatcher
            .execute("chat", &SelectOptions::default(), request(), token)
            .await
            .unwrap_err();

        assert!(matches!(err, PrometheusError::UserAbort));
    }
}
