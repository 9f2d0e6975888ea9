// src/runtime/provider.rs
// Uniform request/response shapes for LM providers and the trait the
// execute loop calls through. Field names follow the teacher's
// `llm::types` (OpenAI-compatible message/tool-call shape).

use super::catalog::ModelRef;
use super::credentials::CredentialHandle;
use crate::error::{PrometheusError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: Some(content.into()), tool_calls: None, tool_call_id: None }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".into(), content: Some(content.into()), tool_calls: None, tool_call_id: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub deadline: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: Option<String>,
    pub model: ModelRef,
    pub tokens_used: u32,
    pub usage: Usage,
    pub latency: Duration,
    pub finish_reason: String,
    pub reasoning: Option<String>,
    pub tool_calls: Option<Vec<ToolCall>>,
}

/// A callable LM provider. Real implementations wrap an HTTP client per
/// provider; the mock below is the crate's default for tests and offline use.
#[async_trait]
pub trait LmProvider: Send + Sync {
    async fn call(
        &self,
        request: &ChatRequest,
        model: &ModelRef,
        credential: &CredentialHandle,
        cancellation: &CancellationToken,
    ) -> Result<ChatResponse>;
}

/// Deterministic mock provider: echoes the last user message, never fails.
/// Scripted providers for error-path tests live alongside it in `runtime::mod` tests.
pub struct EchoProvider;

#[async_trait]
impl LmProvider for EchoProvider {
    async fn call(
        &self,
        request: &ChatRequest,
        model: &ModelRef,
        _credential: &CredentialHandle,
        cancellation: &CancellationToken,
    ) -> Result<ChatResponse> {
        if cancellation.is_cancelled() {
            return Err(PrometheusError::UserAbort);
        }
        let last_user = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .and_then(|m| m.content.clone())
            .unwrap_or_default();
        Ok(ChatResponse {
            content: Some(last_user.clone()),
            model: model.clone(),
            tokens_used: last_user.split_whitespace().count() as u32,
            usage: Usage {
                prompt_tokens: last_user.split_whitespace().count() as u32,
                completion_tokens: last_user.split_whitespace().count() as u32,
                total_tokens: last_user.split_whitespace().count() as u32 * 2,
            },
            latency: Duration::from_millis(1),
            finish_reason: "stop".into(),
            reasoning: None,
            tool_calls: None,
        })
    }
}
