//! LLM capability
//!
//! Stateless client: each generate call is independent, carrying the full
//! prompt. Sequences never talk HTTP; they see only this trait.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use super::error::ToolError;

/// Options attached to a single generate call
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub model: Option<String>,
    /// Pass a thinking hint to providers that support it
    pub thinking: bool,
}

/// Stateless LLM client - each call is independent
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send one prompt, get one text completion
    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String, ToolError>;
}

/// HTTP client speaking the Anthropic messages shape
pub struct HttpLlmClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    timeout: Duration,
}

impl HttpLlmClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            max_tokens,
            timeout,
        }
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String, ToolError> {
        let model = options.model.as_deref().unwrap_or(&self.model);
        debug!(model, prompt_len = prompt.len(), "LLM generate");

        let mut body = json!({
            "model": model,
            "max_tokens": self.max_tokens,
            "messages": [{"role": "user", "content": prompt}],
        });
        if options.thinking {
            body["thinking"] = json!({"type": "enabled", "budget_tokens": 4096});
        }

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ToolError::LlmTimeout(self.timeout)
                } else {
                    ToolError::LlmTransport(e.to_string())
                }
            })?;

        let status = response.status();
        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ToolError::LlmProtocol(e.to_string()))?;

        if !status.is_success() {
            let message = payload
                .pointer("/error/message")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Err(ToolError::LlmApi {
                status: status.as_u16(),
                message,
            });
        }

        // Concatenate text blocks; thinking blocks are skipped
        let blocks = payload
            .get("content")
            .and_then(serde_json::Value::as_array)
            .ok_or_else(|| ToolError::LlmProtocol("response missing content".into()))?;
        let text: String = blocks
            .iter()
            .filter(|b| b.get("type").and_then(serde_json::Value::as_str) == Some("text"))
            .filter_map(|b| b.get("text").and_then(serde_json::Value::as_str))
            .collect();
        Ok(text)
    }
}

/// Deterministic fixture client for tests and credential-free development.
///
/// Responses are looked up by exact prompt, then by substring rule, then fall
/// back to echoing the prompt. Pure function of inputs, so runs driven by it
/// satisfy the determinism property.
pub struct MockLlmClient {
    exact: BTreeMap<String, String>,
    rules: Vec<(String, String)>,
    calls: AtomicUsize,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            exact: BTreeMap::new(),
            rules: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_exact(mut self, prompt: impl Into<String>, response: impl Into<String>) -> Self {
        self.exact.insert(prompt.into(), response.into());
        self
    }

    /// Respond with `response` whenever the prompt contains `needle`
    pub fn with_rule(mut self, needle: impl Into<String>, response: impl Into<String>) -> Self {
        self.rules.push((needle.into(), response.into()));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn into_arc(self) -> Arc<dyn LlmClient> {
        Arc::new(self)
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn generate(&self, prompt: &str, _options: &GenerateOptions) -> Result<String, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(response) = self.exact.get(prompt) {
            return Ok(response.clone());
        }
        for (needle, response) in &self.rules {
            if prompt.contains(needle) {
                return Ok(response.clone());
            }
        }
        Ok(prompt.to_string())
    }
}

/// A mock that computes its answer from the prompt (arithmetic fixtures)
pub struct FnLlmClient<F>(pub F);

#[async_trait]
impl<F> LlmClient for FnLlmClient<F>
where
    F: Fn(&str) -> Result<String, ToolError> + Send + Sync,
{
    async fn generate(&self, prompt: &str, _options: &GenerateOptions) -> Result<String, ToolError> {
        (self.0)(prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_exact_and_rules() {
        let client = MockLlmClient::new()
            .with_exact("ping", "pong")
            .with_rule("sum", "42");

        let opts = GenerateOptions::default();
        assert_eq!(client.generate("ping", &opts).await.unwrap(), "pong");
        assert_eq!(client.generate("compute the sum now", &opts).await.unwrap(), "42");
        // Fallback echoes
        assert_eq!(client.generate("other", &opts).await.unwrap(), "other");
        assert_eq!(client.call_count(), 3);
    }

    #[tokio::test]
    async fn test_fn_client() {
        let client = FnLlmClient(|prompt: &str| Ok(prompt.len().to_string()));
        let out = client.generate("abcd", &GenerateOptions::default()).await.unwrap();
        assert_eq!(out, "4");
    }
}
