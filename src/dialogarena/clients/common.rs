//! Shared HTTP plumbing for chat-completion backends.
//!
//! One `reqwest::Client` is kept per base URL so concurrent arenas reuse connections,
//! DNS lookups and TLS sessions instead of reconnecting for every turn.

use crate::dialogarena::backend::{BackendError, TokenUsage};
use lazy_static::lazy_static;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

lazy_static! {
    static ref HTTP_CLIENT_POOL: Mutex<HashMap<String, reqwest::Client>> =
        Mutex::new(HashMap::new());
}

/// Get or create the pooled client for `base_url`.
pub fn get_http_client(base_url: &str) -> reqwest::Client {
    let mut pool = HTTP_CLIENT_POOL
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    if let Some(client) = pool.get(base_url) {
        return client.clone();
    }

    let client = reqwest::ClientBuilder::new()
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .pool_max_idle_per_host(10)
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .timeout(Duration::from_secs(300))
        .build()
        .unwrap_or_else(|e| {
            log::error!("Falling back to a default HTTP client for {}: {}", base_url, e);
            reqwest::Client::new()
        });

    pool.insert(base_url.to_string(), client.clone());
    client
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatCompletionResponse {
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatChoice {
    pub message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatUsage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

/// POST a chat-completion request, record its usage, and return the first choice's text.
pub async fn send_and_track(
    client: &reqwest::Client,
    url: &str,
    api_key: &str,
    body: &serde_json::Value,
    usage_slot: &Mutex<Option<TokenUsage>>,
) -> Result<String, BackendError> {
    let response = client
        .post(url)
        .bearer_auth(api_key)
        .json(body)
        .send()
        .await
        .map_err(|e| {
            log::error!("dialogarena::clients::common::send_and_track(...): request failed: {}", e);
            e
        })?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        log::error!(
            "dialogarena::clients::common::send_and_track(...): API error {}: {}",
            status,
            text
        );
        return Err(format!("API error {}: {}", status, text).into());
    }

    let parsed: ChatCompletionResponse = response.json().await?;

    if let Some(usage) = &parsed.usage {
        *usage_slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(TokenUsage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        });
    }

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .ok_or_else(|| "API response contained no message content".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_base_url_reuses_the_pool_entry() {
        let _ = get_http_client("https://pool-test.invalid");
        let _ = get_http_client("https://pool-test.invalid");
        let pool = HTTP_CLIENT_POOL.lock().unwrap();
        assert_eq!(
            pool.keys().filter(|k| k.as_str() == "https://pool-test.invalid").count(),
            1
        );
    }

    #[test]
    fn completion_payload_parses_with_and_without_usage() {
        let with_usage: ChatCompletionResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":" Hi "}}],
                "usage":{"prompt_tokens":3,"completion_tokens":2,"total_tokens":5}}"#,
        )
        .unwrap();
        assert_eq!(with_usage.usage.map(|u| u.total_tokens), Some(5));

        let without: ChatCompletionResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":"ok"}}]}"#).unwrap();
        assert!(without.usage.is_none());
    }
}
