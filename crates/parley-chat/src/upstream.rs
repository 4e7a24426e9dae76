//! Upstream HTTP clients: SearxNG search and chat-completion reasoning.
//!
//! Both clients degrade to `None` on any transport error, timeout, error
//! status, or malformed body; callers treat `None` as the unavailable
//! sentinel and never see an exception.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use parley_core::config::{LlmConfig, SearchConfig};
use parley_core::types::SearchHit;

// =============================================================================
// SearchClient
// =============================================================================

/// Client for a SearxNG instance.
pub struct SearchClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl SearchClient {
    pub fn new(config: &SearchConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Query the search upstream with an engine hint.
    ///
    /// Returns `None` when the call itself fails and an empty vec when the
    /// upstream found nothing.
    pub async fn search(&self, query: &str, engine: &str) -> Option<Vec<SearchHit>> {
        let result = self
            .client
            .get(&self.base_url)
            .query(&[("q", query), ("engines", engine), ("format", "json")])
            .timeout(self.timeout)
            .send()
            .await;

        let response = match result {
            Ok(r) => r,
            Err(e) => {
                warn!(engine = %engine, error = %e, "Search request failed");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(engine = %engine, status = %response.status(), "Search returned error status");
            return None;
        }

        match response.json::<SearchResponse>().await {
            Ok(body) => Some(body.results),
            Err(e) => {
                warn!(engine = %engine, error = %e, "Malformed search response");
                None
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

// =============================================================================
// CompletionClient
// =============================================================================

/// Client for an OpenAI-style chat-completions API.
///
/// Stateless: every call is a single-turn request with a system role and
/// one user prompt.
pub struct CompletionClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl CompletionClient {
    pub fn new(config: &LlmConfig) -> Self {
        let api_key = std::env::var(&config.api_key_env).ok();
        if api_key.is_none() {
            warn!(env = %config.api_key_env, "LLM API key not set; completions may be unavailable");
        }
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            api_key,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Single-turn completion; `None` on any failure.
    pub async fn complete(&self, prompt: &str, system_role: &str) -> Option<String> {
        let body = CompletionRequest {
            model: self.model.clone(),
            messages: vec![
                CompletionTurn {
                    role: "system".to_string(),
                    content: system_role.to_string(),
                },
                CompletionTurn {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
        };

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .timeout(self.timeout)
            .json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "Completion request failed");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(status = %response.status(), "Completion returned error status");
            return None;
        }

        let parsed = match response.json::<CompletionResponse>().await {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "Malformed completion response");
                return None;
            }
        };

        parsed.choices.into_iter().next().map(|c| c.message.content)
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<CompletionTurn>,
}

#[derive(Debug, Serialize)]
struct CompletionTurn {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_response_parses_results() {
        let json = r#"{"results": [{"title": "A", "url": "https://a"}, {"title": "B", "url": "https://b"}]}"#;
        let parsed: SearchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.results.len(), 2);
        assert_eq!(parsed.results[0].title, "A");
    }

    #[test]
    fn test_search_response_missing_results_is_empty() {
        let parsed: SearchResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.results.is_empty());
    }

    #[test]
    fn test_completion_response_parses_content() {
        let json = r#"{"choices": [{"message": {"role": "assistant", "content": "Here is a summary."}}]}"#;
        let parsed: CompletionResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.choices[0].message.content, "Here is a summary.");
    }

    #[test]
    fn test_completion_response_no_choices() {
        let parsed: CompletionResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(parsed.choices.into_iter().next().is_none());
    }

    #[test]
    fn test_completion_request_serializes_roles_in_order() {
        let body = CompletionRequest {
            model: "gpt-4".to_string(),
            messages: vec![
                CompletionTurn {
                    role: "system".to_string(),
                    content: "You are an academic assistant.".to_string(),
                },
                CompletionTurn {
                    role: "user".to_string(),
                    content: "summarize".to_string(),
                },
            ],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "gpt-4");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["role"], "user");
    }

    #[tokio::test]
    async fn test_search_unreachable_host_is_none() {
        // Port 9 (discard) refuses connections; the client must degrade to
        // None rather than erroring.
        let config = SearchConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 1,
            max_results: 5,
        };
        let client = SearchClient::new(&config);
        assert!(client.search("anything", "google").await.is_none());
    }

    #[tokio::test]
    async fn test_completion_unreachable_host_is_none() {
        let config = LlmConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            model: "gpt-4".to_string(),
            api_key_env: "PARLEY_TEST_UNSET_KEY".to_string(),
            timeout_secs: 1,
        };
        let client = CompletionClient::new(&config);
        assert!(client.complete("prompt", "role").await.is_none());
    }
}
