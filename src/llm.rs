//! LLM Module - chat-completions client used to generate KPI insights

use crate::error::{KpiError, Result};
use crate::insight::SYSTEM_PROMPT;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_MODEL: &str = "gpt-4";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const TEMPERATURE: f64 = 0.7;
const MAX_TOKENS: u32 = 1000;

/// Anything that turns a prompt into free-form text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

pub struct LlmClient {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl LlmClient {
    pub fn new(api_key: String, model: String, base_url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn call_llm(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt}
            ],
            "temperature": TEMPERATURE,
            "max_tokens": MAX_TOKENS
        });

        debug!("Requesting completion from {} ({} prompt chars)", self.model, prompt.chars().count());

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| KpiError::Upstream(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(KpiError::Upstream(format!("LLM API returned {}: {}", status, detail)));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| KpiError::Upstream(format!("Failed to parse LLM response: {}", e)))?;

        extract_content(&response_json)
    }
}

/// `choices[0].message.content` of a chat-completions response.
pub fn extract_content(response: &serde_json::Value) -> Result<String> {
    response["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| KpiError::Upstream("No content in LLM response".to_string()))
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let content = self.call_llm(prompt).await?;
        info!("Received {} chars of generated insight text", content.chars().count());
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_content() {
        let response = json!({"choices": [{"message": {"role": "assistant", "content": "| 高 | a | b |"}}]});
        assert_eq!(extract_content(&response).unwrap(), "| 高 | a | b |");
    }

    #[test]
    fn test_extract_content_missing() {
        let response = json!({"error": {"message": "quota"}});
        assert!(matches!(extract_content(&response), Err(KpiError::Upstream(_))));
    }

    #[test]
    fn test_base_url_is_normalized() {
        let client = LlmClient::new(
            "sk-test".to_string(),
            DEFAULT_MODEL.to_string(),
            "http://localhost:8080/v1/".to_string(),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(client.base_url, "http://localhost:8080/v1");
        assert_eq!(client.model(), "gpt-4");
    }
}
