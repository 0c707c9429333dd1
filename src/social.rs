//! Social posting of generated KPI highlights.

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

pub const X_API_URL: &str = "https://api.twitter.com/2";

/// Publishes one short post. Failures are reported as `false`, never raised.
#[async_trait]
pub trait SocialPublisher: Send + Sync {
    async fn post(&self, text: &str) -> bool;
}

pub struct XPoster {
    bearer_token: String,
    base_url: String,
    client: reqwest::Client,
}

impl XPoster {
    pub fn new(bearer_token: String) -> Self {
        Self::with_base_url(bearer_token, X_API_URL)
    }

    pub fn with_base_url(bearer_token: String, base_url: &str) -> Self {
        Self {
            bearer_token,
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl SocialPublisher for XPoster {
    async fn post(&self, text: &str) -> bool {
        let result = self
            .client
            .post(format!("{}/tweets", self.base_url))
            .bearer_auth(&self.bearer_token)
            .json(&json!({ "text": text }))
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                info!("Posted social update ({} chars)", text.chars().count());
                true
            }
            Ok(response) => {
                warn!("Social post rejected with status {}", response.status());
                false
            }
            Err(e) => {
                warn!("Social post failed: {}", e);
                false
            }
        }
    }
}
