//! Stage contract and the HTTP collaborator implementation.
//!
//! A stage takes the account and the content item so far and returns
//! its output plus what it cost. Retries, if any, belong to the
//! collaborator behind the endpoint — never to the orchestrator.

use async_trait::async_trait;
use clipcast_core::error::{ClipcastError, Result};
use clipcast_core::types::{Account, Content};
use serde::Deserialize;

/// Output of one stage call.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StageOutput {
    #[serde(default)]
    pub cost: f64,
    /// Set by the idea stage.
    #[serde(default)]
    pub idea: Option<String>,
    /// Set by the compose/publish stages.
    #[serde(default)]
    pub artifact_path: Option<String>,
}

/// One pipeline stage (idea, prompts, videos, compose, publish).
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, account: &Account, content: &Content) -> Result<StageOutput>;
}

/// Stage collaborator reachable over HTTP: POSTs the account and the
/// content item as JSON and expects a [`StageOutput`] body back.
pub struct HttpStage {
    name: String,
    url: String,
    client: reqwest::Client,
}

impl HttpStage {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Stage for HttpStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, account: &Account, content: &Content) -> Result<StageOutput> {
        let body = serde_json::json!({
            "account": {
                "id": account.id,
                "slug": account.slug,
            },
            "content": content,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ClipcastError::Stage {
                stage: self.name.clone(),
                message: format!("request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ClipcastError::Stage {
                stage: self.name.clone(),
                message: format!("endpoint returned {status}: {text}"),
            });
        }

        response.json().await.map_err(|e| ClipcastError::Stage {
            stage: self.name.clone(),
            message: format!("invalid response: {e}"),
        })
    }
}
