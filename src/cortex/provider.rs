// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! LLM provider abstraction for the cortex.
//!
//! The engine treats the provider as an opaque JSON-returning oracle: one
//! system prompt, one user prompt, one string back. Everything about
//! parsing and validating that string lives in `schema.rs`, so a provider
//! swap never touches the reasoning loop.

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::config::AgentConfig;
use crate::errors::AgentError;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send one prompt pair and return the model's raw text output.
    async fn complete(&self, system: &str, user: &str) -> Result<String, AgentError>;

    /// Model identifier for trace metadata.
    fn model(&self) -> &str;
}

/// OpenAI-compatible chat-completions provider. The base URL is
/// configurable so tests can stand in a scripted oracle.
pub struct OpenAiProvider {
    api_key: String,
    api_base: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(api_key: String, api_base: String, model: String) -> Result<Self, AgentError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| {
                AgentError::Configuration(format!("failed to build LLM HTTP client: {}", e))
            })?;

        Ok(Self {
            api_key,
            api_base: api_base.trim_end_matches('/').to_string(),
            model,
            client,
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn complete(&self, system: &str, user: &str) -> Result<String, AgentError> {
        let body = json!({
            "model": self.model,
            "temperature": 0,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::Provider(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(AgentError::Provider(format!(
                "API error ({}): {}",
                status, error_body
            )));
        }

        let envelope: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AgentError::Provider(format!("unparseable envelope: {}", e)))?;

        let content = envelope["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| AgentError::Provider("no message content in response".to_string()))?;

        debug!("LLM returned {} bytes", content.len());
        Ok(content.to_string())
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Build the provider from configuration. `None` means no credential is
/// configured and the cortex must use its deterministic stub.
pub fn create_provider(config: &AgentConfig) -> Option<Box<dyn LlmProvider>> {
    let api_key = config.api_key.clone()?;
    match OpenAiProvider::new(api_key, config.api_base.clone(), config.model.clone()) {
        Ok(provider) => Some(Box::new(provider)),
        Err(e) => {
            tracing::warn!("LLM provider unavailable, falling back to stub: {}", e);
            None
        }
    }
}
