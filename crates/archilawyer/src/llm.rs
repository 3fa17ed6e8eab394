//! Text completion.
//!
//! [`CompletionModel`] is the seam between the QA chain and the language
//! model; [`OpenAiCompletion`] calls an OpenAI-compatible `/completions`
//! endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{Config, Secret};
use crate::error::{Error, Result};
use crate::http;

const SERVICE: &str = "OpenAI";

/// Completes a prompt.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    /// Generate the continuation of `prompt`.
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Model name, for logs and history.
    fn name(&self) -> &str;
}

/// Client for the OpenAI completions API.
#[derive(Debug, Clone)]
pub struct OpenAiCompletion {
    client: Client,
    base_url: String,
    api_key: Secret,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    text: String,
}

impl OpenAiCompletion {
    /// Create a client for `model` at `base_url` with default sampling.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, api_key: Secret, model: impl Into<String>) -> Result<Self> {
        let defaults = Config::default();
        Ok(Self {
            client: http::client(defaults.request_timeout())?,
            base_url: base_url.into(),
            api_key,
            model: model.into(),
            temperature: defaults.openai.temperature,
            max_tokens: defaults.openai.max_tokens,
        })
    }

    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the OpenAI key is missing or the HTTP client
    /// cannot be built.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            client: http::client(config.request_timeout())?,
            base_url: config.openai.base_url.clone(),
            api_key: config.openai_api_key()?.clone(),
            model: config.openai.completion_model.clone(),
            temperature: config.openai.temperature,
            max_tokens: config.openai.max_tokens,
        })
    }

    /// Set the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[async_trait]
impl CompletionModel for OpenAiCompletion {
    async fn complete(&self, prompt: &str) -> Result<String> {
        debug!(
            "Requesting completion for {} char prompt (model: {})",
            prompt.len(),
            self.model
        );

        let request = CompletionRequest {
            model: &self.model,
            prompt,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let response = self
            .client
            .post(http::join(&self.base_url, "completions"))
            .bearer_auth(self.api_key.expose())
            .json(&request)
            .send()
            .await?;
        let response: CompletionResponse = http::check(SERVICE, response).await?.json().await?;

        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.text)
            .ok_or_else(|| Error::api(SERVICE, 200, "response contained no choices"))
    }

    fn name(&self) -> &str {
        &self.model
    }
}
