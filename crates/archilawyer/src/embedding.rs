//! Text embeddings.
//!
//! [`Embedder`] is the seam between the pipeline and the embedding service;
//! [`OpenAiEmbedder`] talks to an OpenAI-compatible `/embeddings` endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{Config, Secret};
use crate::error::{Error, Result};
use crate::http;

const SERVICE: &str = "OpenAI";

/// Turns text into vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed many texts, returning one vector per text in input order.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Length of every vector this embedder produces.
    fn dimension(&self) -> usize;
}

/// Client for the OpenAI embeddings API.
#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    base_url: String,
    api_key: Secret,
    model: String,
    dimension: usize,
    batch_size: usize,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    /// Create an embedder for `model` at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        api_key: Secret,
        model: impl Into<String>,
        dimension: usize,
    ) -> Result<Self> {
        Ok(Self {
            client: http::client(Config::default().request_timeout())?,
            base_url: base_url.into(),
            api_key,
            model: model.into(),
            dimension,
            batch_size: Config::default().openai.embedding_batch_size,
        })
    }

    /// Create an embedder from configuration.
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
            model: config.openai.embedding_model.clone(),
            dimension: config.pinecone.dimension,
            batch_size: config.openai.embedding_batch_size,
        })
    }

    /// Set the number of texts sent per request.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// The embedding model name.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        debug!(
            "Embedding batch of {} texts (model: {})",
            texts.len(),
            self.model
        );

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };
        let response = self
            .client
            .post(http::join(&self.base_url, "embeddings"))
            .bearer_auth(self.api_key.expose())
            .json(&request)
            .send()
            .await?;
        let response: EmbeddingResponse = http::check(SERVICE, response).await?.json().await?;

        if response.data.len() != texts.len() {
            return Err(Error::internal(format!(
                "got {} embeddings for {} inputs",
                response.data.len(),
                texts.len()
            )));
        }

        let mut data = response.data;
        data.sort_by_key(|d| d.index);

        data.into_iter()
            .map(|d| {
                if d.embedding.len() == self.dimension {
                    Ok(d.embedding)
                } else {
                    Err(Error::DimensionMismatch {
                        expected: self.dimension,
                        actual: d.embedding.len(),
                    })
                }
            })
            .collect()
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            embeddings.extend(self.embed_batch(batch).await?);
        }
        debug!("Embedded {} texts", embeddings.len());
        Ok(embeddings)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| Error::internal("no embedding in response"))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
