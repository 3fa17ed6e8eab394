//! Pinecone control-plane and data-plane clients.
//!
//! The control plane (`/indexes`) creates, describes and deletes indexes.
//! Each index then has its own data-plane host serving upserts, queries and
//! statistics.

use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use super::{IndexDescription, IndexStats, Match, Vector, VectorIndex};
use crate::config::{Config, Metric, Secret};
use crate::error::{Error, Result};
use crate::http;

const SERVICE: &str = "Pinecone";
const API_KEY_HEADER: &str = "Api-Key";
const API_VERSION_HEADER: &str = "X-Pinecone-API-Version";

/// Poll `probe` until it yields a value or `timeout` elapses.
async fn poll_until<T, F, Fut>(
    operation: &str,
    timeout: Duration,
    interval: Duration,
    mut probe: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let start = Instant::now();
    loop {
        if let Some(value) = probe().await? {
            return Ok(value);
        }
        if start.elapsed() >= timeout {
            return Err(Error::timeout(operation));
        }
        debug!("Waiting for {operation}");
        tokio::time::sleep(interval).await;
    }
}

/// Map a 404 from the control plane to [`Error::IndexNotFound`].
fn not_found_as(name: &str, err: Error) -> Error {
    if err.api_status() == Some(404) {
        Error::IndexNotFound {
            name: name.to_string(),
        }
    } else {
        err
    }
}

/// Data-plane base URL for a host as reported by the control plane.
fn host_url(host: &str) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

#[derive(Debug, Deserialize)]
struct IndexList {
    #[serde(default)]
    indexes: Vec<IndexModel>,
}

#[derive(Debug, Deserialize)]
struct IndexModel {
    name: String,
    #[serde(default)]
    dimension: Option<usize>,
    metric: Metric,
    #[serde(default)]
    host: String,
    #[serde(default)]
    status: IndexStatus,
}

#[derive(Debug, Default, Deserialize)]
struct IndexStatus {
    #[serde(default)]
    ready: bool,
    #[serde(default)]
    state: String,
}

impl From<IndexModel> for IndexDescription {
    fn from(model: IndexModel) -> Self {
        Self {
            name: model.name,
            dimension: model.dimension.unwrap_or_default(),
            metric: model.metric,
            host: model.host,
            ready: model.status.ready,
            state: model.status.state,
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: usize,
    metric: Metric,
    spec: serde_json::Value,
}

/// Pinecone control-plane client.
#[derive(Debug, Clone)]
pub struct PineconeClient {
    client: Client,
    base_url: String,
    api_key: Secret,
    api_version: String,
    dimension: usize,
    metric: Metric,
    cloud: String,
    region: String,
    namespace: String,
    upsert_batch_size: usize,
    ready_timeout: Duration,
    poll_interval: Duration,
}

impl PineconeClient {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the Pinecone key is missing or the HTTP client
    /// cannot be built.
    pub fn from_config(config: &Config) -> Result<Self> {
        let pinecone = &config.pinecone;
        Ok(Self {
            client: http::client(config.request_timeout())?,
            base_url: pinecone.control_plane_url.clone(),
            api_key: config.pinecone_api_key()?.clone(),
            api_version: pinecone.api_version.clone(),
            dimension: pinecone.dimension,
            metric: pinecone.metric,
            cloud: pinecone.cloud.clone(),
            region: pinecone.region.clone(),
            namespace: pinecone.namespace.clone(),
            upsert_batch_size: pinecone.upsert_batch_size,
            ready_timeout: config.ready_timeout(),
            poll_interval: config.poll_interval(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, http::join(&self.base_url, path))
            .header(API_KEY_HEADER, self.api_key.expose())
            .header(API_VERSION_HEADER, &self.api_version)
    }

    /// All indexes in the project.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn list_indexes(&self) -> Result<Vec<IndexDescription>> {
        let response = self.request(Method::GET, "indexes").send().await?;
        let list: IndexList = http::check(SERVICE, response).await?.json().await?;
        Ok(list.indexes.into_iter().map(Into::into).collect())
    }

    /// Describe one index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexNotFound`] if the index does not exist.
    pub async fn describe_index(&self, name: &str) -> Result<IndexDescription> {
        let response = self
            .request(Method::GET, &format!("indexes/{name}"))
            .send()
            .await?;
        let model: IndexModel = http::check(SERVICE, response)
            .await
            .map_err(|e| not_found_as(name, e))?
            .json()
            .await?;
        Ok(model.into())
    }

    /// Create a serverless index using the configured dimension, metric,
    /// cloud and region.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, e.g. the name is taken.
    pub async fn create_index(&self, name: &str) -> Result<IndexDescription> {
        info!(
            "Creating index {name} (dimension {}, metric {}, {}/{})",
            self.dimension, self.metric, self.cloud, self.region
        );
        let request = CreateIndexRequest {
            name,
            dimension: self.dimension,
            metric: self.metric,
            spec: json!({
                "serverless": {"cloud": self.cloud, "region": self.region}
            }),
        };
        let response = self
            .request(Method::POST, "indexes")
            .json(&request)
            .send()
            .await?;
        let model: IndexModel = http::check(SERVICE, response).await?.json().await?;
        Ok(model.into())
    }

    /// Delete an index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexNotFound`] if the index does not exist.
    pub async fn delete_index(&self, name: &str) -> Result<()> {
        info!("Deleting index {name}");
        let response = self
            .request(Method::DELETE, &format!("indexes/{name}"))
            .send()
            .await?;
        http::check(SERVICE, response)
            .await
            .map_err(|e| not_found_as(name, e))?;
        Ok(())
    }

    /// Poll until the index reports ready.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if it is not ready within the configured
    /// timeout.
    pub async fn wait_until_ready(&self, name: &str) -> Result<IndexDescription> {
        poll_until(
            &format!("index {name} to become ready"),
            self.ready_timeout,
            self.poll_interval,
            || async move {
                let description = self.describe_index(name).await?;
                Ok::<_, Error>(description.ready.then_some(description))
            },
        )
        .await
    }

    async fn wait_until_deleted(&self, name: &str) -> Result<()> {
        poll_until(
            &format!("index {name} to be deleted"),
            self.ready_timeout,
            self.poll_interval,
            || async move {
                match self.describe_index(name).await {
                    Ok(_) => Ok(None),
                    Err(e) if e.is_index_not_found() => Ok(Some(())),
                    Err(e) => Err(e),
                }
            },
        )
        .await
    }

    /// Make sure a ready index named `name` exists.
    ///
    /// With `recreate` an existing index is deleted first. An existing index
    /// whose dimension differs from the configured one is rejected.
    ///
    /// # Errors
    ///
    /// Returns an error if any control-plane call fails, the dimensions
    /// disagree, or the index does not become ready in time.
    pub async fn ensure_index(&self, name: &str, recreate: bool) -> Result<IndexDescription> {
        match self.describe_index(name).await {
            Ok(existing) if recreate => {
                info!("Recreating index {}", existing.name);
                self.delete_index(name).await?;
                self.wait_until_deleted(name).await?;
                self.create_index(name).await?;
            }
            Ok(existing) => {
                if existing.dimension != self.dimension {
                    return Err(Error::DimensionMismatch {
                        expected: self.dimension,
                        actual: existing.dimension,
                    });
                }
                debug!("Index {name} already exists");
            }
            Err(e) if e.is_index_not_found() => {
                self.create_index(name).await?;
            }
            Err(e) => return Err(e),
        }

        self.wait_until_ready(name).await
    }

    /// Data-plane handle for an existing index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexNotFound`] if the index does not exist.
    pub async fn index(&self, name: &str) -> Result<PineconeIndex> {
        let description = self.describe_index(name).await?;
        Ok(self.index_at(&description.host))
    }

    /// Data-plane handle for the index served at `host`.
    #[must_use]
    pub fn index_at(&self, host: &str) -> PineconeIndex {
        PineconeIndex {
            client: self.client.clone(),
            base_url: host_url(host),
            api_key: self.api_key.clone(),
            api_version: self.api_version.clone(),
            namespace: self.namespace.clone(),
            batch_size: self.upsert_batch_size.max(1),
            ready_timeout: self.ready_timeout,
            poll_interval: self.poll_interval,
        }
    }
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [Vector],
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<Match>,
}

/// Data-plane client for one Pinecone index.
#[derive(Debug, Clone)]
pub struct PineconeIndex {
    client: Client,
    base_url: String,
    api_key: Secret,
    api_version: String,
    namespace: String,
    batch_size: usize,
    ready_timeout: Duration,
    poll_interval: Duration,
}

impl PineconeIndex {
    fn post(&self, path: &str) -> RequestBuilder {
        self.client
            .post(http::join(&self.base_url, path))
            .header(API_KEY_HEADER, self.api_key.expose())
            .header(API_VERSION_HEADER, &self.api_version)
    }

    fn namespace(&self) -> Option<&str> {
        (!self.namespace.is_empty()).then_some(self.namespace.as_str())
    }

    /// Data-plane base URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.base_url
    }

    /// Poll statistics until the index reports at least one vector.
    ///
    /// Upserts become visible to statistics with a delay.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if no vector shows up within the
    /// configured timeout.
    pub async fn wait_for_vectors(&self) -> Result<IndexStats> {
        poll_until(
            "vectors to become visible",
            self.ready_timeout,
            self.poll_interval,
            || async move {
                let stats = self.stats().await?;
                Ok::<_, Error>((stats.total_vector_count > 0).then_some(stats))
            },
        )
        .await
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn upsert(&self, vectors: Vec<Vector>) -> Result<usize> {
        let mut upserted = 0;
        for batch in vectors.chunks(self.batch_size) {
            let request = UpsertRequest {
                vectors: batch,
                namespace: self.namespace(),
            };
            let response = self.post("vectors/upsert").json(&request).send().await?;
            let response: UpsertResponse = http::check(SERVICE, response).await?.json().await?;
            debug!("Upserted batch of {}", response.upserted_count);
            upserted += response.upserted_count;
        }
        Ok(upserted)
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<Match>> {
        let request = QueryRequest {
            vector,
            top_k,
            include_metadata: true,
            include_values: false,
            namespace: self.namespace(),
        };
        let response = self.post("query").json(&request).send().await?;
        let response: QueryResponse = http::check(SERVICE, response).await?.json().await?;
        debug!("Query returned {} matches", response.matches.len());
        Ok(response.matches)
    }

    async fn stats(&self) -> Result<IndexStats> {
        let response = self
            .post("describe_index_stats")
            .json(&json!({}))
            .send()
            .await?;
        Ok(http::check(SERVICE, response).await?.json().await?)
    }
}
