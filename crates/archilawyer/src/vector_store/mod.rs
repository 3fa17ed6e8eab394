//! Hosted vector index access.
//!
//! [`VectorIndex`] is the seam the ingest pipeline and retriever use; the
//! Pinecone implementation lives in [`pinecone`].

pub mod pinecone;

pub use pinecone::{PineconeClient, PineconeIndex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::Metric;
use crate::error::Result;

/// A vector with its id and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vector {
    /// Unique id; writing the same id again replaces the vector.
    pub id: String,

    /// Embedding values.
    pub values: Vec<f32>,

    /// Flat metadata stored alongside the vector.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

/// One similarity search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    /// Id of the matched vector.
    pub id: String,

    /// Similarity score; higher is closer for cosine and dot product.
    #[serde(default)]
    pub score: f32,

    /// Metadata stored with the vector.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Statistics reported by an index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    /// Vector dimension.
    #[serde(default)]
    pub dimension: usize,

    /// Number of stored vectors across namespaces.
    #[serde(default)]
    pub total_vector_count: u64,

    /// Fraction of capacity used.
    #[serde(default)]
    pub index_fullness: f64,
}

/// Control-plane description of an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDescription {
    /// Index name.
    pub name: String,

    /// Vector dimension.
    pub dimension: usize,

    /// Similarity metric.
    pub metric: Metric,

    /// Data-plane host.
    pub host: String,

    /// Whether the index accepts requests.
    pub ready: bool,

    /// Provider-specific lifecycle state, e.g. `Ready` or `Initializing`.
    pub state: String,
}

/// A searchable store of vectors.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace vectors, returning how many were written.
    async fn upsert(&self, vectors: Vec<Vector>) -> Result<usize>;

    /// The `top_k` vectors closest to `vector`, best first.
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<Match>>;

    /// Current index statistics.
    async fn stats(&self) -> Result<IndexStats>;
}
