//! PDF ingestion into the vector index.
//!
//! Load pages, shape them with a [`Profile`], split into chunks, embed,
//! make sure the index exists, upsert, and wait until the index reports the
//! vectors. Every stage is timed.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::config::{Config, PreprocessConfig};
use crate::document::Document;
use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::loader;
use crate::logging::timed;
use crate::regulation::Profile;
use crate::splitter::TextSplitter;
use crate::vector_store::{PineconeClient, Vector, VectorIndex};

/// Outcome of an ingestion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    /// File name of the ingested PDF.
    pub source: String,

    /// Pages loaded.
    pub pages: usize,

    /// Documents after applying the profile.
    pub documents: usize,

    /// Chunks produced by the splitter.
    pub chunks: usize,

    /// Vectors written to the index; 0 for a dry run.
    pub upserted: usize,

    /// Target index name.
    pub index: String,

    /// Whether the run stopped before contacting any service.
    pub dry_run: bool,
}

/// Chunks ready for embedding, plus what they were made from.
#[derive(Debug, Clone)]
pub struct Prepared {
    /// File name of the source.
    pub source: String,

    /// Pages as loaded.
    pub pages: usize,

    /// Documents after the profile.
    pub documents: Vec<Document>,

    /// Split chunks.
    pub chunks: Vec<Document>,
}

/// Build index vectors from chunks and their embeddings.
///
/// The metadata of each chunk is stored flat, with the chunk text under
/// `text_key`.
///
/// # Errors
///
/// Returns an error if the counts differ or metadata cannot be serialized.
pub fn to_vectors(
    chunks: &[Document],
    embeddings: Vec<Vec<f32>>,
    text_key: &str,
) -> Result<Vec<Vector>> {
    if chunks.len() != embeddings.len() {
        return Err(Error::internal(format!(
            "got {} embeddings for {} chunks",
            embeddings.len(),
            chunks.len()
        )));
    }

    chunks
        .iter()
        .zip(embeddings)
        .map(|(chunk, values)| {
            let mut metadata = match serde_json::to_value(&chunk.metadata)? {
                Value::Object(map) => map,
                _ => serde_json::Map::new(),
            };
            metadata.insert(text_key.to_string(), Value::String(chunk.content.clone()));
            Ok(Vector {
                id: chunk.id(),
                values,
                metadata,
            })
        })
        .collect()
}

/// Reject an embedder whose vectors would not fit the target index.
fn check_dimension(embedder: &dyn Embedder, index_dimension: usize) -> Result<()> {
    if embedder.dimension() == index_dimension {
        Ok(())
    } else {
        Err(Error::DimensionMismatch {
            expected: index_dimension,
            actual: embedder.dimension(),
        })
    }
}

/// Runs ingestion with one configuration.
#[derive(Debug, Clone)]
pub struct IngestPipeline {
    splitter: TextSplitter,
    preprocess: PreprocessConfig,
    text_key: String,
    index_name: String,
}

impl IngestPipeline {
    /// Create a pipeline from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the chunk sizes are invalid.
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            splitter: TextSplitter::new(config.ingest.chunk_size, config.ingest.chunk_overlap)?,
            preprocess: config.preprocess.clone(),
            text_key: config.retrieval.text_key.clone(),
            index_name: config.pinecone.index_name.clone(),
        })
    }

    /// Name of the index this pipeline writes to.
    #[must_use]
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Load, shape and split a source without contacting any service.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be loaded or a cleanup pattern
    /// is invalid.
    pub async fn prepare(&self, path: &Path, profile: Profile) -> Result<Prepared> {
        let pages = timed("Loading", loader::load(path)).await?;
        let page_count = pages.len();

        info!("Applying {profile} profile to {page_count} pages");
        let documents = profile.apply(pages, &self.preprocess)?;
        let chunks = self.splitter.split_documents(&documents);
        info!(
            "Prepared {} documents into {} chunks",
            documents.len(),
            chunks.len()
        );

        Ok(Prepared {
            source: loader::source_name(path),
            pages: page_count,
            documents,
            chunks,
        })
    }

    /// Embed chunks and write them to `index`.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding or upserting fails.
    pub async fn upload(
        &self,
        chunks: &[Document],
        embedder: &dyn Embedder,
        index: &dyn VectorIndex,
    ) -> Result<usize> {
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = timed("Embedding", embedder.embed_documents(&texts)).await?;
        let vectors = to_vectors(chunks, embeddings, &self.text_key)?;
        timed("Upserting", index.upsert(vectors)).await
    }

    /// Stop after splitting and report what would be ingested.
    ///
    /// # Errors
    ///
    /// Returns an error if preparation fails.
    pub async fn dry_run(&self, path: &Path, profile: Profile) -> Result<IngestReport> {
        let prepared = self.prepare(path, profile).await?;
        Ok(self.report(&prepared, 0, true))
    }

    /// Ingest a source end to end.
    ///
    /// # Errors
    ///
    /// Returns an error from any stage.
    pub async fn run(
        &self,
        path: &Path,
        profile: Profile,
        recreate: bool,
        embedder: &dyn Embedder,
        client: &PineconeClient,
    ) -> Result<IngestReport> {
        let prepared = self.prepare(path, profile).await?;
        if prepared.chunks.is_empty() {
            info!("No text found in {}, nothing to ingest", prepared.source);
            return Ok(self.report(&prepared, 0, false));
        }

        let description = timed(
            "Preparing index",
            client.ensure_index(&self.index_name, recreate),
        )
        .await?;
        check_dimension(embedder, description.dimension)?;
        let index = client.index_at(&description.host);

        let upserted = self.upload(&prepared.chunks, embedder, &index).await?;
        let stats = timed("Waiting for vectors", index.wait_for_vectors()).await?;
        info!(
            "Index {} now holds {} vectors",
            self.index_name, stats.total_vector_count
        );

        Ok(self.report(&prepared, upserted, false))
    }

    fn report(&self, prepared: &Prepared, upserted: usize, dry_run: bool) -> IngestReport {
        IngestReport {
            source: prepared.source.clone(),
            pages: prepared.pages,
            documents: prepared.documents.len(),
            chunks: prepared.chunks.len(),
            upserted,
            index: self.index_name.clone(),
            dry_run,
        }
    }
}
