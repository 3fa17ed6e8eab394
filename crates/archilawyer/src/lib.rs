//! `archilawyer` - A retrieval-grounded assistant for building regulations
//!
//! This library loads regulation PDFs, shapes and splits them into passages,
//! stores their embeddings in a hosted vector index, and answers questions by
//! asking a language model to work from the closest passages.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
mod http;
pub mod ingest;
pub mod llm;
pub mod loader;
pub mod logging;
pub mod qa;
pub mod regulation;
pub mod splitter;
pub mod storage;
pub mod vector_store;

pub use config::Config;
pub use document::{Document, Metadata};
pub use embedding::{Embedder, OpenAiEmbedder};
pub use error::{Error, Result};
pub use ingest::{IngestPipeline, IngestReport};
pub use llm::{CompletionModel, OpenAiCompletion};
pub use logging::init_logging;
pub use qa::{QaChain, QaResponse, Retriever};
pub use regulation::Profile;
pub use splitter::TextSplitter;
pub use storage::{AnswerMode, HistoryEntry, HistoryStats, HistoryStore};
pub use vector_store::{PineconeClient, PineconeIndex, VectorIndex};
