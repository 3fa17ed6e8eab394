//! Configuration management for archilawyer.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "archilawyer";

/// Default history database file name.
const HISTORY_FILE_NAME: &str = "history.db";

/// Prefix for nested environment overrides (`ARCHILAWYER_OPENAI__API_KEY`).
const ENV_PREFIX: &str = "ARCHILAWYER_";

/// Conventional environment variables for the two credentials.
const OPENAI_KEY_ENV: &str = "OPENAI_API_KEY";
const PINECONE_KEY_ENV: &str = "PINECONE_API_KEY";

/// A credential value that never prints in full.
///
/// `Debug` and `Display` show only the first and last character; values of
/// one character or less show as `*****`.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Wrap a raw credential.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw credential, for building request headers.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether the credential is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Redacted form of the credential.
    #[must_use]
    pub fn redacted(&self) -> String {
        let mut chars = self.0.chars();
        match (chars.next(), chars.next_back()) {
            (Some(first), Some(last)) => format!("{first}***{last}"),
            _ => "*****".to_string(),
        }
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Secret").field(&self.redacted()).finish()
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. `OPENAI_API_KEY` / `PINECONE_API_KEY`
/// 2. Environment variables prefixed with `ARCHILAWYER_` (`__` nests)
/// 3. TOML config file at `~/.config/archilawyer/config.toml`
/// 4. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Language model and embedding service.
    pub openai: OpenAiConfig,
    /// Hosted vector index.
    pub pinecone: PineconeConfig,
    /// Retrieval settings.
    pub retrieval: RetrievalConfig,
    /// PDF chunking settings.
    pub ingest: IngestConfig,
    /// Regulation text cleanup patterns.
    pub preprocess: PreprocessConfig,
    /// Local answer history.
    pub history: HistoryConfig,
}

/// OpenAI-compatible API configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    /// API key.
    pub api_key: Option<Secret>,
    /// Base URL including the version segment.
    pub base_url: String,
    /// Embedding model name.
    pub embedding_model: String,
    /// Completion model name.
    pub completion_model: String,
    /// Sampling temperature for answers.
    pub temperature: f32,
    /// Maximum tokens generated per answer.
    pub max_tokens: u32,
    /// Texts sent per embedding request.
    pub embedding_batch_size: usize,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

/// Vector distance metric of the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Cosine similarity.
    #[default]
    Cosine,
    /// Euclidean distance.
    Euclidean,
    /// Dot product.
    Dotproduct,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cosine => write!(f, "cosine"),
            Self::Euclidean => write!(f, "euclidean"),
            Self::Dotproduct => write!(f, "dotproduct"),
        }
    }
}

/// Pinecone-compatible vector index configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PineconeConfig {
    /// API key.
    pub api_key: Option<Secret>,
    /// Control plane base URL.
    pub control_plane_url: String,
    /// Value of the `X-Pinecone-API-Version` header.
    pub api_version: String,
    /// Name of the index holding regulation chunks.
    pub index_name: String,
    /// Namespace within the index.
    pub namespace: String,
    /// Vector dimension; must match the embedding model.
    pub dimension: usize,
    /// Distance metric used when creating the index.
    pub metric: Metric,
    /// Serverless cloud provider.
    pub cloud: String,
    /// Serverless region.
    pub region: String,
    /// Vectors per upsert request.
    pub upsert_batch_size: usize,
    /// How long to wait for a new index to become ready.
    pub ready_timeout_secs: u64,
    /// Delay between readiness polls in milliseconds.
    pub poll_interval_ms: u64,
}

/// Retrieval configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of passages retrieved per question.
    pub top_k: usize,
    /// Metadata key holding the chunk text.
    pub text_key: String,
}

/// Chunking configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks.
    pub chunk_overlap: usize,
}

/// Cleanup patterns for the technical-conditions profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Leading announcement line stripped from the first page.
    pub document_prefix_pattern: String,
    /// Running page header removed from every page.
    pub page_header_pattern: String,
}

/// Answer history configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Record answered questions.
    pub enabled: bool,
    /// Path to the database file.
    /// Defaults to `~/.local/share/archilawyer/history.db`
    pub database_path: Option<PathBuf>,
    /// Maximum number of entries to retain.
    /// Set to 0 for unlimited.
    pub max_entries: usize,
    /// Maximum age of entries to retain in days.
    /// Set to 0 for unlimited.
    pub max_age_days: u32,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            embedding_model: "text-embedding-ada-002".to_string(),
            completion_model: "gpt-3.5-turbo-instruct".to_string(),
            temperature: 0.3,
            max_tokens: 256,
            embedding_batch_size: 100,
            request_timeout_secs: 60,
        }
    }
}

impl Default for PineconeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            control_plane_url: "https://api.pinecone.io".to_string(),
            api_version: "2024-07".to_string(),
            index_name: "building-regulations".to_string(),
            namespace: String::new(),
            dimension: 1536,
            metric: Metric::Cosine,
            cloud: "aws".to_string(),
            region: "us-east-1".to_string(),
            upsert_batch_size: 100,
            ready_timeout_secs: 120,
            poll_interval_ms: 1000,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            text_key: "context".to_string(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 100,
        }
    }
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            document_prefix_pattern: concat!(
                r"^\s*Załącznik\s*do\s*obwieszczenia\s*Ministra\s*Inwestycji\s*i\s*Rozwoju\s*",
                r"z\s*dnia\s*8\s*kwietnia\s*2019\s*r\.\s*\(poz\.\s*1065\)\s*"
            )
            .to_string(),
            page_header_pattern: r"\s*\n*Dziennik Ustaw –\s*\d+\s*– Poz\. 1065\s*\n*".to_string(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            database_path: None, // Will be resolved to default at runtime
            max_entries: 10_000,
            max_age_days: 0,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// Missing credentials are not an error here; each one is logged as a
    /// warning and reported again by the command that needs it.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);
        if !config_file.exists() {
            warn!(
                "Configuration file {} does not exist, using defaults and environment",
                config_file.display()
            );
        }

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .merge(
                Env::raw()
                    .only(&[OPENAI_KEY_ENV, PINECONE_KEY_ENV])
                    .map(|key| key.as_str().to_ascii_lowercase().replacen('_', ".", 1).into()),
            );

        let config: Config = figment.extract()?;
        config.validate()?;
        for name in config.missing_credentials() {
            warn!("{name} was not found");
        }
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.ingest.chunk_size == 0 {
            return Err(Error::invalid_config("chunk_size must be greater than 0"));
        }

        if self.ingest.chunk_overlap >= self.ingest.chunk_size {
            return Err(Error::invalid_config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.ingest.chunk_overlap, self.ingest.chunk_size
            )));
        }

        if self.retrieval.top_k == 0 {
            return Err(Error::invalid_config("top_k must be greater than 0"));
        }

        if self.retrieval.text_key.is_empty() {
            return Err(Error::invalid_config("text_key must not be empty"));
        }

        if self.pinecone.dimension == 0 {
            return Err(Error::invalid_config("dimension must be greater than 0"));
        }

        if self.pinecone.upsert_batch_size == 0 || self.openai.embedding_batch_size == 0 {
            return Err(Error::invalid_config("batch sizes must be greater than 0"));
        }

        if !(0.0..=2.0).contains(&self.openai.temperature) {
            return Err(Error::invalid_config(format!(
                "temperature ({}) must be between 0 and 2",
                self.openai.temperature
            )));
        }

        if self.pinecone.index_name.is_empty() {
            return Err(Error::invalid_config("index_name must not be empty"));
        }

        for pattern in [
            &self.preprocess.document_prefix_pattern,
            &self.preprocess.page_header_pattern,
        ] {
            if regex::Regex::new(pattern).is_err() {
                return Err(Error::invalid_config(format!(
                    "invalid regex pattern: {pattern}"
                )));
            }
        }

        Ok(())
    }

    /// Dotted names of credentials that are not configured.
    #[must_use]
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.openai.api_key.as_ref().is_none_or(Secret::is_empty) {
            missing.push("openai.api_key");
        }
        if self.pinecone.api_key.as_ref().is_none_or(Secret::is_empty) {
            missing.push("pinecone.api_key");
        }
        missing
    }

    /// The OpenAI key, or an error naming how to provide it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingCredential`] if the key is absent or blank.
    pub fn openai_api_key(&self) -> Result<&Secret> {
        self.openai
            .api_key
            .as_ref()
            .filter(|key| !key.is_empty())
            .ok_or(Error::MissingCredential {
                name: "openai.api_key",
                env_var: OPENAI_KEY_ENV,
            })
    }

    /// The Pinecone key, or an error naming how to provide it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingCredential`] if the key is absent or blank.
    pub fn pinecone_api_key(&self) -> Result<&Secret> {
        self.pinecone
            .api_key
            .as_ref()
            .filter(|key| !key.is_empty())
            .ok_or(Error::MissingCredential {
                name: "pinecone.api_key",
                env_var: PINECONE_KEY_ENV,
            })
    }

    /// The configuration as JSON with every credential redacted.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn redacted(&self) -> Result<serde_json::Value> {
        let mut shown = self.clone();
        for key in [&mut shown.openai.api_key, &mut shown.pinecone.api_key]
            .into_iter()
            .flatten()
        {
            *key = Secret::new(key.redacted());
        }
        Ok(serde_json::to_value(&shown)?)
    }

    /// Get the history database path, resolving defaults if not set.
    #[must_use]
    pub fn history_database_path(&self) -> PathBuf {
        self.history
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(HISTORY_FILE_NAME))
    }

    /// Get the history max age as a Duration.
    #[must_use]
    pub fn history_max_age(&self) -> Option<Duration> {
        if self.history.max_age_days == 0 {
            None
        } else {
            Some(Duration::from_secs(
                u64::from(self.history.max_age_days) * 24 * 60 * 60,
            ))
        }
    }

    /// Timeout applied to every HTTP request.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.openai.request_timeout_secs)
    }

    /// How long to wait for a new index to become ready.
    #[must_use]
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.pinecone.ready_timeout_secs)
    }

    /// Delay between index readiness polls.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.pinecone.poll_interval_ms)
    }
}
