//! TOML configuration.
//!
//! Every section is optional and every field has a default, so a minimal
//! config only needs the values that differ from the defaults:
//!
//! ```toml
//! [data]
//! dir = "./data"
//!
//! [embedding]
//! provider = "hashing"
//!
//! [retrieval]
//! hybrid = true
//! ```
//!
//! See `config/ragsync.example.toml` for every option.

use anyhow::{bail, Context, Result};
use ragsync_core::embedding::DistanceMetric;
use ragsync_core::lexical::Bm25Params;
use ragsync_core::search::RetrievalParams;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub collectors: CollectorsConfig,
}

/// Where persisted resources and the two catalogs live.
#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/ragsync.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Chunk length in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default)]
    pub chunk_overlap: usize,
    /// Lowercase and Snowball-stem text before embedding and lexical scoring.
    #[serde(default)]
    pub stemming: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: 0,
            stemming: false,
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for HTTP providers (Ollama).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Prefix prepended to queries for instruction-aware models.
    #[serde(default)]
    pub query_instruction: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            backoff_base_ms: default_backoff_base_ms(),
            query_instruction: None,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_backoff_base_ms() -> u64 {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default)]
    pub distance_metric: DistanceMetric,
    /// The top hit's raw distance must be strictly below this for its
    /// source link to be returned.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default)]
    pub hybrid: bool,
    #[serde(default = "default_bm25_weight")]
    pub bm25_weight: f64,
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f64,
    #[serde(default = "default_bm25_k1")]
    pub bm25_k1: f64,
    #[serde(default = "default_bm25_b")]
    pub bm25_b: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            distance_metric: DistanceMetric::default(),
            similarity_threshold: default_similarity_threshold(),
            hybrid: false,
            bm25_weight: default_bm25_weight(),
            semantic_weight: default_semantic_weight(),
            bm25_k1: default_bm25_k1(),
            bm25_b: default_bm25_b(),
        }
    }
}

fn default_k() -> usize {
    3
}
fn default_similarity_threshold() -> f64 {
    0.5
}
fn default_bm25_weight() -> f64 {
    0.6
}
fn default_semantic_weight() -> f64 {
    0.4
}
fn default_bm25_k1() -> f64 {
    1.5
}
fn default_bm25_b() -> f64 {
    0.75
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Per-call timeout for index upserts and deletes.
    #[serde(default = "default_index_timeout_secs")]
    pub index_timeout_secs: u64,
    /// Run the filesystem collector before each pass in `serve`.
    #[serde(default)]
    pub collect_before_sync: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            index_timeout_secs: default_index_timeout_secs(),
            collect_before_sync: false,
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    10
}
fn default_index_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `"info"` or `"ragsync=debug,sqlx=warn"`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CollectorsConfig {
    pub filesystem: Option<FilesystemCollectorConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilesystemCollectorConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl FilesystemCollectorConfig {
    /// Default globs rooted at `root`.
    pub fn with_root(root: PathBuf) -> Self {
        Self {
            root,
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.md".to_string(),
        "**/*.txt".to_string(),
        "**/*.html".to_string(),
    ]
}

impl Config {
    /// Retrieval parameters for [`ragsync_core::search::HybridRetriever`].
    pub fn retrieval_params(&self) -> RetrievalParams {
        RetrievalParams {
            metric: self.retrieval.distance_metric,
            hybrid: self.retrieval.hybrid,
            bm25_weight: self.retrieval.bm25_weight,
            semantic_weight: self.retrieval.semantic_weight,
            bm25: Bm25Params {
                k1: self.retrieval.bm25_k1,
                b: self.retrieval.bm25_b,
            },
            similarity_threshold: self.retrieval.similarity_threshold,
            stemming: self.chunking.stemming,
            query_instruction: self.embedding.query_instruction.clone(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.sync.poll_interval_secs)
    }

    /// Check value ranges. Called by [`load_config`]; exposed for configs
    /// built in code.
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            bail!("chunking.chunk_size must be > 0");
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            bail!(
                "chunking.chunk_overlap ({}) must be < chunking.chunk_size ({})",
                self.chunking.chunk_overlap,
                self.chunking.chunk_size
            );
        }

        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }
        if self.embedding.timeout_secs == 0 {
            bail!("embedding.timeout_secs must be > 0");
        }
        match self.embedding.provider.as_str() {
            "disabled" | "hashing" | "local" => {}
            "openai" | "ollama" => {
                if self.embedding.model.is_none() {
                    bail!(
                        "embedding.model must be specified when provider is '{}'",
                        self.embedding.provider
                    );
                }
                if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                    bail!(
                        "embedding.dims must be > 0 when provider is '{}'",
                        self.embedding.provider
                    );
                }
            }
            other => bail!(
                "Unknown embedding provider: '{}'. Must be disabled, hashing, openai, ollama, or local.",
                other
            ),
        }
        if self.embedding.dims == Some(0) {
            bail!("embedding.dims must be > 0");
        }

        if !(1.2..=2.0).contains(&self.retrieval.bm25_k1) {
            bail!("retrieval.bm25_k1 must be in [1.2, 2.0]");
        }
        if !(0.0..=1.0).contains(&self.retrieval.bm25_b) {
            bail!("retrieval.bm25_b must be in [0.0, 1.0]");
        }
        if !(self.retrieval.bm25_weight >= 0.0 && self.retrieval.bm25_weight.is_finite()) {
            bail!("retrieval.bm25_weight must be >= 0");
        }
        if !(self.retrieval.semantic_weight >= 0.0 && self.retrieval.semantic_weight.is_finite()) {
            bail!("retrieval.semantic_weight must be >= 0");
        }
        if !self.retrieval.similarity_threshold.is_finite() {
            bail!("retrieval.similarity_threshold must be a finite number");
        }

        if self.sync.poll_interval_secs == 0 {
            bail!("sync.poll_interval_secs must be > 0");
        }
        if self.sync.index_timeout_secs == 0 {
            bail!("sync.index_timeout_secs must be > 0");
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}
