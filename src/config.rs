//! TOML configuration for `memidx`.
//!
//! Every section except `[db]` has defaults, so a minimal config is:
//!
//! ```toml
//! [db]
//! path = "./data/memidx.sqlite"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub corpus: Option<CorpusConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_size_words")]
    pub size_words: usize,
    #[serde(default = "default_overlap_words")]
    pub overlap_words: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            size_words: default_size_words(),
            overlap_words: default_overlap_words(),
        }
    }
}

fn default_size_words() -> usize {
    400
}
fn default_overlap_words() -> usize {
    80
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_lexical_weight")]
    pub lexical_weight: f64,
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f64,
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            lexical_weight: default_lexical_weight(),
            vector_weight: default_vector_weight(),
            default_top_k: default_top_k(),
            candidate_multiplier: default_candidate_multiplier(),
        }
    }
}

fn default_lexical_weight() -> f64 {
    0.3
}
fn default_vector_weight() -> f64 {
    0.7
}
fn default_top_k() -> usize {
    10
}
fn default_candidate_multiplier() -> usize {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
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

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

/// How vector search is executed.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    /// Try the native extension, fall back to a linear scan.
    #[default]
    Auto,
    /// Require the native extension.
    Native,
    /// Never load the extension.
    Linear,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorConfig {
    #[serde(default)]
    pub backend: VectorBackend,
    /// SQLite loadable extension providing `vec_distance_cosine`.
    #[serde(default = "default_extension")]
    pub extension: String,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            backend: VectorBackend::default(),
            extension: default_extension(),
        }
    }
}

fn default_extension() -> String {
    "vec0".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    /// Concurrent files and concurrent embedding calls.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

fn default_workers() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string()]
}

impl Config {
    /// Check value ranges and cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        // Validate chunking
        if self.chunking.size_words == 0 {
            anyhow::bail!("chunking.size_words must be > 0");
        }
        if self.chunking.overlap_words >= self.chunking.size_words {
            anyhow::bail!("chunking.overlap_words must be smaller than chunking.size_words");
        }

        // Validate retrieval
        let r = &self.retrieval;
        if r.lexical_weight < 0.0 || r.vector_weight < 0.0 {
            anyhow::bail!("retrieval weights must be >= 0");
        }
        if r.lexical_weight == 0.0 && r.vector_weight == 0.0 {
            anyhow::bail!("retrieval.lexical_weight and retrieval.vector_weight cannot both be 0");
        }
        if r.default_top_k < 1 {
            anyhow::bail!("retrieval.default_top_k must be >= 1");
        }
        if r.candidate_multiplier < 1 {
            anyhow::bail!("retrieval.candidate_multiplier must be >= 1");
        }

        // Validate embedding
        let e = &self.embedding;
        match e.provider.as_str() {
            "disabled" | "hash" | "openai" | "ollama" | "local" => {}
            other => anyhow::bail!(
                "Unknown embedding provider: '{}'. Must be disabled, hash, openai, ollama, or local.",
                other
            ),
        }
        if e.is_enabled() && e.provider != "local" && e.dims.unwrap_or(0) == 0 {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                e.provider
            );
        }
        if matches!(e.provider.as_str(), "openai" | "ollama") && e.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                e.provider
            );
        }
        if e.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }

        if self.indexing.workers < 1 {
            anyhow::bail!("indexing.workers must be >= 1");
        }

        Ok(())
    }
}

/// Parse and validate a config from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}
