use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Words per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Words shared between consecutive chunks. Must be < chunk_size.
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    512
}
fn default_overlap() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for an OpenAI-compatible embeddings endpoint.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            api_base: default_api_base(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_batch_size() -> usize {
    32
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_final_limit")]
    pub final_limit: i64,
    /// Vector candidates fetched per requested result. Searching for
    /// `limit` documents scans `limit * candidate_multiplier` chunk
    /// candidates before per-document dedup.
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,
    /// Upper bound on structured matches collected before post-filtering
    /// a semantic result set by date range.
    #[serde(default = "default_date_filter_cap")]
    pub date_filter_cap: i64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            final_limit: default_final_limit(),
            candidate_multiplier: default_candidate_multiplier(),
            date_filter_cap: default_date_filter_cap(),
        }
    }
}

fn default_final_limit() -> i64 {
    10
}
fn default_candidate_multiplier() -> usize {
    4
}
fn default_date_filter_cap() -> i64 {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SourcesConfig {
    #[serde(default)]
    pub federal_register: FederalRegisterConfig,
    #[serde(default)]
    pub htsus: HtsusConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FederalRegisterConfig {
    #[serde(default = "default_fr_base_url")]
    pub base_url: String,
    /// Agency slug used as the API-side filter condition.
    #[serde(default = "default_fr_agency")]
    pub agency: String,
    #[serde(default = "default_fr_per_page")]
    pub per_page: u32,
}

impl Default for FederalRegisterConfig {
    fn default() -> Self {
        Self {
            base_url: default_fr_base_url(),
            agency: default_fr_agency(),
            per_page: default_fr_per_page(),
        }
    }
}

fn default_fr_base_url() -> String {
    "https://www.federalregister.gov/api/v1".to_string()
}
fn default_fr_agency() -> String {
    "u-s-customs-and-border-protection".to_string()
}
fn default_fr_per_page() -> u32 {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct HtsusConfig {
    #[serde(default = "default_htsus_url")]
    pub url: String,
}

impl Default for HtsusConfig {
    fn default() -> Self {
        Self {
            url: default_htsus_url(),
        }
    }
}

fn default_htsus_url() -> String {
    "https://www.usitc.gov/sites/default/files/tata/hts/hts_2025_basic_edition_csv.csv".to_string()
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate chunking. An overlap >= chunk_size makes the window step
    // non-positive and the chunker would never terminate.
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        anyhow::bail!(
            "chunking.overlap ({}) must be < chunking.chunk_size ({})",
            config.chunking.overlap,
            config.chunking.chunk_size
        );
    }

    // Validate retrieval
    if config.retrieval.final_limit < 1 {
        anyhow::bail!("retrieval.final_limit must be >= 1");
    }
    if config.retrieval.candidate_multiplier == 0 {
        anyhow::bail!("retrieval.candidate_multiplier must be >= 1");
    }

    // Validate embedding
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    Ok(config)
}
