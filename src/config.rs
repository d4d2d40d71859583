use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub learning: LearningConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Where raw uploaded bytes are kept.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
        }
    }
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./data/blobs")
}

/// Window sizes are in characters, not bytes or tokens.
#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_max_chars() -> usize {
    1000
}
fn default_overlap_chars() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Results used for answers and summaries.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_hybrid_alpha")]
    pub hybrid_alpha: f64,
    #[serde(default = "default_candidate_k")]
    pub candidate_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            hybrid_alpha: default_hybrid_alpha(),
            candidate_k: default_candidate_k(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_hybrid_alpha() -> f64 {
    0.6
}
fn default_candidate_k() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct LearningConfig {
    /// Results used as context for flashcards and quizzes.
    #[serde(default = "default_learning_top_k")]
    pub top_k: usize,
    #[serde(default = "default_flashcard_count")]
    pub flashcard_count: usize,
    #[serde(default = "default_quiz_count")]
    pub quiz_count: usize,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            top_k: default_learning_top_k(),
            flashcard_count: default_flashcard_count(),
            quiz_count: default_quiz_count(),
        }
    }
}

fn default_learning_top_k() -> usize {
    3
}
fn default_flashcard_count() -> usize {
    5
}
fn default_quiz_count() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Endpoint override; each provider has its own default.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
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
            url: None,
            api_key_env: default_api_key_env(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Vector size of OpenAI's `text-embedding-3-small`.
pub const DEFAULT_OPENAI_DIMS: usize = 1536;

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    /// Configured `dims`, falling back to [`DEFAULT_OPENAI_DIMS`] for `openai`.
    pub fn resolved_dims(&self) -> Option<usize> {
        self.dims
            .or_else(|| (self.provider == "openai").then_some(DEFAULT_OPENAI_DIMS))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            url: None,
            api_key_env: default_api_key_env(),
            max_retries: default_max_retries(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_llm_timeout_secs() -> u64 {
    120
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
    "127.0.0.1:7340".to_string()
}

impl Config {
    /// A configuration with every section at its default and the given database path.
    pub fn minimal(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
            },
            storage: StorageConfig::default(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            learning: LearningConfig::default(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            server: ServerConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        // Validate chunking
        if self.chunking.max_chars == 0 {
            anyhow::bail!("chunking.max_chars must be > 0");
        }
        if self.chunking.overlap_chars >= self.chunking.max_chars {
            anyhow::bail!(
                "chunking.overlap_chars ({}) must be smaller than chunking.max_chars ({})",
                self.chunking.overlap_chars,
                self.chunking.max_chars
            );
        }

        // Validate retrieval
        if self.retrieval.top_k < 1 || self.learning.top_k < 1 {
            anyhow::bail!("retrieval.top_k and learning.top_k must be >= 1");
        }
        if !(0.0..=1.0).contains(&self.retrieval.hybrid_alpha) {
            anyhow::bail!("retrieval.hybrid_alpha must be in [0.0, 1.0]");
        }

        // Validate embedding
        match self.embedding.provider.as_str() {
            "disabled" | "openai" | "ollama" => {}
            other => anyhow::bail!(
                "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
                other
            ),
        }
        if self.embedding.is_enabled() {
            if matches!(self.embedding.resolved_dims(), None | Some(0)) {
                anyhow::bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    self.embedding.provider
                );
            }
            if self.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    self.embedding.provider
                );
            }
        }

        // Validate llm
        match self.llm.provider.as_str() {
            "disabled" | "openai" => {}
            other => anyhow::bail!(
                "Unknown llm provider: '{}'. Must be disabled or openai.",
                other
            ),
        }
        if self.llm.is_enabled() && self.llm.model.is_none() {
            anyhow::bail!(
                "llm.model must be specified when provider is '{}'",
                self.llm.provider
            );
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn test_defaults_follow_service_constants() {
        let config = parse("[db]\npath = \"kb.sqlite\"\n").unwrap();
        assert_eq!(config.chunking.max_chars, 1000);
        assert_eq!(config.chunking.overlap_chars, 100);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.learning.top_k, 3);
        assert_eq!(config.learning.flashcard_count, 5);
        assert!(!config.embedding.is_enabled());
        assert!(!config.llm.is_enabled());
    }

    #[test]
    fn test_overlap_must_be_smaller_than_window() {
        let err = parse("[db]\npath = \"x\"\n[chunking]\nmax_chars = 100\noverlap_chars = 100\n")
            .unwrap_err();
        assert!(err.to_string().contains("overlap_chars"));
    }

    #[test]
    fn test_enabled_embedding_requires_model_and_dims() {
        let err = parse("[db]\npath = \"x\"\n[embedding]\nprovider = \"ollama\"\n").unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));

        let err = parse("[db]\npath = \"x\"\n[embedding]\nprovider = \"openai\"\ndims = 0\n")
            .unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));

        let err = parse("[db]\npath = \"x\"\n[embedding]\nprovider = \"openai\"\ndims = 1536\n")
            .unwrap_err();
        assert!(err.to_string().contains("embedding.model"));
    }

    #[test]
    fn test_openai_dims_default_to_1536() {
        let config = parse(
            "[db]\npath = \"x\"\n[embedding]\nprovider = \"openai\"\nmodel = \"text-embedding-3-small\"\n",
        )
        .unwrap();
        assert_eq!(config.embedding.dims, None);
        assert_eq!(config.embedding.resolved_dims(), Some(DEFAULT_OPENAI_DIMS));

        let config = parse(
            "[db]\npath = \"x\"\n[embedding]\nprovider = \"openai\"\nmodel = \"m\"\ndims = 256\n",
        )
        .unwrap();
        assert_eq!(config.embedding.resolved_dims(), Some(256));
    }

    #[test]
    fn test_unknown_providers_rejected() {
        assert!(parse("[db]\npath = \"x\"\n[embedding]\nprovider = \"azure\"\n").is_err());
        assert!(parse("[db]\npath = \"x\"\n[llm]\nprovider = \"azure\"\n").is_err());
    }

    #[test]
    fn test_example_config_parses() {
        let config = parse(include_str!("../config/kb.example.toml")).unwrap();
        assert_eq!(config.embedding.provider, "openai");
        assert_eq!(config.embedding.dims, Some(1536));
        assert_eq!(config.server.bind, "127.0.0.1:7340");
    }

    #[test]
    fn test_minimal_is_valid() {
        Config::minimal("kb.sqlite").validate().unwrap();
    }
}
