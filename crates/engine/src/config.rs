//! Engine configuration management.

use docrag_core::config::STATE_DIR;
use docrag_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Full engine configuration, stored as `.docrag/engine.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub chunking: ChunkConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

/// Unit in which chunk size and overlap are counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkUnit {
    /// Unicode scalar values
    #[default]
    Characters,

    /// Whitespace-delimited words
    Words,
}

/// Chunker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Target chunk size in units
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Overlap between consecutive chunks in units
    #[serde(default = "default_overlap")]
    pub overlap: usize,

    #[serde(default)]
    pub unit: ChunkUnit,
}

fn default_chunk_size() -> usize {
    1200
}

fn default_overlap() -> usize {
    200
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
            unit: ChunkUnit::default(),
        }
    }
}

impl ChunkConfig {
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size,
            overlap,
            unit: ChunkUnit::Characters,
        }
    }

    pub fn with_unit(mut self, unit: ChunkUnit) -> Self {
        self.unit = unit;
        self
    }

    /// Overlap must be strictly less than a non-zero chunk size.
    pub fn validate(&self) -> AppResult<()> {
        if self.chunk_size == 0 {
            return Err(AppError::Config("chunk_size must be greater than 0".to_string()));
        }
        if self.overlap >= self.chunk_size {
            return Err(AppError::Config(format!(
                "overlap ({}) must be less than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }

    /// Distance between the starts of consecutive windows.
    pub fn step(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

/// Embedding client and provider configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider name: "openai", "ollama", "hash"
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model identifier (provider-specific)
    #[serde(default = "default_model")]
    pub model: String,

    /// Embedding vector dimensions, fixed for the whole index
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Maximum texts per provider request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Provider requests allowed in flight for one embed call
    #[serde(default = "default_max_concurrent_batches")]
    pub max_concurrent_batches: usize,

    /// Attempts per request, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Base URL override (OpenAI-compatible gateway, remote Ollama)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_dimensions() -> usize {
    1536
}

fn default_batch_size() -> usize {
    100
}

fn default_max_concurrent_batches() -> usize {
    2
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    8_000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            dimensions: default_dimensions(),
            batch_size: default_batch_size(),
            max_concurrent_batches: default_max_concurrent_batches(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            api_key_env: default_api_key_env(),
            endpoint: None,
        }
    }
}

impl EmbeddingConfig {
    pub fn validate(&self) -> AppResult<()> {
        if self.dimensions == 0 {
            return Err(AppError::Config("embedding dimensions must be greater than 0".to_string()));
        }
        if self.batch_size == 0 {
            return Err(AppError::Config("embedding batch_size must be greater than 0".to_string()));
        }
        if self.max_concurrent_batches == 0 {
            return Err(AppError::Config(
                "embedding max_concurrent_batches must be greater than 0".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(AppError::Config("embedding max_attempts must be greater than 0".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(AppError::Config(
                "embedding request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Search defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    /// Drop hits scoring below this cosine similarity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f32>,
}

fn default_top_k() -> usize {
    5
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            min_score: None,
        }
    }
}

/// Durable storage settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database path; relative paths resolve against the workspace.
    /// Defaults to `.docrag/docrag.sqlite`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl EngineConfig {
    pub fn validate(&self) -> AppResult<()> {
        self.chunking.validate()?;
        self.embedding.validate()?;
        if let Some(min) = self.search.min_score {
            if !min.is_finite() {
                return Err(AppError::Config("search min_score must be finite".to_string()));
            }
        }
        Ok(())
    }

    /// Resolve the SQLite path for a workspace.
    pub fn storage_path(&self, workspace: &Path) -> PathBuf {
        match &self.storage.path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => workspace.join(path),
            None => workspace.join(STATE_DIR).join("docrag.sqlite"),
        }
    }
}

/// Load engine configuration.
///
/// Loads from `.docrag/engine.yaml` if it exists, otherwise returns defaults.
/// The result is validated either way.
pub fn load_config(workspace: &Path) -> AppResult<EngineConfig> {
    let config_path = get_config_path(workspace);

    let config = if config_path.exists() {
        let content = fs::read_to_string(&config_path).map_err(|e| {
            AppError::Config(format!("Failed to read config at {:?}: {}", config_path, e))
        })?;

        let config: EngineConfig = serde_yaml::from_str(&content).map_err(|e| {
            AppError::Config(format!("Failed to parse config at {:?}: {}", config_path, e))
        })?;

        tracing::debug!("Loaded engine config from {:?}", config_path);
        config
    } else {
        tracing::debug!("Using default engine config (no config file found)");
        EngineConfig::default()
    };

    config.validate()?;
    Ok(config)
}

/// Save engine configuration.
pub fn save_config(workspace: &Path, config: &EngineConfig) -> AppResult<()> {
    let config_path = get_config_path(workspace);

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            AppError::Config(format!("Failed to create config directory: {}", e))
        })?;
    }

    let yaml = serde_yaml::to_string(config)?;

    fs::write(&config_path, yaml).map_err(|e| {
        AppError::Config(format!("Failed to write config to {:?}: {}", config_path, e))
    })?;

    tracing::debug!("Saved engine config to {:?}", config_path);
    Ok(())
}

/// Get the path to the engine config file.
pub fn get_config_path(workspace: &Path) -> PathBuf {
    workspace.join(STATE_DIR).join("engine.yaml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_default_config() {
        let temp = TempDir::new().unwrap();
        let config = load_config(temp.path()).unwrap();

        assert_eq!(config.chunking.chunk_size, 1200);
        assert_eq!(config.chunking.overlap, 200);
        assert_eq!(config.embedding.provider, "openai");
        assert_eq!(config.embedding.dimensions, 1536);
        assert_eq!(config.search.default_top_k, 5);
    }

    #[test]
    fn test_save_and_load_config() {
        let temp = TempDir::new().unwrap();
        let mut config = EngineConfig::default();
        config.chunking = ChunkConfig::new(100, 20).with_unit(ChunkUnit::Words);
        config.embedding.provider = "hash".to_string();
        config.embedding.dimensions = 64;

        save_config(temp.path(), &config).unwrap();

        let loaded = load_config(temp.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let path = get_config_path(temp.path());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "chunking:\n  chunk_size: 300\n").unwrap();

        let loaded = load_config(temp.path()).unwrap();
        assert_eq!(loaded.chunking.chunk_size, 300);
        assert_eq!(loaded.chunking.overlap, 200);
        assert_eq!(loaded.embedding.batch_size, 100);
    }

    #[test]
    fn test_overlap_not_less_than_size_rejected() {
        assert!(ChunkConfig::new(100, 100).validate().is_err());
        assert!(ChunkConfig::new(100, 150).validate().is_err());
        assert!(ChunkConfig::new(0, 0).validate().is_err());
        assert!(ChunkConfig::new(100, 0).validate().is_ok());
        assert!(ChunkConfig::new(100, 99).validate().is_ok());
    }

    #[test]
    fn test_invalid_file_config_rejected_on_load() {
        let temp = TempDir::new().unwrap();
        let path = get_config_path(temp.path());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "chunking:\n  chunk_size: 50\n  overlap: 50\n").unwrap();

        let result = load_config(temp.path());
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_storage_path_resolution() {
        let workspace = Path::new("/srv/ws");
        let mut config = EngineConfig::default();
        assert_eq!(
            config.storage_path(workspace),
            PathBuf::from("/srv/ws/.docrag/docrag.sqlite")
        );

        config.storage.path = Some(PathBuf::from("data/index.sqlite"));
        assert_eq!(
            config.storage_path(workspace),
            PathBuf::from("/srv/ws/data/index.sqlite")
        );

        config.storage.path = Some(PathBuf::from("/var/lib/docrag.sqlite"));
        assert_eq!(
            config.storage_path(workspace),
            PathBuf::from("/var/lib/docrag.sqlite")
        );
    }
}
