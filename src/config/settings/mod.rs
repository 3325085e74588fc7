
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::DocsError;
use crate::embeddings::chunking::ChunkingConfig;
use crate::retrieval::RetrievalConfig;

const CONFIG_FILE_NAME: &str = "config.toml";
const UPLOAD_DIR_NAME: &str = "uploads";

pub const BATCH_SIZE_RANGE: RangeInclusive<u32> = 1..=1000;
pub const TOP_K_RANGE: RangeInclusive<usize> = 1..=20;
pub const GENERATION_TIMEOUT_RANGE: RangeInclusive<u64> = 1..=600;

/// Everything read from `config.toml`
///
/// Each section falls back to its defaults when missing, so a partial file
/// is valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Overrides `<base_dir>/uploads`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_dir: Option<PathBuf>,
    #[serde(skip)]
    base_dir: PathBuf,
}

/// Connection to the Ollama server used for embeddings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub batch_size: u32,
}

impl Default for OllamaConfig {
    #[inline]
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: "nomic-embed-text:latest".to_string(),
            batch_size: 16,
        }
    }
}

/// Text generation settings; the server itself is shared with [`OllamaConfig`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GenerationConfig {
    pub model: String,
    pub timeout_seconds: u64,
}

impl Default for GenerationConfig {
    #[inline]
    fn default() -> Self {
        Self {
            model: "llama2".to_string(),
            timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not determine a configuration directory")]
    DirectoryError,
    #[error("Invalid Ollama URL: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Model name cannot be empty")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (expected 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid generation timeout: {0}s (must be between 1 and 600)")]
    InvalidGenerationTimeout(u64),
    #[error("Invalid chunking: {0}")]
    InvalidChunking(#[source] DocsError),
    #[error("Invalid top_k: {0} (must be between 1 and 20)")]
    InvalidTopK(usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config file: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Could not serialize config: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

fn check_protocol(protocol: &str) -> Result<(), ConfigError> {
    match protocol {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::InvalidProtocol(other.to_string())),
    }
}

fn check_port(port: u16) -> Result<(), ConfigError> {
    if port == 0 {
        return Err(ConfigError::InvalidPort(port));
    }
    Ok(())
}

fn check_model(model: &str) -> Result<(), ConfigError> {
    if model.trim().is_empty() {
        return Err(ConfigError::InvalidModel(model.to_string()));
    }
    Ok(())
}

fn check_batch_size(batch_size: u32) -> Result<(), ConfigError> {
    if !BATCH_SIZE_RANGE.contains(&batch_size) {
        return Err(ConfigError::InvalidBatchSize(batch_size));
    }
    Ok(())
}

fn server_url(protocol: &str, host: &str, port: u16) -> Result<Url, ConfigError> {
    let raw = format!("{}://{}:{}", protocol, host, port);
    Url::parse(&raw).map_err(|_| ConfigError::InvalidUrl(raw))
}

impl Config {
    /// Default configuration rooted at `base_dir`
    #[inline]
    pub fn with_base_dir<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// `~/.docs-rag`, or the platform data directory when there is no home
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".docs-rag"))
            .or_else(|| dirs::data_dir().map(|data| data.join("docs-rag")))
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn load_default() -> Result<Self> {
        let config_dir = Self::config_dir().context("Failed to determine config directory")?;
        Self::load(config_dir)
    }

    /// Read `config.toml` from `config_dir`, using defaults when it is absent
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let base_dir = config_dir.as_ref();
        let path = base_dir.join(CONFIG_FILE_NAME);

        if !path.exists() {
            return Ok(Self::with_base_dir(base_dir));
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut config: Self = toml::from_str(&content)
            .map_err(ConfigError::from)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config.base_dir = base_dir.to_path_buf();

        config
            .validate()
            .with_context(|| format!("Invalid settings in {}", path.display()))?;
        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate().context("Refusing to save invalid settings")?;

        fs::create_dir_all(&self.base_dir).with_context(|| {
            format!("Failed to create directory {}", self.base_dir.display())
        })?;

        let path = self.config_file_path();
        let content = toml::to_string_pretty(self).map_err(ConfigError::from)?;
        fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))
    }

    #[inline]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.base_dir.join(CONFIG_FILE_NAME)
    }

    /// Directory that uploaded documents are stored in
    #[inline]
    pub fn upload_dir_path(&self) -> PathBuf {
        self.upload_dir
            .clone()
            .unwrap_or_else(|| self.base_dir.join(UPLOAD_DIR_NAME))
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ollama.validate()?;
        self.generation.validate()?;

        self.chunking
            .validate()
            .map_err(ConfigError::InvalidChunking)?;

        if !TOP_K_RANGE.contains(&self.retrieval.top_k) {
            return Err(ConfigError::InvalidTopK(self.retrieval.top_k));
        }

        Ok(())
    }
}

impl OllamaConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_protocol(&self.protocol)?;
        check_port(self.port)?;
        self.base_url()?;
        check_model(&self.model)?;
        check_batch_size(self.batch_size)
    }

    /// Root URL of the Ollama HTTP API
    #[inline]
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        server_url(&self.protocol, &self.host, self.port)
    }

    #[inline]
    pub fn set_protocol(&mut self, protocol: String) -> Result<(), ConfigError> {
        check_protocol(&protocol)?;
        self.protocol = protocol;
        Ok(())
    }

    /// Accepts only hosts that form a valid URL with the current protocol
    #[inline]
    pub fn set_host(&mut self, host: String) -> Result<(), ConfigError> {
        server_url(&self.protocol, &host, self.port)?;
        self.host = host;
        Ok(())
    }

    #[inline]
    pub fn set_port(&mut self, port: u16) -> Result<(), ConfigError> {
        check_port(port)?;
        self.port = port;
        Ok(())
    }

    #[inline]
    pub fn set_model(&mut self, model: String) -> Result<(), ConfigError> {
        check_model(&model)?;
        self.model = model;
        Ok(())
    }

    #[inline]
    pub fn set_batch_size(&mut self, batch_size: u32) -> Result<(), ConfigError> {
        check_batch_size(batch_size)?;
        self.batch_size = batch_size;
        Ok(())
    }
}

impl GenerationConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_model(&self.model)?;
        if !GENERATION_TIMEOUT_RANGE.contains(&self.timeout_seconds) {
            return Err(ConfigError::InvalidGenerationTimeout(self.timeout_seconds));
        }
        Ok(())
    }

    #[inline]
    pub fn set_model(&mut self, model: String) -> Result<(), ConfigError> {
        check_model(&model)?;
        self.model = model;
        Ok(())
    }
}
