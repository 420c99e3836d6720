//! Configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::orchestrator::OrchestratorConfig;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Orchestrator limits (cycles, workers, retry)
    pub orchestrator: OrchestratorConfig,

    /// Checkpoint cadence
    pub checkpoint: CheckpointConfig,

    /// Storage locations
    pub storage: StorageConfig,

    /// HTTP server binding
    pub server: ServerConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let local_config = PathBuf::from(".planorch.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("planorch").join("planorch.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name ("anthropic" or "mock")
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Per-call timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            max_tokens: 8192,
            timeout_ms: 300_000,
        }
    }
}

/// When checkpoints are written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "policy")]
pub enum CheckpointConfig {
    /// At the end of every cycle (the default)
    EveryCycle,
    /// After every N completed inferences
    EveryInferences {
        #[serde(rename = "n")]
        n: u64,
    },
    /// Only when the run reaches a terminal state
    TerminalOnly,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self::EveryCycle
    }
}

impl CheckpointConfig {
    /// Whether to persist after a cycle, given completions since the last write
    pub fn due(&self, completed_since_checkpoint: u64) -> bool {
        match self {
            CheckpointConfig::EveryCycle => true,
            CheckpointConfig::EveryInferences { n } => completed_since_checkpoint >= *n,
            CheckpointConfig::TerminalOnly => false,
        }
    }
}

/// Storage locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding per-run SQLite files
    #[serde(rename = "runs-dir")]
    pub runs_dir: PathBuf,

    /// Directory deployed plans unpack into
    #[serde(rename = "plans-dir")]
    pub plans_dir: PathBuf,

    /// Directory holding per-run sandboxes
    #[serde(rename = "sandboxes-dir")]
    pub sandboxes_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            runs_dir: PathBuf::from(".planorch/runs"),
            plans_dir: PathBuf::from(".planorch/plans"),
            sandboxes_dir: PathBuf::from(".planorch/sandboxes"),
        }
    }
}

/// HTTP server binding
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8700,
        }
    }
}
