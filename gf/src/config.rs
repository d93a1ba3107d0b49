//! gofigure configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::llm::LlmError;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider configuration
    pub llm: LlmConfig,

    /// History ledger location
    pub history: HistoryConfig,

    /// Shell execution settings
    pub exec: ExecConfig,

    /// Sink for write-to-file mode
    pub output: OutputConfig,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Fails when the credential for the plan provider is missing. Call this
    /// before building anything that talks to the provider.
    pub fn validate(&self) -> Result<()> {
        self.llm.api_key().map_err(|e| eyre::eyre!(e))?;
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // An explicit config path must load
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .gofigure.yml
        let local_config = PathBuf::from(".gofigure.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/gofigure/gofigure.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("gofigure").join("gofigure.yml");
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

    /// Read only the log level, before logging is set up
    ///
    /// Errors are swallowed; the full load reports them later.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        Self::load(config_path).ok().and_then(|c| c.log_level)
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
    /// Provider name (currently only "openai")
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

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl LlmConfig {
    /// Read the API key from the configured environment variable
    pub fn api_key(&self) -> Result<String, LlmError> {
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(LlmError::MissingCredential(self.api_key_env.clone())),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: "https://api.openai.com".to_string(),
            max_tokens: 2048,
            timeout_ms: 30_000,
        }
    }
}

/// History ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// JSON file holding the ledger
    pub path: PathBuf,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        // XDG data directory (~/.local/share/gofigure on Linux)
        let path = dirs::data_dir()
            .map(|d| d.join("gofigure").join("history.json"))
            .unwrap_or_else(|| PathBuf::from("history.json"));
        Self { path }
    }
}

/// Shell execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecConfig {
    /// Shell used as `<shell> -c <command>`
    pub shell: String,

    /// Per-command timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Captured output beyond this many characters is truncated
    #[serde(rename = "max-output-chars")]
    pub max_output_chars: usize,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            shell: "bash".to_string(),
            timeout_ms: 120_000,
            max_output_chars: 30_000,
        }
    }
}

/// Write-to-file sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// File approved commands are appended to
    pub path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("gofigure-commands.sh"),
        }
    }
}
