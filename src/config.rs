//! Configuration structures and loading logic

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main manager configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub cache_dir: PathBuf,
    pub models_dir: PathBuf,
    pub db_path: PathBuf,
    /// Directory holding one `llama_server_<slug>.log` per model
    pub log_dir: PathBuf,
    /// Directory holding per-model start locks
    pub lock_dir: PathBuf,
    pub server_binary: String,
    /// Recorded for completeness; no command invokes it
    pub cli_binary: String,
    pub api_url: String,
    pub port: u16,
    pub hub_endpoint: String,
    pub startup_timeout_secs: u64,
    pub kill_grace_secs: u64,
    pub generation: GenerationParams,
}

impl Default for Config {
    fn default() -> Self {
        let cache_dir = default_cache_dir();
        Self {
            models_dir: cache_dir.join("models"),
            db_path: cache_dir.join("llm-cli.db"),
            lock_dir: cache_dir.join("locks"),
            cache_dir,
            log_dir: PathBuf::from("/tmp"),
            server_binary: default_server_binary(),
            cli_binary: default_cli_binary(),
            api_url: default_api_url(),
            port: default_port(),
            hub_endpoint: default_hub_endpoint(),
            startup_timeout_secs: default_startup_timeout(),
            kill_grace_secs: default_kill_grace(),
            generation: GenerationParams::default(),
        }
    }
}

impl Config {
    /// Load configuration from file with environment variable overrides
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let path = path.or_else(|| std::env::var("GGUF_MANAGER_CONFIG").ok().map(PathBuf::from));

        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content).context("Failed to parse TOML config")?
        } else {
            Self::default()
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in production)
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(server) = lookup("LLAMA_SERVER").filter(|v| !v.is_empty()) {
            self.server_binary = server;
        }
        if let Some(cli) = lookup("LLAMA_CLI").filter(|v| !v.is_empty()) {
            self.cli_binary = cli;
        }
        if let Some(url) = lookup("API_URL").filter(|v| !v.is_empty()) {
            self.api_url = url;
        }
        if let Some(endpoint) = lookup("HF_ENDPOINT").filter(|v| !v.is_empty()) {
            self.hub_endpoint = endpoint;
        }
        if let Some(timeout) = lookup("GGUF_MANAGER_STARTUP_TIMEOUT") {
            self.startup_timeout_secs = timeout
                .parse()
                .context("Invalid GGUF_MANAGER_STARTUP_TIMEOUT value")?;
        }
        Ok(())
    }

    /// Validate configuration and create the models directory
    pub fn validate(&self) -> Result<()> {
        if self.port < 1024 {
            anyhow::bail!("Server port must be >= 1024 (got {})", self.port);
        }
        if self.server_binary.trim().is_empty() {
            anyhow::bail!("Server binary path cannot be empty");
        }
        if self.startup_timeout_secs == 0 {
            anyhow::bail!("startup_timeout_secs must be greater than zero");
        }
        reqwest::Url::parse(&self.api_url)
            .with_context(|| format!("Invalid API URL: {}", self.api_url))?;
        reqwest::Url::parse(&self.hub_endpoint)
            .with_context(|| format!("Invalid hub endpoint: {}", self.hub_endpoint))?;

        std::fs::create_dir_all(&self.models_dir)
            .with_context(|| format!("Cannot create models directory: {:?}", self.models_dir))?;

        Ok(())
    }
}

/// Fixed sampling parameters sent with every completion request
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GenerationParams {
    pub temperature: f64,
    pub top_k: u32,
    pub top_p: f64,
    pub n_predict: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_k: 40,
            top_p: 0.5,
            n_predict: 256,
        }
    }
}

// Default functions
fn default_cache_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".cache").join("llm-cli"))
        .unwrap_or_else(|| PathBuf::from("/tmp/llm-cli"))
}
fn default_server_binary() -> String {
    "/opt/homebrew/bin/llama-server".to_string()
}
fn default_cli_binary() -> String {
    "/opt/homebrew/bin/llama-cli".to_string()
}
fn default_api_url() -> String {
    "http://localhost:1966".to_string()
}
fn default_port() -> u16 {
    1966
}
fn default_hub_endpoint() -> String {
    "https://huggingface.co".to_string()
}
fn default_startup_timeout() -> u64 {
    300
}
fn default_kill_grace() -> u64 {
    2
}
