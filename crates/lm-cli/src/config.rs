use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use lm_client::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
use lm_core::SplitterConfig;

/// Prefix for environment overrides, e.g. `LEARNMATE_TOKEN` or
/// `LEARNMATE_DISPLAY__SHOW_THINKING`.
pub const ENV_PREFIX: &str = "LEARNMATE_";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Backend root URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token sent with every request
    #[serde(default)]
    pub token: Option<String>,

    /// File holding the bearer token (supports $HOME, ~)
    #[serde(default)]
    pub token_file: Option<String>,

    /// Seconds to wait for the backend to start a stream
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub display: DisplayConfig,

    #[serde(default)]
    pub splitter: SplitterConfig,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
            token_file: None,
            timeout_secs: default_timeout_secs(),
            display: DisplayConfig::default(),
            splitter: SplitterConfig::default(),
        }
    }
}

/// Terminal output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Print the thinking channel
    #[serde(default = "default_true")]
    pub show_thinking: bool,

    /// Dim thinking text when stdout is a terminal
    #[serde(default = "default_true")]
    pub color: bool,
}

fn default_true() -> bool {
    true
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            show_thinking: true,
            color: true,
        }
    }
}

/// Expand environment variables in a path string
/// Supports: $VAR, ${VAR}, ~
pub fn expand_path(path: &str) -> PathBuf {
    let mut result = path.to_string();

    // Expand ~ at the start
    if result.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            result = format!("{}{}", home.display(), &result[1..]);
        }
    } else if result == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }

    let re = regex::Regex::new(r"\$\{?([A-Za-z_][A-Za-z0-9_]*)\}?").expect("valid regex");
    let expanded = re.replace_all(&result, |caps: &regex::Captures<'_>| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    });

    PathBuf::from(expanded.to_string())
}

impl Config {
    /// Load defaults, then the user config file, then `LEARNMATE_*` variables.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Like [`Config::load`] with an explicit file. A missing file is not an
    /// error; the backend defaults to a local development server.
    pub fn load_from(path: &Path) -> Result<Self> {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("learnmate"))
    }

    /// The bearer token: inline `token` wins over `token_file`.
    pub fn resolve_token(&self) -> Result<Option<String>> {
        if let Some(token) = &self.token {
            return Ok(Some(token.clone()));
        }

        match &self.token_file {
            Some(path) => {
                let path = expand_path(path);
                let token = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read token file: {}", path.display()))?;
                let token = token.trim();
                Ok((!token.is_empty()).then(|| token.to_string()))
            }
            None => Ok(None),
        }
    }
}
