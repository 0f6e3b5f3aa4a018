//! Engine configuration.
//!
//! Every field has a default, so an empty (or absent) TOML file is a valid
//! configuration:
//!
//! ```toml
//! log_level = "debug"
//!
//! [generator]
//! model = "claude-sonnet-4-20250514"
//! max_tokens = 4096
//! temperature = 0.8
//!
//! [growth]
//! max_steps = 200
//! request_timeout_ms = 90000
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors from loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: String, value: String },
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default tracing filter; `RUST_LOG` takes precedence.
    pub log_level: String,
    pub generator: GeneratorConfig,
    pub growth: GrowthConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            generator: GeneratorConfig::default(),
            growth: GrowthConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `STORYTREE_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, keyed by environment variable name.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(level) = lookup("STORYTREE_LOG") {
            self.log_level = level;
        }
        if let Some(model) = lookup("STORYTREE_MODEL") {
            self.generator.model = Some(model);
        }
        if let Some(raw) = lookup("STORYTREE_MAX_STEPS") {
            let steps = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "STORYTREE_MAX_STEPS".to_string(),
                value: raw.clone(),
            })?;
            self.growth.max_steps = Some(steps);
        }
        Ok(self)
    }
}

/// Settings for the Claude-backed generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// The model to use (defaults to the client's model).
    pub model: Option<String>,

    /// Maximum tokens for responses.
    pub max_tokens: usize,

    /// Temperature for generation.
    pub temperature: Option<f32>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            model: None,
            max_tokens: 4096,
            temperature: Some(0.8),
        }
    }
}

/// Settings for the growth engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrowthConfig {
    /// Stop a run after this many generation calls. `None` grows until every
    /// path has concluded.
    pub max_steps: Option<usize>,

    /// Timeout passed to the generator with every call.
    pub request_timeout_ms: Option<u64>,
}

impl GrowthConfig {
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}
