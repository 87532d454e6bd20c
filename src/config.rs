//! Configuration system for the Nirava companion
//!
//! Configuration is a TOML file with one section per concern. Every field has
//! a default, so an empty file (or no file at all) is a valid configuration.
//! Secrets are never stored in the file: `llm.api_key_env` names the
//! environment variable that holds the key and is resolved at runtime.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default locations searched when no `--config` flag is given
pub const DEFAULT_CONFIG_PATHS: [&str; 2] = ["nirava.toml", "config/nirava.toml"];

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NiravaConfig {
    #[serde(default)]
    pub companion: CompanionSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub context: ContextSection,
    #[serde(default)]
    pub research: ResearchSection,
}

/// Companion persona settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompanionSection {
    /// Name the companion introduces itself with
    #[serde(default = "default_companion_name")]
    pub name: String,
    /// How the user is addressed until they tell us their name
    #[serde(default = "default_user_name")]
    pub user_name: String,
}

impl Default for CompanionSection {
    fn default() -> Self {
        Self {
            name: default_companion_name(),
            user_name: default_user_name(),
        }
    }
}

fn default_companion_name() -> String {
    "Nirava".to_string()
}

fn default_user_name() -> String {
    "Friend".to_string()
}

/// LLM section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmSection {
    /// Provider name ("gemini" or "openai")
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Model identifier
    #[serde(default = "default_model")]
    pub model: String,
    /// Environment variable containing API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Override for the provider's API base URL
    pub base_url: Option<String>,
    /// Sampling temperature (0.0 to 2.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Optional max output tokens
    pub max_tokens: Option<u32>,
    /// HTTP timeout per request
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Allow the research stage to use live search grounding
    #[serde(default = "default_true")]
    pub grounding: bool,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            base_url: None,
            temperature: default_temperature(),
            max_tokens: None,
            timeout_secs: default_timeout_secs(),
            grounding: true,
        }
    }
}

fn default_provider() -> String {
    "gemini".to_string()
}

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_api_key_env() -> String {
    "GOOGLE_API_KEY".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

/// Session persistence settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSection {
    /// Directory holding `{id}.json` and `{id}.checkpoint.json` files
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,
    /// Write sessions to disk after every turn
    #[serde(default = "default_true")]
    pub persist: bool,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            persist: true,
        }
    }
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from(".sessions")
}

/// Context compaction settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextSection {
    /// Approximate token budget; compaction starts at 4 characters per token
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,
    /// Messages kept verbatim after compaction
    #[serde(default = "default_max_recent_messages")]
    pub max_recent_messages: usize,
    /// History length that triggers compaction regardless of size
    #[serde(default = "default_max_history_messages")]
    pub max_history_messages: usize,
}

impl Default for ContextSection {
    fn default() -> Self {
        Self {
            max_context_tokens: default_max_context_tokens(),
            max_recent_messages: default_max_recent_messages(),
            max_history_messages: default_max_history_messages(),
        }
    }
}

fn default_max_context_tokens() -> usize {
    8000
}

fn default_max_recent_messages() -> usize {
    6
}

fn default_max_history_messages() -> usize {
    12
}

/// Research quality gates
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResearchSection {
    /// Minimum average source authority (0-10) to accept grounded research
    #[serde(default = "default_min_authority_score")]
    pub min_authority_score: u8,
    /// Minimum number of trusted sources to accept grounded research
    #[serde(default = "default_min_trusted_sources")]
    pub min_trusted_sources: usize,
    /// Maximum research attempts before keeping the best result
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

impl Default for ResearchSection {
    fn default() -> Self {
        Self {
            min_authority_score: default_min_authority_score(),
            min_trusted_sources: default_min_trusted_sources(),
            max_iterations: default_max_iterations(),
        }
    }
}

fn default_min_authority_score() -> u8 {
    7
}

fn default_min_trusted_sources() -> usize {
    2
}

fn default_max_iterations() -> u32 {
    3
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Unsupported LLM provider: {0}")]
    UnsupportedProvider(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl NiravaConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: NiravaConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path, else the first default path that exists,
    /// else built-in defaults
    pub fn load(path: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        if let Some(path) = path {
            return Ok((Self::load_from_file(path)?, Some(path.to_path_buf())));
        }

        for candidate in DEFAULT_CONFIG_PATHS {
            let candidate = PathBuf::from(candidate);
            if candidate.exists() {
                return Ok((Self::load_from_file(&candidate)?, Some(candidate)));
            }
        }

        Ok((Self::default(), None))
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_provider(&self.llm.provider)?;

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::InvalidConfig(format!(
                "llm.temperature must be between 0.0 and 2.0, got {}",
                self.llm.temperature
            )));
        }
        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "llm.model must not be empty".to_string(),
            ));
        }
        if self.llm.timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "llm.timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.context.max_recent_messages == 0
            || self.context.max_recent_messages > self.context.max_history_messages
        {
            return Err(ConfigError::InvalidConfig(format!(
                "context.max_recent_messages must be between 1 and max_history_messages ({})",
                self.context.max_history_messages
            )));
        }
        if self.research.min_authority_score > 10 {
            return Err(ConfigError::InvalidConfig(
                "research.min_authority_score must be between 0 and 10".to_string(),
            ));
        }
        if self.research.max_iterations == 0 {
            return Err(ConfigError::InvalidConfig(
                "research.max_iterations must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Helper method to get environment variable with error propagation
    fn get_env_var_required(env_var_name: &str) -> Result<String, ConfigError> {
        std::env::var(env_var_name)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::EnvVarNotFound(env_var_name.to_string()))
    }

    /// Get LLM API key from environment variable
    pub fn get_llm_api_key(&self) -> Result<String, ConfigError> {
        Self::get_env_var_required(&self.llm.api_key_env)
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[llm]
provider = "gemini"
model = "gemini-2.0-flash"
api_key_env = "NIRAVA_TEST_KEY"
temperature = 0.5

[session]
persist = false
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

fn validate_provider(provider: &str) -> Result<(), ConfigError> {
    match provider {
        "gemini" | "openai" => Ok(()),
        other => Err(ConfigError::UnsupportedProvider(other.to_string())),
    }
}
