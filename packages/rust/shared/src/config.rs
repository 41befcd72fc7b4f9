//! Application configuration for kbchat.
//!
//! User config lives at `~/.kbchat/kbchat.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{KbChatError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "kbchat.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".kbchat";

/// Upper bound on the number of knowledge sources a single query may target.
pub const MAX_SOURCES: usize = 10;

/// Default context template. References every supported placeholder.
pub const DEFAULT_CONTEXT_TEMPLATE: &str = "\
You are a helpful assistant. Answer the question using only the reference material below.
Current time: {{current_time}} ({{current_week}})

## Reference material
{{contexts}}

## Question
{{query}}";

// ---------------------------------------------------------------------------
// Config structs (matching kbchat.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Answer-assembly pipeline settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Chat-model endpoint settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Configured knowledge sources.
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum results requested from each source.
    #[serde(default = "default_match_count")]
    pub match_count: usize,

    /// Results kept after fusion. `0` keeps everything.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Maximum number of sources per query. Cannot exceed [`MAX_SOURCES`].
    #[serde(default = "default_max_sources")]
    pub max_sources: usize,

    /// Render FAQ results ahead of documents.
    #[serde(default)]
    pub faq_priority_enabled: bool,

    /// Score at or above which the top FAQ is marked as an exact match.
    #[serde(default = "default_faq_threshold")]
    pub faq_direct_answer_threshold: f64,

    /// Template the assembled contexts are rendered into.
    #[serde(default = "default_context_template")]
    pub context_template: String,

    /// System prompt sent ahead of the assembled user message.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Fixed answer used when nothing was retrieved. Empty disables it.
    #[serde(default)]
    pub fallback_response: String,

    /// Per-source search request timeout.
    #[serde(default = "default_search_timeout_secs")]
    pub search_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            match_count: default_match_count(),
            top_k: default_top_k(),
            max_sources: default_max_sources(),
            faq_priority_enabled: false,
            faq_direct_answer_threshold: default_faq_threshold(),
            context_template: default_context_template(),
            system_prompt: default_system_prompt(),
            fallback_response: String::new(),
            search_timeout_secs: default_search_timeout_secs(),
        }
    }
}

fn default_match_count() -> usize {
    10
}
fn default_top_k() -> usize {
    5
}
fn default_max_sources() -> usize {
    MAX_SOURCES
}
fn default_faq_threshold() -> f64 {
    0.9
}
fn default_search_timeout_secs() -> u64 {
    30
}
fn default_context_template() -> String {
    DEFAULT_CONTEXT_TEMPLATE.into()
}
fn default_system_prompt() -> String {
    "You are a knowledge-base assistant. Prefer the provided reference material and say so when it does not contain the answer.".into()
}

impl PipelineConfig {
    /// Reject values the pipeline cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.match_count == 0 {
            return Err(KbChatError::config("pipeline.match_count must be at least 1"));
        }
        if self.max_sources == 0 || self.max_sources > MAX_SOURCES {
            return Err(KbChatError::config(format!(
                "pipeline.max_sources must be between 1 and {MAX_SOURCES}, got {}",
                self.max_sources
            )));
        }
        if !self.faq_direct_answer_threshold.is_finite() {
            return Err(KbChatError::config(
                "pipeline.faq_direct_answer_threshold must be a finite number",
            ));
        }
        Ok(())
    }
}

/// `[model]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Base URL of an OpenAI-compatible API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model identifier sent with every request.
    #[serde(default = "default_model_name")]
    pub model_name: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model_name: default_model_name(),
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model_name() -> String {
    "gpt-4o-mini".into()
}
fn default_api_key_env() -> String {
    "KBCHAT_API_KEY".into()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_timeout_secs() -> u64 {
    60
}

/// `[[sources]]` entry, one configured knowledge source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Identifier callers use to target this source.
    pub id: String,
    /// HTTP search endpoint.
    pub endpoint: String,
    /// Human-readable title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.kbchat/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| KbChatError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.kbchat/kbchat.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load and validate the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| KbChatError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| KbChatError::config(format!("failed to parse {}: {e}", path.display())))?;
    config.pipeline.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| KbChatError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| KbChatError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| KbChatError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the model API key env var is set and non-empty, returning it.
pub fn validate_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.model.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(KbChatError::config(format!(
            "model API key not found. Set the {var_name} environment variable."
        ))),
    }
}
