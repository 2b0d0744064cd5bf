use crate::core::{EngineConfig, RetryPolicy};
use crate::services::{BackendConfig, LlmProvider};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub matching: MatchingSettings,
    #[serde(default)]
    pub roster: RosterSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub workers: Option<usize>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: None,
        }
    }
}

fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8000 }

#[derive(Debug, Clone, Deserialize)]
pub struct LlmSettings {
    #[serde(default)]
    pub provider: LlmProvider,
    /// Falls back to the provider's public endpoint
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_key: String,
    /// Falls back to the provider's default model
    pub model: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            endpoint: None,
            api_key: String::new(),
            model: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_temperature() -> f32 { 0.1 }
fn default_max_tokens() -> u32 { 400 }
fn default_request_timeout_secs() -> u64 { 30 }

#[derive(Debug, Clone, Deserialize)]
pub struct MatchingSettings {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    #[serde(default = "default_batch_timeout_secs")]
    pub batch_timeout_secs: u64,
    #[serde(default = "default_bio_char_limit")]
    pub bio_char_limit: usize,
    #[serde(default = "default_threshold")]
    pub default_threshold: f64,
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
            call_timeout_secs: default_call_timeout_secs(),
            batch_timeout_secs: default_batch_timeout_secs(),
            bio_char_limit: default_bio_char_limit(),
            default_threshold: default_threshold(),
        }
    }
}

fn default_max_concurrency() -> usize { 16 }
fn default_max_attempts() -> u32 { 3 }
fn default_backoff_ms() -> u64 { 500 }
fn default_call_timeout_secs() -> u64 { 30 }
fn default_batch_timeout_secs() -> u64 { 120 }
fn default_bio_char_limit() -> usize { 800 }
fn default_threshold() -> f64 { 6.0 }

impl MatchingSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_backoff: Duration::from_millis(self.backoff_ms),
            call_timeout: Duration::from_secs(self.call_timeout_secs),
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_concurrency: self.max_concurrency,
            batch_timeout: Duration::from_secs(self.batch_timeout_secs),
            bio_char_limit: self.bio_char_limit,
        }
    }
}

impl LlmSettings {
    pub fn backend_config(&self) -> BackendConfig {
        BackendConfig {
            endpoint: self
                .endpoint
                .clone()
                .unwrap_or_else(|| self.provider.default_endpoint().to_string()),
            api_key: self.api_key.clone(),
            model: self
                .model
                .clone()
                .unwrap_or_else(|| self.provider.default_model().to_string()),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RosterSettings {
    #[serde(default = "default_roster_path")]
    pub path: String,
}

impl Default for RosterSettings {
    fn default() -> Self {
        Self { path: default_roster_path() }
    }
}

fn default_roster_path() -> String { "data/speakers.json".to_string() }

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "compact".to_string() }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values in the struct
    /// 2. Configuration file (config/default.toml)
    /// 3. Local overrides (config/local.toml)
    /// 4. Environment variables (prefixed with SPEAKER_MATCH)
    /// 5. The provider's key and model variables (OPENAI_* or ANTHROPIC_*)
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., SPEAKER_MATCH__MATCHING__MAX_CONCURRENCY -> matching.max_concurrency
            .add_source(
                Environment::with_prefix("SPEAKER_MATCH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        apply_provider_env(settings)?.try_deserialize()
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("SPEAKER_MATCH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        apply_provider_env(settings)?.try_deserialize()
    }
}

/// Apply the provider's conventional variables on top of everything else
fn apply_provider_env(settings: Config) -> Result<Config, ConfigError> {
    use std::env;

    let provider = match settings.get::<LlmProvider>("llm.provider") {
        Ok(provider) => provider,
        Err(ConfigError::NotFound(_)) => LlmProvider::default(),
        Err(e) => return Err(e),
    };
    let (key_var, model_var) = provider.env_vars();

    let mut builder = Config::builder().add_source(settings);

    if let Ok(api_key) = env::var(key_var) {
        builder = builder.set_override("llm.api_key", api_key)?;
    }
    if let Ok(model) = env::var(model_var) {
        builder = builder.set_override("llm.model", model)?;
    }

    builder.build()
}
