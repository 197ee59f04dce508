//! Configuration Management
//!
//! Loads testsmith configuration from TOML files.
//! Configuration includes:
//! - Model endpoint settings (base URL, model, sampling)
//! - Transport retry policy
//! - Self-correction loop bounds and prompt budgets
//! - Test harness command and timeouts

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::TestsmithError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    pub api_key: Option<String>,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub runner: RunnerConfig,
}

/// HTTP-level retry for the model transport. Separate from the repair loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_transport_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Repair attempts after the initial generation call
    #[serde(default = "default_repair_retries")]
    pub max_retries: u32,
    /// Execute candidates in the harness between repairs
    #[serde(default)]
    pub run_tests: bool,
    #[serde(default = "default_true")]
    pub headless: bool,
    #[serde(default = "default_model_timeout")]
    pub model_timeout_secs: u64,
    /// Upper bound on execution evidence embedded in one repair prompt
    #[serde(default = "default_evidence_budget")]
    pub evidence_budget_chars: usize,
    #[serde(default = "default_max_prompt_elements")]
    pub max_prompt_elements: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    #[serde(default = "default_runner_command")]
    pub command: String,
    #[serde(default)]
    pub extra_args: Vec<String>,
    #[serde(default = "default_runner_timeout")]
    pub timeout_secs: u64,
    /// Added on top of `timeout_secs` for the hard outer deadline
    #[serde(default = "default_timeout_buffer")]
    pub timeout_buffer_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            api_key: None,
            retry: RetrySettings::default(),
            generation: GenerationConfig::default(),
            runner: RunnerConfig::default(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_transport_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_retries: default_repair_retries(),
            run_tests: false,
            headless: true,
            model_timeout_secs: default_model_timeout(),
            evidence_budget_chars: default_evidence_budget(),
            max_prompt_elements: default_max_prompt_elements(),
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            command: default_runner_command(),
            extra_args: vec![],
            timeout_secs: default_runner_timeout(),
            timeout_buffer_secs: default_timeout_buffer(),
        }
    }
}

fn default_endpoint() -> String {
    "http://localhost:11434/v1".to_string()
}
fn default_model() -> String {
    "qwen2.5-coder:7b".to_string()
}
fn default_max_tokens() -> usize {
    4096
}
fn default_temperature() -> f32 {
    0.2
}
fn default_true() -> bool {
    true
}
fn default_transport_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_max_delay_ms() -> u64 {
    30000
}
fn default_repair_retries() -> u32 {
    2
}
fn default_model_timeout() -> u64 {
    120
}
fn default_evidence_budget() -> usize {
    2000
}
fn default_max_prompt_elements() -> usize {
    20
}
fn default_runner_command() -> String {
    "python -m pytest".to_string()
}
fn default_runner_timeout() -> u64 {
    60
}
fn default_timeout_buffer() -> u64 {
    15
}

impl Config {
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(Path::new(p))?,
            None => {
                let mut default_paths = vec![PathBuf::from("testsmith.toml")];
                if let Some(home) = dirs::home_dir() {
                    default_paths.push(home.join(".config/testsmith/config.toml"));
                }

                let mut loaded = None;
                for p in &default_paths {
                    if p.exists() {
                        loaded = Some(Self::from_file(p)?);
                        break;
                    }
                }
                loaded.unwrap_or_else(|| {
                    tracing::debug!("No config file found, using defaults");
                    Self::default()
                })
            }
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        toml::from_str(&content).context("Failed to parse config")
    }

    /// Apply `TESTSMITH_*` overrides. `OPENAI_API_KEY` is used when no
    /// testsmith key is set anywhere.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(endpoint) = lookup("TESTSMITH_ENDPOINT") {
            self.endpoint = endpoint;
        }
        if let Some(model) = lookup("TESTSMITH_MODEL") {
            self.model = model;
        }
        if let Some(api_key) = lookup("TESTSMITH_API_KEY") {
            self.api_key = Some(api_key);
        } else if self.api_key.is_none() {
            self.api_key = lookup("OPENAI_API_KEY");
        }
        if let Some(n) = lookup("TESTSMITH_MAX_TOKENS").and_then(|v| v.parse::<usize>().ok()) {
            self.max_tokens = n;
        }
        if let Some(t) = lookup("TESTSMITH_TEMPERATURE").and_then(|v| v.parse::<f32>().ok()) {
            self.temperature = t;
        }
        if let Some(t) = lookup("TESTSMITH_TIMEOUT").and_then(|v| v.parse::<u64>().ok()) {
            self.runner.timeout_secs = t;
        }
    }

    /// Reject settings that would make the client or runner unusable.
    pub fn validate(&self) -> std::result::Result<(), TestsmithError> {
        let parsed = url::Url::parse(&self.endpoint).map_err(|e| {
            TestsmithError::Config(format!("invalid endpoint '{}': {}", self.endpoint, e))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(TestsmithError::Config(format!(
                "endpoint must use http or https, got '{}'",
                parsed.scheme()
            )));
        }
        if self.model.trim().is_empty() {
            return Err(TestsmithError::Config("model must not be empty".into()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(TestsmithError::Config(format!(
                "temperature {} is outside 0.0..=2.0",
                self.temperature
            )));
        }
        if self.runner.timeout_secs == 0 {
            return Err(TestsmithError::Config(
                "runner.timeout_secs must be at least 1".into(),
            ));
        }
        match shlex::split(&self.runner.command) {
            Some(parts) if !parts.is_empty() => Ok(()),
            _ => Err(TestsmithError::Config(format!(
                "runner.command '{}' cannot be parsed",
                self.runner.command
            ))),
        }
    }
}
