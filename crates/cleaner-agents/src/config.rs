use std::path::Path;

use anyhow::{bail, Context, Result};
use rig::providers::openai;
use serde::Deserialize;
use tracing::{info, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4";
pub const DEFAULT_TEMPERATURE: f64 = 0.3;
pub const DEFAULT_MAX_TOKENS: u64 = 4000;
pub const DEFAULT_OUTPUT_SUFFIX: &str = "_cleaned";

/// Settings for the LLM endpoint and the output file.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanerConfig {
    /// OpenAI-compatible endpoint, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u64,
    /// Inserted between the input stem and its extension.
    pub output_suffix: String,
}

/// Keys accepted in a `--config` TOML file. Absent keys leave the
/// environment-derived value alone.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    base_url: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    temperature: Option<f64>,
    max_tokens: Option<u64>,
    output_suffix: Option<String>,
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

impl CleanerConfig {
    /// Build from an arbitrary variable source (the process environment in
    /// `Default`).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            base_url: lookup("OPENAI_BASE_URL")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_BASE_URL.into()),
            api_key: lookup("OPENAI_API_KEY").filter(|v| !v.trim().is_empty()),
            model: lookup("MODEL_NAME").unwrap_or_else(|| DEFAULT_MODEL.into()),
            temperature: parse_or(lookup("TEMPERATURE"), "TEMPERATURE", DEFAULT_TEMPERATURE),
            max_tokens: parse_or(lookup("MAX_TOKENS"), "MAX_TOKENS", DEFAULT_MAX_TOKENS),
            output_suffix: lookup("CLEANER_OUTPUT_SUFFIX")
                .unwrap_or_else(|| DEFAULT_OUTPUT_SUFFIX.into()),
        }
    }

    /// Environment defaults, overridden by `path` if given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            config.apply_toml(&content)?;
            info!(path = %path.display(), "Loaded config overrides");
        }
        Ok(config)
    }

    /// Overlay the keys present in a TOML document.
    pub fn apply_toml(&mut self, content: &str) -> Result<()> {
        let file: ConfigFile = toml::from_str(content).context("Failed to parse config TOML")?;
        if let Some(v) = file.base_url {
            self.base_url = v;
        }
        if let Some(v) = file.api_key {
            self.api_key = Some(v);
        }
        if let Some(v) = file.model {
            self.model = v;
        }
        if let Some(v) = file.temperature {
            self.temperature = v;
        }
        if let Some(v) = file.max_tokens {
            self.max_tokens = v;
        }
        if let Some(v) = file.output_suffix {
            self.output_suffix = v;
        }
        Ok(())
    }

    /// The API key, or a configuration error naming the variable to set.
    pub fn require_api_key(&self) -> Result<&str> {
        match self.api_key.as_deref() {
            Some(key) => Ok(key),
            None => bail!("OPENAI_API_KEY is not set (export it or add api_key to the --config file)"),
        }
    }

    /// Build the rig client for the configured endpoint.
    pub fn build_client(&self) -> Result<openai::CompletionsClient> {
        let api_key = self.require_api_key()?;
        openai::CompletionsClient::builder()
            .api_key(api_key)
            .base_url(&self.base_url)
            .build()
            .with_context(|| format!("Failed to build client for {}", self.base_url))
    }
}

fn parse_or<T: std::str::FromStr + Copy + std::fmt::Display>(
    raw: Option<String>,
    name: &str,
    default: T,
) -> T {
    match raw {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(var = name, value = %raw, %default, "Unparseable value, using default");
            default
        }),
    }
}

/// Check if an inference endpoint is reachable (GET {url}/models).
pub async fn check_endpoint(url: &str, api_key: Option<&str>) -> bool {
    let models_url = format!("{}/models", url.trim_end_matches('/'));
    let mut request = reqwest::Client::new()
        .get(&models_url)
        .timeout(std::time::Duration::from_secs(5));
    if let Some(key) = api_key {
        request = request.bearer_auth(key);
    }
    match request.send().await {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}
