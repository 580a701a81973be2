use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub rewrite: RewriteConfig,
    #[serde(default)]
    pub convert: ConvertConfig,
    #[serde(default)]
    pub normalize: NormalizeConfig,
    #[serde(default)]
    pub compose: ComposeConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RewriteConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            url: None,
            api_key_env: default_api_key_env(),
            system_prompt: default_system_prompt(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_system_prompt() -> String {
    "你擅长添加标点符号和分段，要求：\n1. 精确保留所有原始内容\n2. 适当分段\n".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    120
}

impl RewriteConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConvertConfig {
    /// Minimum coverage a rewrite must reach to be accepted.
    #[serde(default = "default_coverage_threshold")]
    pub coverage_threshold: f64,
    /// Character count at which a pending batch is sent for rewriting.
    #[serde(default = "default_context_len")]
    pub context_len: usize,
    /// Rewrite attempts per batch before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// What to do with a batch whose attempts are exhausted:
    /// `abort-file` or `skip-batch`.
    #[serde(default = "default_on_exhausted")]
    pub on_exhausted: String,
    /// Abort the whole run on the first failed file.
    #[serde(default)]
    pub fail_fast: bool,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            coverage_threshold: default_coverage_threshold(),
            context_len: default_context_len(),
            max_attempts: default_max_attempts(),
            on_exhausted: default_on_exhausted(),
            fail_fast: false,
            include_globs: default_include_globs(),
        }
    }
}

fn default_coverage_threshold() -> f64 {
    0.80
}
fn default_context_len() -> usize {
    1000
}
fn default_max_attempts() -> u32 {
    3
}
fn default_on_exhausted() -> String {
    "abort-file".to_string()
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.srt".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct NormalizeConfig {
    /// Characters stripped before any coverage comparison.
    #[serde(default = "default_strip_chars")]
    pub strip_chars: String,
    /// Filler syllables removed as substrings.
    #[serde(default = "default_fillers")]
    pub fillers: Vec<String>,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            strip_chars: default_strip_chars(),
            fillers: default_fillers(),
        }
    }
}

fn default_strip_chars() -> String {
    "\"“”‘’。，？！：；、".to_string()
}
fn default_fillers() -> Vec<String> {
    ["呀", "啊", "呃", "吧", "呢", "呐"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ComposeConfig {
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub identifier: Option<String>,
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            identifier: None,
        }
    }
}

fn default_language() -> String {
    "zh".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Load the config file if it exists, otherwise fall back to defaults.
/// Commands that do not need a rewrite provider work without a file.
pub fn load_config_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::default())
    }
}

fn validate(config: &Config) -> Result<()> {
    if !(0.0..=1.0).contains(&config.convert.coverage_threshold) {
        anyhow::bail!("convert.coverage_threshold must be in [0.0, 1.0]");
    }

    if config.convert.context_len == 0 {
        anyhow::bail!("convert.context_len must be > 0");
    }

    if config.convert.max_attempts == 0 {
        anyhow::bail!("convert.max_attempts must be >= 1");
    }

    match config.convert.on_exhausted.as_str() {
        "abort-file" | "skip-batch" => {}
        other => anyhow::bail!(
            "Unknown convert.on_exhausted policy: '{}'. Must be abort-file or skip-batch.",
            other
        ),
    }

    if config.rewrite.is_enabled()
        && config.rewrite.provider != "passthrough"
        && config.rewrite.model.is_none()
    {
        anyhow::bail!(
            "rewrite.model must be specified when provider is '{}'",
            config.rewrite.provider
        );
    }

    match config.rewrite.provider.as_str() {
        "disabled" | "openai" | "ollama" | "passthrough" => {}
        other => anyhow::bail!(
            "Unknown rewrite provider: '{}'. Must be disabled, openai, ollama, or passthrough.",
            other
        ),
    }

    Ok(())
}
