//! Configuration parsing and validation.
//!
//! Triage Harness is configured by a single TOML file, passed with
//! `--config`. Only `[source].repo` is required; every other table and key
//! falls back to a default.
//!
//! ```toml
//! [source]
//! repo = "rust-lang/cargo"
//! state = "all"
//! max_issues = 500
//!
//! [knowledge]
//! site = "stackoverflow"
//!
//! [batch]
//! batch_size = 5
//! analyze_state = "open"
//!
//! [checkpoint]
//! backend = "sqlite"
//! path = "./data/triage.sqlite"
//!
//! [scoring.strategies]
//! exact_error_score = 95
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use triage_harness_core::models::{RepoRef, StateFilter};
use triage_harness_core::tuning::ScoringTuning;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub source: SourceConfig,
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub scoring: ScoringTuning,
}

/// Issue tracker settings (`[source]`).
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    /// `owner/name`.
    pub repo: String,
    #[serde(default = "default_github_api")]
    pub api_base: String,
    #[serde(default)]
    pub state: StateFilter,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_max_issues")]
    pub max_issues: usize,
    /// Environment variable holding an API token. Unset or empty means anonymous.
    #[serde(default = "default_github_token_env")]
    pub token_env: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_source_delay_ms")]
    pub min_delay_ms: u64,
}

fn default_github_api() -> String {
    "https://api.github.com".to_string()
}
fn default_page_size() -> u32 {
    100
}
fn default_max_issues() -> usize {
    1000
}
fn default_github_token_env() -> Option<String> {
    Some("GITHUB_TOKEN".to_string())
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_source_delay_ms() -> u64 {
    250
}

/// Knowledge-base settings (`[knowledge]`).
#[derive(Debug, Deserialize, Clone)]
pub struct KnowledgeConfig {
    #[serde(default = "default_stackexchange_api")]
    pub api_base: String,
    #[serde(default = "default_site")]
    pub site: String,
    #[serde(default = "default_key_env")]
    pub key_env: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_knowledge_delay_ms")]
    pub min_delay_ms: u64,
    /// Cool-down taken after a rate-limit response that carries no hint.
    #[serde(default = "default_cooldown_secs")]
    pub rate_limit_cooldown_secs: u64,
    /// Results requested per search call.
    #[serde(default = "default_knowledge_page_size")]
    pub page_size: u32,
    #[serde(default = "default_true")]
    pub fetch_responses: bool,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            api_base: default_stackexchange_api(),
            site: default_site(),
            key_env: default_key_env(),
            timeout_secs: default_timeout_secs(),
            min_delay_ms: default_knowledge_delay_ms(),
            rate_limit_cooldown_secs: default_cooldown_secs(),
            page_size: default_knowledge_page_size(),
            fetch_responses: true,
        }
    }
}

fn default_stackexchange_api() -> String {
    "https://api.stackexchange.com/2.3".to_string()
}
fn default_site() -> String {
    "stackoverflow".to_string()
}
fn default_key_env() -> Option<String> {
    Some("STACKEXCHANGE_KEY".to_string())
}
fn default_knowledge_delay_ms() -> u64 {
    100
}
fn default_cooldown_secs() -> u64 {
    60
}
fn default_knowledge_page_size() -> u32 {
    10
}
fn default_true() -> bool {
    true
}

/// Batch pipeline settings (`[batch]`).
#[derive(Debug, Deserialize, Clone)]
pub struct BatchConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Serialized run size above which a warning is logged between batches.
    #[serde(default = "default_memory_warn_mb")]
    pub memory_warn_mb: u64,
    /// Which fetched issues are analyzed. The whole corpus is always the precedent pool.
    #[serde(default)]
    pub analyze_state: StateFilter,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            backoff_multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            memory_warn_mb: default_memory_warn_mb(),
            analyze_state: StateFilter::All,
        }
    }
}

fn default_batch_size() -> usize {
    5
}
fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_memory_warn_mb() -> u64 {
    512
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointBackend {
    #[default]
    File,
    Sqlite,
}

/// Checkpoint store settings (`[checkpoint]`).
///
/// For the `file` backend `path` is a directory; for `sqlite` it is the
/// database file.
#[derive(Debug, Deserialize, Clone)]
pub struct CheckpointConfig {
    #[serde(default)]
    pub backend: CheckpointBackend,
    #[serde(default = "default_checkpoint_path")]
    pub path: PathBuf,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            backend: CheckpointBackend::File,
            path: default_checkpoint_path(),
        }
    }
}

fn default_checkpoint_path() -> PathBuf {
    PathBuf::from("./data/checkpoints")
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./data/output")
}

impl Config {
    /// The validated repository reference.
    pub fn repo(&self) -> Result<RepoRef> {
        RepoRef::parse(&self.source.repo).ok_or_else(|| {
            anyhow::anyhow!(
                "source.repo must be in 'owner/name' form, got '{}'",
                self.source.repo
            )
        })
    }

    pub fn min_source_delay(&self) -> Duration {
        Duration::from_millis(self.source.min_delay_ms)
    }

    pub fn min_knowledge_delay(&self) -> Duration {
        Duration::from_millis(self.knowledge.min_delay_ms)
    }

    pub fn rate_limit_cooldown(&self) -> Duration {
        Duration::from_secs(self.knowledge.rate_limit_cooldown_secs)
    }
}

/// Read a secret from the environment variable named in config.
pub fn env_secret(var: Option<&str>) -> Option<String> {
    let value = std::env::var(var?).ok()?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate source
    config.repo()?;
    if config.source.page_size == 0 || config.source.page_size > 100 {
        anyhow::bail!("source.page_size must be in [1, 100]");
    }
    if config.source.max_issues == 0 {
        anyhow::bail!("source.max_issues must be > 0");
    }

    // Validate knowledge
    if config.knowledge.site.trim().is_empty() {
        anyhow::bail!("knowledge.site must not be empty");
    }
    if config.knowledge.page_size == 0 || config.knowledge.page_size > 100 {
        anyhow::bail!("knowledge.page_size must be in [1, 100]");
    }

    // Validate batch
    if config.batch.batch_size == 0 {
        anyhow::bail!("batch.batch_size must be > 0");
    }
    if config.batch.max_attempts == 0 {
        anyhow::bail!("batch.max_attempts must be >= 1");
    }
    if config.batch.backoff_multiplier < 1.0 || !config.batch.backoff_multiplier.is_finite() {
        anyhow::bail!("batch.backoff_multiplier must be >= 1.0");
    }
    if config.batch.max_delay_ms < config.batch.base_delay_ms {
        anyhow::bail!("batch.max_delay_ms must be >= batch.base_delay_ms");
    }

    // Validate scoring
    let strategies = &config.scoring.strategies;
    for (name, score) in [
        ("exact_error_score", strategies.exact_error_score),
        ("exception_type_score", strategies.exception_type_score),
        ("keyword_tech_score", strategies.keyword_tech_score),
        ("tag_only_score", strategies.tag_only_score),
    ] {
        if score > 100 {
            anyhow::bail!("scoring.strategies.{} must be in [0, 100]", name);
        }
    }
    if strategies.max_candidates == 0 {
        anyhow::bail!("scoring.strategies.max_candidates must be > 0");
    }

    Ok(config)
}
