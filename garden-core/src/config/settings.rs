//! Settings loaded from the TOML configuration file.

use std::env;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Errors from loading or parsing settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config directory not found")]
    NoConfigDir,

    #[error("IO error reading settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidEnv { key: &'static str, value: String },
}

/// Resolved application settings (all values filled with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Override for the SQLite database file. Primarily for testing.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub gateway: GatewaySettings,
    #[serde(default)]
    pub logseq: LogseqSettings,
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub providers: ProviderSettings,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Logseq worktree settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogseqSettings {
    /// Root of the Logseq git worktree (`pages/` and `journals/` live here).
    #[serde(default = "default_logseq_root")]
    pub root: PathBuf,
    /// Directory prefixes (relative, POSIX-separated) skipped when
    /// snapshotting the worktree.
    #[serde(default = "default_excluded_prefixes")]
    pub excluded_prefixes: Vec<String>,
    /// Entity types that are page-backed and participate in sync.
    #[serde(default = "default_page_types")]
    pub page_types: Vec<String>,
    /// Tolerance applied to file-vs-entity timestamp comparisons.
    #[serde(default = "default_clock_skew_seconds")]
    pub clock_skew_seconds: i64,
    /// Whether the reconciler commits and pushes after a run.
    #[serde(default = "default_push_enabled")]
    pub push_enabled: bool,
}

impl Default for LogseqSettings {
    fn default() -> Self {
        Self {
            root: default_logseq_root(),
            excluded_prefixes: default_excluded_prefixes(),
            page_types: default_page_types(),
            clock_skew_seconds: default_clock_skew_seconds(),
            push_enabled: default_push_enabled(),
        }
    }
}

/// Unified search tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    /// Embedding strategy used for query vectors and the bookmark index.
    #[serde(default = "default_strategy")]
    pub default_strategy: String,
    /// Minimum edit-distance similarity for the fuzzy pass.
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: f64,
    /// Top-K for each adapter's vector pass.
    #[serde(default = "default_vector_top_k")]
    pub vector_top_k: usize,
    /// Per-adapter candidate cap before fusion.
    #[serde(default = "default_adapter_cap")]
    pub adapter_cap: usize,
    /// Hard ceiling on the caller-supplied result limit.
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
    /// Request-scoped adapter fan-out limit.
    #[serde(default = "default_fanout")]
    pub fanout: usize,
    /// Soft budget for one adapter's vector pass, in milliseconds.
    #[serde(default = "default_vector_timeout_ms")]
    pub vector_timeout_ms: u64,
    /// Recency decay constant, in days.
    #[serde(default = "default_recency_tau_days")]
    pub recency_tau_days: f64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            default_strategy: default_strategy(),
            fuzzy_threshold: default_fuzzy_threshold(),
            vector_top_k: default_vector_top_k(),
            adapter_cap: default_adapter_cap(),
            max_limit: default_max_limit(),
            fanout: default_fanout(),
            vector_timeout_ms: default_vector_timeout_ms(),
            recency_tau_days: default_recency_tau_days(),
        }
    }
}

/// External provider endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_vector_url")]
    pub vector_url: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_llm_url")]
    pub llm_url: String,
    #[serde(default = "default_llm_model")]
    pub llm_model: String,
    /// Hard deadline for one LLM call, in seconds.
    #[serde(default = "default_llm_timeout_seconds")]
    pub llm_timeout_seconds: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            vector_url: default_vector_url(),
            embedding_model: default_embedding_model(),
            llm_url: default_llm_url(),
            llm_model: default_llm_model(),
            llm_timeout_seconds: default_llm_timeout_seconds(),
        }
    }
}

impl Settings {
    /// Load settings from the default config file, falling back to
    /// defaults when the file does not exist.
    pub fn load() -> Result<Self, SettingsError> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Load settings from an explicit path.
    pub fn load_from(path: &PathBuf) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    /// Default config file location.
    pub fn config_path() -> Result<PathBuf, SettingsError> {
        let config_dir = dirs::config_dir().ok_or(SettingsError::NoConfigDir)?;
        Ok(config_dir.join("garden").join("config.toml"))
    }

    /// Apply environment variable overrides on top of file settings.
    pub fn apply_env_overrides(&mut self) -> Result<(), SettingsError> {
        if let Ok(root) = env::var("LOGSEQ_ROOT") {
            self.logseq.root = PathBuf::from(root);
        }
        if let Ok(url) = env::var("VECTOR_PROVIDER_URL") {
            self.providers.vector_url = url;
        }
        if let Ok(url) = env::var("LLM_PROVIDER_URL") {
            self.providers.llm_url = url;
        }
        if let Ok(strategy) = env::var("DEFAULT_SEARCH_STRATEGY") {
            self.search.default_strategy = strategy;
        }
        if let Ok(value) = env::var("SYNC_FANOUT") {
            self.search.fanout = value.parse().map_err(|_| SettingsError::InvalidEnv {
                key: "SYNC_FANOUT",
                value,
            })?;
        }
        if let Ok(value) = env::var("SYNC_CLOCK_SKEW_SECONDS") {
            self.logseq.clock_skew_seconds =
                value.parse().map_err(|_| SettingsError::InvalidEnv {
                    key: "SYNC_CLOCK_SKEW_SECONDS",
                    value,
                })?;
        }
        Ok(())
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_logseq_root() -> PathBuf {
    PathBuf::from("./logseq")
}

fn default_excluded_prefixes() -> Vec<String> {
    vec![
        "logseq/".to_string(),
        ".git/".to_string(),
        "assets/".to_string(),
    ]
}

// `unresolved` placeholders are deliberately not page-backed; they
// would otherwise sprout files on the next sync run.
fn default_page_types() -> Vec<String> {
    vec![
        "note".to_string(),
        "concept".to_string(),
        "person".to_string(),
        "project".to_string(),
    ]
}

fn default_clock_skew_seconds() -> i64 {
    2
}

fn default_push_enabled() -> bool {
    false
}

fn default_strategy() -> String {
    "qa-v2-passage".to_string()
}

fn default_fuzzy_threshold() -> f64 {
    0.55
}

fn default_vector_top_k() -> usize {
    50
}

fn default_adapter_cap() -> usize {
    200
}

fn default_max_limit() -> usize {
    500
}

fn default_fanout() -> usize {
    8
}

fn default_vector_timeout_ms() -> u64 {
    500
}

fn default_recency_tau_days() -> f64 {
    30.0
}

fn default_vector_url() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_llm_url() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_llm_model() -> String {
    "qwen3:8b".to_string()
}

fn default_llm_timeout_seconds() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let settings = Settings::default();
        assert_eq!(settings.search.default_strategy, "qa-v2-passage");
        assert_eq!(settings.search.fanout, 8);
        assert_eq!(settings.search.max_limit, 500);
        assert_eq!(settings.logseq.clock_skew_seconds, 2);
    }

    #[test]
    fn parses_partial_toml() {
        let raw = r#"
[search]
fuzzy_threshold = 0.7

[logseq]
root = "/tmp/graph"
"#;
        let settings: Settings = toml::from_str(raw).expect("parse settings");
        assert_eq!(settings.search.fuzzy_threshold, 0.7);
        assert_eq!(settings.logseq.root, PathBuf::from("/tmp/graph"));
        // untouched sections keep defaults
        assert_eq!(settings.search.vector_top_k, 50);
        assert_eq!(settings.providers.llm_timeout_seconds, 30);
    }
}
