//! Configuration management for garden.
//!
//! Non-sensitive settings live in a TOML file
//! (`~/.config/garden/config.toml` by default). A small set of
//! environment knobs overrides the file so deployments can be
//! reconfigured without editing it:
//!
//! - `LOGSEQ_ROOT` — Logseq worktree directory
//! - `VECTOR_PROVIDER_URL` — embedding provider base URL
//! - `LLM_PROVIDER_URL` — LLM provider base URL
//! - `DEFAULT_SEARCH_STRATEGY` — embedding strategy name
//! - `SYNC_FANOUT` — request-scoped adapter fan-out limit
//! - `SYNC_CLOCK_SKEW_SECONDS` — sync timestamp tolerance

mod settings;

pub use settings::{
    GatewaySettings, LogseqSettings, ProviderSettings, SearchSettings, Settings, SettingsError,
};

/// Top-level configuration handle.
#[derive(Debug, Clone)]
pub struct Config {
    pub settings: Settings,
}

/// Errors that can occur when loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),
}

impl Config {
    /// Load the TOML settings file (creating defaults when absent) and
    /// apply environment overrides. `.env` is honored for development.
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let mut settings = Settings::load()?;
        settings.apply_env_overrides()?;
        Ok(Self { settings })
    }
}
