//! Shared configuration for the garden knowledge backend.

pub mod config;

pub use config::{
    Config, ConfigError, GatewaySettings, LogseqSettings, ProviderSettings, SearchSettings,
    Settings, SettingsError,
};
