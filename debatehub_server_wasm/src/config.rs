//! Environment-derived server settings

use crate::state::DEFAULT_STATE_FILE;

/// Runtime configuration, read once at startup
#[derive(Debug, Clone)]
pub struct Config {
    /// Where the coordinator persists its state between requests
    pub state_file: String,
    /// Stderr log verbosity
    pub log_level: log::LevelFilter,
}

impl Config {
    /// Read configuration from the environment.
    ///
    /// `DEBATEHUB_STATE_FILE` overrides the state-file path and `LOG_LEVEL`
    /// the verbosity (`error`..`trace`, default `info`).
    pub fn from_env() -> Self {
        let state_file = std::env::var("DEBATEHUB_STATE_FILE")
            .unwrap_or_else(|_| DEFAULT_STATE_FILE.to_string());
        let log_level = std::env::var("LOG_LEVEL")
            .ok()
            .and_then(|level| level.parse().ok())
            .unwrap_or(log::LevelFilter::Info);
        Self {
            state_file,
            log_level,
        }
    }
}
