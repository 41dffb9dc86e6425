//! Configuration management for the annotation sync engine

use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::error::SyncError;

/// Default quiet period for both debounced actions
pub const DEFAULT_DEBOUNCE_MS: u64 = 250;

/// Namespace the per-page blobs live under in the host document
pub const DEFAULT_NAMESPACE: &str = "pdf-pager";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub sync: SyncConfig,
    pub actor: ActorConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Quiet period before a burst of edits is flushed
    pub flush_debounce_ms: u64,
    /// Quiet period before the surface returns to normal mode after loads
    pub mode_reset_debounce_ms: u64,
    /// Host flag namespace (`flags.<namespace>.objects.page<N>`)
    pub namespace: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActorConfig {
    /// Identity of the local user; updates made by this actor are never replayed
    pub id: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            flush_debounce_ms: DEFAULT_DEBOUNCE_MS,
            mode_reset_debounce_ms: DEFAULT_DEBOUNCE_MS,
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            sync: SyncConfig::default(),
            actor: ActorConfig {
                id: uuid::Uuid::new_v4().to_string(),
            },
        }
    }
}

impl SyncConfig {
    pub fn flush_debounce(&self) -> Duration {
        Duration::from_millis(self.flush_debounce_ms)
    }

    pub fn mode_reset_debounce(&self) -> Duration {
        Duration::from_millis(self.mode_reset_debounce_ms)
    }
}

impl Config {
    pub fn from_env() -> Result<Self, SyncError> {
        Ok(Config {
            sync: SyncConfig {
                flush_debounce_ms: parse_ms("PDF_PAGER_FLUSH_DEBOUNCE_MS")?,
                mode_reset_debounce_ms: parse_ms("PDF_PAGER_MODE_RESET_DEBOUNCE_MS")?,
                namespace: env::var("PDF_PAGER_NAMESPACE")
                    .unwrap_or_else(|_| DEFAULT_NAMESPACE.to_string()),
            },
            actor: ActorConfig {
                id: env::var("PDF_PAGER_ACTOR_ID")
                    .unwrap_or_else(|_| uuid::Uuid::new_v4().to_string()),
            },
        })
    }
}

fn parse_ms(key: &str) -> Result<u64, SyncError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| {
                SyncError::Config(format!(
                    "{} must be a whole number of milliseconds, got {:?}",
                    key, raw
                ))
            }),
        Err(_) => Ok(DEFAULT_DEBOUNCE_MS),
    }
}
