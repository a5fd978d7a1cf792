//! Client configuration loaded from the environment.

use crate::reconcile::ReconcileMode;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Settings for talking to the Grimoire service.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Base URL of the REST API
    pub base_url: String,
    /// Bearer token sent with every request
    pub auth_token: Option<String>,
    pub request_timeout: Duration,
    pub reconcile_mode: ReconcileMode,
    /// Where store snapshots are kept; `None` keeps everything in memory
    pub store_dir: Option<PathBuf>,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth_token: None,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            reconcile_mode: ReconcileMode::default(),
            store_dir: None,
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup("GRIMOIRE_API_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::MissingApiUrl)?;

        let auth_token = lookup("GRIMOIRE_API_TOKEN").filter(|t| !t.is_empty());

        let request_timeout = match lookup("GRIMOIRE_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .ok_or(ConfigError::InvalidTimeout(raw))?,
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        let reconcile_mode = match lookup("GRIMOIRE_LEGACY_RECONCILE") {
            Some(raw) if parse_bool(&raw).ok_or(ConfigError::InvalidFlag(raw.clone()))? => {
                ReconcileMode::ReplaceAll
            }
            _ => ReconcileMode::PreserveDirty,
        };

        let store_dir = lookup("GRIMOIRE_STORE_DIR")
            .filter(|d| !d.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            base_url,
            auth_token,
            request_timeout,
            reconcile_mode,
            store_dir,
        })
    }

    /// Snapshot path for a collection, if a store directory is configured.
    pub fn store_path(&self, collection: &str) -> Option<PathBuf> {
        self.store_dir
            .as_ref()
            .map(|dir| dir.join(format!("{collection}.json")))
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("GRIMOIRE_API_URL environment variable is required")]
    MissingApiUrl,

    #[error("Invalid GRIMOIRE_TIMEOUT_SECS value: {0}")]
    InvalidTimeout(String),

    #[error("Invalid GRIMOIRE_LEGACY_RECONCILE value: {0}")]
    InvalidFlag(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<ClientConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ClientConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = load(&[("GRIMOIRE_API_URL", "http://localhost:3000")]).unwrap();
        assert_eq!(config, ClientConfig::new("http://localhost:3000"));
        assert_eq!(config.store_path("campaigns"), None);
    }

    #[test]
    fn url_is_required() {
        assert_eq!(load(&[]), Err(ConfigError::MissingApiUrl));
        assert_eq!(
            load(&[("GRIMOIRE_API_URL", "  ")]),
            Err(ConfigError::MissingApiUrl)
        );
    }

    #[test]
    fn all_values() {
        let config = load(&[
            ("GRIMOIRE_API_URL", "https://api.example.com/v1"),
            ("GRIMOIRE_API_TOKEN", "secret"),
            ("GRIMOIRE_TIMEOUT_SECS", "5"),
            ("GRIMOIRE_LEGACY_RECONCILE", "true"),
            ("GRIMOIRE_STORE_DIR", "/tmp/grimoire"),
        ])
        .unwrap();

        assert_eq!(config.auth_token.as_deref(), Some("secret"));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.reconcile_mode, ReconcileMode::ReplaceAll);
        assert_eq!(
            config.store_path("characters"),
            Some(PathBuf::from("/tmp/grimoire/characters.json"))
        );
    }

    #[test]
    fn bad_values() {
        let url = ("GRIMOIRE_API_URL", "http://localhost");
        assert!(matches!(
            load(&[url, ("GRIMOIRE_TIMEOUT_SECS", "soon")]),
            Err(ConfigError::InvalidTimeout(_))
        ));
        assert!(matches!(
            load(&[url, ("GRIMOIRE_TIMEOUT_SECS", "0")]),
            Err(ConfigError::InvalidTimeout(_))
        ));
        assert!(matches!(
            load(&[url, ("GRIMOIRE_LEGACY_RECONCILE", "maybe")]),
            Err(ConfigError::InvalidFlag(_))
        ));
        assert_eq!(
            load(&[url, ("GRIMOIRE_LEGACY_RECONCILE", "0")])
                .unwrap()
                .reconcile_mode,
            ReconcileMode::PreserveDirty
        );
    }
}
