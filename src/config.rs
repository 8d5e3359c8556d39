//! Configuration management

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::session::SessionStore;
use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// API endpoint configuration
    pub api: ApiConfig,
    /// Session and refresh configuration
    pub session: SessionConfig,
    /// User notification configuration
    pub notifications: NotificationsConfig,
}

/// API endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL every request path is resolved against
    pub base_url: String,
    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// User-Agent header
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080/api/".to_string(),
            timeout: Duration::from_secs(30),
            user_agent: format!("dealwatch-client/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ApiConfig {
    /// Parsed base URL, always ending in `/` so paths join beneath it
    pub fn base_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| Error::Config(format!("Invalid api.base_url {}: {e}", self.base_url)))?;

        if url.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "api.base_url cannot be used as a base: {}",
                self.base_url
            )));
        }

        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }

        Ok(url)
    }
}

/// Session and refresh configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Path of the session refresh endpoint
    pub refresh_path: String,
    /// Entry surface the user is sent to when the session ends
    pub entry_path: String,
    /// Session file (default: `~/.dealwatch/session.json`)
    pub store_path: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_path: "/auth/refresh".to_string(),
            entry_path: "/login".to_string(),
            store_path: None,
        }
    }
}

impl SessionConfig {
    /// Session file to use, falling back to the default location
    pub fn resolve_store_path(&self) -> Result<PathBuf> {
        match &self.store_path {
            Some(path) => Ok(path.clone()),
            None => SessionStore::default_path(),
        }
    }
}

/// User notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    /// Stable id of the "insufficient permission" notification
    pub forbidden_id: String,
    /// Text of the "insufficient permission" notification
    pub forbidden_message: String,
    /// Repeats of the same notification inside this window are dropped
    #[serde(with = "humantime_serde")]
    pub dedup_window: Duration,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            forbidden_id: "forbidden".to_string(),
            forbidden_message: "You do not have permission to perform this action.".to_string(),
            dedup_window: Duration::from_secs(3),
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist, cannot be parsed,
    /// or describes an unusable setup.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // Merge environment variables (DEALWATCH_ prefix, `__` for nesting)
        figment = figment.merge(Env::prefixed("DEALWATCH_").split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the client cannot work with
    pub fn validate(&self) -> Result<()> {
        self.api.base_url()?;

        if self.api.timeout.is_zero() {
            return Err(Error::Config("api.timeout must be greater than zero".to_string()));
        }

        for (key, value) in [
            ("session.refresh_path", &self.session.refresh_path),
            ("session.entry_path", &self.session.entry_path),
        ] {
            if !value.starts_with('/') {
                return Err(Error::Config(format!("{key} must start with '/': {value}")));
            }
        }

        if self.notifications.forbidden_id.trim().is_empty() {
            return Err(Error::Config("notifications.forbidden_id must not be empty".to_string()));
        }

        Ok(())
    }
}
