//! Configuration loading

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::auth::{LifecycleConfig, DEFAULT_SKEW_SECS};

const DEFAULT_AUTH_BASE: &str = "https://auth.globus.org";
const DEFAULT_TRANSFER_BASE: &str = "https://transfer.api.globus.org/v0.10";
const DEFAULT_TRANSFER_RESOURCE_SERVER: &str = "transfer.api.globus.org";

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Registered native app client ID
    pub client_id: Option<String>,
    /// Credential file (defaults to `tokens.json` in the data dir)
    pub token_file: Option<PathBuf>,
    /// Refresh this many seconds before a token expires
    pub skew_secs: u64,
    pub auth_base_url: String,
    pub transfer_base_url: String,
    /// Resource server whose token authorizes transfer API calls
    pub transfer_resource_server: String,
    /// Scopes requested at login
    pub scopes: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: None,
            token_file: None,
            skew_secs: DEFAULT_SKEW_SECS,
            auth_base_url: DEFAULT_AUTH_BASE.to_string(),
            transfer_base_url: DEFAULT_TRANSFER_BASE.to_string(),
            transfer_resource_server: DEFAULT_TRANSFER_RESOURCE_SERVER.to_string(),
            scopes: vec![
                "openid".to_string(),
                "profile".to_string(),
                "email".to_string(),
                "urn:globus:auth:scope:transfer.api.globus.org:all".to_string(),
            ],
        }
    }
}

impl Config {
    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("org", "gxfer", "gxfer").context("Could not determine config directory")
    }

    /// Default config file path
    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }

    /// Load configuration from `path`, or the default location. A missing
    /// file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };

        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn client_id(&self) -> Result<&str> {
        self.client_id.as_deref().context(
            "No client_id configured. Set client_id in the config file or pass --client-id.",
        )
    }

    /// Resolved credential file path
    pub fn token_file(&self) -> Result<PathBuf> {
        match &self.token_file {
            Some(p) => Ok(p.clone()),
            None => Ok(Self::project_dirs()?.data_dir().join("tokens.json")),
        }
    }

    pub fn lifecycle(&self) -> Result<LifecycleConfig> {
        Ok(LifecycleConfig {
            token_file: self.token_file()?,
            skew_secs: self.skew_secs,
        })
    }
}
