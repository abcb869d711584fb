//! Configuration loading and management
//!
//! Handles parsing of `.folio.toml` configuration files.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::store::github::DEFAULT_API_BASE;

/// Name of the configuration file looked up in the working directory
pub const CONFIG_FILENAME: &str = ".folio.toml";

/// Hard ceiling for history listings
pub const HISTORY_LIMIT_CEILING: usize = 100;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Branch used when a command does not name one
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Remote store selection
    #[serde(default)]
    pub store: StoreConfig,

    /// Default commit identity
    #[serde(default)]
    pub author: AuthorConfig,

    /// History listing limits
    #[serde(default)]
    pub history: HistoryConfig,

    /// Collection listing defaults
    #[serde(default)]
    pub collection: CollectionConfig,

    /// Staging ledger persistence
    #[serde(default)]
    pub staging: StagingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            branch: default_branch(),
            store: StoreConfig::default(),
            author: AuthorConfig::default(),
            history: HistoryConfig::default(),
            collection: CollectionConfig::default(),
            staging: StagingConfig::default(),
        }
    }
}

fn default_branch() -> String {
    "main".to_string()
}

/// Which remote store implementation to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Github,
    Git,
}

/// Remote store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,

    /// Base URL of the hosted API
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Environment variable holding the API token
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Directory holding `<owner>/<name>` repositories for the git backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_root: Option<PathBuf>,

    /// Per-request timeout for the hosted API
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

fn default_backend() -> StoreBackend {
    StoreBackend::Github
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            api_base: default_api_base(),
            token_env: default_token_env(),
            git_root: None,
            timeout_secs: None,
        }
    }
}

/// Author identity used when a write does not carry one
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorConfig {
    #[serde(default = "default_author_name")]
    pub name: String,

    #[serde(default = "default_author_email")]
    pub email: String,
}

fn default_author_name() -> String {
    "folio".to_string()
}

fn default_author_email() -> String {
    "folio@localhost".to_string()
}

impl Default for AuthorConfig {
    fn default() -> Self {
        Self {
            name: default_author_name(),
            email: default_author_email(),
        }
    }
}

/// History configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Largest number of commits a single listing may return
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
}

fn default_max_limit() -> usize {
    50
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_limit: default_max_limit(),
        }
    }
}

/// Collection listing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// File extensions whose front-matter is decoded
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Name (file stem or slug) of the item excluded from listings
    #[serde(default = "default_index_name")]
    pub index_name: String,
}

fn default_extensions() -> Vec<String> {
    vec!["md".to_string(), "mdx".to_string()]
}

fn default_index_name() -> String {
    "index".to_string()
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            index_name: default_index_name(),
        }
    }
}

/// Staging ledger configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StagingConfig {
    /// Directory for persisted session ledgers (defaults to the platform data dir)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
}

impl StagingConfig {
    /// Resolve the directory holding session ledgers.
    pub fn resolve_state_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.state_dir {
            return Ok(dir.clone());
        }
        directories::ProjectDirs::from("", "", "folio")
            .map(|dirs| dirs.data_local_dir().to_path_buf())
            .ok_or_else(|| {
                Error::InvalidConfig(
                    "cannot determine a data directory; set staging.state_dir".to_string(),
                )
            })
    }
}

impl Config {
    /// Load configuration from a `.folio.toml` file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|err| Error::InvalidConfig(format!("{}: {err}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a directory, or return defaults
    pub fn load_from_dir(dir: &Path) -> Self {
        let config_path = dir.join(CONFIG_FILENAME);
        if config_path.exists() {
            match Self::load(&config_path) {
                Ok(config) => config,
                Err(err) => {
                    tracing::warn!(path = %config_path.display(), error = %err, "ignoring invalid config");
                    Self::default()
                }
            }
        } else {
            Self::default()
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.branch.trim().is_empty() {
            return Err(Error::InvalidConfig("branch cannot be empty".to_string()));
        }
        self.store.validate()?;
        self.author.validate()?;
        self.history.validate()?;
        self.collection.validate()?;
        Ok(())
    }
}

impl StoreConfig {
    fn validate(&self) -> Result<()> {
        if self.backend == StoreBackend::Git && self.git_root.is_none() {
            return Err(Error::InvalidConfig(
                "store.git_root is required when store.backend = \"git\"".to_string(),
            ));
        }
        if self.api_base.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "store.api_base cannot be empty".to_string(),
            ));
        }
        if self.token_env.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "store.token_env cannot be empty".to_string(),
            ));
        }
        if self.timeout_secs == Some(0) {
            return Err(Error::InvalidConfig(
                "store.timeout_secs must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl AuthorConfig {
    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidConfig("author.name cannot be empty".to_string()));
        }
        if !self.email.contains('@') {
            return Err(Error::InvalidConfig(format!(
                "author.email '{}' is not an email address",
                self.email
            )));
        }
        Ok(())
    }
}

impl HistoryConfig {
    fn validate(&self) -> Result<()> {
        if self.max_limit == 0 {
            return Err(Error::InvalidConfig(
                "history.max_limit must be > 0".to_string(),
            ));
        }
        if self.max_limit > HISTORY_LIMIT_CEILING {
            return Err(Error::InvalidConfig(format!(
                "history.max_limit must be <= {HISTORY_LIMIT_CEILING}"
            )));
        }
        Ok(())
    }
}

impl CollectionConfig {
    fn validate(&self) -> Result<()> {
        for ext in &self.extensions {
            let trimmed = ext.trim().trim_start_matches('.');
            if trimmed.is_empty() {
                return Err(Error::InvalidConfig(
                    "collection.extensions cannot include empty entries".to_string(),
                ));
            }
        }
        if self.index_name.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "collection.index_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}
