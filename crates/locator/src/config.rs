//! Configuration file management
//!
//! Stores settings in `~/.config/locator/config.yaml`

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::credentials::{CredentialStore, DockerConfig};
use crate::error::{LocatorError, Result};

/// Locator configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocatorConfig {
    /// API version
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Prefix of every temporary file and directory name
    #[serde(default = "default_temp_prefix")]
    pub temp_prefix: String,

    /// Timeout of the default HTTP transport, in seconds
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    /// Exact-string URL rewrites applied before parsing
    #[serde(default)]
    pub mappings: HashMap<String, String>,

    /// Credentials keyed by host
    #[serde(default)]
    pub credentials: CredentialStore,

    /// Docker config.json whose auths are imported as credentials
    #[serde(default)]
    pub docker_config: Option<PathBuf>,
}

fn default_api_version() -> String {
    "locator/v1".to_string()
}

fn default_temp_prefix() -> String {
    "locator".to_string()
}

fn default_http_timeout() -> u64 {
    30
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            temp_prefix: default_temp_prefix(),
            http_timeout_secs: default_http_timeout(),
            mappings: HashMap::new(),
            credentials: CredentialStore::default(),
            docker_config: None,
        }
    }
}

impl LocatorConfig {
    /// Load configuration from default location
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a specific path
    ///
    /// The file holds credentials, so it is only readable by its owner on Unix.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            let mut options = std::fs::OpenOptions::new();
            options.write(true).create(true).truncate(true).mode(0o600);
            std::io::Write::write_all(&mut options.open(path)?, content.as_bytes())?;
            Ok(())
        }

        #[cfg(not(unix))]
        {
            std::fs::write(path, content)?;
            Ok(())
        }
    }

    /// Get default configuration path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| LocatorError::InvalidConfig {
            message: "Could not determine config directory".to_string(),
        })?;
        Ok(config_dir.join("locator").join("config.yaml"))
    }

    /// Credentials with the docker config (if any) merged underneath
    pub fn resolved_credentials(&self) -> Result<CredentialStore> {
        let mut store = self.credentials.clone();
        if let Some(path) = &self.docker_config {
            store.import_docker_config(&DockerConfig::load(Some(path))?);
        }
        Ok(store)
    }

    fn validate(&self) -> Result<()> {
        if self.temp_prefix.is_empty() || self.temp_prefix.contains(['/', '\\']) {
            return Err(LocatorError::InvalidConfig {
                message: format!("tempPrefix must be a plain file name, got {:?}", self.temp_prefix),
            });
        }
        if self.http_timeout_secs == 0 {
            return Err(LocatorError::InvalidConfig {
                message: "httpTimeoutSecs must be positive".to_string(),
            });
        }
        Ok(())
    }
}
