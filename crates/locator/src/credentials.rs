//! Per-host credentials
//!
//! Credentials never appear in a URL's key or display form. They are lifted
//! out of `user:password@host` URLs at parse time and stored here, keyed by
//! host, for the transports to pick up.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{LocatorError, Result};

/// Username/password/token tuple for one host
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .field("token", &if self.token.is_empty() { "" } else { "***" })
            .finish()
    }
}

impl Credentials {
    /// Create basic auth credentials
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            token: String::new(),
        }
    }

    /// Create bearer token credentials
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.username.is_empty() && self.password.is_empty() && self.token.is_empty()
    }

    /// Authorization header value; a token wins over username/password
    pub fn auth_header(&self) -> Option<String> {
        if !self.token.is_empty() {
            return Some(format!("Bearer {}", self.token));
        }
        if self.username.is_empty() && self.password.is_empty() {
            return None;
        }
        let encoded = STANDARD.encode(format!("{}:{}", self.username, self.password));
        Some(format!("Basic {}", encoded))
    }
}

/// Docker config.json format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DockerConfig {
    #[serde(default)]
    pub auths: HashMap<String, DockerAuth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerAuth {
    #[serde(default)]
    pub auth: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default, rename = "registrytoken")]
    pub registry_token: Option<String>,
}

impl DockerConfig {
    /// Load Docker config from the given path, or `~/.docker/config.json`
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config: DockerConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| LocatorError::InvalidConfig {
            message: "Could not determine home directory".to_string(),
        })?;
        Ok(home.join(".docker").join("config.json"))
    }

    /// Host-keyed credentials for every decodable entry
    ///
    /// Entry keys may be bare hosts or `https://host/...` URLs.
    pub fn credentials(&self) -> HashMap<String, Credentials> {
        let mut resolved = HashMap::new();

        for (registry, auth) in &self.auths {
            let host = registry_host(registry);

            let mut credentials = match (&auth.username, &auth.password) {
                (Some(u), Some(p)) => Credentials::basic(u.clone(), p.clone()),
                _ => auth
                    .auth
                    .as_deref()
                    .and_then(decode_basic_auth)
                    .unwrap_or_default(),
            };
            if let Some(token) = &auth.registry_token {
                credentials.token = token.clone();
            }

            if !credentials.is_empty() {
                resolved.insert(host, credentials);
            }
        }

        resolved
    }
}

fn registry_host(registry: &str) -> String {
    let trimmed = registry
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    trimmed.split('/').next().unwrap_or(trimmed).to_string()
}

fn decode_basic_auth(encoded: &str) -> Option<Credentials> {
    let decoded = STANDARD.decode(encoded).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (user, pass) = text.split_once(':')?;
    Some(Credentials::basic(user, pass))
}

/// Credential store keyed by host (`host` or `host:port`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialStore {
    #[serde(flatten)]
    credentials: HashMap<String, Credentials>,
}

impl CredentialStore {
    /// Store credentials for a host, replacing any previous entry
    pub fn set(&mut self, host: &str, credentials: Credentials) {
        self.credentials.insert(host.to_string(), credentials);
    }

    /// Get credentials for a host
    pub fn get(&self, host: &str) -> Option<&Credentials> {
        self.credentials.get(host)
    }

    /// Remove credentials for a host
    pub fn remove(&mut self, host: &str) -> Option<Credentials> {
        self.credentials.remove(host)
    }

    /// Check if credentials exist for a host
    pub fn has(&self, host: &str) -> bool {
        self.credentials.contains_key(host)
    }

    /// Add every entry of a docker config, keeping existing hosts untouched
    pub fn import_docker_config(&mut self, config: &DockerConfig) {
        for (host, credentials) in config.credentials() {
            self.credentials.entry(host).or_insert(credentials);
        }
    }

    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.credentials.keys().map(String::as_str)
    }
}
