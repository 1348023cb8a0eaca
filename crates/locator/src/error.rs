//! Error types for URL parsing, resolution and retrieval

use std::io;

use thiserror::Error;

/// Errors raised while parsing, resolving, fetching or caching URLs
#[derive(Debug, Error)]
pub enum LocatorError {
    // ============ Grammar Errors ============
    #[error("Malformed URL: {url} - {reason}")]
    Parse { url: String, reason: String },

    #[error("Unsupported URL scheme \"{scheme}\": {url}")]
    UnsupportedScheme { scheme: String, url: String },

    // ============ Resolution Errors ============
    /// Well-formed but absent. The only kind relative resolution skips past.
    #[error("{message}")]
    NotFound { message: String },

    #[error("Reference \"{reference}\" not found in git repository {repository}")]
    GitReference {
        reference: String,
        repository: String,
    },

    #[error("Internal URL conflict: {path}")]
    InternalConflict { path: String },

    // ============ Transport Errors ============
    #[error("Transport error: {message}")]
    Transport { message: String },

    // ============ Archive Errors ============
    #[error("Unsupported archive format: \"{format}\"")]
    ArchiveFormat { format: String },

    #[error("Archive error: {message}")]
    Archive { message: String },

    // ============ Configuration Errors ============
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    // ============ Cleanup Errors ============
    #[error("Failed to delete {} temporary path(s): {}", failures.len(), failures.join("; "))]
    Cleanup { failures: Vec<String> },

    // ============ IO Errors ============
    #[error("IO error: {0}")]
    Io(io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for URL operations
pub type Result<T> = std::result::Result<T, LocatorError>;

impl LocatorError {
    pub fn not_found(message: impl Into<String>) -> Self {
        LocatorError::NotFound {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        LocatorError::Transport {
            message: message.into(),
        }
    }

    pub fn parse(url: impl Into<String>, reason: impl Into<String>) -> Self {
        LocatorError::Parse {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Whether relative resolution may move on to the next origin
    pub fn is_not_found(&self) -> bool {
        matches!(self, LocatorError::NotFound { .. })
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, LocatorError::Transport { .. })
    }

    /// Box this error into an `io::Error` so it can travel through `Read`
    pub fn into_io(self) -> io::Error {
        match self {
            LocatorError::Io(e) => e,
            other => io::Error::other(other),
        }
    }
}

impl From<io::Error> for LocatorError {
    fn from(e: io::Error) -> Self {
        // Unwrap errors that were boxed by `into_io` on the far side of a reader
        if e.get_ref().is_some_and(|inner| inner.is::<LocatorError>()) {
            if let Some(inner) = e.into_inner() {
                if let Ok(located) = inner.downcast::<LocatorError>() {
                    return *located;
                }
            }
            return LocatorError::Io(io::Error::other("unrecoverable boxed error"));
        }
        LocatorError::Io(e)
    }
}

impl From<reqwest::Error> for LocatorError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LocatorError::transport(format!("Request timed out: {}", e))
        } else if e.is_connect() {
            LocatorError::transport(format!("Connection failed: {}", e))
        } else if let Some(status) = e.status() {
            LocatorError::transport(format!("HTTP {}: {}", status.as_u16(), e))
        } else {
            LocatorError::transport(e.to_string())
        }
    }
}

impl From<git2::Error> for LocatorError {
    fn from(e: git2::Error) -> Self {
        LocatorError::transport(format!("git: {}", e.message()))
    }
}

impl From<zip::result::ZipError> for LocatorError {
    fn from(e: zip::result::ZipError) -> Self {
        match e {
            zip::result::ZipError::Io(io) => io.into(),
            zip::result::ZipError::FileNotFound => LocatorError::not_found("file not found in zip"),
            other => LocatorError::Archive {
                message: other.to_string(),
            },
        }
    }
}

impl From<serde_yaml::Error> for LocatorError {
    fn from(e: serde_yaml::Error) -> Self {
        LocatorError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for LocatorError {
    fn from(e: serde_json::Error) -> Self {
        LocatorError::Serialization(e.to_string())
    }
}

impl From<url::ParseError> for LocatorError {
    fn from(e: url::ParseError) -> Self {
        LocatorError::Parse {
            url: String::new(),
            reason: e.to_string(),
        }
    }
}
