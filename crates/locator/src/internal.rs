//! In-process byte buffers addressable as `internal:` URLs
//!
//! The registry belongs to a [`Context`], so two sessions never see each
//! other's buffers.

use std::collections::HashMap;
use std::fmt;
use std::io::{Cursor, Read};
use std::sync::{Arc, PoisonError, RwLock};

use uuid::Uuid;

use crate::context::Context;
use crate::error::{LocatorError, Result};
use crate::format::get_format;
use crate::util::{join, origin_dir};

/// Path → buffer table
#[derive(Default)]
pub struct InternalRegistry {
    entries: RwLock<HashMap<String, Arc<[u8]>>>,
}

impl fmt::Debug for InternalRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut paths: Vec<_> = entries.keys().collect();
        paths.sort();
        f.debug_struct("InternalRegistry").field("paths", &paths).finish()
    }
}

impl InternalRegistry {
    /// Register `content` under `path`; an existing entry is a conflict
    pub fn register(&self, path: &str, content: impl Into<Vec<u8>>) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.contains_key(path) {
            return Err(LocatorError::InternalConflict {
                path: path.to_string(),
            });
        }
        entries.insert(path.to_string(), Arc::from(content.into()));
        Ok(())
    }

    /// Register or replace the content under `path`
    pub fn update(&self, path: &str, content: impl Into<Vec<u8>>) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_string(), Arc::from(content.into()));
    }

    /// Remove `path`, returning whether it was registered
    pub fn deregister(&self, path: &str) -> bool {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path)
            .is_some()
    }

    pub fn get(&self, path: &str) -> Option<Arc<[u8]>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(path)
    }
}

/// URL of a registered in-process buffer
#[derive(Clone)]
pub struct InternalUrl {
    pub path: String,
    content: Option<Arc<[u8]>>,
    context: Arc<Context>,
}

impl fmt::Debug for InternalUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InternalUrl")
            .field("path", &self.path)
            .field("pinned", &self.content.is_some())
            .finish()
    }
}

impl InternalUrl {
    pub fn new(path: impl Into<String>, context: &Arc<Context>) -> Self {
        Self {
            path: path.into(),
            content: None,
            context: context.clone(),
        }
    }

    /// Parse `internal:<path>`
    pub fn parse(url: &str, context: &Arc<Context>) -> Result<Self> {
        let path = url
            .strip_prefix("internal:")
            .ok_or_else(|| LocatorError::parse(url, "expected internal: scheme"))?;
        Ok(Self::new(path, context))
    }

    /// Create a URL for a path that must already be registered
    pub fn new_valid(path: impl Into<String>, context: &Arc<Context>) -> Result<Self> {
        let url = Self::new(path, context);
        url.validate()?;
        Ok(url)
    }

    /// Pin this URL to `content`, bypassing the registry
    pub fn set_content(&mut self, content: impl Into<Vec<u8>>) {
        self.content = Some(Arc::from(content.into()));
    }

    pub fn key(&self) -> String {
        format!("internal:{}", self.path)
    }

    pub fn format(&self) -> String {
        get_format(&self.path)
    }

    pub fn origin(&self) -> Self {
        Self::new(origin_dir(&self.path), &self.context)
    }

    pub fn relative(&self, path: &str) -> Self {
        Self::new(join(&self.path, path), &self.context)
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    fn content(&self) -> Option<Arc<[u8]>> {
        self.content
            .clone()
            .or_else(|| self.context.internal().get(&self.path))
    }

    pub fn validate(&self) -> Result<()> {
        if self.content.is_some() || self.context.internal().contains(&self.path) {
            Ok(())
        } else {
            Err(LocatorError::not_found(format!(
                "internal URL not found: {}",
                self.path
            )))
        }
    }

    pub fn open(&self) -> Result<Box<dyn Read + Send>> {
        let content = self.content().ok_or_else(|| {
            LocatorError::not_found(format!("internal URL not found: {}", self.path))
        })?;
        Ok(Box::new(Cursor::new(content)))
    }
}

/// Read `reader` to the end and register it under `path`
pub fn read_to_internal_url(
    path: &str,
    mut reader: impl Read,
    context: &Arc<Context>,
) -> Result<InternalUrl> {
    let mut content = Vec::new();
    reader.read_to_end(&mut content)?;
    context.internal().register(path, content)?;
    Ok(InternalUrl::new(path, context))
}

/// Capture standard input under a fresh `<stdin:UUID>[.format]` path
pub fn read_to_internal_url_from_stdin(
    format: Option<&str>,
    context: &Arc<Context>,
) -> Result<InternalUrl> {
    read_to_internal_url(&stdin_path(format), std::io::stdin().lock(), context)
}

fn stdin_path(format: Option<&str>) -> String {
    let mut path = format!("<stdin:{}>", Uuid::now_v7());
    if let Some(format) = format.filter(|f| !f.is_empty()) {
        path.push('.');
        path.push_str(format);
    }
    path
}
