//! Per-session cache, credential and transport store
//!
//! A [`Context`] owns every temporary artifact created while resolving URLs:
//! downloaded files (keyed by [`Url::key`]) and git clones (keyed by
//! repository identity). Entries are populated lazily on first access and
//! removed only by [`Context::release`] or when the context is dropped.
//!
//! # Locking
//!
//! One mutex guards each key map, and every key owns a slot mutex that is
//! held for the whole download, clone or pull of that key. Requests for the
//! same key are therefore serialized and fetched at most once, while distinct
//! keys proceed in parallel. Nested archive URLs re-enter the context for
//! their inner key while an outer key is being materialized; per-key slots
//! make that re-entry safe.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use crate::config::LocatorConfig;
use crate::credentials::{CredentialStore, Credentials};
use crate::docker::{ImageSource, OciImageSource};
use crate::error::{LocatorError, Result};
use crate::internal::InternalRegistry;
use crate::transfer;
use crate::transport::{HttpTransport, Transport};
use crate::url::Url;
use crate::util::{delete_temporary_dir, delete_temporary_file, sanitize_filename};

const DEFAULT_TEMP_PREFIX: &str = "locator";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Lifecycle of one cache key
#[derive(Debug)]
enum Slot {
    /// Not fetched yet (or its backing path vanished)
    Unresolved,
    /// Materialized at this local path
    Cached(PathBuf),
    /// Removed by `release`; the key must be looked up again
    Deleted,
}

/// Key → slot table
#[derive(Default)]
struct SlotMap {
    slots: Mutex<HashMap<String, Arc<Mutex<Slot>>>>,
}

impl SlotMap {
    fn slot(&self, key: &str) -> Arc<Mutex<Slot>> {
        lock(&self.slots)
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Slot::Unresolved)))
            .clone()
    }

    /// Materialize `key`, reusing a cached path that still exists on disk
    fn resolve(
        &self,
        key: &str,
        on_hit: impl FnOnce(&Path),
        create: impl FnOnce() -> Result<PathBuf>,
    ) -> Result<PathBuf> {
        loop {
            let slot = self.slot(key);
            let mut state = lock(&slot);

            match &*state {
                Slot::Cached(path) if path.exists() => {
                    tracing::debug!("cache hit for {} at {}", key, path.display());
                    let path = path.clone();
                    on_hit(&path);
                    return Ok(path);
                }
                Slot::Cached(path) => {
                    tracing::warn!(
                        "cached path {} for {} vanished, fetching again",
                        path.display(),
                        key
                    );
                    *state = Slot::Unresolved;
                }
                // Released while we waited; the map now holds a fresh slot
                Slot::Deleted => continue,
                Slot::Unresolved => {}
            }

            let path = create()?;
            *state = Slot::Cached(path.clone());
            return Ok(path);
        }
    }

    /// Remove every slot, returning the paths that were cached
    fn drain(&self) -> Vec<PathBuf> {
        let slots: Vec<_> = lock(&self.slots).drain().map(|(_, slot)| slot).collect();

        slots
            .into_iter()
            .filter_map(|slot| match std::mem::replace(&mut *lock(&slot), Slot::Deleted) {
                Slot::Cached(path) => Some(path),
                _ => None,
            })
            .collect()
    }

    fn cached_paths(&self) -> Vec<PathBuf> {
        let slots: Vec<_> = lock(&self.slots).values().cloned().collect();
        slots
            .iter()
            .filter_map(|slot| match &*lock(slot) {
                Slot::Cached(path) => Some(path.clone()),
                _ => None,
            })
            .collect()
    }
}

/// Cache, credential and transport store shared by the URLs of one session
pub struct Context {
    temp_prefix: String,
    http_timeout: Duration,
    files: SlotMap,
    dirs: SlotMap,
    credentials: RwLock<CredentialStore>,
    transports: RwLock<HashMap<String, Arc<dyn Transport>>>,
    image_sources: RwLock<HashMap<String, Arc<dyn ImageSource>>>,
    mappings: RwLock<HashMap<String, String>>,
    default_transport: Mutex<Option<Arc<dyn Transport>>>,
    internal: InternalRegistry,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("temp_prefix", &self.temp_prefix)
            .field("files", &self.files.cached_paths())
            .field("dirs", &self.dirs.cached_paths())
            .finish_non_exhaustive()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Create an empty context with default settings
    pub fn new() -> Self {
        Self {
            temp_prefix: DEFAULT_TEMP_PREFIX.to_string(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            files: SlotMap::default(),
            dirs: SlotMap::default(),
            credentials: RwLock::new(CredentialStore::default()),
            transports: RwLock::new(HashMap::new()),
            image_sources: RwLock::new(HashMap::new()),
            mappings: RwLock::new(HashMap::new()),
            default_transport: Mutex::new(None),
            internal: InternalRegistry::default(),
        }
    }

    /// Create a context from a configuration file
    pub fn from_config(config: &LocatorConfig) -> Result<Self> {
        let mut context = Self::new();
        context.temp_prefix = config.temp_prefix.clone();
        context.http_timeout = Duration::from_secs(config.http_timeout_secs);
        context.credentials = RwLock::new(config.resolved_credentials()?);
        context.mappings = RwLock::new(config.mappings.clone());
        Ok(context)
    }

    /// Wrap in an `Arc`, the form URLs hold on to
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    // ============ Registries ============

    /// In-process buffers addressable as `internal:` URLs
    pub fn internal(&self) -> &InternalRegistry {
        &self.internal
    }

    /// Rewrite `from` to `to` before any URL string is parsed
    pub fn set_mapping(&self, from: impl Into<String>, to: impl Into<String>) {
        self.mappings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(from.into(), to.into());
    }

    /// Apply the URL mapping table to `url`
    pub fn map_url(&self, url: &str) -> String {
        self.mappings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .cloned()
            .unwrap_or_else(|| url.to_string())
    }

    pub fn set_credentials(&self, host: &str, credentials: Credentials) {
        self.credentials
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .set(host, credentials);
    }

    pub fn credentials(&self, host: &str) -> Option<Credentials> {
        self.credentials
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(host)
            .cloned()
    }

    /// Route HTTP requests for `host` through `transport`
    pub fn set_transport(&self, host: &str, transport: Arc<dyn Transport>) {
        self.transports
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(host.to_string(), transport);
    }

    /// Transport for `host`: the override if one is set, else the shared HTTP client
    pub fn transport_for(&self, host: &str) -> Result<Arc<dyn Transport>> {
        if let Some(transport) = self
            .transports
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(host)
        {
            return Ok(transport.clone());
        }

        let mut default = lock(&self.default_transport);
        if let Some(transport) = default.as_ref() {
            return Ok(transport.clone());
        }
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(self.http_timeout)?);
        *default = Some(transport.clone());
        Ok(transport)
    }

    /// Route image pulls from `registry` through `source`
    pub fn set_image_source(&self, registry: &str, source: Arc<dyn ImageSource>) {
        self.image_sources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(registry.to_string(), source);
    }

    pub fn image_source_for(&self, registry: &str) -> Arc<dyn ImageSource> {
        self.image_sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(registry)
            .cloned()
            .unwrap_or_else(|| Arc::new(OciImageSource::default()))
    }

    // ============ Materialization ============

    /// Prefix for temporary paths created on behalf of `key`
    pub(crate) fn temp_name_prefix(&self, key: &str) -> String {
        format!("{}-{}-", self.temp_prefix, sanitize_filename(key))
    }

    /// Local, seekable path holding the content of `url`
    ///
    /// File URLs map to themselves and git URLs to their worktree. Every
    /// other variant is downloaded once into a temporary file and memoized
    /// under its rendered URL, which keeps the git ref and docker format that
    /// [`Url::key`] leaves out; a memoized file that vanished is fetched again.
    pub fn get_local_path(&self, url: &Url) -> Result<PathBuf> {
        match url {
            Url::File(file) => Ok(file.local_path()),
            Url::Git(git) => git.local_path(),
            other => {
                let identity = other.to_string();
                self.files.resolve(&identity, |_| {}, || {
                    transfer::download(other, &self.temp_name_prefix(&identity))
                })
            }
        }
    }

    /// Open the local copy of `url`, materializing it first if needed
    pub fn open(&self, url: &Url) -> Result<File> {
        match url {
            Url::File(file) => file.open_file(),
            other => {
                let path = self.get_local_path(other)?;
                Ok(File::open(path)?)
            }
        }
    }

    /// Clone directory for a repository key, created by `clone` on first use
    ///
    /// A cached directory is handed to `refresh` before being returned.
    pub(crate) fn cached_dir(
        &self,
        key: &str,
        refresh: impl FnOnce(&Path),
        clone: impl FnOnce() -> Result<PathBuf>,
    ) -> Result<PathBuf> {
        self.dirs.resolve(key, refresh, clone)
    }

    /// Every temporary file and directory currently owned by this context
    pub fn temporary_paths(&self) -> Vec<PathBuf> {
        let mut paths = self.files.cached_paths();
        paths.extend(self.dirs.cached_paths());
        paths
    }

    /// Delete every temporary file and directory created through this context
    ///
    /// Paths already removed by someone else count as deleted. A failed
    /// deletion does not stop the remaining ones; all failures are reported
    /// together. Calling it again is a no-op.
    pub fn release(&self) -> Result<()> {
        let mut failures = Vec::new();

        for path in self.files.drain() {
            if let Err(e) = delete_temporary_file(&path) {
                failures.push(format!("{}: {}", path.display(), e));
            }
        }
        for path in self.dirs.drain() {
            if let Err(e) = delete_temporary_dir(&path) {
                failures.push(format!("{}: {}", path.display(), e));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(LocatorError::Cleanup { failures })
        }
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!("context cleanup incomplete: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[test]
    fn test_slot_fetches_once() {
        let temp = TempDir::new().unwrap();
        let slots = SlotMap::default();
        let calls = AtomicUsize::new(0);
        let target = temp.path().join("a");

        for _ in 0..3 {
            let path = slots
                .resolve("k", |_| {}, || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    std::fs::write(&target, "x")?;
                    Ok(target.clone())
                })
                .unwrap();
            assert_eq!(path, target);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_slot_refetches_vanished_path() {
        let temp = TempDir::new().unwrap();
        let slots = SlotMap::default();
        let calls = AtomicUsize::new(0);
        let target = temp.path().join("a");

        let fetch = || -> Result<PathBuf> {
            calls.fetch_add(1, Ordering::SeqCst);
            std::fs::write(&target, "x")?;
            Ok(target.clone())
        };
        slots.resolve("k", |_| {}, fetch).unwrap();
        std::fs::remove_file(&target).unwrap();
        slots.resolve("k", |_| {}, fetch).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failed_create_leaves_slot_unresolved() {
        let slots = SlotMap::default();

        let err = slots
            .resolve("k", |_| {}, || Err(LocatorError::transport("offline")))
            .unwrap_err();
        assert!(err.is_transport());
        assert!(slots.cached_paths().is_empty());
    }

    #[test]
    fn test_hit_callback_runs_on_reuse_only() {
        let temp = TempDir::new().unwrap();
        let slots = SlotMap::default();
        let hits = AtomicUsize::new(0);
        let dir = temp.path().to_path_buf();

        for _ in 0..2 {
            slots
                .resolve(
                    "repo",
                    |_| {
                        hits.fetch_add(1, Ordering::SeqCst);
                    },
                    || Ok(dir.clone()),
                )
                .unwrap();
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_mappings() {
        let context = Context::new();
        context.set_mapping("https://example.com/a.yaml", "internal:a.yaml");

        assert_eq!(context.map_url("https://example.com/a.yaml"), "internal:a.yaml");
        assert_eq!(context.map_url("other"), "other");
    }

    #[test]
    fn test_credentials_by_host() {
        let context = Context::new();
        context.set_credentials("git.example.com", Credentials::basic("u", "p"));

        assert_eq!(context.credentials("git.example.com").unwrap().username, "u");
        assert!(context.credentials("other.example.com").is_none());
    }

    #[test]
    fn test_release_is_idempotent() {
        let context = Context::new();
        assert!(context.release().is_ok());
        assert!(context.release().is_ok());
    }
}
