//! The closed set of URL variants, parsing and relative resolution
//!
//! ```text
//! file:<path> | <bare-path>
//! http(s)://...
//! git:<repoURL>[#ref]!/<path>
//! docker:<host>/<repo>:<tag>
//! tar:<archiveURL>!/<path>
//! zip:<archiveURL>!/<path>
//! internal:<path>
//! ```

use std::fmt;
use std::io::Read;
use std::sync::Arc;

use crate::archive::{TarballUrl, ZipUrl};
use crate::context::Context;
use crate::docker::DockerUrl;
use crate::error::{LocatorError, Result};
use crate::file::FileUrl;
use crate::git::GitUrl;
use crate::internal::InternalUrl;
use crate::network::NetworkUrl;

/// A resource locator
///
/// Equality compares [`key`](Url::key)s.
#[derive(Clone)]
pub enum Url {
    File(FileUrl),
    Network(NetworkUrl),
    Git(GitUrl),
    Docker(DockerUrl),
    Tarball(TarballUrl),
    Zip(ZipUrl),
    Internal(InternalUrl),
}

impl Url {
    /// Canonical, credential-free identity used for caching and equality
    pub fn key(&self) -> String {
        match self {
            Url::File(u) => u.key(),
            Url::Network(u) => u.key(),
            Url::Git(u) => u.key(),
            Url::Docker(u) => u.key(),
            Url::Tarball(u) => u.key(),
            Url::Zip(u) => u.key(),
            Url::Internal(u) => u.key(),
        }
    }

    /// Content format hint derived from the path's extension
    pub fn format(&self) -> String {
        match self {
            Url::File(u) => u.format(),
            Url::Network(u) => u.format(),
            Url::Git(u) => u.format(),
            Url::Docker(u) => u.format(),
            Url::Tarball(u) => u.format(),
            Url::Zip(u) => u.format(),
            Url::Internal(u) => u.format(),
        }
    }

    /// Slash path of the resource within its variant
    pub fn path(&self) -> String {
        match self {
            Url::File(u) => u.path.clone(),
            Url::Network(u) => u.path().to_string(),
            Url::Git(u) => u.path.clone(),
            Url::Docker(u) => u.reference.repository.clone(),
            Url::Tarball(u) => u.path.clone(),
            Url::Zip(u) => u.path.clone(),
            Url::Internal(u) => u.path.clone(),
        }
    }

    /// Directory-like base of the same variant for relative resolution
    pub fn origin(&self) -> Url {
        match self {
            Url::File(u) => Url::File(u.origin()),
            Url::Network(u) => Url::Network(u.origin()),
            Url::Git(u) => Url::Git(u.origin()),
            Url::Docker(u) => Url::Docker(u.origin()),
            Url::Tarball(u) => Url::Tarball(u.origin()),
            Url::Zip(u) => Url::Zip(u.origin()),
            Url::Internal(u) => Url::Internal(u.origin()),
        }
    }

    /// URL of `path` resolved against this one with slash-path semantics
    pub fn relative(&self, path: &str) -> Url {
        match self {
            Url::File(u) => Url::File(u.relative(path)),
            Url::Network(u) => Url::Network(u.relative(path)),
            Url::Git(u) => Url::Git(u.relative(path)),
            Url::Docker(u) => Url::Docker(u.relative(path)),
            Url::Tarball(u) => Url::Tarball(u.relative(path)),
            Url::Zip(u) => Url::Zip(u.relative(path)),
            Url::Internal(u) => Url::Internal(u.relative(path)),
        }
    }

    pub fn context(&self) -> &Arc<Context> {
        match self {
            Url::File(u) => u.context(),
            Url::Network(u) => u.context(),
            Url::Git(u) => u.context(),
            Url::Docker(u) => u.context(),
            Url::Tarball(u) => u.context(),
            Url::Zip(u) => u.context(),
            Url::Internal(u) => u.context(),
        }
    }

    /// Check that the resource exists, materializing it when that is the only way to tell
    ///
    /// An absent resource is [`LocatorError::NotFound`].
    pub fn validate(&self) -> Result<()> {
        match self {
            Url::File(u) => u.validate(),
            Url::Network(_) => self.context().get_local_path(self).map(|_| ()),
            Url::Git(u) => u.validate(),
            Url::Docker(u) => u.validate(),
            Url::Tarball(u) => u.validate(),
            Url::Zip(u) => u.validate(),
            Url::Internal(u) => u.validate(),
        }
    }

    /// Byte stream of the resource
    ///
    /// Network content is downloaded once per context and served from the
    /// local copy.
    pub fn open(&self) -> Result<Box<dyn Read + Send>> {
        match self {
            Url::File(u) => u.open(),
            Url::Network(_) => Ok(Box::new(self.context().open(self)?)),
            Url::Git(u) => u.open(),
            Url::Docker(u) => u.open(),
            Url::Tarball(u) => u.open(),
            Url::Zip(u) => u.open(),
            Url::Internal(u) => u.open(),
        }
    }

    /// Byte stream straight from the source, bypassing the context cache
    pub(crate) fn fetch(&self) -> Result<Box<dyn Read + Send>> {
        match self {
            Url::Network(u) => u.fetch(),
            other => other.open(),
        }
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Url::Git(u) => fmt::Display::fmt(u, f),
            Url::Docker(u) => fmt::Display::fmt(u, f),
            Url::Tarball(u) => fmt::Display::fmt(u, f),
            Url::Zip(u) => fmt::Display::fmt(u, f),
            other => f.write_str(&other.key()),
        }
    }
}

impl fmt::Debug for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Url::File(u) => fmt::Debug::fmt(u, f),
            Url::Network(u) => fmt::Debug::fmt(u, f),
            Url::Git(u) => fmt::Debug::fmt(u, f),
            Url::Docker(u) => fmt::Debug::fmt(u, f),
            Url::Tarball(u) => fmt::Debug::fmt(u, f),
            Url::Zip(u) => fmt::Debug::fmt(u, f),
            Url::Internal(u) => fmt::Debug::fmt(u, f),
        }
    }
}

impl PartialEq for Url {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Url {}

impl From<FileUrl> for Url {
    fn from(url: FileUrl) -> Self {
        Url::File(url)
    }
}

impl From<NetworkUrl> for Url {
    fn from(url: NetworkUrl) -> Self {
        Url::Network(url)
    }
}

impl From<GitUrl> for Url {
    fn from(url: GitUrl) -> Self {
        Url::Git(url)
    }
}

impl From<DockerUrl> for Url {
    fn from(url: DockerUrl) -> Self {
        Url::Docker(url)
    }
}

impl From<TarballUrl> for Url {
    fn from(url: TarballUrl) -> Self {
        Url::Tarball(url)
    }
}

impl From<ZipUrl> for Url {
    fn from(url: ZipUrl) -> Self {
        Url::Zip(url)
    }
}

impl From<InternalUrl> for Url {
    fn from(url: InternalUrl) -> Self {
        Url::Internal(url)
    }
}

/// Scheme of `url`, if it has one
///
/// Single letters are not schemes so `C:\x` stays a path.
pub(crate) fn scheme(url: &str) -> Option<&str> {
    let (scheme, _) = url.split_once(':')?;
    let mut chars = scheme.chars();
    let valid = scheme.len() > 1
        && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '-'));
    valid.then_some(scheme)
}

/// Split `<scheme>:<archive URL>!/<path>` into the archive URL and the path
pub(crate) fn split_archive<'a>(url: &'a str, scheme: &str) -> Result<(&'a str, &'a str)> {
    let rest = url
        .strip_prefix(scheme)
        .and_then(|rest| rest.strip_prefix(':'))
        .ok_or_else(|| LocatorError::parse(url, format!("expected {}: scheme", scheme)))?;
    let (archive, path) = rest
        .rsplit_once('!')
        .ok_or_else(|| LocatorError::parse(url, "missing '!' between archive URL and path"))?;
    if archive.is_empty() {
        return Err(LocatorError::parse(url, "empty archive URL"));
    }
    Ok((archive, path.trim_start_matches('/')))
}

/// Parse an absolute URL string into its variant
///
/// A string without a scheme is a file path. Context mappings apply first.
pub fn new_url(url: &str, context: &Arc<Context>) -> Result<Url> {
    let mapped = context.map_url(url);
    let url = mapped.as_str();
    if url.is_empty() {
        return Err(LocatorError::parse(url, "empty URL"));
    }

    let Some(scheme) = scheme(url) else {
        return Ok(Url::File(FileUrl::parse(url, context)?));
    };

    match scheme {
        "file" => Ok(Url::File(FileUrl::parse(url, context)?)),
        "http" | "https" => Ok(Url::Network(NetworkUrl::parse(url, context)?)),
        "git" => Ok(Url::Git(GitUrl::parse(url, context)?)),
        "docker" => Ok(Url::Docker(DockerUrl::parse(url, context)?)),
        "tar" => Ok(Url::Tarball(TarballUrl::parse(url, context)?)),
        "zip" => Ok(Url::Zip(ZipUrl::parse(url, context)?)),
        "internal" => Ok(Url::Internal(InternalUrl::parse(url, context)?)),
        other => Err(LocatorError::UnsupportedScheme {
            scheme: other.to_string(),
            url: url.to_string(),
        }),
    }
}

/// Resolve `url` to an existing resource
///
/// An absolute URL is parsed and validated. A relative path (bare or
/// `file:`) is tried against each origin in order, then against the current
/// directory; the first hit wins. Only [`LocatorError::NotFound`] moves on
/// to the next candidate; any other error is returned at once.
pub fn new_valid_url(url: &str, origins: &[Url], context: &Arc<Context>) -> Result<Url> {
    let mapped = context.map_url(url);
    let url = mapped.as_str();
    if url.is_empty() {
        return Err(LocatorError::parse(url, "empty URL"));
    }

    let (path, only_file) = match scheme(url) {
        Some("file") if !url.starts_with("file://") => (&url["file:".len()..], true),
        Some(_) => {
            let parsed = new_url(url, context)?;
            parsed.validate()?;
            return Ok(parsed);
        }
        None => (url, false),
    };
    if path.is_empty() {
        return Err(LocatorError::parse(url, "empty path"));
    }

    if path.starts_with('/') {
        return Ok(Url::File(FileUrl::new_valid(path, context)?));
    }

    for origin in origins {
        if only_file && !matches!(origin, Url::File(_)) {
            continue;
        }
        let candidate = origin.relative(path);
        tracing::debug!("trying {} relative to {}", path, origin);
        match candidate.validate() {
            Ok(()) => return Ok(candidate),
            Err(e) if e.is_not_found() => continue,
            Err(e) => return Err(e),
        }
    }

    match FileUrl::new_valid(path, context) {
        Ok(file) => Ok(Url::File(file)),
        Err(e) if e.is_not_found() => Err(LocatorError::not_found(format!("URL not found: {}", path))),
        Err(e) => Err(e),
    }
}
