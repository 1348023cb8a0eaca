//! Entries of tar and tar.gz archives
//!
//! Tar has no index: every lookup scans the archive from the start. An
//! opened entry is streamed by a thread that owns the archive, so callers
//! get a plain owned reader.

use std::fmt;
use std::io::{self, Read};
use std::sync::Arc;
use std::thread;

use crossbeam::channel;
use flate2::read::GzDecoder;
use tar::{Archive, EntryType};

use crate::context::Context;
use crate::error::{LocatorError, Result};
use crate::format::get_format;
use crate::pipe::{PipeReader, pipe};
use crate::url::{Url, new_url, split_archive};
use crate::util::{join, origin_dir};

/// Header of one tar entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TarEntry {
    /// Path inside the archive, without a leading `./` or `/`
    pub path: String,
    pub size: u64,
    pub mode: u32,
    pub entry_type: EntryType,
}

impl TarEntry {
    fn from_entry<R: Read>(entry: &tar::Entry<'_, R>) -> Result<Self> {
        let header = entry.header();
        Ok(Self {
            path: normalize_entry_path(&entry.path()?.to_string_lossy()),
            size: entry.size(),
            mode: header.mode().unwrap_or(0o644),
            entry_type: header.entry_type(),
        })
    }

    pub fn is_file(&self) -> bool {
        self.entry_type.is_file() || self.entry_type == EntryType::Continuous
    }

    pub fn is_dir(&self) -> bool {
        self.entry_type.is_dir()
    }

    pub fn is_executable(&self) -> bool {
        self.mode & 0o111 != 0
    }
}

/// Forward-only reader over the entries of a tar stream
pub struct TarballReader {
    archive: Archive<Box<dyn Read + Send>>,
}

impl TarballReader {
    pub fn new(stream: Box<dyn Read + Send>) -> Self {
        Self {
            archive: Archive::new(stream),
        }
    }

    /// Reader over a gzip-compressed tar stream
    pub fn gzip(stream: Box<dyn Read + Send>) -> Self {
        Self::new(Box::new(GzDecoder::new(stream)))
    }

    /// Call `visit` with every entry and its data until it returns `false`
    pub fn for_each_entry(
        mut self,
        mut visit: impl FnMut(&TarEntry, &mut dyn Read) -> Result<bool>,
    ) -> Result<()> {
        for entry in self.archive.entries()? {
            let mut entry = entry?;
            let meta = TarEntry::from_entry(&entry)?;
            if !visit(&meta, &mut entry)? {
                break;
            }
        }
        Ok(())
    }

    /// Whether a regular file named `path` exists
    pub fn has(self, path: &str) -> Result<bool> {
        let mut found = false;
        self.for_each_entry(|entry, _| {
            found = entry.is_file() && entry.path == path;
            Ok(!found)
        })?;
        Ok(found)
    }

    /// Call `visit` for every entry until it returns `false`
    pub fn iterate(self, mut visit: impl FnMut(&TarEntry) -> bool) -> Result<()> {
        self.for_each_entry(|entry, _| Ok(visit(entry)))
    }

    /// Consume the reader and stream the regular file named `path`
    pub fn open(self, path: &str) -> Result<Option<TarballEntryReader>> {
        let path = path.to_string();
        self.open_where(move |entry| entry.is_file() && entry.path == path)
    }

    /// Consume the reader and stream the first entry matching `predicate`
    ///
    /// The scan runs on its own thread; the call returns once the entry is
    /// found or the archive is exhausted.
    pub fn open_where(
        self,
        mut predicate: impl FnMut(&TarEntry) -> bool + Send + 'static,
    ) -> Result<Option<TarballEntryReader>> {
        let (reader, writer) = pipe();
        let (found_tx, found_rx) = channel::bounded::<Result<Option<TarEntry>>>(1);

        thread::Builder::new()
            .name("tar-entry".to_string())
            .spawn(move || {
                let mut writer = Some(writer);
                let scanned = self.for_each_entry(|meta, data| {
                    if !predicate(meta) {
                        return Ok(true);
                    }
                    let _ = found_tx.send(Ok(Some(meta.clone())));
                    if let Some(mut writer) = writer.take() {
                        match copy_entry(meta, data, &mut writer) {
                            Ok(()) => writer.close(),
                            Err(e) => writer.close_with_error(e),
                        }
                    }
                    Ok(false)
                });
                // Only reports when no entry was handed over
                if writer.is_some() {
                    let _ = found_tx.send(scanned.map(|()| None));
                }
            })?;

        match found_rx.recv() {
            Ok(Ok(Some(entry))) => Ok(Some(TarballEntryReader { entry, reader })),
            Ok(Ok(None)) => Ok(None),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(LocatorError::Archive {
                message: "tar reader stopped unexpectedly".to_string(),
            }),
        }
    }
}

fn copy_entry(
    entry: &TarEntry,
    data: &mut dyn Read,
    writer: &mut impl io::Write,
) -> Result<()> {
    let copied = io::copy(data, writer)?;
    if copied < entry.size {
        return Err(LocatorError::Archive {
            message: format!("tar entry {} truncated", entry.path),
        });
    }
    Ok(())
}

/// Owned reader over one tar entry
pub struct TarballEntryReader {
    entry: TarEntry,
    reader: PipeReader,
}

impl TarballEntryReader {
    pub fn entry(&self) -> &TarEntry {
        &self.entry
    }
}

impl Read for TarballEntryReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

fn normalize_entry_path(path: &str) -> String {
    let mut path = path;
    loop {
        if let Some(stripped) = path.strip_prefix("./") {
            path = stripped;
        } else if let Some(stripped) = path.strip_prefix('/') {
            path = stripped;
        } else {
            return path.to_string();
        }
    }
}

/// An entry inside a tar or tar.gz archive addressed by any other URL
#[derive(Clone)]
pub struct TarballUrl {
    pub path: String,
    pub archive_url: Box<Url>,
    pub archive_format: String,
}

impl fmt::Debug for TarballUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TarballUrl")
            .field("archive_url", &self.archive_url)
            .field("archive_format", &self.archive_format)
            .field("path", &self.path)
            .finish()
    }
}

impl fmt::Display for TarballUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tar:{}!/{}", self.archive_url, self.path)
    }
}

impl TarballUrl {
    /// Entry `path` of `archive_url`; the format defaults to the archive's extension
    pub fn new(path: &str, archive_url: Url, archive_format: Option<&str>) -> Self {
        let archive_format = archive_format
            .map(str::to_string)
            .unwrap_or_else(|| archive_url.format());
        Self {
            path: path.trim_start_matches('/').to_string(),
            archive_url: Box::new(archive_url),
            archive_format,
        }
    }

    /// Parse `tar:<archive URL>!/<path>`
    pub fn parse(url: &str, context: &Arc<Context>) -> Result<Self> {
        let (archive, path) = split_archive(url, "tar")?;
        Ok(Self::new(path, new_url(archive, context)?, None))
    }

    pub fn key(&self) -> String {
        format!("tar:{}!/{}", self.archive_url.key(), self.path)
    }

    pub fn format(&self) -> String {
        get_format(&self.path)
    }

    pub fn origin(&self) -> Self {
        self.with_path(&origin_dir(&self.path))
    }

    pub fn relative(&self, path: &str) -> Self {
        self.with_path(&join(&self.path, path))
    }

    pub fn context(&self) -> &Arc<Context> {
        self.archive_url.context()
    }

    fn with_path(&self, path: &str) -> Self {
        Self {
            path: path.trim_start_matches('/').to_string(),
            archive_url: self.archive_url.clone(),
            archive_format: self.archive_format.clone(),
        }
    }

    /// Start a fresh scan of the archive
    pub fn open_archive(&self) -> Result<TarballReader> {
        let gzip = match self.archive_format.as_str() {
            "tar" => false,
            "tar.gz" => true,
            other => {
                return Err(LocatorError::ArchiveFormat {
                    format: other.to_string(),
                });
            }
        };
        let stream = self.archive_url.open()?;
        Ok(if gzip {
            TarballReader::gzip(stream)
        } else {
            TarballReader::new(stream)
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.open_archive()?.has(&self.path)? {
            Ok(())
        } else {
            Err(self.not_found())
        }
    }

    pub fn open(&self) -> Result<Box<dyn Read + Send>> {
        match self.open_archive()?.open(&self.path)? {
            Some(entry) => Ok(Box::new(entry)),
            None => Err(self.not_found()),
        }
    }

    fn not_found(&self) -> LocatorError {
        LocatorError::not_found(format!(
            "path {} not found in tarball {}",
            self.path, self.archive_url
        ))
    }
}
