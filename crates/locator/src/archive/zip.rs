//! Entries of zip archives
//!
//! Zip needs random access to its central directory, so the archive is
//! first materialized to a local file through the context, whatever URL it
//! comes from.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;
use std::thread;

use ::zip::ZipArchive;

use crate::context::Context;
use crate::error::{LocatorError, Result};
use crate::format::get_format;
use crate::pipe::{PipeReader, pipe};
use crate::url::{Url, new_url, split_archive};
use crate::util::{join, origin_dir};

/// Metadata of one zip entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipEntry {
    pub path: String,
    pub size: u64,
    pub is_dir: bool,
    pub mode: Option<u32>,
}

impl ZipEntry {
    pub fn is_executable(&self) -> bool {
        self.mode.is_some_and(|mode| mode & 0o111 != 0)
    }
}

/// Indexed reader over a local zip file
pub struct ZipReader {
    archive: ZipArchive<File>,
}

impl ZipReader {
    pub fn open(path: &Path) -> Result<Self> {
        let archive = ZipArchive::new(File::open(path)?)?;
        Ok(Self { archive })
    }

    /// Whether a file entry named `name` exists
    pub fn has(&self, name: &str) -> bool {
        !is_dir_name(name) && self.archive.file_names().any(|entry| entry == name)
    }

    /// Call `visit` for every entry until it returns `false`
    pub fn iterate(&mut self, mut visit: impl FnMut(&ZipEntry) -> bool) -> Result<()> {
        for index in 0..self.archive.len() {
            let entry = self.entry_at(index)?;
            if !visit(&entry) {
                break;
            }
        }
        Ok(())
    }

    /// Read the entry at `index` through `visit`
    pub fn visit_entry<T>(
        &mut self,
        index: usize,
        visit: impl FnOnce(&ZipEntry, &mut dyn Read) -> Result<T>,
    ) -> Result<T> {
        let mut file = self.archive.by_index(index)?;
        let entry = ZipEntry {
            path: file.name().to_string(),
            size: file.size(),
            is_dir: file.is_dir(),
            mode: file.unix_mode(),
        };
        visit(&entry, &mut file)
    }

    pub fn len(&self) -> usize {
        self.archive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archive.is_empty()
    }

    fn entry_at(&mut self, index: usize) -> Result<ZipEntry> {
        let file = self.archive.by_index_raw(index)?;
        Ok(ZipEntry {
            path: file.name().to_string(),
            size: file.size(),
            is_dir: file.is_dir(),
            mode: file.unix_mode(),
        })
    }

    /// Stream the entry named `name`
    ///
    /// A thread owning the archive decompresses the entry into a pipe, so
    /// the reader checks the entry CRC like any other zip read.
    pub fn entry(mut self, name: &str) -> Result<Option<ZipEntryReader>> {
        if is_dir_name(name) {
            return Ok(None);
        }
        let Some(index) = self.archive.index_for_name(name) else {
            return Ok(None);
        };

        let (reader, mut writer) = pipe();
        thread::Builder::new()
            .name("zip-entry".to_string())
            .spawn(move || {
                let copied = self
                    .archive
                    .by_index(index)
                    .map_err(LocatorError::from)
                    .and_then(|mut file| Ok(io::copy(&mut file, &mut writer)?));
                match copied {
                    Ok(_) => writer.close(),
                    Err(e) => writer.close_with_error(e),
                }
            })?;

        Ok(Some(ZipEntryReader { inner: reader }))
    }
}

fn is_dir_name(name: &str) -> bool {
    name.is_empty() || name.ends_with('/')
}

/// Owned reader over one zip entry
pub struct ZipEntryReader {
    inner: PipeReader,
}

impl Read for ZipEntryReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

/// An entry inside a zip archive addressed by any other URL
#[derive(Clone)]
pub struct ZipUrl {
    pub path: String,
    pub archive_url: Box<Url>,
}

impl fmt::Debug for ZipUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZipUrl")
            .field("archive_url", &self.archive_url)
            .field("path", &self.path)
            .finish()
    }
}

impl fmt::Display for ZipUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "zip:{}!/{}", self.archive_url, self.path)
    }
}

impl ZipUrl {
    pub fn new(path: &str, archive_url: Url) -> Self {
        Self {
            path: path.trim_start_matches('/').to_string(),
            archive_url: Box::new(archive_url),
        }
    }

    /// Parse `zip:<archive URL>!/<path>`
    pub fn parse(url: &str, context: &Arc<Context>) -> Result<Self> {
        let (archive, path) = split_archive(url, "zip")?;
        Ok(Self::new(path, new_url(archive, context)?))
    }

    pub fn key(&self) -> String {
        format!("zip:{}!/{}", self.archive_url.key(), self.path)
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
        }
    }

    /// Materialize the archive locally and index it
    pub fn open_archive(&self) -> Result<ZipReader> {
        let local = self.context().get_local_path(&self.archive_url)?;
        ZipReader::open(&local)
    }

    pub fn validate(&self) -> Result<()> {
        if self.open_archive()?.has(&self.path) {
            Ok(())
        } else {
            Err(self.not_found())
        }
    }

    pub fn open(&self) -> Result<Box<dyn Read + Send>> {
        match self.open_archive()?.entry(&self.path)? {
            Some(entry) => Ok(Box::new(entry)),
            None => Err(self.not_found()),
        }
    }

    fn not_found(&self) -> LocatorError {
        LocatorError::not_found(format!(
            "path {} not found in zip {}",
            self.path, self.archive_url
        ))
    }
}
