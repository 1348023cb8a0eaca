//! Enumerate the files behind a URL
//!
//! A URL can stand for a directory, an archive to unpack, or a single file.
//! [`visit_files`] presents all three the same way: one callback per
//! regular file with its relative path, executable bit and content.

use std::fs::File;
use std::io::Read;

use walkdir::WalkDir;

use crate::archive::{TarballReader, ZipReader};
use crate::error::{LocatorError, Result};
use crate::url::Url;
use crate::util::base;

/// How to unpack the resource before visiting its files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unpack {
    Tar,
    TarGz,
    Zip,
}

impl Unpack {
    /// Unpack mode matching a format hint, if it names an archive
    pub fn from_format(format: &str) -> Option<Self> {
        match format {
            "tar" => Some(Unpack::Tar),
            "tar.gz" => Some(Unpack::TarGz),
            "zip" => Some(Unpack::Zip),
            _ => None,
        }
    }
}

/// One regular file handed to a visitor
pub struct ProvidedFile<'a> {
    /// Slash path relative to the directory or archive root
    pub path: String,
    pub executable: bool,
    pub reader: &'a mut dyn Read,
}

/// Call `visitor` for every regular file behind `url`
///
/// A local directory is walked recursively. With `unpack` set the resource
/// is read as that kind of archive. Otherwise the URL itself is the only
/// file, named after its last path element.
pub fn visit_files(
    url: &Url,
    unpack: Option<Unpack>,
    mut visitor: impl FnMut(ProvidedFile<'_>) -> Result<()>,
) -> Result<()> {
    match unpack {
        Some(Unpack::Tar) => visit_tarball(TarballReader::new(url.open()?), &mut visitor),
        Some(Unpack::TarGz) => visit_tarball(TarballReader::gzip(url.open()?), &mut visitor),
        Some(Unpack::Zip) => {
            let local = url.context().get_local_path(url)?;
            visit_zip(ZipReader::open(&local)?, &mut visitor)
        }
        None => {
            if let Url::File(file) = url {
                let path = file.local_path();
                if path.is_dir() {
                    return visit_directory(&path, &mut visitor);
                }
            }
            let mut reader = url.open()?;
            visitor(ProvidedFile {
                path: base(&url.path()).to_string(),
                executable: false,
                reader: &mut reader,
            })
        }
    }
}

fn visit_tarball(
    reader: TarballReader,
    visitor: &mut impl FnMut(ProvidedFile<'_>) -> Result<()>,
) -> Result<()> {
    reader.for_each_entry(|entry, content| {
        if entry.is_file() {
            visitor(ProvidedFile {
                path: entry.path.clone(),
                executable: entry.is_executable(),
                reader: content,
            })?;
        }
        Ok(true)
    })
}

fn visit_zip(
    mut reader: ZipReader,
    visitor: &mut impl FnMut(ProvidedFile<'_>) -> Result<()>,
) -> Result<()> {
    for index in 0..reader.len() {
        reader.visit_entry(index, |entry, content| {
            if entry.is_dir {
                return Ok(());
            }
            visitor(ProvidedFile {
                path: entry.path.clone(),
                executable: entry.is_executable(),
                reader: content,
            })
        })?;
    }
    Ok(())
}

fn visit_directory(
    root: &std::path::Path,
    visitor: &mut impl FnMut(ProvidedFile<'_>) -> Result<()>,
) -> Result<()> {
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| LocatorError::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");
        let executable = is_executable(&entry.metadata().map_err(|e| LocatorError::Io(e.into()))?);

        let mut file = File::open(entry.path())?;
        visitor(ProvidedFile {
            path: relative,
            executable,
            reader: &mut file,
        })?;
    }
    Ok(())
}

#[cfg(unix)]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &std::fs::Metadata) -> bool {
    false
}
