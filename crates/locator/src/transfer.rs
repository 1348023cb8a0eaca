//! Reading URLs to memory and copying them to disk

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{LocatorError, Result};
use crate::url::Url;
use crate::util::delete_temporary_file;

/// Read the whole resource
pub fn read_bytes(url: &Url) -> Result<Vec<u8>> {
    let mut content = Vec::new();
    url.open()?.read_to_end(&mut content)?;
    Ok(content)
}

/// Read the whole resource as UTF-8 text
pub fn read_string(url: &Url) -> Result<String> {
    String::from_utf8(read_bytes(url)?)
        .map_err(|e| LocatorError::Serialization(format!("{} is not valid UTF-8: {}", url, e)))
}

/// Size of the resource in bytes, found by reading it
pub fn size(url: &Url) -> Result<u64> {
    Ok(io::copy(&mut url.open()?, &mut io::sink())?)
}

/// Copy the resource to `path`
///
/// A partially written file is removed when the copy fails.
pub fn download_to(url: &Url, path: &Path) -> Result<()> {
    let mut reader = url.open()?;
    let mut file = File::create(path)?;

    let copied = io::copy(&mut reader, &mut file).and_then(|_| file.flush());
    if let Err(e) = copied {
        drop(file);
        if let Err(cleanup) = delete_temporary_file(path) {
            tracing::warn!("could not remove partial download {}: {}", path.display(), cleanup);
        }
        return Err(e.into());
    }
    Ok(())
}

/// Copy the resource straight from its source into a new temporary file
///
/// The file name starts with `prefix`. The caller owns the returned path.
pub fn download(url: &Url, prefix: &str) -> Result<PathBuf> {
    let mut reader = url.fetch()?;
    let mut temp = tempfile::Builder::new().prefix(prefix).tempfile()?;
    tracing::info!("downloading {} to temporary file {}", url, temp.path().display());

    // Dropping `temp` on error removes the partial file
    io::copy(&mut reader, temp.as_file_mut())?;
    temp.as_file_mut().flush()?;

    let (_, path) = temp.keep().map_err(|e| LocatorError::Io(e.error))?;
    Ok(path)
}
