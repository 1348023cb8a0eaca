//! Slash-path helpers and temporary artifact cleanup
//!
//! URL paths always use `/` separators regardless of the host OS, so these
//! helpers never touch `std::path`.

use std::io::ErrorKind;
use std::path::Path;

use crate::error::Result;

/// Lexically normalize a slash path: collapse `//`, drop `.`, resolve `..`
pub fn clean(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }

    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|last| *last != "..") {
                    parts.pop();
                } else if !rooted {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{}", joined),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// Join two slash paths and normalize the result
pub fn join(base: &str, path: &str) -> String {
    match (base.is_empty(), path.is_empty()) {
        (true, true) => String::new(),
        (true, false) => clean(path),
        (false, true) => clean(base),
        (false, false) => clean(&format!("{}/{}", base, path)),
    }
}

/// Parent directory of a slash path
pub fn dir(path: &str) -> String {
    match path.rfind('/') {
        Some(index) => clean(&path[..=index]),
        None => ".".to_string(),
    }
}

/// Directory-like form of a path used as a relative-resolution base
pub fn origin_dir(path: &str) -> String {
    let parent = dir(path);
    if parent == "/" {
        parent
    } else {
        format!("{}/", parent)
    }
}

/// Last element of a slash path
pub fn base(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Make a URL key safe for use inside a temporary file name
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(64)
        .collect()
}

/// Delete a temporary file; a file that is already gone counts as deleted
pub fn delete_temporary_file(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::info!("deleted temporary file {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::info!("temporary file already deleted {}", path.display());
            Ok(())
        }
        Err(e) => {
            tracing::warn!("could not delete temporary file {}: {}", path.display(), e);
            Err(e.into())
        }
    }
}

/// Delete a temporary directory tree; a missing directory counts as deleted
pub fn delete_temporary_dir(path: &Path) -> Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => {
            tracing::info!("deleted temporary dir {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::info!("temporary dir already deleted {}", path.display());
            Ok(())
        }
        Err(e) => {
            tracing::warn!("could not delete temporary dir {}: {}", path.display(), e);
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_clean() {
        assert_eq!(clean("a/b/../c"), "a/c");
        assert_eq!(clean("/a//b/./c/"), "/a/b/c");
        assert_eq!(clean("../x"), "../x");
        assert_eq!(clean("/../x"), "/x");
        assert_eq!(clean("a/.."), ".");
        assert_eq!(clean(""), ".");
    }

    #[test]
    fn test_join() {
        assert_eq!(join("/a/b/", "c.yaml"), "/a/b/c.yaml");
        assert_eq!(join("./", "c.yaml"), "c.yaml");
        assert_eq!(join("a/b", "../c"), "a/c");
        assert_eq!(join("", "c"), "c");
    }

    #[test]
    fn test_dir_and_origin() {
        assert_eq!(dir("a/b/c.yaml"), "a/b");
        assert_eq!(dir("c.yaml"), ".");
        assert_eq!(dir("/c.yaml"), "/");
        assert_eq!(origin_dir("a/b/c.yaml"), "a/b/");
        assert_eq!(origin_dir("/c.yaml"), "/");
        assert_eq!(origin_dir("c.yaml"), "./");
    }

    #[test]
    fn test_base() {
        assert_eq!(base("a/b/c.yaml"), "c.yaml");
        assert_eq!(base("c.yaml"), "c.yaml");
        assert_eq!(base("a/b/"), "b");
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(
            sanitize_filename("tar:file:///pkg.tar.gz!/a.zip"),
            "tar_file____pkg.tar.gz__a.zip"
        );
        assert_eq!(sanitize_filename(&"x".repeat(100)).len(), 64);
    }

    #[test]
    fn test_delete_tolerates_missing_targets() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("gone.txt");
        let dir = temp.path().join("gone");

        assert!(delete_temporary_file(&file).is_ok());
        assert!(delete_temporary_dir(&dir).is_ok());

        std::fs::write(&file, "x").unwrap();
        std::fs::create_dir_all(dir.join("nested")).unwrap();
        delete_temporary_file(&file).unwrap();
        delete_temporary_dir(&dir).unwrap();
        assert!(!file.exists());
        assert!(!dir.exists());
    }
}
