//! Local filesystem URLs

use std::fmt;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::PathBuf;
use std::sync::Arc;

use crate::context::Context;
use crate::error::{LocatorError, Result};
use crate::format::get_format;
use crate::util::{clean, join, origin_dir};

/// A path on the local filesystem
#[derive(Clone)]
pub struct FileUrl {
    pub path: String,
    context: Arc<Context>,
}

impl fmt::Debug for FileUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FileUrl").field(&self.path).finish()
    }
}

impl FileUrl {
    pub fn new(path: impl Into<String>, context: &Arc<Context>) -> Self {
        Self {
            path: path.into(),
            context: context.clone(),
        }
    }

    /// Parse `file:<path>`, `file:///abs/path` or a bare path
    pub fn parse(url: &str, context: &Arc<Context>) -> Result<Self> {
        if url.starts_with("file://") {
            let parsed = url::Url::parse(url).map_err(|e| LocatorError::parse(url, e.to_string()))?;
            let path = parsed
                .to_file_path()
                .map_err(|_| LocatorError::parse(url, "not a local file URL"))?;
            return Ok(Self::new(path.to_string_lossy(), context));
        }

        let path = url.strip_prefix("file:").unwrap_or(url);
        if path.is_empty() {
            return Err(LocatorError::parse(url, "empty path"));
        }
        Ok(Self::new(path, context))
    }

    /// Absolute URL for an existing path, relative paths taken from the CWD
    pub fn new_valid(path: &str, context: &Arc<Context>) -> Result<Self> {
        let url = Self::new(absolute(path)?, context);
        url.validate()?;
        Ok(url)
    }

    pub fn key(&self) -> String {
        format!("file:{}", self.path)
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

    pub fn local_path(&self) -> PathBuf {
        PathBuf::from(&self.path)
    }

    pub fn validate(&self) -> Result<()> {
        match std::fs::metadata(&self.path) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(not_found(&self.path)),
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) fn open_file(&self) -> Result<File> {
        match File::open(&self.path) {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(not_found(&self.path)),
            Err(e) => Err(e.into()),
        }
    }

    pub fn open(&self) -> Result<Box<dyn Read + Send>> {
        Ok(Box::new(self.open_file()?))
    }
}

fn not_found(path: &str) -> LocatorError {
    LocatorError::not_found(format!("file not found: {}", path))
}

fn absolute(path: &str) -> Result<String> {
    if path.starts_with('/') {
        return Ok(clean(path));
    }
    let cwd = std::env::current_dir()?;
    Ok(clean(&cwd.join(path).to_string_lossy()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_forms() {
        let context = Context::new().shared();

        assert_eq!(FileUrl::parse("file:///etc/hosts", &context).unwrap().path, "/etc/hosts");
        assert_eq!(FileUrl::parse("file:conf/a.yaml", &context).unwrap().path, "conf/a.yaml");
        assert_eq!(FileUrl::parse("conf/a.yaml", &context).unwrap().path, "conf/a.yaml");
        assert!(FileUrl::parse("file:", &context).is_err());
    }

    #[test]
    fn test_origin_and_relative() {
        let context = Context::new().shared();
        let url = FileUrl::new("/srv/conf/app.yaml", &context);

        assert_eq!(url.origin().path, "/srv/conf/");
        assert_eq!(url.origin().relative("db.yaml").path, "/srv/conf/db.yaml");
        assert_eq!(url.origin().relative("../x.json").path, "/srv/x.json");
        assert_eq!(url.format(), "yaml");
    }

    #[test]
    fn test_validate_and_open() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.txt");
        std::fs::write(&path, "hello").unwrap();
        let context = Context::new().shared();

        let url = FileUrl::new_valid(&path.to_string_lossy(), &context).unwrap();
        let mut content = String::new();
        url.open().unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "hello");

        let missing = FileUrl::new(temp.path().join("b.txt").to_string_lossy(), &context);
        assert!(missing.validate().unwrap_err().is_not_found());
        assert!(missing.open().err().unwrap().is_not_found());
    }

    #[test]
    fn test_new_valid_uses_cwd() {
        let context = Context::new().shared();
        let url = FileUrl::new_valid("Cargo.toml", &context).unwrap();
        assert!(url.path.starts_with('/'));
        assert!(url.path.ends_with("/Cargo.toml"));
    }
}
