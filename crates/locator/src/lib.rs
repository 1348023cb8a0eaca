//! Locator: one addressing scheme for files wherever they live
//!
//! This crate parses URL strings into a closed set of locators and turns
//! each of them into a byte stream:
//!
//! - **Files**: `file:` URLs and bare paths
//! - **HTTP(S)**: downloaded once per context into a temporary file
//! - **Git**: `git:<repo>[#ref]!/<path>`, served from a cached clone
//! - **Container images**: `docker:<host>/<repo>:<tag>`, the first `.tar.gz` layer
//! - **Archives**: `tar:` and `zip:` entries of any other URL, nested at will
//! - **Internal buffers**: `internal:<path>`, registered in memory
//!
//! ## Key Features
//!
//! - **Relative resolution**: try a path against a chain of origins, then the CWD
//! - **Caching**: every remote resource is fetched at most once per [`Context`]
//! - **Credentials**: lifted out of URLs and kept per host, never in keys
//! - **Cleanup**: [`Context::release`] deletes every temporary file and clone
//!
//! ## Example
//!
//! ```rust,no_run
//! use locator::{Context, new_valid_url, read_string};
//!
//! # fn example() -> locator::Result<()> {
//! let context = Context::new().shared();
//!
//! let base = new_valid_url("tar:https://example.com/bundle.tar.gz!/conf/app.yaml", &[], &context)?;
//! let sibling = new_valid_url("db.yaml", &[base.origin()], &context)?;
//!
//! println!("{}", read_string(&sibling)?);
//! context.release()?;
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod config;
pub mod context;
pub mod credentials;
pub mod docker;
pub mod error;
pub mod file;
pub mod format;
pub mod git;
pub mod internal;
pub mod network;
pub mod pipe;
pub mod provider;
pub mod transfer;
pub mod transport;
pub mod url;
pub mod util;

// Re-exports for convenience
pub use archive::{TarEntry, TarballReader, TarballUrl, ZipEntry, ZipReader, ZipUrl};
pub use config::LocatorConfig;
pub use context::Context;
pub use credentials::{CredentialStore, Credentials, DockerConfig};
pub use docker::{DockerUrl, ImageReference, ImageSource, LayerDecoder, OciImageSource};
pub use error::{LocatorError, Result};
pub use file::FileUrl;
pub use format::get_format;
pub use git::GitUrl;
pub use internal::{InternalRegistry, InternalUrl, read_to_internal_url, read_to_internal_url_from_stdin};
pub use network::NetworkUrl;
pub use provider::{ProvidedFile, Unpack, visit_files};
pub use transfer::{download, download_to, read_bytes, read_string, size};
pub use transport::{Body, HttpTransport, Transport};
pub use url::{Url, new_url, new_valid_url};
