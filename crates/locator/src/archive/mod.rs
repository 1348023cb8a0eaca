//! URLs of entries inside archives
//!
//! The archive itself is any other URL, nested to any depth.

pub mod tarball;
pub mod zip;

pub use tarball::{TarEntry, TarballEntryReader, TarballReader, TarballUrl};
pub use self::zip::{ZipEntry, ZipEntryReader, ZipReader, ZipUrl};
