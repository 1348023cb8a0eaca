//! Entries of tar and zip archives, nested inside each other and behind other URLs

mod common;

use std::io::Read;
use std::sync::Arc;

use tempfile::TempDir;

use common::{CountingTransport, file_url, gzip, tar_bytes, write_file, zip_bytes};
use locator::{Context, LocatorError, Unpack, Url, new_url, new_valid_url, read_string, visit_files};

/// `pkg.tar.gz` holding `inner.zip` (with `data.json`) and `conf/app.yaml`
fn nested_package(dir: &TempDir) -> std::path::PathBuf {
    let inner = zip_bytes(&[("data.json", br#"{"answer": 42}"#), ("nested/readme.txt", b"hi")]);
    let tarball = gzip(&tar_bytes(&[
        ("inner.zip", &inner),
        ("conf/app.yaml", b"name: app"),
        ("conf/db.yaml", b"name: db"),
    ]));
    let path = dir.path().join("pkg.tar.gz");
    write_file(&path, &tarball);
    path
}

#[test]
fn test_zip_inside_tarball() {
    let dir = TempDir::new().unwrap();
    let package = nested_package(&dir);
    let context = Context::new().shared();

    let url = new_url(
        &format!("zip:tar:{}!/inner.zip!/data.json", file_url(&package)),
        &context,
    )
    .unwrap();

    assert_eq!(url.format(), "json");
    assert_eq!(read_string(&url).unwrap(), r#"{"answer": 42}"#);
}

#[test]
fn test_nested_archive_is_materialized_once() {
    let dir = TempDir::new().unwrap();
    let package = nested_package(&dir);
    let context = Context::new().shared();
    let archive = format!("zip:tar:{}!/inner.zip", file_url(&package));

    let data = new_url(&format!("{}!/data.json", archive), &context).unwrap();
    let readme = new_url(&format!("{}!/nested/readme.txt", archive), &context).unwrap();
    read_string(&data).unwrap();
    read_string(&readme).unwrap();

    // Only the zip extracted from the tarball needed a local copy
    let paths = context.temporary_paths();
    assert_eq!(paths.len(), 1);

    context.release().unwrap();
    assert!(!paths[0].exists());
}

#[test]
fn test_tarball_entries_and_siblings() {
    let dir = TempDir::new().unwrap();
    let package = nested_package(&dir);
    let context = Context::new().shared();

    let app = new_valid_url(
        &format!("tar:{}!/conf/app.yaml", file_url(&package)),
        &[],
        &context,
    )
    .unwrap();
    assert_eq!(read_string(&app).unwrap(), "name: app");

    let db = new_valid_url("db.yaml", &[app.origin()], &context).unwrap();
    assert!(matches!(db, Url::Tarball(_)));
    assert_eq!(read_string(&db).unwrap(), "name: db");

    // Streaming straight from the archive needs no temporary copy
    assert!(context.temporary_paths().is_empty());
}

#[test]
fn test_tar_inside_zip() {
    let dir = TempDir::new().unwrap();
    let inner = tar_bytes(&[("a.yaml", b"a: 1")]);
    let path = dir.path().join("bundle.zip");
    write_file(&path, &zip_bytes(&[("inner.tar", &inner)]));

    let context = Context::new().shared();
    let url = new_url(&format!("tar:zip:{}!/inner.tar!/a.yaml", file_url(&path)), &context).unwrap();
    assert_eq!(read_string(&url).unwrap(), "a: 1");
}

#[test]
fn test_missing_entries_are_not_found() {
    let dir = TempDir::new().unwrap();
    let package = nested_package(&dir);
    let context = Context::new().shared();

    let missing_tar = new_url(&format!("tar:{}!/conf/none.yaml", file_url(&package)), &context).unwrap();
    let err = missing_tar.validate().unwrap_err();
    assert!(err.is_not_found());
    assert!(err.to_string().contains("conf/none.yaml"));

    let missing_zip = new_url(
        &format!("zip:tar:{}!/inner.zip!/none.json", file_url(&package)),
        &context,
    )
    .unwrap();
    assert!(missing_zip.validate().unwrap_err().is_not_found());
    assert!(read_string(&missing_zip).unwrap_err().is_not_found());
}

#[test]
fn test_directory_entry_is_not_a_file() {
    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Directory);
    header.set_size(0);
    header.set_mode(0o755);
    header.set_cksum();
    builder.append_data(&mut header, "conf/", std::io::empty()).unwrap();
    let mut header = tar::Header::new_gnu();
    header.set_size(9);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, "conf/app.yaml", &b"name: app"[..]).unwrap();

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pkg.tar");
    write_file(&path, &builder.into_inner().unwrap());
    let context = Context::new().shared();

    for entry in ["conf", "conf/"] {
        let url = new_url(&format!("tar:{}!/{}", file_url(&path), entry), &context).unwrap();
        assert!(url.validate().unwrap_err().is_not_found(), "{}", entry);
        assert!(read_string(&url).unwrap_err().is_not_found(), "{}", entry);
    }
    let file = new_url(&format!("tar:{}!/conf/app.yaml", file_url(&path)), &context).unwrap();
    assert_eq!(read_string(&file).unwrap(), "name: app");
}

#[test]
fn test_missing_archive_is_not_found() {
    let dir = TempDir::new().unwrap();
    let context = Context::new().shared();
    let path = dir.path().join("absent.tar");

    let url = new_url(&format!("tar:{}!/a.yaml", file_url(&path)), &context).unwrap();
    assert!(url.validate().unwrap_err().is_not_found());
}

#[test]
fn test_unsupported_archive_format() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data.json");
    write_file(&path, b"{}");
    let context = Context::new().shared();

    let err = new_valid_url(&format!("tar:{}!/a.yaml", file_url(&path)), &[], &context).unwrap_err();
    match err {
        LocatorError::ArchiveFormat { format } => assert_eq!(format, "json"),
        other => panic!("expected ArchiveFormat, got {:?}", other),
    }
}

#[test]
fn test_tarball_over_network_is_downloaded_once() {
    let tarball = tar_bytes(&[("a.yaml", b"a: 1"), ("b.yaml", b"b: 2")]);
    let transport =
        Arc::new(CountingTransport::new().with_body("https://example.com/bundle.tar", tarball));
    let context = Context::new().shared();
    context.set_transport("example.com", transport.clone());

    let a = new_url("tar:https://example.com/bundle.tar!/a.yaml", &context).unwrap();
    let b = a.relative("../b.yaml");
    assert_eq!(b.key(), "tar:https://example.com/bundle.tar!/b.yaml");

    assert_eq!(read_string(&a).unwrap(), "a: 1");
    assert_eq!(read_string(&b).unwrap(), "b: 2");
    assert_eq!(transport.requests(), 1);
}

#[test]
fn test_visit_zip_archive_files() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("files.zip");
    write_file(&path, &zip_bytes(&[("one.txt", b"1"), ("sub/two.txt", b"2")]));

    let context = Context::new().shared();
    let url = new_url(&file_url(&path), &context).unwrap();

    let mut seen = Vec::new();
    visit_files(&url, Unpack::from_format(&url.format()), |file| {
        let mut content = String::new();
        file.reader.read_to_string(&mut content)?;
        seen.push((file.path, content));
        Ok(())
    })
    .unwrap();

    assert_eq!(
        seen,
        vec![
            ("one.txt".to_string(), "1".to_string()),
            ("sub/two.txt".to_string(), "2".to_string()),
        ]
    );
}
