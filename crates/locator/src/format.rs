//! Content-format hints derived from path extensions
//!
//! The hint only steers downstream decoders; nothing in this crate inspects
//! content structure.

/// Format hint for a path: the lowercased extension, with `yml` folded into
/// `yaml` and `tgz` / `.tar.*` folded into `tar.<compression>`
pub fn get_format(path: &str) -> String {
    let name = path.rsplit('/').next().unwrap_or(path);
    let Some((stem, extension)) = name.rsplit_once('.') else {
        return String::new();
    };
    if extension.is_empty() {
        return String::new();
    }

    let extension = extension.to_lowercase();

    if stem.to_lowercase().ends_with(".tar") {
        return format!("tar.{}", extension);
    }

    match extension.as_str() {
        "yml" => "yaml".to_string(),
        "tgz" => "tar.gz".to_string(),
        _ => extension,
    }
}
