use std::path::Path;

use crate::constants::OCTET_STREAM;

/// Map a file extension (with or without the leading dot) to a content type.
///
/// Lookup is case-insensitive and never fails: anything outside the image
/// table resolves to `application/octet-stream`. No content sniffing is done.
pub fn resolve(extension: &str) -> &'static str {
    let ext = extension.strip_prefix('.').unwrap_or(extension);

    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        _ => OCTET_STREAM,
    }
}

/// Content type for a path, based on its final extension
pub fn for_path(path: &Path) -> &'static str {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(resolve)
        .unwrap_or(OCTET_STREAM)
}
