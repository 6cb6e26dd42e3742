//! Content helpers: hashing, content-type detection, display-name fixing.

/// Compute BLAKE3 hash of data with "blake3:" prefix.
///
/// Returns a string in the format: `blake3:{64-char-hex}`
pub fn compute_content_hash(data: &[u8]) -> String {
    let hash = blake3::hash(data);
    format!("blake3:{}", hash.to_hex())
}

/// Detect actual content type from file magic bytes.
///
/// Called where raw bytes become an attachment. Returns the detected MIME
/// type if magic bytes match a known format, falling back to extension-based
/// detection for text formats, then to the claimed type. A binary claim whose
/// bytes carry no recognisable signature is downgraded to
/// `application/octet-stream`.
pub fn detect_content_type(filename: &str, data: &[u8], claimed: &str) -> String {
    if let Some(kind) = infer::get(data) {
        return kind.mime_type().to_string();
    }

    if let Some(ext) = filename.rsplit('.').next() {
        if let Some(mime) = mime_from_extension(ext) {
            return mime.to_string();
        }
    }

    if claimed_is_binary(claimed) {
        return "application/octet-stream".to_string();
    }

    claimed.to_string()
}

fn claimed_is_binary(claimed: &str) -> bool {
    if claimed.starts_with("image/")
        || claimed.starts_with("audio/")
        || claimed.starts_with("video/")
    {
        return true;
    }
    matches!(
        claimed,
        "application/pdf"
            | "application/zip"
            | "application/gzip"
            | "application/x-tar"
            | "application/x-7z-compressed"
            | "application/x-rar-compressed"
    )
}

/// Text-only extensions (formats without magic bytes).
fn mime_from_extension(ext: &str) -> Option<&'static str> {
    match ext.to_lowercase().as_str() {
        "txt" | "log" => Some("text/plain"),
        "csv" => Some("text/csv"),
        "html" | "htm" => Some("text/html"),
        "xml" => Some("application/xml"),
        "json" => Some("application/json"),
        "md" | "markdown" => Some("text/markdown"),
        "svg" => Some("image/svg+xml"),
        _ => None,
    }
}

/// Make `display_name` end with `extension`.
///
/// Strict suffix check: the extension is appended only when the name does
/// not already end with it, so `cat.jpg` + `.png` gives `cat.jpg.png` and
/// `cat.png` + `.png` stays `cat.png`.
pub fn with_extension_suffix(display_name: &str, extension: &str) -> String {
    if display_name.ends_with(extension) {
        display_name.to_string()
    } else {
        format!("{}{}", display_name, extension)
    }
}
