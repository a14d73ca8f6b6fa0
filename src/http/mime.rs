//! MIME type detection based on file extensions.

const DEFAULT_MIME: &str = "application/text";

/// Map a file path to the content-type string for its extension.
///
/// Unknown or missing extensions fall back to a generic default; this
/// function has no failure mode.
pub fn mime_type(path: &str) -> &'static str {
    let ext = match path.rfind('.') {
        Some(pos) => &path[pos..],
        None => return DEFAULT_MIME,
    };

    match ext.to_ascii_lowercase().as_str() {
        ".htm" | ".html" | ".php" => "text/html",
        ".css" => "text/css",
        ".txt" => "text/plain",
        ".js" => "application/javascript",
        ".json" => "application/json",
        ".xml" => "application/xml",
        ".swf" => "application/x-shockwave-flash",
        ".flv" => "video/x-flv",
        ".png" => "image/png",
        ".jpe" | ".jpeg" | ".jpg" => "image/jpeg",
        ".gif" => "image/gif",
        ".bmp" => "image/bmp",
        ".ico" => "image/vnd.microsoft.icon",
        ".tiff" | ".tif" => "image/tiff",
        ".svg" | ".svgz" => "image/svg+xml",
        _ => DEFAULT_MIME,
    }
}
