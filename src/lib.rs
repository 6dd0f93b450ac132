pub mod cache;
pub mod handler;
pub mod lb;
pub mod metrics;
pub mod queue;
pub mod server;
pub mod shutdown;

// Content-type classification by filename extension. The set is closed:
// anything not listed below is served as application/octet-stream.
pub fn content_type(filename: &str) -> &'static str {
    let ext = match filename.rsplit_once('.') {
        Some((_, ext)) => ext,
        None => return "application/octet-stream",
    };

    match ext.to_ascii_lowercase().as_str() {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "application/javascript",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}
