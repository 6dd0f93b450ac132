use std::fs;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::Path;
use std::time::Instant;

use once_cell::sync::Lazy;

use crate::cache::FileCache;
use crate::content_type;
use crate::metrics::{self, Metrics};

pub const READ_BUFFER_SIZE: usize = 4096;

const NOT_FOUND_BODY: &str =
    "<!DOCTYPE html><html><body><h1>404 Not Found</h1></body></html>";
const SERVER_ERROR_BODY: &str =
    "<!DOCTYPE html><html><body><h1>500 Internal Server Error</h1></body></html>";

// Fixed error responses, compiled once so the error paths are a single write.
static NOT_FOUND: Lazy<Vec<u8>> =
    Lazy::new(|| build_response("404 Not Found", "text/html", NOT_FOUND_BODY.as_bytes()));
static SERVER_ERROR: Lazy<Vec<u8>> = Lazy::new(|| {
    build_response(
        "500 Internal Server Error",
        "text/html",
        SERVER_ERROR_BODY.as_bytes(),
    )
});

// Serves one connection: read the request, resolve it through the cache or
// the filesystem under `root`, respond, and record the outcome. The stream
// is consumed, so every exit path closes the socket exactly once.
pub fn handle(mut stream: TcpStream, root: &Path, cache: &FileCache, metrics: &Metrics) {
    let start = Instant::now();

    let mut buffer = [0u8; READ_BUFFER_SIZE];
    let bytes_read = match stream.read(&mut buffer) {
        Ok(0) | Err(_) => {
            metrics.record(false, start.elapsed().as_secs_f64());
            return;
        }
        Ok(n) => n,
    };

    let request = String::from_utf8_lossy(&buffer[..bytes_read]);
    let mut tokens = request.split_whitespace();
    let (method, path, protocol) = match (tokens.next(), tokens.next(), tokens.next()) {
        (Some(m), Some(p), Some(v)) => (m, p, v),
        _ => {
            let _ = stream.write_all(&SERVER_ERROR);
            metrics.record(false, start.elapsed().as_secs_f64());
            return;
        }
    };

    println!("Request: {} {} {}", method, path, protocol);

    if path == "/metrics" {
        let page = metrics::render_metrics_page(&metrics.snapshot(), cache.len());
        send_response(&mut stream, "200 OK", "text/html", page.as_bytes());
        metrics.record(false, start.elapsed().as_secs_f64());
        return;
    }

    if method != "GET" {
        let _ = stream.write_all(&NOT_FOUND);
        metrics.record(false, start.elapsed().as_secs_f64());
        return;
    }

    let filename = if path == "/" {
        "index.html"
    } else {
        path.strip_prefix('/').unwrap_or(path)
    };

    // Reject any path that climbs out of the content root.
    if filename.contains("..") {
        let _ = stream.write_all(&NOT_FOUND);
        metrics.record(false, start.elapsed().as_secs_f64());
        return;
    }

    if let Some(content) = cache.get(filename) {
        println!("Cache HIT for {}", filename);
        send_response(&mut stream, "200 OK", content_type(filename), &content);
        metrics.record(true, start.elapsed().as_secs_f64());
        return;
    }

    println!("Cache MISS for {}", filename);
    let bytes = match fs::read(root.join(filename)) {
        Ok(bytes) => bytes,
        Err(_) => {
            let _ = stream.write_all(&NOT_FOUND);
            metrics.record(false, start.elapsed().as_secs_f64());
            return;
        }
    };

    // The cache copies under its own lock; the response is sent from this
    // buffer so no I/O happens while the cache lock is held.
    cache.insert(filename, &bytes);
    send_response(&mut stream, "200 OK", content_type(filename), &bytes);
    metrics.record(false, start.elapsed().as_secs_f64());
}

fn response_header(status: &str, content_type: &str, body_len: usize) -> String {
    format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\nServer: Advanced-Multithreaded-Server/1.0\r\n\r\n",
        status, content_type, body_len
    )
}

fn build_response(status: &str, content_type: &str, body: &[u8]) -> Vec<u8> {
    let header = response_header(status, content_type, body.len());
    let mut response = Vec::with_capacity(header.len() + body.len());
    response.extend_from_slice(header.as_bytes());
    response.extend_from_slice(body);
    response
}

// Writes the status line, the fixed header set, and the body. Send failures
// are not reported back to the client; the connection just closes.
pub fn send_response(stream: &mut TcpStream, status: &str, content_type: &str, body: &[u8]) {
    let header = response_header(status, content_type, body.len());
    if stream.write_all(header.as_bytes()).is_err() {
        return;
    }
    let _ = stream.write_all(body);
}
