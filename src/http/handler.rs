//! Static file request handling.
//!
//! Maps a parsed request onto the document root and produces a response.
//! This never fails: client mistakes become 400/404/500 responses so the
//! session can keep running.

use std::io::ErrorKind;

use tokio::fs::File;

use crate::http::SERVER_NAME;
use crate::http::mime::mime_type;
use crate::http::request::{Method, Request};
use crate::http::response::{Response, ResponseBuilder, StatusCode};

/// Default file served when the request target ends in `/`.
const INDEX_FILE: &str = "index.html";

/// Handle one HTTP request against the document root.
///
/// Only GET and HEAD are served; other methods get 400. Targets must
/// start with `/` and must not contain `..` (directory-traversal guard).
pub async fn handle_request(doc_root: &str, req: Request) -> Response {
    if !matches!(req.method, Method::GET | Method::HEAD) {
        return bad_request(&req, "Unknown HTTP-method");
    }

    if req.path.is_empty() || !req.path.starts_with('/') || req.path.contains("..") {
        return bad_request(&req, "Illegal request-target");
    }

    let mut path = path_cat(doc_root, &req.path);
    if req.path.ends_with('/') {
        path.push_str(INDEX_FILE);
    }

    let file = match File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return not_found(&req),
        Err(e) => return server_error(&req, &e.to_string()),
    };

    let metadata = match file.metadata().await {
        Ok(metadata) => metadata,
        Err(e) => return server_error(&req, &e.to_string()),
    };
    if metadata.is_dir() {
        return not_found(&req);
    }
    let size = metadata.len();

    if req.method == Method::HEAD {
        return ResponseBuilder::new(StatusCode::Ok)
            .header("Server", SERVER_NAME)
            .header("Content-Type", mime_type(&path))
            .header("Content-Length", size.to_string())
            .keep_alive(req.keep_alive())
            .build();
    }

    ResponseBuilder::new(StatusCode::Ok)
        .header("Server", SERVER_NAME)
        .header("Content-Type", mime_type(&path))
        .keep_alive(req.keep_alive())
        .file(file, size)
        .build()
}

/// Concatenate the document root and a request target.
///
/// A single trailing separator on the root is dropped before appending
/// the target, which always starts with `/`.
fn path_cat(base: &str, target: &str) -> String {
    if base.is_empty() {
        return target.to_string();
    }

    let mut result = base.to_string();
    if result.ends_with('/') {
        result.pop();
    }
    result.push_str(target);
    result
}

fn bad_request(req: &Request, why: &str) -> Response {
    ResponseBuilder::new(StatusCode::BadRequest)
        .header("Server", SERVER_NAME)
        .header("Content-Type", "text/html")
        .keep_alive(req.keep_alive())
        .body(why.as_bytes().to_vec())
        .build()
}

fn not_found(req: &Request) -> Response {
    ResponseBuilder::new(StatusCode::NotFound)
        .header("Server", SERVER_NAME)
        .header("Content-Type", "text/html")
        .keep_alive(req.keep_alive())
        .body(format!("The resource '{}' was not found.", req.path).into_bytes())
        .build()
}

fn server_error(req: &Request, what: &str) -> Response {
    ResponseBuilder::new(StatusCode::InternalServerError)
        .header("Server", SERVER_NAME)
        .header("Content-Type", "text/html")
        .keep_alive(req.keep_alive())
        .body(format!("An error occurred: '{what}'").into_bytes())
        .build()
}
