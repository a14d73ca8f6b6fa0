//! HTTP protocol implementation.
//!
//! This module implements an HTTP/1.1 server with keep-alive connections,
//! request pipelining, and WebSocket upgrade hand-off.
//!
//! # Architecture
//!
//! The HTTP layer is organized into several submodules:
//!
//! - **`connection`**: The per-connection session implementing the request-response state machine
//! - **`parser`**: Parses incoming HTTP requests from byte buffers
//! - **`request`**: HTTP request representation and parsing utilities
//! - **`response`**: HTTP response representation with builder pattern
//! - **`writer`**: Serializes and writes HTTP responses to the client
//! - **`handler`**: Maps requests onto the document root (static file serving)
//! - **`mime`**: MIME type detection based on file extensions
//!
//! # Connection State Machine
//!
//! Each client connection goes through a state machine:
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← Parse the next pipelined request
//!        └──────┬──────┘
//!               │ Request parsed            Upgrade header?
//!               ▼                           → hand transport to WebSocket session
//!        ┌──────────────────┐
//!        │   Dispatching    │ ← Build response, push onto queue
//!        └──────┬───────────┘
//!               │ Queue below limit → Reading (pipelining)
//!               │ Queue full → Writing (backpressure)
//!               ▼
//!        ┌──────────────────┐
//!        │     Writing      │ ← Pop and send responses in FIFO order
//!        └──────┬───────────┘
//!               │ Response sent
//!               ├─ Keep-Alive → Reading (same connection)
//!               └─ Close → Closing
//! ```
//!
//! The session is generic over its transport, so the same state machine
//! runs unchanged over a plain TCP stream or a TLS stream.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use flexserve::http::connection::Connection;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let listener = TcpListener::bind("127.0.0.1:8080").await?;
//!     let doc_root = Arc::new(".".to_string());
//!
//!     loop {
//!         let (socket, _addr) = listener.accept().await?;
//!         let doc_root = doc_root.clone();
//!         tokio::spawn(async move {
//!             if let Err(e) = Connection::new(socket, doc_root).run().await {
//!                 eprintln!("Connection error: {}", e);
//!             }
//!         });
//!     }
//! }
//! ```

pub mod connection;
pub mod handler;
pub mod mime;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;

/// Server identification header value stamped on every response.
pub const SERVER_NAME: &str = concat!("flexserve/", env!("CARGO_PKG_VERSION"));
