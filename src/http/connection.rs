use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::http::SERVER_NAME;
use crate::http::handler::handle_request;
use crate::http::parser::{ParseError, parse_http_request};
use crate::http::request::Request;
use crate::http::response::{Response, ResponseBuilder, StatusCode};
use crate::http::writer::ResponseWriter;
use crate::server::fail;
use crate::ws::session::WsSession;

/// Maximum number of responses queued per connection.
///
/// Pipelined requests beyond this pause further reads until the write
/// side drains the queue below the limit.
const QUEUE_LIMIT: usize = 8;

/// Deadline for every blocking step at the HTTP layer.
const IO_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Connection<S> {
    stream: S,
    buffer: BytesMut,
    queue: VecDeque<Response>,
    doc_root: Arc<String>,
    idle_timeout: Duration,
    state: ConnectionState,
}

#[derive(Default)]
enum ConnectionState {
    #[default]
    Reading,
    Dispatching(Request),
    Writing,
    Closing,
}

/// Outcome of one pass through the read state.
enum ReadStep {
    /// A complete request was parsed off the buffer.
    Request(Request),
    /// No complete request buffered, but responses are queued; write one
    /// before blocking on the socket again.
    Drain,
    /// The request was refused before dispatch (oversized body); answer
    /// with the given response and close.
    Reject(Response),
    /// Peer closed the connection between requests.
    Eof,
}

/// What ended the HTTP session.
enum SessionExit {
    Closed,
    Upgrade(Request),
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, doc_root: Arc<String>) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(4096),
            queue: VecDeque::new(),
            doc_root,
            idle_timeout: IO_TIMEOUT,
            state: ConnectionState::Reading,
        }
    }

    /// Override the idle read timeout (used by tests; production keeps
    /// the 30s default).
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Drive the connection until it closes or upgrades.
    ///
    /// On a WebSocket upgrade the transport moves out of this session
    /// into the echo session; the HTTP session ends here either way.
    pub async fn run(mut self) -> anyhow::Result<()> {
        match self.drive().await? {
            SessionExit::Closed => Ok(()),
            SessionExit::Upgrade(request) => WsSession::new(self.stream).run(request).await,
        }
    }

    async fn drive(&mut self) -> anyhow::Result<SessionExit> {
        loop {
            self.state = match std::mem::take(&mut self.state) {
                ConnectionState::Reading => match self.read_step().await? {
                    ReadStep::Request(request) if request.is_upgrade() => {
                        // WebSocket manages its own timeouts from here on.
                        return Ok(SessionExit::Upgrade(request));
                    }
                    ReadStep::Request(request) => ConnectionState::Dispatching(request),
                    ReadStep::Drain => ConnectionState::Writing,
                    ReadStep::Reject(response) => {
                        self.queue.push_back(response);
                        ConnectionState::Writing
                    }
                    ReadStep::Eof => ConnectionState::Closing,
                },

                ConnectionState::Dispatching(request) => {
                    let response = handle_request(&self.doc_root, request).await;
                    self.queue.push_back(response);

                    if self.queue.len() < QUEUE_LIMIT {
                        ConnectionState::Reading // keep reading pipelined requests
                    } else {
                        ConnectionState::Writing // queue full, pause reading
                    }
                }

                ConnectionState::Writing => match self.queue.pop_front() {
                    Some(response) => {
                        let keep_alive = response.keep_alive;
                        let writer = ResponseWriter::new(response);

                        timeout(IO_TIMEOUT, writer.write_to_stream(&mut self.stream))
                            .await
                            .context("write timed out")?
                            .context("write")?;

                        if keep_alive {
                            ConnectionState::Reading
                        } else {
                            ConnectionState::Closing
                        }
                    }
                    None => ConnectionState::Reading,
                },

                ConnectionState::Closing => {
                    self.close().await;
                    return Ok(SessionExit::Closed);
                }
            };
        }
    }

    /// Parse one request from the buffer, reading more bytes as needed.
    async fn read_step(&mut self) -> anyhow::Result<ReadStep> {
        loop {
            // Try parsing whatever we already have
            match parse_http_request(&self.buffer) {
                Ok((request, consumed)) => {
                    // Remove consumed bytes
                    self.buffer.advance(consumed);
                    return Ok(ReadStep::Request(request));
                }

                Err(ParseError::Incomplete) => {
                    // Drain queued responses before blocking on the socket
                    if !self.queue.is_empty() {
                        return Ok(ReadStep::Drain);
                    }
                }

                Err(ParseError::BodyTooLarge) => {
                    // Refuse and close; the rest of the entity is never read.
                    self.buffer.clear();
                    return Ok(ReadStep::Reject(body_too_large()));
                }

                Err(e) => {
                    // Malformed request → protocol error
                    anyhow::bail!("HTTP parse error: {:?}", e);
                }
            }

            // Read more data
            let mut temp = [0u8; 1024];
            let n = timeout(self.idle_timeout, self.stream.read(&mut temp))
                .await
                .context("idle timeout expired")?
                .context("read")?;

            if n == 0 {
                if self.buffer.is_empty() {
                    // Client closed connection between requests
                    return Ok(ReadStep::Eof);
                }
                anyhow::bail!("connection closed mid-request");
            }

            self.buffer.extend_from_slice(&temp[..n]);
        }
    }

    /// Graceful shutdown: TCP half-close on plain transports, close_notify
    /// on TLS. A peer that already dropped the raw socket produces an
    /// expected truncation which `fail` filters out of the error log.
    async fn close(&mut self) {
        match timeout(IO_TIMEOUT, self.stream.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => fail(e, "shutdown"),
            Err(_) => tracing::warn!(operation = "shutdown", "shutdown timed out"),
        }
    }
}

fn body_too_large() -> Response {
    ResponseBuilder::new(StatusCode::BadRequest)
        .header("Server", SERVER_NAME)
        .header("Content-Type", "text/html")
        .keep_alive(false)
        .body(b"Request body exceeds limit".to_vec())
        .build()
}
