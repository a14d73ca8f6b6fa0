//! Per-connection protocol detection.
//!
//! Classifies a freshly accepted connection as TLS or plaintext without
//! consuming any bytes, then starts the matching HTTP session. A TLS
//! ClientHello always begins with the handshake record type byte, which
//! plaintext HTTP request lines never do.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;

use crate::http::connection::Connection;

/// First byte of a TLS handshake record (ContentType::Handshake).
const TLS_HANDSHAKE_RECORD: u8 = 0x16;

/// Deadline for classifying the connection and for the TLS handshake.
const DETECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Classify the connection and run the matching session to completion.
///
/// The probe uses a non-consuming peek, so whichever session is built
/// next reads the stream from its very first byte. Exactly one of three
/// things happens: a TLS session runs, a plain session runs, or detection
/// fails and the connection is dropped.
pub async fn run(
    stream: TcpStream,
    acceptor: TlsAcceptor,
    doc_root: Arc<String>,
) -> anyhow::Result<()> {
    let mut probe = [0u8; 1];
    let n = timeout(DETECT_TIMEOUT, stream.peek(&mut probe))
        .await
        .context("detect timed out")?
        .context("detect")?;

    if n == 0 {
        // Peer closed before sending anything
        return Ok(());
    }

    if probe[0] == TLS_HANDSHAKE_RECORD {
        let stream = timeout(DETECT_TIMEOUT, acceptor.accept(stream))
            .await
            .context("handshake timed out")?
            .context("handshake")?;
        Connection::new(stream, doc_root).run().await
    } else {
        Connection::new(stream, doc_root).run().await
    }
}
