use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::{Message, Role};

use crate::http::SERVER_NAME;
use crate::http::request::Request;

/// Deadline for writing the accept handshake response.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-connection WebSocket echo session.
///
/// Owns the transport inherited from the HTTP session. No response queue:
/// echo semantics keep exactly one frame in flight.
pub struct WsSession<S> {
    stream: S,
}

impl<S> WsSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Accept the upgrade described by `request`, then echo frames until
    /// the peer sends a close frame or the connection errors out.
    pub async fn run(self, request: Request) -> anyhow::Result<()> {
        let Self { mut stream } = self;

        accept_upgrade(&mut stream, &request)
            .await
            .context("accept")?;

        let mut ws = WebSocketStream::from_raw_socket(stream, Role::Server, None).await;

        while let Some(frame) = ws.next().await {
            match frame.context("read")? {
                // Echo the message back, preserving the text/binary opcode
                frame @ (Message::Text(_) | Message::Binary(_)) => {
                    ws.send(frame).await.context("write")?;
                }
                Message::Close(_) => break,
                // Ping/pong are answered by the protocol layer
                _ => {}
            }
        }

        // Flush the close reply if one is pending; the peer may already
        // be gone, which is not an error at this point.
        let _ = ws.close(None).await;

        Ok(())
    }
}

/// Write the 101 Switching Protocols response for a parsed upgrade request.
///
/// The handshake was already read by the HTTP session, so only the accept
/// key has to be derived and the response written back.
async fn accept_upgrade<S>(stream: &mut S, request: &Request) -> anyhow::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let key = request
        .header("Sec-WebSocket-Key")
        .ok_or_else(|| anyhow::anyhow!("missing Sec-WebSocket-Key header"))?;

    let version = request.header("Sec-WebSocket-Version").unwrap_or_default();
    if version.trim() != "13" {
        anyhow::bail!("unsupported WebSocket version: {version:?}");
    }

    let accept = derive_accept_key(key.as_bytes());
    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Connection: Upgrade\r\n\
         Upgrade: websocket\r\n\
         Sec-WebSocket-Accept: {accept}\r\n\
         Server: {SERVER_NAME}\r\n\
         \r\n"
    );

    timeout(HANDSHAKE_TIMEOUT, async {
        stream.write_all(response.as_bytes()).await?;
        stream.flush().await
    })
    .await
    .context("handshake timed out")??;

    Ok(())
}
