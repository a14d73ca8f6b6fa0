use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::http::response::{Body, Response};

const HTTP_VERSION: &str = "HTTP/1.1";

/// Chunk size for streaming file bodies.
const FILE_BUFFER_SIZE: usize = 8192;

fn serialize_head(resp: &Response) -> Vec<u8> {
    let mut buf = Vec::new();

    // Status line
    let status_line = format!(
        "{} {} {}\r\n",
        HTTP_VERSION,
        resp.status.as_u16(),
        resp.status.reason_phrase()
    );
    buf.extend_from_slice(status_line.as_bytes());

    // Headers
    for (k, v) in &resp.headers {
        buf.extend_from_slice(k.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(v.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    let connection = if resp.keep_alive { "keep-alive" } else { "close" };
    buf.extend_from_slice(b"Connection: ");
    buf.extend_from_slice(connection.as_bytes());
    buf.extend_from_slice(b"\r\n");

    // Header/body separator
    buf.extend_from_slice(b"\r\n");

    buf
}

pub struct ResponseWriter {
    response: Response,
}

impl ResponseWriter {
    pub fn new(response: Response) -> Self {
        Self { response }
    }

    /// Write the full response to the stream: head, then body.
    ///
    /// File bodies are copied in fixed-size chunks and capped at the
    /// advertised length, so the client receives exactly the byte count
    /// promised in Content-Length.
    pub async fn write_to_stream<W>(self, stream: &mut W) -> anyhow::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let head = serialize_head(&self.response);
        stream.write_all(&head).await?;

        match self.response.body {
            Body::Empty => {}
            Body::Bytes(bytes) => {
                stream.write_all(&bytes).await?;
            }
            Body::File { mut file, len } => {
                let mut chunk = [0u8; FILE_BUFFER_SIZE];
                let mut remaining = len as usize;

                while remaining > 0 {
                    let n = file.read(&mut chunk).await?;
                    if n == 0 {
                        anyhow::bail!("file truncated while streaming response body");
                    }
                    let n = n.min(remaining);
                    stream.write_all(&chunk[..n]).await?;
                    remaining -= n;
                }
            }
        }

        stream.flush().await?;
        Ok(())
    }
}
