//! Session-level tests for the HTTP connection state machine.
//!
//! The session is generic over its transport, so these tests drive it
//! over in-memory duplex pipes instead of sockets.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use flexserve::http::connection::Connection;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::{Message, Role};

fn doc_root(files: &[(&str, &[u8])]) -> (tempfile::TempDir, Arc<String>) {
    let dir = tempfile::tempdir().unwrap();
    for (name, contents) in files {
        std::fs::write(dir.path().join(name), contents).unwrap();
    }
    let root = Arc::new(dir.path().to_str().unwrap().to_string());
    (dir, root)
}

/// Spawn a session over one end of a duplex pipe and hand back the client end.
fn start_session(
    root: Arc<String>,
) -> (ResponseReader<ReadHalf<DuplexStream>>, WriteHalf<DuplexStream>) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    tokio::spawn(async move {
        // Errors here are the subject of individual tests; the client side
        // observes them as a closed stream.
        let _ = Connection::new(server, root).run().await;
    });
    let (read_half, write_half) = tokio::io::split(client);
    (ResponseReader::new(read_half), write_half)
}

/// Minimal client-side response parser for assertions.
struct ResponseReader<R> {
    stream: R,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> ResponseReader<R> {
    fn new(stream: R) -> Self {
        Self {
            stream,
            buf: Vec::new(),
        }
    }

    fn into_inner(self) -> R {
        assert!(self.buf.is_empty(), "unconsumed bytes left in reader");
        self.stream
    }

    /// Read one response off the wire. `expect_body` is false for
    /// responses that advertise a Content-Length but carry no payload
    /// (HEAD, 101).
    async fn next_response(
        &mut self,
        expect_body: bool,
    ) -> (u16, HashMap<String, String>, Vec<u8>) {
        let headers_end = loop {
            if let Some(pos) = self.buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos;
            }
            let mut tmp = [0u8; 1024];
            let n = self.stream.read(&mut tmp).await.expect("read head");
            assert!(n > 0, "connection closed before response head");
            self.buf.extend_from_slice(&tmp[..n]);
        };

        let head = String::from_utf8(self.buf[..headers_end].to_vec()).unwrap();
        self.buf.drain(..headers_end + 4);

        let mut lines = head.split("\r\n");
        let status: u16 = lines
            .next()
            .unwrap()
            .split_whitespace()
            .nth(1)
            .unwrap()
            .parse()
            .unwrap();

        let mut headers = HashMap::new();
        for line in lines {
            let (k, v) = line.split_once(':').unwrap();
            headers.insert(k.trim().to_ascii_lowercase(), v.trim().to_string());
        }

        let mut body = Vec::new();
        if expect_body {
            let len: usize = headers
                .get("content-length")
                .map(|v| v.parse().unwrap())
                .unwrap_or(0);
            while self.buf.len() < len {
                let mut tmp = [0u8; 1024];
                let n = self.stream.read(&mut tmp).await.expect("read body");
                assert!(n > 0, "connection closed mid-body");
                self.buf.extend_from_slice(&tmp[..n]);
            }
            body = self.buf.drain(..len).collect();
        }

        (status, headers, body)
    }

    /// Expect the server to close the connection without sending more data.
    async fn expect_eof(&mut self) {
        assert!(self.buf.is_empty(), "unexpected data before close");
        let mut tmp = [0u8; 64];
        let n = tokio::time::timeout(Duration::from_secs(5), self.stream.read(&mut tmp))
            .await
            .expect("timed out waiting for close")
            .expect("read");
        assert_eq!(n, 0, "expected close, got {n} bytes");
    }
}

#[tokio::test]
async fn test_serves_file_and_keeps_connection() {
    let contents = b"hello world";
    let (_dir, root) = doc_root(&[("hello.txt", contents)]);
    let (mut reader, mut writer) = start_session(root);

    writer
        .write_all(b"GET /hello.txt HTTP/1.1\r\nHost: t\r\n\r\n")
        .await
        .unwrap();

    let (status, headers, body) = reader.next_response(true).await;
    assert_eq!(status, 200);
    assert_eq!(headers.get("content-type").unwrap(), "text/plain");
    assert_eq!(
        headers.get("content-length").unwrap(),
        &contents.len().to_string()
    );
    assert_eq!(headers.get("connection").unwrap(), "keep-alive");
    assert!(headers.get("server").unwrap().starts_with("flexserve/"));
    assert_eq!(body, contents);

    // Connection stays usable for a second request
    writer
        .write_all(b"GET /hello.txt HTTP/1.1\r\nHost: t\r\n\r\n")
        .await
        .unwrap();
    let (status, _, body) = reader.next_response(true).await;
    assert_eq!(status, 200);
    assert_eq!(body, contents);
}

#[tokio::test]
async fn test_pipelined_responses_arrive_in_request_order() {
    let (_dir, root) = doc_root(&[
        ("a.txt", b"alpha"),
        ("b.txt", b"bravo"),
        ("c.txt", b"charlie"),
    ]);
    let (mut reader, mut writer) = start_session(root);

    writer
        .write_all(
            b"GET /a.txt HTTP/1.1\r\nHost: t\r\n\r\n\
              GET /b.txt HTTP/1.1\r\nHost: t\r\n\r\n\
              GET /c.txt HTTP/1.1\r\nHost: t\r\n\r\n",
        )
        .await
        .unwrap();

    for expected in [b"alpha".as_slice(), b"bravo", b"charlie"] {
        let (status, _, body) = reader.next_response(true).await;
        assert_eq!(status, 200);
        assert_eq!(body, expected);
    }
}

#[tokio::test]
async fn test_backpressure_over_queue_limit_loses_nothing() {
    // More pipelined requests than the 8-entry response queue holds;
    // reads pause until writes drain, and every response still arrives
    // exactly once, in order.
    let files: Vec<(String, Vec<u8>)> = (0..12)
        .map(|i| (format!("f{i}.txt"), format!("payload-{i}").into_bytes()))
        .collect();
    let file_refs: Vec<(&str, &[u8])> = files
        .iter()
        .map(|(n, c)| (n.as_str(), c.as_slice()))
        .collect();
    let (_dir, root) = doc_root(&file_refs);
    let (mut reader, mut writer) = start_session(root);

    let mut burst = Vec::new();
    for i in 0..12 {
        burst.extend_from_slice(format!("GET /f{i}.txt HTTP/1.1\r\nHost: t\r\n\r\n").as_bytes());
    }
    writer.write_all(&burst).await.unwrap();

    for i in 0..12 {
        let (status, _, body) = reader.next_response(true).await;
        assert_eq!(status, 200, "response {i}");
        assert_eq!(body, format!("payload-{i}").into_bytes(), "response {i}");
    }
}

#[tokio::test]
async fn test_connection_close_is_honored() {
    let (_dir, root) = doc_root(&[("bye.txt", b"bye")]);
    let (mut reader, mut writer) = start_session(root);

    writer
        .write_all(b"GET /bye.txt HTTP/1.1\r\nHost: t\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();

    let (status, headers, body) = reader.next_response(true).await;
    assert_eq!(status, 200);
    assert_eq!(headers.get("connection").unwrap(), "close");
    assert_eq!(body, b"bye");

    reader.expect_eof().await;
}

#[tokio::test]
async fn test_unknown_method_answered_without_closing() {
    let (_dir, root) = doc_root(&[("ok.txt", b"ok")]);
    let (mut reader, mut writer) = start_session(root);

    writer
        .write_all(b"FETCH /ok.txt HTTP/1.1\r\nHost: t\r\n\r\n")
        .await
        .unwrap();
    let (status, _, body) = reader.next_response(true).await;
    assert_eq!(status, 400);
    assert_eq!(body, b"Unknown HTTP-method");

    // Session survives the rejected method
    writer
        .write_all(b"GET /ok.txt HTTP/1.1\r\nHost: t\r\n\r\n")
        .await
        .unwrap();
    let (status, _, body) = reader.next_response(true).await;
    assert_eq!(status, 200);
    assert_eq!(body, b"ok");
}

#[tokio::test]
async fn test_malformed_request_line_closes_without_response() {
    let (_dir, root) = doc_root(&[]);
    let (mut reader, mut writer) = start_session(root);

    writer.write_all(b"BADREQUEST\r\n\r\n").await.unwrap();

    reader.expect_eof().await;
}

#[tokio::test]
async fn test_oversized_body_gets_400_then_close() {
    let (_dir, root) = doc_root(&[]);
    let (mut reader, mut writer) = start_session(root);

    writer
        .write_all(b"POST /upload HTTP/1.1\r\nHost: t\r\nContent-Length: 20000\r\n\r\n")
        .await
        .unwrap();

    let (status, headers, body) = reader.next_response(true).await;
    assert_eq!(status, 400);
    assert_eq!(headers.get("connection").unwrap(), "close");
    assert_eq!(body, b"Request body exceeds limit");

    reader.expect_eof().await;
}

#[tokio::test]
async fn test_idle_connection_times_out() {
    let (_dir, root) = doc_root(&[]);
    let (client, server) = tokio::io::duplex(4096);
    tokio::spawn(async move {
        let _ = Connection::new(server, root)
            .with_idle_timeout(Duration::from_millis(50))
            .run()
            .await;
    });

    let (read_half, _write_half) = tokio::io::split(client);
    let mut reader = ResponseReader::new(read_half);
    reader.expect_eof().await;
}

#[tokio::test]
async fn test_websocket_upgrade_echoes_frames() {
    let (_dir, root) = doc_root(&[]);
    let (mut reader, mut writer) = start_session(root);

    let key = "dGhlIHNhbXBsZSBub25jZQ==";
    writer
        .write_all(
            format!(
                "GET /chat HTTP/1.1\r\n\
                 Host: t\r\n\
                 Connection: Upgrade\r\n\
                 Upgrade: websocket\r\n\
                 Sec-WebSocket-Version: 13\r\n\
                 Sec-WebSocket-Key: {key}\r\n\
                 \r\n"
            )
            .as_bytes(),
        )
        .await
        .unwrap();

    let (status, headers, _) = reader.next_response(false).await;
    assert_eq!(status, 101);
    assert_eq!(headers.get("upgrade").unwrap(), "websocket");
    assert_eq!(
        headers.get("sec-websocket-accept").unwrap(),
        &derive_accept_key(key.as_bytes())
    );
    assert!(headers.get("server").unwrap().starts_with("flexserve/"));

    // Reunite the halves and speak WebSocket over the upgraded transport
    let client = reader.into_inner().unsplit(writer);
    let mut ws = WebSocketStream::from_raw_socket(client, Role::Client, None).await;

    ws.send(Message::Text("ping".into())).await.unwrap();
    let echoed = ws.next().await.unwrap().unwrap();
    assert_eq!(echoed, Message::Text("ping".into()));

    ws.send(Message::Binary(vec![1, 2, 3].into())).await.unwrap();
    let echoed = ws.next().await.unwrap().unwrap();
    assert_eq!(echoed, Message::Binary(vec![1, 2, 3].into()));

    // A close frame ends the session; no data frames may follow
    ws.send(Message::Close(None)).await.unwrap();
    while let Some(frame) = ws.next().await {
        match frame {
            Ok(Message::Close(_)) => {}
            Ok(other) => panic!("unexpected frame after close: {other:?}"),
            Err(_) => break,
        }
    }
}

#[tokio::test]
async fn test_websocket_upgrade_with_bad_version_closes() {
    let (_dir, root) = doc_root(&[]);
    let (mut reader, mut writer) = start_session(root);

    writer
        .write_all(
            b"GET /chat HTTP/1.1\r\n\
              Host: t\r\n\
              Connection: Upgrade\r\n\
              Upgrade: websocket\r\n\
              Sec-WebSocket-Version: 8\r\n\
              Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
              \r\n",
        )
        .await
        .unwrap();

    reader.expect_eof().await;
}
