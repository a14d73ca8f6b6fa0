use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::{TcpListener, TcpSocket};
use tokio_rustls::TlsAcceptor;
use tracing::info;

use crate::server::{self, detect};

/// Accept backlog passed to listen(2).
const BACKLOG: u32 = 1024;

/// Open, configure, bind and listen on the endpoint.
///
/// Each step can fail independently; the failing operation's name is
/// attached to the error so startup logs pinpoint it. Any failure here
/// aborts startup — a port already in use or a privilege problem must
/// not be silently ignored.
pub async fn bind(addr: SocketAddr) -> anyhow::Result<TcpListener> {
    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4().context("open")?,
        SocketAddr::V6(_) => TcpSocket::new_v6().context("open")?,
    };

    // Allow the address to be reused to avoid conflicts on restart
    socket.set_reuseaddr(true).context("set_option")?;
    socket.bind(addr).context("bind")?;
    let listener = socket.listen(BACKLOG).context("listen")?;

    info!("Listening on {}", addr);
    Ok(listener)
}

/// Accept connections forever, spawning one detector task per connection.
///
/// Accept failures are logged and skipped; a transient accept error must
/// never take the listener down once the server is up.
pub async fn run(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    doc_root: Arc<String>,
) -> anyhow::Result<()> {
    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                server::fail(e, "accept");
                continue;
            }
        };

        info!("Accepted connection from {}", peer);

        let acceptor = acceptor.clone();
        let doc_root = doc_root.clone();
        tokio::spawn(async move {
            if let Err(e) = detect::run(socket, acceptor, doc_root).await {
                server::fail(e, "session");
            }
        });
    }
}
