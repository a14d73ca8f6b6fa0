//! TLS context construction and certificate loading.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::ServerConfig;

/// Build the process-wide TLS acceptor from PEM certificate and key files.
///
/// Called once at startup; any failure here is fatal to the whole process,
/// never a per-connection concern.
pub fn load_server_certificate(cert_path: &Path, key_path: &Path) -> anyhow::Result<TlsAcceptor> {
    let cert_file = File::open(cert_path)
        .with_context(|| format!("opening certificate file {}", cert_path.display()))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(cert_file))
        .collect::<Result<Vec<_>, _>>()
        .context("reading certificate chain")?;
    if certs.is_empty() {
        anyhow::bail!("no certificates found in {}", cert_path.display());
    }

    let key_file = File::open(key_path)
        .with_context(|| format!("opening private key file {}", key_path.display()))?;
    let key = rustls_pemfile::private_key(&mut BufReader::new(key_file))
        .context("reading private key")?
        .ok_or_else(|| anyhow::anyhow!("no private key found in {}", key_path.display()))?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("certificate/key pair rejected")?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}
