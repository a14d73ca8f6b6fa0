use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct Config {
    pub address: IpAddr,
    pub port: u16,
    pub doc_root: Arc<String>,
    pub threads: usize,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

impl Config {
    pub const USAGE: &'static str = "\
Usage: flexserve <address> <port> <doc_root> <threads>
Example:
    flexserve 0.0.0.0 8080 . 1
Certificates are read from the CERT_PATH and KEY_PATH environment variables.
";

    /// Parse positional command-line arguments (without the program name).
    ///
    /// Certificate and key locations come from the `CERT_PATH` and
    /// `KEY_PATH` environment variables; a missing variable is a startup
    /// failure because every server instance must be able to answer TLS
    /// connections.
    pub fn from_args(mut args: impl Iterator<Item = String>) -> Result<Self, String> {
        let (Some(address), Some(port), Some(doc_root), Some(threads), None) =
            (args.next(), args.next(), args.next(), args.next(), args.next())
        else {
            return Err("wrong number of arguments".to_string());
        };

        let address = address
            .parse::<IpAddr>()
            .map_err(|_| format!("invalid address: {address}"))?;
        let port = port
            .parse::<u16>()
            .map_err(|_| format!("invalid port: {port}"))?;
        let threads = threads
            .parse::<usize>()
            .map_err(|_| format!("invalid thread count: {threads}"))?
            .max(1);

        let cert_path = std::env::var("CERT_PATH")
            .map_err(|_| "missing CERT_PATH environment variable".to_string())?;
        let key_path = std::env::var("KEY_PATH")
            .map_err(|_| "missing KEY_PATH environment variable".to_string())?;

        Ok(Self {
            address,
            port,
            doc_root: Arc::new(doc_root),
            threads,
            cert_path: PathBuf::from(cert_path),
            key_path: PathBuf::from(key_path),
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}
