//! Plain/TLS transport for the IRC connection (§6 "irc: ... ssl?").
//!
//! Same object-safety trick as `opm-probes`' `wire::Stream`: the core
//! `AsyncRead`/`AsyncWrite` traits are object-safe, so a boxed trait object
//! lets the rest of the presence ignore whether the socket is wrapped in
//! TLS.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

pub(crate) trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Stream for T {}

pub type BoxedStream = Box<dyn Stream>;
pub type Reader = tokio::io::ReadHalf<BoxedStream>;
pub type Writer = tokio::io::WriteHalf<BoxedStream>;

/// Connect to `host:port`, optionally wrapping in TLS with certificate
/// verification disabled — IRC networks' opers almost universally run
/// self-signed or non-chain-verifiable certs, and the original Twisted
/// client never verified either.
pub async fn connect(host: &str, port: u16, use_tls: bool) -> anyhow::Result<BoxedStream> {
    let tcp = TcpStream::connect((host, port)).await?;
    if !use_tls {
        return Ok(Box::new(tcp));
    }

    let connector = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()?;
    let connector = tokio_native_tls::TlsConnector::from(connector);
    let tls = connector.connect(host, tcp).await?;
    Ok(Box::new(tls))
}

/// Split a boxed stream into independent read/write halves so the reader
/// loop and the rate-limited writer can own one each.
pub fn split(stream: BoxedStream) -> (Reader, Writer) {
    tokio::io::split(stream)
}
