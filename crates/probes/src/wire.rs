//! Connection and substring-matching helpers shared by the line-based
//! proxy probes (§4.2 "Common wiring"). Grounded on `vajra_scanner_tcp`'s
//! `try_connect` for the bind/connect shape; the match loop replaces
//! `vajra-fingerprint`'s banner table walk with straight substring search
//! against the accumulated buffer, which is the Rust equivalent of the
//! original's per-line-plus-partial-buffer check (every byte that ever
//! arrives stays eligible for a match until the cap is hit).

use std::net::{IpAddr, SocketAddr};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpSocket, TcpStream};

/// Open a TCP connection to `(ip, port)`, honoring an optional bind address
/// (§6 "bind-address").
pub(crate) async fn connect(
    ip: IpAddr,
    port: u16,
    bind_address: Option<IpAddr>,
) -> std::io::Result<TcpStream> {
    let socket = match ip {
        IpAddr::V4(_) => TcpSocket::new_v4()?,
        IpAddr::V6(_) => TcpSocket::new_v6()?,
    };
    if let Some(bind) = bind_address {
        socket.bind(SocketAddr::new(bind, 0))?;
    }
    socket.connect(SocketAddr::new(ip, port)).await
}

/// Object-safe stand-in for "plain TCP or TLS-wrapped TCP", so the banner
/// and HTTP-hash probes can share one read loop regardless of transport.
pub(crate) trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Stream for T {}

/// Write `bytes` then read up to `max_bytes`, returning `true` the moment
/// any of `target_strings` appears anywhere in what has been received so
/// far.
pub(crate) async fn send_and_match(
    stream: &mut TcpStream,
    bytes: &[u8],
    target_strings: &[String],
    max_bytes: usize,
) -> std::io::Result<bool> {
    if !bytes.is_empty() {
        stream.write_all(bytes).await?;
    }
    read_match(stream, target_strings, max_bytes).await
}

/// Read up to `max_bytes` from `stream`, returning `true` the moment any
/// of `target_strings` appears anywhere in the accumulated buffer.
pub(crate) async fn read_match(
    stream: &mut TcpStream,
    target_strings: &[String],
    max_bytes: usize,
) -> std::io::Result<bool> {
    if target_strings.is_empty() {
        return Ok(false);
    }
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(false);
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf);
        if target_strings.iter().any(|s| text.contains(s.as_str())) {
            return Ok(true);
        }
        if buf.len() >= max_bytes {
            return Ok(false);
        }
    }
}
