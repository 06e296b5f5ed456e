//! HTTP response hash probe (§4.2 "HTTP response match"). Grounded on
//! `original_source/opm/http.py`'s `HTTPBodyProtocol`: send a request,
//! parse up to 20 headers looking for `Content-Length`, then hash the
//! body and match the SHA1 hex digest against a table. The stable-header
//! and headers+body digests are a generalization of that same protocol
//! to the full three-hash match §4.2 describes.

use std::collections::HashMap;
use std::net::IpAddr;

use async_trait::async_trait;
use opm_common::{Probe, ProbeError, ScanEnvironment};
use sha1::{Digest, Sha1};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_native_tls::native_tls;

use crate::line_proxy::is_benign_connect_error;
use crate::wire;

const MAX_HEADER_LINES: usize = 20;
const DEFAULT_SEND: &str = "GET / HTTP/1.0\r\n\r\n";

/// The fixed set of headers that feed the stable-header/headers+body
/// hashes (§4.2), in the order they're joined.
const STABLE_HEADERS: [&str; 5] =
    ["content-type", "cache-control", "referrer-policy", "connection", "server"];

pub struct HttpHashProbe {
    port: u16,
    tls: bool,
    send: String,
    bad: HashMap<String, String>,
    /// Body-only (`false`) vs. the full body/headers/headers+body match.
    full: bool,
}

impl HttpHashProbe {
    pub fn new(port: u16, bad: HashMap<String, String>) -> Self {
        Self { port, tls: false, send: DEFAULT_SEND.to_string(), bad, full: false }
    }

    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    pub fn with_send(mut self, send: impl Into<String>) -> Self {
        self.send = send.into();
        self
    }

    pub fn with_full(mut self, full: bool) -> Self {
        self.full = full;
        self
    }
}

async fn open_transport(
    ip: IpAddr,
    port: u16,
    tls: bool,
    bind_address: Option<IpAddr>,
) -> std::io::Result<Box<dyn wire::Stream>> {
    let tcp = wire::connect(ip, port, bind_address).await?;
    if !tls {
        return Ok(Box::new(tcp));
    }
    let builder = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()
        .map_err(std::io::Error::other)?;
    let connector = tokio_native_tls::TlsConnector::from(builder);
    let domain = ip.to_string();
    let tls_stream = connector
        .connect(&domain, tcp)
        .await
        .map_err(std::io::Error::other)?;
    Ok(Box::new(tls_stream))
}

/// Parse response headers off `buf`/`stream`: the declared
/// `Content-Length` (if any), the subset of `STABLE_HEADERS` present
/// (key lower-cased, value as sent), and whatever body bytes were
/// already read past the header block.
async fn read_headers(
    stream: &mut Box<dyn wire::Stream>,
) -> std::io::Result<(Option<usize>, HashMap<String, String>, Vec<u8>)> {
    let mut buf: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 4096];
    let mut header_lines = 0usize;
    let mut content_length = None;
    let mut stable = HashMap::new();

    loop {
        while header_lines <= MAX_HEADER_LINES {
            let Some(pos) = buf.iter().position(|&b| b == b'\n') else {
                break;
            };
            header_lines += 1;
            let raw = buf.drain(..=pos).collect::<Vec<u8>>();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                return Ok((content_length, stable, buf));
            }
            if let Some((key, value)) = line.split_once(':') {
                let key = key.trim().to_lowercase();
                let value = value.trim().to_string();
                if key == "content-length" {
                    content_length = value.parse::<usize>().ok();
                } else if STABLE_HEADERS.contains(&key.as_str()) {
                    stable.insert(key, value);
                }
            }
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok((content_length, stable, buf));
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Join the present stable headers, in `STABLE_HEADERS` order, the same
/// way for both the hashing side and any future debug dump.
fn stable_header_blob(stable: &HashMap<String, String>) -> Vec<u8> {
    let mut blob = Vec::new();
    for key in STABLE_HEADERS {
        if let Some(value) = stable.get(key) {
            blob.extend_from_slice(key.as_bytes());
            blob.extend_from_slice(b": ");
            blob.extend_from_slice(value.as_bytes());
            blob.extend_from_slice(b"\r\n");
        }
    }
    blob
}

fn sha1_hex(data: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher.finalize().iter().map(|b| format!("{b:02x}")).collect()
}

#[async_trait]
impl Probe for HttpHashProbe {
    async fn run(&self, ip: IpAddr, env: &ScanEnvironment) -> Result<Option<String>, ProbeError> {
        let mut stream = match open_transport(ip, self.port, self.tls, env.bind_address).await {
            Ok(stream) => stream,
            Err(e) if is_benign_connect_error(&e) => return Ok(None),
            Err(e) => return Err(ProbeError::Other(e.into())),
        };
        if !self.send.is_empty() {
            stream
                .write_all(self.send.as_bytes())
                .await
                .map_err(|e| ProbeError::Other(e.into()))?;
        }

        let (content_length, stable, mut body) =
            read_headers(&mut stream).await.map_err(|e| ProbeError::Other(e.into()))?;
        let Some(want) = content_length else {
            return Ok(None);
        };

        let mut chunk = [0u8; 4096];
        while body.len() < want {
            let n = stream.read(&mut chunk).await.map_err(|e| ProbeError::Other(e.into()))?;
            if n == 0 {
                return Ok(None);
            }
            body.extend_from_slice(&chunk[..n]);
        }
        body.truncate(want);

        let body_hash = sha1_hex(&body);
        let mut candidates = vec![body_hash];
        if self.full {
            let headers_blob = stable_header_blob(&stable);
            candidates.push(sha1_hex(&headers_blob));
            let mut combined = headers_blob;
            combined.extend_from_slice(&body);
            candidates.push(sha1_hex(&combined));
        }

        Ok(candidates
            .iter()
            .find_map(|hash| self.bad.get(hash).map(|description| format!("{description} ({hash})"))))
    }

    fn name(&self) -> &str {
        match (self.tls, self.full) {
            (false, false) => "http-hash",
            (true, false) => "https-hash",
            (false, true) => "http-response-hash",
            (true, true) => "https-response-hash",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_lookup_formats_reason() {
        let mut bad = HashMap::new();
        bad.insert("aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d".to_string(), "known page".to_string());
        let probe = HttpHashProbe::new(80, bad);
        let got = probe.bad.get("aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d").unwrap();
        assert_eq!(got, "known page");
    }

    #[test]
    fn default_send_is_http_1_0_get() {
        let probe = HttpHashProbe::new(80, HashMap::new());
        assert_eq!(probe.send, "GET / HTTP/1.0\r\n\r\n");
    }

    #[test]
    fn body_only_name_ignores_stable_headers() {
        let probe = HttpHashProbe::new(80, HashMap::new());
        assert_eq!(probe.name(), "http-hash");
    }

    #[test]
    fn full_variant_name_reflects_tls_and_mode() {
        let probe = HttpHashProbe::new(443, HashMap::new()).with_tls(true).with_full(true);
        assert_eq!(probe.name(), "https-response-hash");
    }

    #[test]
    fn stable_header_blob_joins_only_present_headers_in_fixed_order() {
        let mut stable = HashMap::new();
        stable.insert("server".to_string(), "nginx".to_string());
        stable.insert("content-type".to_string(), "text/html".to_string());
        let blob = stable_header_blob(&stable);
        assert_eq!(blob, b"content-type: text/html\r\nserver: nginx\r\n");
    }

    #[test]
    fn full_variant_matches_on_any_of_the_three_hashes() {
        let mut stable = HashMap::new();
        stable.insert("server".to_string(), "nginx".to_string());
        let headers_blob = stable_header_blob(&stable);
        let headers_hash = sha1_hex(&headers_blob);

        let mut bad = HashMap::new();
        bad.insert(headers_hash.clone(), "known headers".to_string());
        let probe = HttpHashProbe::new(80, bad).with_full(true);

        assert_eq!(probe.bad.get(&headers_hash).unwrap(), "known headers");
    }
}
