//! Line-banner probe (§4.2 "Banner"). Grounded on
//! `original_source/opm/banner.py`'s `BannerProtocol`: collect up to 20
//! lines, stop early on a blank line, fold any unterminated trailing
//! bytes into one more pseudo-line, and match each named group's full
//! set of required lines against what was seen.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;

use async_trait::async_trait;
use opm_common::{Probe, ProbeError, ScanEnvironment};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_native_tls::native_tls;

use crate::line_proxy::is_benign_connect_error;
use crate::wire;

const MAX_LINES: usize = 20;

pub struct BannerProbe {
    port: u16,
    tls: bool,
    send: Option<String>,
    groups: Vec<(String, HashSet<String>)>,
}

impl BannerProbe {
    pub fn new(port: u16, groups: HashMap<String, Vec<String>>) -> Self {
        Self {
            port,
            tls: false,
            send: None,
            groups: groups
                .into_iter()
                .map(|(k, v)| (k, v.into_iter().collect()))
                .collect(),
        }
    }

    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    pub fn with_send(mut self, send: impl Into<String>) -> Self {
        self.send = Some(send.into());
        self
    }

    fn check(&self, lines: &HashSet<String>) -> Option<String> {
        for (key, required) in &self.groups {
            if required.is_subset(lines) {
                return Some(format!("TCP banner ({key})"));
            }
        }
        None
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

/// Read up to [`MAX_LINES`] newline-delimited lines, stopping at the first
/// blank line or once a group's required lines are all present. Any bytes
/// left over when the peer closes the connection become one last line.
async fn read_lines(
    stream: &mut Box<dyn wire::Stream>,
    send: Option<&str>,
    on_line: impl Fn(&HashSet<String>) -> Option<String>,
) -> std::io::Result<Option<String>> {
    if let Some(payload) = send {
        stream.write_all(payload.as_bytes()).await?;
    }

    let mut lines: HashSet<String> = HashSet::new();
    let mut buf: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
            let raw = buf.drain(..=pos).collect::<Vec<u8>>();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            let line = line.trim_end_matches('\r').to_string();

            if line.is_empty() || lines.len() > MAX_LINES {
                return Ok(None);
            }
            lines.insert(line);
            if let Some(verdict) = on_line(&lines) {
                return Ok(Some(verdict));
            }
        }
    }

    if !buf.is_empty() {
        let trailing = String::from_utf8_lossy(&buf).to_string();
        lines.insert(trailing);
        return Ok(on_line(&lines));
    }
    Ok(None)
}

#[async_trait]
impl Probe for BannerProbe {
    async fn run(&self, ip: IpAddr, env: &ScanEnvironment) -> Result<Option<String>, ProbeError> {
        let mut stream = match open_transport(ip, self.port, self.tls, env.bind_address).await {
            Ok(stream) => stream,
            Err(e) if is_benign_connect_error(&e) => return Ok(None),
            Err(e) => return Err(ProbeError::Other(e.into())),
        };
        read_lines(&mut stream, self.send.as_deref(), |lines| self.check(lines))
            .await
            .map_err(|e| ProbeError::Other(e.into()))
    }

    fn name(&self) -> &str {
        if self.tls {
            "tls-banner"
        } else {
            "banner"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn groups(pairs: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    #[test]
    fn check_requires_full_subset() {
        let probe = BannerProbe::new(23, groups(&[("wingate", &["a", "b"])]));
        let mut lines = HashSet::new();
        lines.insert("a".to_string());
        assert_eq!(probe.check(&lines), None);
        lines.insert("b".to_string());
        assert_eq!(probe.check(&lines), Some("TCP banner (wingate)".to_string()));
    }

    #[test]
    fn extra_lines_still_match() {
        let probe = BannerProbe::new(23, groups(&[("wingate", &["a"])]));
        let mut lines = HashSet::new();
        lines.insert("a".to_string());
        lines.insert("unrelated".to_string());
        assert_eq!(probe.check(&lines), Some("TCP banner (wingate)".to_string()));
    }
}
