//! TLS certificate probe (§4.2 "TLS certificate"). Grounded on
//! `thomas0903-lan-scan-rs`'s `tls_probe`/`format_cert_summary` for the
//! connect-with-no-verification-then-inspect shape, and on
//! `original_source/opm/cert.py`'s `CertificateProtocol` for which
//! candidate keys (`sha1:`, `scn:`, `son:`, `icn:`, `ion:`, `san:`) get
//! built and matched.

use std::net::IpAddr;

use async_trait::async_trait;
use opm_common::{Probe, ProbeError, ScanEnvironment};
use regex::Regex;
use sha1::{Digest, Sha1};
use tokio_native_tls::native_tls;
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::*;

use crate::line_proxy::is_benign_connect_error;
use crate::wire;

pub struct TlsCertProbe {
    port: u16,
    patterns: Vec<(Regex, String)>,
}

impl TlsCertProbe {
    pub fn new(port: u16, bad: Vec<(String, String)>) -> Result<Self, regex::Error> {
        let patterns = bad
            .into_iter()
            .map(|(pattern, description)| {
                Regex::new(&format!("(?i)^(?:{pattern})$")).map(|re| (re, description))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { port, patterns })
    }

    fn find_match(&self, candidates: &[(&str, String)]) -> Option<String> {
        for (pattern, description) in &self.patterns {
            for (prefix, value) in candidates {
                let key = format!("{prefix}:{value}");
                if pattern.is_match(&key) {
                    return Some(format!("{description} ({key})"));
                }
            }
        }
        None
    }
}

/// Build the `sha1:`/`scn:`/`son:`/`icn:`/`ion:`/`san:` candidate keys for
/// one DER-encoded certificate (§4.2 "TLS certificate").
fn candidate_keys(der: &[u8]) -> Vec<(&'static str, String)> {
    let mut out = Vec::new();
    let mut hasher = Sha1::new();
    hasher.update(der);
    out.push(("sha1", to_hex(&hasher.finalize())));

    let Ok((_, cert)) = parse_x509_certificate(der) else {
        return out;
    };

    if let Some(cn) = cert.subject().iter_common_name().next().and_then(|a| a.as_str().ok()) {
        out.push(("scn", cn.to_string()));
    }
    if let Some(on) = cert.subject().iter_organization().next().and_then(|a| a.as_str().ok()) {
        out.push(("son", on.to_string()));
    }
    if let Some(cn) = cert.issuer().iter_common_name().next().and_then(|a| a.as_str().ok()) {
        out.push(("icn", cn.to_string()));
    }
    if let Some(on) = cert.issuer().iter_organization().next().and_then(|a| a.as_str().ok()) {
        out.push(("ion", on.to_string()));
    }
    if let Ok(Some(ext)) = cert.subject_alternative_name() {
        for name in &ext.value.general_names {
            match name {
                GeneralName::DNSName(s) => out.push(("san", s.to_string())),
                GeneralName::IPAddress(bytes) => out.push(("san", format_ip(bytes))),
                _ => {}
            }
        }
    }
    out
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn format_ip(bytes: &[u8]) -> String {
    match bytes.len() {
        4 => std::net::Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]).to_string(),
        _ => bytes.iter().map(|b| format!("{b:02x}")).collect::<Vec<_>>().join(":"),
    }
}

#[async_trait]
impl Probe for TlsCertProbe {
    async fn run(&self, ip: IpAddr, env: &ScanEnvironment) -> Result<Option<String>, ProbeError> {
        let stream = match wire::connect(ip, self.port, env.bind_address).await {
            Ok(stream) => stream,
            Err(e) if is_benign_connect_error(&e) => return Ok(None),
            Err(e) => return Err(ProbeError::Other(e.into())),
        };

        let builder = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()
            .map_err(|e| ProbeError::Other(e.into()))?;
        let connector = tokio_native_tls::TlsConnector::from(builder);
        let domain = ip.to_string();
        let tls = match connector.connect(&domain, stream).await {
            Ok(tls) => tls,
            Err(e) => return Err(ProbeError::Other(anyhow::anyhow!(e))),
        };

        let cert = match tls.get_ref().peer_certificate() {
            Ok(Some(cert)) => cert,
            Ok(None) => return Ok(None),
            Err(e) => return Err(ProbeError::Other(anyhow::anyhow!(e))),
        };
        let der = cert.to_der().map_err(|e| ProbeError::Other(anyhow::anyhow!(e)))?;
        let candidates = candidate_keys(&der);
        Ok(self.find_match(&candidates))
    }

    fn name(&self) -> &str {
        "tls-cert"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_key_is_lowercase_hex() {
        let mut hasher = Sha1::new();
        hasher.update(b"hello");
        let hex = to_hex(&hasher.finalize());
        assert_eq!(hex.len(), 40);
        assert_eq!(hex, hex.to_lowercase());
    }

    #[test]
    fn find_match_first_pattern_wins() {
        let probe = TlsCertProbe::new(
            443,
            vec![("sha1:abc".to_string(), "known bad cert".to_string())],
        )
        .unwrap();
        let candidates = vec![("sha1", "abc".to_string())];
        assert_eq!(
            probe.find_match(&candidates),
            Some("known bad cert (sha1:abc)".to_string())
        );
    }
}
