//! Reverse-DNS hostname probe (§4.2 "rDNS"). Grounded on
//! `original_source/opm/dns.py`'s `rDNSChecker`: PTR-resolve the scanned
//! address, full-match the result against a case-insensitive pattern
//! table, first match wins.

use std::net::IpAddr;

use async_trait::async_trait;
use opm_common::{Probe, ProbeError, ScanEnvironment};
use regex::Regex;

pub struct RdnsProbe {
    patterns: Vec<(Regex, String)>,
}

impl RdnsProbe {
    pub fn new(bad: Vec<(String, String)>) -> Result<Self, regex::Error> {
        let patterns = bad
            .into_iter()
            .map(|(pattern, description)| {
                Regex::new(&format!("(?i)^(?:{pattern})$")).map(|re| (re, description))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }
}

#[async_trait]
impl Probe for RdnsProbe {
    async fn run(&self, ip: IpAddr, env: &ScanEnvironment) -> Result<Option<String>, ProbeError> {
        let name = match env
            .resolver
            .lookup_ptr(ip)
            .await
            .map_err(|e| ProbeError::Other(e.into()))?
        {
            Some(name) => name,
            None => return Ok(None),
        };
        for (pattern, description) in &self.patterns {
            if pattern.is_match(&name) {
                return Ok(Some(description.clone()));
            }
        }
        Ok(None)
    }

    fn name(&self) -> &str {
        "rdns"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_match_is_anchored() {
        let probe = RdnsProbe::new(vec![("dialup.*\\.example\\.net".to_string(), "dialup".to_string())]).unwrap();
        let (re, _) = &probe.patterns[0];
        assert!(re.is_match("dialup-1-2-3.example.net"));
        assert!(!re.is_match("notdialup-1-2-3.example.net.evil.com"));
    }

    #[test]
    fn match_is_case_insensitive() {
        let probe = RdnsProbe::new(vec![("proxy\\.example\\.net".to_string(), "proxy".to_string())]).unwrap();
        let (re, _) = &probe.patterns[0];
        assert!(re.is_match("PROXY.EXAMPLE.NET"));
    }
}
