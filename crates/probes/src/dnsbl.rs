//! DNS blacklist probe (§4.2 "DNSBL"). Grounded on
//! `original_source/opm/dns.py`'s `DNSBLChecker`: reverse the scanned
//! address's octets, append the zone, resolve an A record, and map the
//! last octet of the result through a reason-code table.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use opm_common::{OpmError, Probe, ProbeError, Resolver, ScanEnvironment};

pub struct DnsblProbe {
    zone: String,
    reasons: HashMap<u8, String>,
    /// Per-probe nameserver override (§4.2 "Supports overriding the
    /// resolver per-probe"); falls back to `env.resolver` when absent.
    resolver: Option<Arc<dyn Resolver>>,
}

impl DnsblProbe {
    pub fn new(zone: impl Into<String>, reasons: HashMap<u8, String>) -> Self {
        Self { zone: zone.into(), reasons, resolver: None }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    fn query_name(&self, ip: IpAddr) -> Option<String> {
        match ip {
            IpAddr::V4(v4) => {
                let octets = v4.octets();
                Some(format!(
                    "{}.{}.{}.{}.{}",
                    octets[3], octets[2], octets[1], octets[0], self.zone
                ))
            }
            IpAddr::V6(v6) => {
                // `dns.py`'s `reversed(address_obj.exploded.replace(":", ""))`:
                // 32 hex nibbles of the fully-expanded address, reversed.
                let exploded: String = v6.segments().iter().map(|seg| format!("{seg:04x}")).collect();
                let nibbles: Vec<String> = exploded.chars().rev().map(|c| c.to_string()).collect();
                Some(format!("{}.{}", nibbles.join("."), self.zone))
            }
        }
    }
}

#[async_trait]
impl Probe for DnsblProbe {
    async fn run(&self, ip: IpAddr, env: &ScanEnvironment) -> Result<Option<String>, ProbeError> {
        let query = match self.query_name(ip) {
            Some(q) => q,
            None => return Ok(None),
        };
        let resolver = self.resolver.as_ref().unwrap_or(&env.resolver);
        let result = match resolver.lookup_a(&query).await {
            Ok(addr) => addr,
            Err(OpmError::Dns(_)) => return Ok(None),
            Err(e) => return Err(ProbeError::Other(e.into())),
        };
        let Some(addr) = result else {
            return Ok(None);
        };
        let reason = addr.octets()[3];
        Ok(Some(
            self.reasons
                .get(&reason)
                .cloned()
                .unwrap_or_else(|| format!("Unknown reason {reason}")),
        ))
    }

    fn name(&self) -> &str {
        "dnsbl"
    }
}
