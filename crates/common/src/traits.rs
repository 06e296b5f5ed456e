//! Seams between the engine, the probe library, and the resolver.

use std::net::{IpAddr, Ipv4Addr};

use async_trait::async_trait;

use crate::error::{OpmError, ProbeError};
use crate::types::ScanEnvironment;

/// One network test producing `None` ("not a proxy") or a reason string
/// (GLOSSARY "Probe"). Implementations live in `opm-probes`.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Run this probe against `ip`. Connection-refused and connect-timeout
    /// are folded into `Ok(None)` by the implementation (§4.2); any other
    /// I/O failure is surfaced as `ProbeError::Other`.
    async fn run(&self, ip: IpAddr, env: &ScanEnvironment) -> Result<Option<String>, ProbeError>;

    /// Short identifier used in config (`protocols: [[pool, name, ...]]`, §6)
    /// and in the static probe registry (§9 "Plugin registry").
    fn name(&self) -> &str;
}

/// DNS operations the rDNS/DNSBL probes and the `check <host>` command need.
/// Implemented by `opm-resolver`; kept as a trait so `opm-common` and
/// `opm-probes` never depend on a concrete resolver crate.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// PTR-resolve `ip`, returning the first name if any.
    async fn lookup_ptr(&self, ip: IpAddr) -> Result<Option<String>, OpmError>;

    /// A-resolve `name`, returning the first IPv4 address if any.
    /// `NXDOMAIN` and similar "no such name" outcomes are `Ok(None)`.
    async fn lookup_a(&self, name: &str) -> Result<Option<Ipv4Addr>, OpmError>;

    /// Resolve a hostname typed into the `check` command to every IP it has.
    async fn resolve_host(&self, host: &str) -> Result<Vec<IpAddr>, OpmError>;
}
