//! opm-resolver — async DNS for the rDNS/DNSBL probes and the `check`
//! command. Grounded on `vajra-target-resolver`'s "do DNS work off the
//! async-unfriendly resolver API" shape, generalized from CIDR/hostname
//! expansion to PTR/A lookups and wrapped behind `opm_common::Resolver`
//! so the probe library never names `trust-dns-resolver` directly.

use std::net::{IpAddr, Ipv4Addr};

use opm_common::{OpmError, Resolver};
use trust_dns_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use trust_dns_resolver::error::ResolveErrorKind;
use trust_dns_resolver::TokioAsyncResolver;

/// `opm_common::Resolver` backed by `trust-dns-resolver`.
pub struct DnsResolver {
    inner: TokioAsyncResolver,
}

impl DnsResolver {
    /// Build a resolver using the system's configured nameservers.
    pub fn system() -> anyhow::Result<Self> {
        let (config, opts) = trust_dns_resolver::system_conf::read_system_conf()?;
        Ok(Self {
            inner: TokioAsyncResolver::tokio(config, opts),
        })
    }

    /// Build a resolver pointed at a single nameserver, `host[:port]`
    /// (§4.2 DNSBL "Supports overriding the resolver per-probe").
    pub fn with_nameserver(nameserver: &str) -> anyhow::Result<Self> {
        let (host, port) = match nameserver.split_once(':') {
            Some((h, p)) => (h, p.parse::<u16>().unwrap_or(53)),
            None => (nameserver, 53),
        };
        let ip: IpAddr = host.parse()?;
        let group = NameServerConfigGroup::from_ips_clear(&[ip], port, true);
        let config = ResolverConfig::from_parts(None, vec![], group);
        Ok(Self {
            inner: TokioAsyncResolver::tokio(config, ResolverOpts::default()),
        })
    }
}

fn is_nxdomain(err: &trust_dns_resolver::error::ResolveError) -> bool {
    matches!(err.kind(), ResolveErrorKind::NoRecordsFound { .. })
}

#[async_trait::async_trait]
impl Resolver for DnsResolver {
    async fn lookup_ptr(&self, ip: IpAddr) -> Result<Option<String>, OpmError> {
        match self.inner.reverse_lookup(ip).await {
            Ok(lookup) => Ok(lookup
                .iter()
                .next()
                .map(|name| name.to_string().trim_end_matches('.').to_string())),
            Err(e) if is_nxdomain(&e) => Ok(None),
            Err(e) => Err(OpmError::Dns(e.to_string())),
        }
    }

    async fn lookup_a(&self, name: &str) -> Result<Option<Ipv4Addr>, OpmError> {
        match self.inner.ipv4_lookup(name).await {
            Ok(lookup) => Ok(lookup.iter().next().copied()),
            Err(e) if is_nxdomain(&e) => Ok(None),
            Err(e) => Err(OpmError::Dns(e.to_string())),
        }
    }

    async fn resolve_host(&self, host: &str) -> Result<Vec<IpAddr>, OpmError> {
        match self.inner.lookup_ip(host).await {
            Ok(lookup) => Ok(lookup.iter().collect()),
            Err(e) if is_nxdomain(&e) => Ok(Vec::new()),
            Err(e) => Err(OpmError::Dns(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_nameserver_accepts_host_port() {
        let r = DnsResolver::with_nameserver("127.0.0.1:5353");
        assert!(r.is_ok());
    }

    #[test]
    fn with_nameserver_defaults_port_53() {
        let r = DnsResolver::with_nameserver("127.0.0.1");
        assert!(r.is_ok());
    }

    #[test]
    fn with_nameserver_rejects_bad_host() {
        let r = DnsResolver::with_nameserver("not-an-ip");
        assert!(r.is_err());
    }
}
