//! SOCKS4 and SOCKS5 CONNECT probes (§4.2 "Proxy probes"). Packet layouts
//! are lifted byte-for-byte from `original_source/opm/proxy.py`'s
//! `SOCKS4Protocol`/`SOCKS5Protocol` (themselves referencing the SOCKS4
//! draft and RFC 1928); the SOCKS5 negotiation reply is never read, the
//! CONNECT request is written straight after the greeting.

use std::net::{IpAddr, Ipv4Addr};

use async_trait::async_trait;
use opm_common::{Probe, ProbeError, ScanEnvironment};

use crate::line_proxy::is_benign_connect_error;
use crate::wire;

fn target_v4(env: &ScanEnvironment) -> Ipv4Addr {
    env.target_ip
}

pub struct Socks4Probe {
    port: u16,
}

pub struct Socks5Probe {
    port: u16,
}

pub fn socks4(port: u16) -> Socks4Probe {
    Socks4Probe { port }
}

pub fn socks5(port: u16) -> Socks5Probe {
    Socks5Probe { port }
}

fn socks4_packet(env: &ScanEnvironment) -> Vec<u8> {
    let mut packet = Vec::with_capacity(9);
    packet.push(4); // version
    packet.push(1); // command: CONNECT
    packet.extend_from_slice(&env.target_port.to_be_bytes());
    packet.extend_from_slice(&target_v4(env).octets());
    packet.push(0); // empty user-id terminator
    packet
}

fn socks5_packets(env: &ScanEnvironment) -> Vec<u8> {
    let mut packet = Vec::with_capacity(13);
    packet.extend_from_slice(&[5, 1, 0]); // version, 1 method, no-auth
    packet.push(5); // version
    packet.push(1); // command: CONNECT
    packet.push(0); // reserved
    packet.push(1); // address type: IPv4
    packet.extend_from_slice(&target_v4(env).octets());
    packet.extend_from_slice(&env.target_port.to_be_bytes());
    packet
}

#[async_trait]
impl Probe for Socks4Probe {
    async fn run(&self, ip: IpAddr, env: &ScanEnvironment) -> Result<Option<String>, ProbeError> {
        let mut stream = match wire::connect(ip, self.port, env.bind_address).await {
            Ok(stream) => stream,
            Err(e) if is_benign_connect_error(&e) => return Ok(None),
            Err(e) => return Err(ProbeError::Other(e.into())),
        };
        let packet = socks4_packet(env);
        match wire::send_and_match(&mut stream, &packet, &env.target_strings, env.max_bytes).await
        {
            Ok(true) => Ok(Some(format!("SOCKS 4 ({})", self.port))),
            Ok(false) => Ok(None),
            Err(e) => Err(ProbeError::Other(e.into())),
        }
    }

    fn name(&self) -> &str {
        "socks4"
    }
}

#[async_trait]
impl Probe for Socks5Probe {
    async fn run(&self, ip: IpAddr, env: &ScanEnvironment) -> Result<Option<String>, ProbeError> {
        let mut stream = match wire::connect(ip, self.port, env.bind_address).await {
            Ok(stream) => stream,
            Err(e) if is_benign_connect_error(&e) => return Ok(None),
            Err(e) => return Err(ProbeError::Other(e.into())),
        };
        let packet = socks5_packets(env);
        match wire::send_and_match(&mut stream, &packet, &env.target_strings, env.max_bytes).await
        {
            Ok(true) => Ok(Some(format!("SOCKS 5 ({})", self.port))),
            Ok(false) => Ok(None),
            Err(e) => Err(ProbeError::Other(e.into())),
        }
    }

    fn name(&self) -> &str {
        "socks5"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct NullResolver;
    #[async_trait]
    impl opm_common::Resolver for NullResolver {
        async fn lookup_ptr(&self, _ip: IpAddr) -> Result<Option<String>, opm_common::OpmError> {
            Ok(None)
        }
        async fn lookup_a(
            &self,
            _name: &str,
        ) -> Result<Option<Ipv4Addr>, opm_common::OpmError> {
            Ok(None)
        }
        async fn resolve_host(&self, _host: &str) -> Result<Vec<IpAddr>, opm_common::OpmError> {
            Ok(Vec::new())
        }
    }

    fn env() -> ScanEnvironment {
        ScanEnvironment::new(
            Ipv4Addr::new(203, 0, 113, 7),
            6667,
            "http://203.0.113.7:6667/",
            Arc::new(NullResolver),
        )
    }

    #[test]
    fn socks4_packet_layout() {
        let packet = socks4_packet(&env());
        assert_eq!(packet, vec![4, 1, 0x1A, 0x0B, 203, 0, 113, 7, 0]);
    }

    #[test]
    fn socks5_packet_layout() {
        let packet = socks5_packets(&env());
        assert_eq!(
            packet,
            vec![5, 1, 0, 5, 1, 0, 1, 203, 0, 113, 7, 0x1A, 0x0B]
        );
    }
}
