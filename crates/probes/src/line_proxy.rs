//! CONNECT/POST/GET/Wingate/Cisco proxy probes (§4.2 "Proxy probes").
//! Wire bytes are lifted verbatim from `original_source/opm/proxy.py`'s
//! `*Protocol.connectionMade` methods; the `\r\n` delimiter and the
//! read-and-substring-match loop live in [`crate::wire`].

use std::net::IpAddr;

use async_trait::async_trait;
use opm_common::{ProbeError, ScanEnvironment};

use crate::wire;

#[derive(Clone, Copy, Debug)]
enum Kind {
    HttpConnect,
    HttpPost,
    HttpGet,
    Wingate,
    Cisco,
}

impl Kind {
    fn registry_name(self) -> &'static str {
        match self {
            Kind::HttpConnect => "http-connect",
            Kind::HttpPost => "http-post",
            Kind::HttpGet => "http-get",
            Kind::Wingate => "wingate",
            Kind::Cisco => "cisco",
        }
    }

    fn message(self) -> &'static str {
        match self {
            Kind::HttpConnect => "HTTP CONNECT",
            Kind::HttpPost => "HTTP POST",
            Kind::HttpGet => "HTTP GET",
            Kind::Wingate => "Wingate",
            Kind::Cisco => "cisco router (telnet)",
        }
    }

    fn request(self, env: &ScanEnvironment) -> Vec<u8> {
        let lines: Vec<String> = match self {
            Kind::HttpConnect => vec![
                format!("CONNECT {}:{} HTTP/1.0", env.target_ip, env.target_port),
                String::new(),
            ],
            Kind::HttpPost => vec![
                format!("POST {} HTTP/1.0", env.target_url),
                "Content-type: text/plain".to_string(),
                "Content-length: 5".to_string(),
                String::new(),
                "quit".to_string(),
                String::new(),
            ],
            Kind::HttpGet => vec![format!("GET {} HTTP/1.0", env.target_url), String::new()],
            Kind::Wingate => vec![format!("{}:{}", env.target_ip, env.target_port)],
            Kind::Cisco => vec![
                "cisco".to_string(),
                format!("telnet {} {}", env.target_ip, env.target_port),
            ],
        };
        let mut out = Vec::new();
        for line in lines {
            out.extend_from_slice(line.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out
    }
}

pub struct LineProxyProbe {
    kind: Kind,
    port: u16,
}

#[async_trait]
impl opm_common::Probe for LineProxyProbe {
    async fn run(&self, ip: IpAddr, env: &ScanEnvironment) -> Result<Option<String>, ProbeError> {
        let mut stream = match wire::connect(ip, self.port, env.bind_address).await {
            Ok(stream) => stream,
            Err(e) if is_benign_connect_error(&e) => return Ok(None),
            Err(e) => return Err(ProbeError::Other(e.into())),
        };
        let request = self.kind.request(env);
        match wire::send_and_match(&mut stream, &request, &env.target_strings, env.max_bytes)
            .await
        {
            Ok(true) => Ok(Some(format!("{} ({})", self.kind.message(), self.port))),
            Ok(false) => Ok(None),
            Err(e) => Err(ProbeError::Other(e.into())),
        }
    }

    fn name(&self) -> &str {
        self.kind.registry_name()
    }
}

/// §7/`proxy.py`'s `fail.trap(ConnectionRefusedError, TCPTimedOutError)`:
/// only refused and timed-out connects mean "not a proxy". Any other
/// connect failure is a real transport error and must propagate.
pub(crate) fn is_benign_connect_error(e: &std::io::Error) -> bool {
    use std::io::ErrorKind::*;
    matches!(e.kind(), ConnectionRefused | TimedOut)
}

pub fn http_connect(port: u16) -> LineProxyProbe {
    LineProxyProbe { kind: Kind::HttpConnect, port }
}

pub fn http_post(port: u16) -> LineProxyProbe {
    LineProxyProbe { kind: Kind::HttpPost, port }
}

pub fn http_get(port: u16) -> LineProxyProbe {
    LineProxyProbe { kind: Kind::HttpGet, port }
}

pub fn wingate(port: u16) -> LineProxyProbe {
    LineProxyProbe { kind: Kind::Wingate, port }
}

pub fn cisco(port: u16) -> LineProxyProbe {
    LineProxyProbe { kind: Kind::Cisco, port }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
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
            Ipv4Addr::new(10, 0, 0, 1),
            6667,
            "http://10.0.0.1:6667/",
            Arc::new(NullResolver),
        )
    }

    #[test]
    fn http_connect_request_bytes() {
        let req = Kind::HttpConnect.request(&env());
        assert_eq!(req, b"CONNECT 10.0.0.1:6667 HTTP/1.0\r\n\r\n".to_vec());
    }

    #[test]
    fn wingate_request_bytes() {
        let req = Kind::Wingate.request(&env());
        assert_eq!(req, b"10.0.0.1:6667\r\n".to_vec());
    }

    #[test]
    fn cisco_request_bytes() {
        let req = Kind::Cisco.request(&env());
        assert_eq!(req, b"cisco\r\ntelnet 10.0.0.1 6667\r\n".to_vec());
    }

    #[test]
    fn registry_names_are_stable() {
        assert_eq!(http_connect(80).name(), "http-connect");
        assert_eq!(http_post(80).name(), "http-post");
        assert_eq!(http_get(80).name(), "http-get");
        assert_eq!(wingate(23).name(), "wingate");
        assert_eq!(cisco(23).name(), "cisco");
    }

    #[test]
    fn only_refused_and_timed_out_are_benign() {
        use std::io::{Error, ErrorKind};
        assert!(is_benign_connect_error(&Error::from(ErrorKind::ConnectionRefused)));
        assert!(is_benign_connect_error(&Error::from(ErrorKind::TimedOut)));
        assert!(!is_benign_connect_error(&Error::from(ErrorKind::ConnectionReset)));
        assert!(!is_benign_connect_error(&Error::from(ErrorKind::ConnectionAborted)));
        assert!(!is_benign_connect_error(&Error::from(ErrorKind::HostUnreachable)));
    }
}
