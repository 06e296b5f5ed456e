//! opm-probes — the probe library (§4.2) and its static registry (§9).
//!
//! Every probe implements `opm_common::Probe`; none of them know about
//! scansets, pools, or cancellation — that's the engine's job. Wire
//! formats are grounded on `original_source/opm`'s `proxy.py`/`dns.py`/
//! `cert.py`/`banner.py`/`http.py`; connection handling follows
//! `vajra_scanner_tcp`'s connect/retry shape and `thomas0903-lan-scan-rs`'s
//! TLS inspection.

mod banner;
mod cert;
mod dnsbl;
mod http;
mod line_proxy;
mod rdns;
mod registry;
mod socks;
mod wire;

pub use banner::BannerProbe;
pub use cert::TlsCertProbe;
pub use dnsbl::DnsblProbe;
pub use http::HttpHashProbe;
pub use line_proxy::{cisco, http_connect, http_get, http_post, wingate, LineProxyProbe};
pub use rdns::RdnsProbe;
pub use registry::{known_names, lookup};
pub use socks::{socks4, socks5};
