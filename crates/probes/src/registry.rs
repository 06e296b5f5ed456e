//! Static probe registry (§9 "Plugin registry is a static registration
//! table"). Each entry turns a YAML args blob from `protocols:` (§6) into
//! a boxed [`Probe`]; there is no dynamic plugin loading.

use std::collections::HashMap;
use std::sync::Arc;

use opm_common::Probe;
use serde::Deserialize;

use crate::{banner, cert, dnsbl, http, line_proxy, rdns, socks};

type Constructor = fn(&serde_yaml::Value) -> anyhow::Result<Arc<dyn Probe>>;

/// Look up a probe constructor by its config-facing name.
pub fn lookup(name: &str) -> Option<Constructor> {
    registry().get(name).copied()
}

/// Every probe name the registry accepts, for config validation/error
/// messages.
pub fn known_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = registry().keys().copied().collect();
    names.sort_unstable();
    names
}

fn registry() -> HashMap<&'static str, Constructor> {
    let mut m: HashMap<&'static str, Constructor> = HashMap::new();
    m.insert("http-connect", build_http_connect as Constructor);
    m.insert("http-post", build_http_post as Constructor);
    m.insert("http-get", build_http_get as Constructor);
    m.insert("wingate", build_wingate as Constructor);
    m.insert("cisco", build_cisco as Constructor);
    m.insert("socks4", build_socks4 as Constructor);
    m.insert("socks5", build_socks5 as Constructor);
    m.insert("rdns", build_rdns as Constructor);
    m.insert("dnsbl", build_dnsbl as Constructor);
    m.insert("tls-cert", build_tls_cert as Constructor);
    m.insert("banner", build_banner as Constructor);
    m.insert("http-hash", build_http_hash as Constructor);
    m.insert("http-response-hash", build_http_response_hash as Constructor);
    m
}

#[derive(Deserialize)]
struct PortArgs {
    port: u16,
}

fn port_arg(value: &serde_yaml::Value) -> anyhow::Result<u16> {
    let args: PortArgs = serde_yaml::from_value(value.clone())?;
    Ok(args.port)
}

fn build_http_connect(value: &serde_yaml::Value) -> anyhow::Result<Arc<dyn Probe>> {
    Ok(Arc::new(line_proxy::http_connect(port_arg(value)?)))
}

fn build_http_post(value: &serde_yaml::Value) -> anyhow::Result<Arc<dyn Probe>> {
    Ok(Arc::new(line_proxy::http_post(port_arg(value)?)))
}

fn build_http_get(value: &serde_yaml::Value) -> anyhow::Result<Arc<dyn Probe>> {
    Ok(Arc::new(line_proxy::http_get(port_arg(value)?)))
}

fn build_wingate(value: &serde_yaml::Value) -> anyhow::Result<Arc<dyn Probe>> {
    Ok(Arc::new(line_proxy::wingate(port_arg(value)?)))
}

fn build_cisco(value: &serde_yaml::Value) -> anyhow::Result<Arc<dyn Probe>> {
    Ok(Arc::new(line_proxy::cisco(port_arg(value)?)))
}

fn build_socks4(value: &serde_yaml::Value) -> anyhow::Result<Arc<dyn Probe>> {
    Ok(Arc::new(socks::socks4(port_arg(value)?)))
}

fn build_socks5(value: &serde_yaml::Value) -> anyhow::Result<Arc<dyn Probe>> {
    Ok(Arc::new(socks::socks5(port_arg(value)?)))
}

fn build_rdns(value: &serde_yaml::Value) -> anyhow::Result<Arc<dyn Probe>> {
    #[derive(Deserialize)]
    struct Args {
        bad: HashMap<String, String>,
    }
    let args: Args = serde_yaml::from_value(value.clone())?;
    Ok(Arc::new(rdns::RdnsProbe::new(args.bad.into_iter().collect())?))
}

fn build_dnsbl(value: &serde_yaml::Value) -> anyhow::Result<Arc<dyn Probe>> {
    #[derive(Deserialize)]
    struct Args {
        zone: String,
        reasons: HashMap<u8, String>,
        nameserver: Option<String>,
    }
    let args: Args = serde_yaml::from_value(value.clone())?;
    let mut probe = dnsbl::DnsblProbe::new(args.zone, args.reasons);
    if let Some(ns) = args.nameserver {
        let resolver = opm_resolver::DnsResolver::with_nameserver(&ns)?;
        probe = probe.with_resolver(Arc::new(resolver));
    }
    Ok(Arc::new(probe))
}

fn build_tls_cert(value: &serde_yaml::Value) -> anyhow::Result<Arc<dyn Probe>> {
    #[derive(Deserialize)]
    struct Args {
        port: u16,
        bad: HashMap<String, String>,
    }
    let args: Args = serde_yaml::from_value(value.clone())?;
    Ok(Arc::new(cert::TlsCertProbe::new(
        args.port,
        args.bad.into_iter().collect(),
    )?))
}

fn build_banner(value: &serde_yaml::Value) -> anyhow::Result<Arc<dyn Probe>> {
    #[derive(Deserialize)]
    struct Args {
        port: u16,
        #[serde(default)]
        tls: bool,
        send: Option<String>,
        groups: HashMap<String, Vec<String>>,
    }
    let args: Args = serde_yaml::from_value(value.clone())?;
    let mut probe = banner::BannerProbe::new(args.port, args.groups).with_tls(args.tls);
    if let Some(send) = args.send {
        probe = probe.with_send(send);
    }
    Ok(Arc::new(probe))
}

fn build_http_hash(value: &serde_yaml::Value) -> anyhow::Result<Arc<dyn Probe>> {
    #[derive(Deserialize)]
    struct Args {
        port: u16,
        #[serde(default)]
        tls: bool,
        send: Option<String>,
        bad: HashMap<String, String>,
    }
    let args: Args = serde_yaml::from_value(value.clone())?;
    let mut probe = http::HttpHashProbe::new(args.port, args.bad).with_tls(args.tls);
    if let Some(send) = args.send {
        probe = probe.with_send(send);
    }
    Ok(Arc::new(probe))
}

/// Body + stable-headers + headers-and-body hash match (§4.2 "HTTP
/// response match"), as opposed to `http-hash`'s body-only match.
fn build_http_response_hash(value: &serde_yaml::Value) -> anyhow::Result<Arc<dyn Probe>> {
    #[derive(Deserialize)]
    struct Args {
        port: u16,
        #[serde(default)]
        tls: bool,
        send: Option<String>,
        bad: HashMap<String, String>,
    }
    let args: Args = serde_yaml::from_value(value.clone())?;
    let mut probe = http::HttpHashProbe::new(args.port, args.bad).with_tls(args.tls).with_full(true);
    if let Some(send) = args.send {
        probe = probe.with_send(send);
    }
    Ok(Arc::new(probe))
}
