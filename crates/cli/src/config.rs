//! The declarative configuration document (§6) and its compile step into
//! runtime `Pool`/`ProbeSet`/`Presence` objects. Grounded on
//! `original_source/opm/conf.py`'s `makeService`: this module is the Rust
//! shape of that function, split into "parse" (this file) and "compile"
//! (`bootstrap.rs`).

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};

use serde::Deserialize;

fn default_max_bytes() -> usize {
    1 << 16
}

/// One entry of a scanset's `protocols` list. `conf.py` unpacks
/// `poolname, checkername, *args` positionally and splats `*args` into the
/// checker factory; the registry here (`opm_probes::lookup`) instead takes
/// one structured args value per probe, so the third element is a single
/// YAML mapping rather than a variadic tail.
#[derive(Clone, Debug, Deserialize)]
pub struct ProtocolEntry(pub String, pub String, #[serde(default)] pub serde_yaml::Value);

#[derive(Clone, Debug, Deserialize)]
pub struct ScansetDoc {
    pub timeout: u64,
    #[serde(default)]
    pub protocols: Vec<ProtocolEntry>,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default, rename = "user-reason")]
    pub user_reason: Option<String>,
    #[serde(default, rename = "oper-reason")]
    pub oper_reason: Option<String>,
}

/// Top-level configuration document (§6).
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub pools: HashMap<String, usize>,
    pub scansets: HashMap<String, ScansetDoc>,

    pub target_ip: Ipv4Addr,
    pub target_port: u16,
    pub target_url: String,
    #[serde(default)]
    pub target_strings: Vec<String>,
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
    #[serde(default)]
    pub bind_address: Option<IpAddr>,

    /// `fnmatch-pattern -> [setName]`, shared by every configured network
    /// (`conf.py` passes the same `masks` dict to every `Factory`).
    #[serde(default)]
    pub masks: HashMap<String, Vec<String>>,

    #[serde(default, rename = "user-reason")]
    pub user_reason: String,
    #[serde(default, rename = "oper-reason")]
    pub oper_reason: String,

    #[serde(default)]
    pub irc: HashMap<String, opm_irc::NetworkConfig>,
}

impl Config {
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot open {}: {e}", path.display()))?;
        let config: Config = serde_yaml::from_str(&text)?;
        Ok(config)
    }

    /// `user-reason`/`oper-reason` resolution order: scanset-level, then
    /// document-level, then `"{REASON}"` (`ProbeSet::new`'s own default),
    /// mirroring `conf.py`'s `d.get('user-reason', default_user_reason)`.
    pub fn resolve_reasons(&self, set: &ScansetDoc) -> (String, String) {
        let user = set
            .user_reason
            .clone()
            .unwrap_or_else(|| self.user_reason.clone());
        let oper = set
            .oper_reason
            .clone()
            .unwrap_or_else(|| self.oper_reason.clone());
        let user = if user.is_empty() { "{REASON}".to_string() } else { user };
        let oper = if oper.is_empty() { "{REASON}".to_string() } else { oper };
        (user, oper)
    }
}
