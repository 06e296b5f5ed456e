//! Core data types for the open-proxy monitor (§3).

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::traits::{Probe, Resolver};

/// Resources a probe needs besides the target address (§4.2 "Common wiring").
#[derive(Clone)]
pub struct ScanEnvironment {
    pub target_ip: Ipv4Addr,
    pub target_port: u16,
    pub target_url: String,
    pub target_strings: Vec<String>,
    pub max_bytes: usize,
    pub bind_address: Option<IpAddr>,
    /// Default resolver; DNSBL probes may hold their own instead (§4.2 "DNSBL").
    pub resolver: Arc<dyn Resolver>,
}

impl ScanEnvironment {
    pub fn new(
        target_ip: Ipv4Addr,
        target_port: u16,
        target_url: impl Into<String>,
        resolver: Arc<dyn Resolver>,
    ) -> Self {
        Self {
            target_ip,
            target_port,
            target_url: target_url.into(),
            target_strings: Vec::new(),
            max_bytes: 1 << 16,
            bind_address: None,
            resolver,
        }
    }

    pub fn with_target_strings(mut self, strings: Vec<String>) -> Self {
        self.target_strings = strings;
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn with_bind_address(mut self, addr: Option<IpAddr>) -> Self {
        self.bind_address = addr;
        self
    }
}

/// A single `(pool, probe)` pair attached as part of a scanset (§3).
#[derive(Clone)]
pub struct PooledProbe {
    pub pool: String,
    pub probe: Arc<dyn Probe>,
}

impl PooledProbe {
    pub fn new(pool: impl Into<String>, probe: Arc<dyn Probe>) -> Self {
        Self { pool: pool.into(), probe }
    }
}

/// An immutable bundle of probes sharing a timeout and an action list (§3).
pub struct ProbeSet {
    pub name: String,
    pub timeout: Duration,
    pub probes: Vec<PooledProbe>,
    pub actions: Vec<String>,
    /// Operator-facing reason template; defaults to `"{REASON}"`.
    pub oper_reason: String,
    /// User-facing reason template; defaults to `"{REASON}"`.
    pub user_reason: String,
}

impl ProbeSet {
    pub fn new(name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            timeout,
            probes: Vec::new(),
            actions: Vec::new(),
            oper_reason: "{REASON}".to_string(),
            user_reason: "{REASON}".to_string(),
        }
    }
}

/// A verdict is the winning probe set plus the reason its probe returned (§3, GLOSSARY).
pub type Verdict = Option<(Arc<ProbeSet>, String)>;

/// Dedup key for attached probes: same probe *and* same timeout is idempotent (§4.1 step 2).
#[derive(Clone)]
pub struct CheckKey {
    pub probe: *const (),
    pub timeout: Duration,
}

// SAFETY: CheckKey only ever compares and hashes the pointer value of an
// `Arc<dyn Probe>`'s data, which is stable for the Arc's lifetime; the
// Scan holding the key also holds the Arc, so the pointer never dangles.
unsafe impl Send for CheckKey {}
unsafe impl Sync for CheckKey {}

impl PartialEq for CheckKey {
    fn eq(&self, other: &Self) -> bool {
        self.probe == other.probe && self.timeout == other.timeout
    }
}
impl Eq for CheckKey {}

impl std::hash::Hash for CheckKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.probe.hash(state);
        self.timeout.hash(state);
    }
}

impl CheckKey {
    pub fn new(probe: &Arc<dyn Probe>, timeout: Duration) -> Self {
        Self {
            probe: Arc::as_ptr(probe) as *const (),
            timeout,
        }
    }
}

/// Generate the `{RANDOM}` action-template placeholder value (§4.3): an
/// integer in `[160, 320]`, matching the original's jitter on kill messages.
pub fn random_jitter() -> u32 {
    rand::thread_rng().gen_range(160..=320)
}
