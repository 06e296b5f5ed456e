//! Typed shape of one `irc:` network entry (§6). YAML parsing itself is
//! `opm-cli`'s job (§1 "Config/bootstrap" is a thin external layer); this
//! crate only needs the values, not the document format.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

fn default_scan_cache_time() -> u64 {
    120
}

fn default_scan_cache_size() -> usize {
    100
}

fn default_message_penalty_ms() -> u64 {
    2_000
}

fn default_message_burst_ms() -> u64 {
    10_000
}

/// One `(target, message)` pair sent right after `signedOn` (§4.3 "send any
/// configured on-connect messages").
#[derive(Clone, Debug, Deserialize)]
pub struct OnConnectMessage {
    pub target: String,
    pub message: String,
}

/// One `irc.<netName>` entry (§6).
#[derive(Clone, Debug, Deserialize)]
pub struct NetworkConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub ssl: bool,
    pub nick: String,
    pub channel: String,
    #[serde(default)]
    pub pass: Option<String>,
    #[serde(default)]
    pub opername: Option<String>,
    #[serde(default)]
    pub operpass: Option<String>,
    /// Path to a PEM-encoded RSA private key, for the 740/741 challenge
    /// path (SPEC_FULL §2).
    #[serde(default)]
    pub operkey: Option<String>,
    #[serde(default)]
    pub opermode: Option<String>,
    #[serde(default)]
    pub away: Option<String>,
    pub connregex: String,
    #[serde(default)]
    pub onconnectmsgs: Vec<OnConnectMessage>,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub flood_exempt: bool,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default = "default_scan_cache_time", rename = "scan-cache-time")]
    pub scan_cache_time: u64,
    #[serde(default = "default_scan_cache_size", rename = "scan-cache-size")]
    pub scan_cache_size: usize,
    #[serde(default = "default_message_penalty_ms", rename = "message-penalty-ms")]
    pub message_penalty_ms: u64,
    #[serde(default = "default_message_burst_ms", rename = "message-burst-ms")]
    pub message_burst_ms: u64,
    /// `fnmatch-pattern -> [setName]` (§6 "masks"). The document's `masks`
    /// key is shared by every network (`conf.py`'s `makeService` passes the
    /// same mapping to every `Factory`); `opm-cli` copies it in here after
    /// deserializing each network entry on its own.
    #[serde(default)]
    pub masks: HashMap<String, Vec<String>>,
    #[serde(default = "default_immune_cache_size", rename = "immune-cache-size")]
    pub immune_cache_size: usize,
}

fn default_immune_cache_size() -> usize {
    100
}

impl NetworkConfig {
    pub fn username_or_nick(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.nick)
    }

    /// `conf.py`'s `makeService`: `net.get('opername', net['nick'])`.
    pub fn opername_or_nick(&self) -> &str {
        self.opername.as_deref().unwrap_or(&self.nick)
    }

    pub fn scan_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.scan_cache_time)
    }

    pub fn message_penalty(&self) -> Duration {
        Duration::from_millis(self.message_penalty_ms)
    }

    pub fn message_burst(&self) -> Duration {
        Duration::from_millis(self.message_burst_ms)
    }
}
