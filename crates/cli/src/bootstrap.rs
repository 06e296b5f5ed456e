//! Compiles a parsed [`Config`](crate::config::Config) into running
//! `Pool`s, `ProbeSet`s, a `ScanManager`, and one `Presence` per configured
//! IRC network. The second half of `original_source/opm/conf.py`'s
//! `makeService`.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use anyhow::Context;
use opm_common::{PooledProbe, ProbeSet, Resolver, ScanEnvironment};
use opm_engine::{Pool, ScanManager};
use opm_resolver::DnsResolver;

use crate::config::Config;

/// Build every `Pool` named under `pools:` (§6).
pub fn build_pools(config: &Config) -> HashMap<String, Arc<Pool>> {
    config
        .pools
        .iter()
        .map(|(name, size)| (name.clone(), Arc::new(Pool::new(name.clone(), *size))))
        .collect()
}

/// Check the FD soft limit covers every pool's token count (§5 "The total
/// soft FD limit must be ≥ the sum of pool sizes, checked at boot"),
/// grounded on `conf.py`'s `Options.postOptions`.
pub fn check_fd_limit(config: &Config) -> anyhow::Result<()> {
    let total: usize = config.pools.values().sum();
    let (soft, _hard) = rlimit::getrlimit(rlimit::Resource::NOFILE)
        .context("could not read the process FD limit")?;
    if soft < total as u64 {
        anyhow::bail!(
            "fd limit {soft} < {total}, use --force-limits to override"
        );
    }
    Ok(())
}

/// Build every `ProbeSet` named under `scansets:` (§3), resolving each
/// `protocols` entry through `opm_probes::lookup`.
pub fn build_scansets(config: &Config) -> anyhow::Result<HashMap<String, Arc<ProbeSet>>> {
    let mut scansets = HashMap::new();
    for (name, doc) in &config.scansets {
        let mut set = ProbeSet::new(name.clone(), std::time::Duration::from_secs(doc.timeout));
        for entry in &doc.protocols {
            let constructor = opm_probes::lookup(&entry.1).ok_or_else(|| {
                anyhow::anyhow!(
                    "scanset {name}: unknown probe {:?} (known: {:?})",
                    entry.1,
                    opm_probes::known_names()
                )
            })?;
            let probe = constructor(&entry.2)
                .with_context(|| format!("scanset {name}: building probe {:?}", entry.1))?;
            set.probes.push(PooledProbe::new(entry.0.clone(), probe));
        }
        set.actions = doc.actions.clone();
        let (user_reason, oper_reason) = config.resolve_reasons(doc);
        set.user_reason = user_reason;
        set.oper_reason = oper_reason;
        scansets.insert(name.clone(), Arc::new(set));
    }
    Ok(scansets)
}

/// Build the shared probe environment (§4.2 "Common wiring") once at
/// startup; every probe across every scanset borrows the same values.
pub fn build_environment(config: &Config, resolver: Arc<dyn Resolver>) -> Arc<ScanEnvironment> {
    let env = ScanEnvironment::new(
        config.target_ip,
        config.target_port,
        config.target_url.clone(),
        resolver,
    )
    .with_target_strings(config.target_strings.clone())
    .with_max_bytes(config.max_bytes)
    .with_bind_address(config.bind_address);
    Arc::new(env)
}

/// Build the shared resolver. `--keep-resolver` is a no-op here since
/// `opm-resolver` always builds its own `trust-dns-resolver` instance
/// rather than patching a process-global default the way Twisted's
/// `reactor.installResolver` did; the flag is accepted for config-file
/// compatibility but has nothing left to override.
pub fn build_resolver(_keep_resolver: bool) -> anyhow::Result<Arc<dyn Resolver>> {
    Ok(Arc::new(DnsResolver::system()?))
}

/// Build one [`opm_irc::Presence`] per `irc:` entry, patching in the
/// document-level `masks` map (§6) since every network shares it.
pub fn build_presences(
    config: &Config,
    manager: Arc<ScanManager>,
    resolver: Arc<dyn Resolver>,
    irc_log: bool,
) -> anyhow::Result<Vec<Arc<opm_irc::Presence>>> {
    let mut presences = Vec::with_capacity(config.irc.len());
    for (name, net) in &config.irc {
        let mut net = net.clone();
        net.masks = config.masks.clone();
        if irc_log {
            net.verbose = true;
        }
        let presence = opm_irc::Presence::new(name.clone(), net, Arc::clone(&manager), Arc::clone(&resolver))
            .with_context(|| format!("irc network {name}"))?;
        presences.push(presence);
    }
    Ok(presences)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn sample_config() -> Config {
        let yaml = r#"
pools:
  dns: 4
  tcp: 8
scansets:
  default:
    timeout: 5
    protocols:
      - [tcp, http-connect, {port: 80}]
    actions:
      - "KILL {MASK} :{REASON}"
target_ip: 127.0.0.1
target_port: 6667
target_url: "http://127.0.0.1:6667/"
masks:
  "*!*@*": [default]
irc:
  freenode:
    host: irc.example.org
    port: 6667
    nick: opmbot
    channel: "#opm"
    connregex: "nick=(?P<nick>\\S+) user=(?P<user>\\S+) ip=(?P<ip>\\S+)"
"#;
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn builds_pools_with_configured_sizes() {
        let config = sample_config();
        let pools = build_pools(&config);
        assert_eq!(pools.get("dns").unwrap().size(), 4);
        assert_eq!(pools.get("tcp").unwrap().size(), 8);
    }

    #[test]
    fn fd_limit_check_rejects_pools_larger_than_the_soft_limit() {
        let mut config = sample_config();
        config.pools.insert("huge".to_string(), 1 << 30);
        assert!(check_fd_limit(&config).is_err());
    }

    #[test]
    fn scanset_protocols_resolve_through_the_probe_registry() {
        let config = sample_config();
        let scansets = build_scansets(&config).unwrap();
        let set = scansets.get("default").unwrap();
        assert_eq!(set.probes.len(), 1);
        assert_eq!(set.probes[0].pool, "tcp");
        assert_eq!(set.actions, vec!["KILL {MASK} :{REASON}".to_string()]);
    }

    #[test]
    fn unknown_probe_name_is_a_config_error() {
        let mut config = sample_config();
        config
            .scansets
            .get_mut("default")
            .unwrap()
            .protocols
            .push(crate::config::ProtocolEntry(
                "tcp".to_string(),
                "not-a-probe".to_string(),
                serde_yaml::Value::Null,
            ));
        assert!(build_scansets(&config).is_err());
    }

    #[test]
    fn presences_inherit_the_document_level_masks() {
        let config = sample_config();
        let pools = build_pools(&config);
        let scansets = build_scansets(&config).unwrap();
        struct NullResolver;
        #[async_trait::async_trait]
        impl opm_common::Resolver for NullResolver {
            async fn lookup_ptr(
                &self,
                _ip: std::net::IpAddr,
            ) -> Result<Option<String>, opm_common::OpmError> {
                Ok(None)
            }
            async fn lookup_a(
                &self,
                _name: &str,
            ) -> Result<Option<Ipv4Addr>, opm_common::OpmError> {
                Ok(None)
            }
            async fn resolve_host(
                &self,
                _host: &str,
            ) -> Result<Vec<std::net::IpAddr>, opm_common::OpmError> {
                Ok(Vec::new())
            }
        }
        let resolver: Arc<dyn Resolver> = Arc::new(NullResolver);
        let env = build_environment(&config, Arc::clone(&resolver));
        let manager = Arc::new(ScanManager::new(pools, scansets, env));
        let presences = build_presences(&config, manager, resolver, false).unwrap();
        assert_eq!(presences.len(), 1);
    }
}
