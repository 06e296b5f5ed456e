//! The engine entry point: per-ip scan coalescing and scanset→pool
//! wiring (§3, GLOSSARY "ScanManager"). Grounded on
//! `original_source/opm/scanner.py`'s `Scanner.scan`.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use opm_common::{OpmError, OpmResult, ProbeSet, Resolver, ScanEnvironment, Verdict};
use tokio::sync::Mutex;

use crate::pool::Pool;
use crate::scan::{ErrorHandler, Scan};

pub struct ScanManager {
    pools: HashMap<String, Arc<Pool>>,
    scansets: HashMap<String, Arc<ProbeSet>>,
    scans: Arc<Mutex<HashMap<IpAddr, Arc<Scan>>>>,
    /// Shared probe environment (our own callback address, default
    /// resolver, byte caps) built once at startup (§4.2 "Common wiring")
    /// — distinct from `ip`, which is the candidate being scanned.
    env: Arc<ScanEnvironment>,
}

impl ScanManager {
    pub fn new(
        pools: HashMap<String, Arc<Pool>>,
        scansets: HashMap<String, Arc<ProbeSet>>,
        env: Arc<ScanEnvironment>,
    ) -> Self {
        Self { pools, scansets, scans: Arc::new(Mutex::new(HashMap::new())), env }
    }

    pub fn pool(&self, name: &str) -> Option<&Arc<Pool>> {
        self.pools.get(name)
    }

    /// Every named pool, for `cmd_stats` (§4.3) to report free/queued
    /// counts in config order.
    pub fn pools(&self) -> impl Iterator<Item = (&String, &Arc<Pool>)> {
        self.pools.iter()
    }

    /// Scans currently active, for `cmd_stats`'s "N checks in progress".
    pub async fn active_scan_count(&self) -> usize {
        self.scans.lock().await.len()
    }

    /// Scan `ip` against the named scansets, returning the winning
    /// verdict or `None` if clean (§4.1). An unknown scanset name is an
    /// error *before* any work starts; an empty name list is a no-op
    /// returning `Ok(None)` without creating a `Scan` at all.
    pub async fn scan(
        &self,
        ip: IpAddr,
        scanset_names: &[String],
        errhandler: Option<ErrorHandler>,
    ) -> OpmResult<Verdict> {
        let mut selected: HashMap<String, Arc<ProbeSet>> = HashMap::new();
        for name in scanset_names {
            let set = self
                .scansets
                .get(name)
                .ok_or_else(|| OpmError::UnknownSet(name.clone()))?;
            selected.insert(set.name.clone(), Arc::clone(set));
        }
        if selected.is_empty() {
            return Ok(None);
        }

        let (scan, is_new) = {
            let mut scans = self.scans.lock().await;
            match scans.get(&ip) {
                Some(existing) => (Arc::clone(existing), false),
                None => {
                    let scan = Scan::new(ip);
                    scans.insert(ip, Arc::clone(&scan));
                    (scan, true)
                }
            }
        };

        if is_new {
            tracing::info!(%ip, "starting scan");
            metrics::counter!("opm_scans_started_total").increment(1);
            let cleanup_scan = Arc::clone(&scan);
            let cleanup_map = Arc::clone(&self.scans);
            tokio::spawn(async move {
                cleanup_scan.get_result().await;
                cleanup_map.lock().await.remove(&ip);
            });
        } else {
            tracing::info!(%ip, "scan already in progress, adding to it");
            metrics::counter!("opm_scans_coalesced_total").increment(1);
        }

        if let Some(handler) = errhandler {
            scan.add_errhandler(handler).await;
        }

        for set in selected.values() {
            for pooled in &set.probes {
                let Some(pool) = self.pools.get(&pooled.pool) else {
                    return Err(OpmError::Config(format!("unknown pool {}", pooled.pool)));
                };
                scan.add_check(
                    Arc::clone(pool),
                    pooled.clone(),
                    Arc::clone(set),
                    Arc::clone(&self.env),
                )
                .await;
            }
        }

        scan.start().await;
        let result = scan.get_result().await;
        match &result {
            Some((set, _)) => {
                metrics::counter!("opm_verdicts_total", "result" => "match", "scanset" => set.name.clone())
                    .increment(1);
            }
            None => {
                metrics::counter!("opm_verdicts_total", "result" => "clean").increment(1);
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use opm_common::{PooledProbe, ProbeError};
    use std::net::Ipv4Addr;
    use std::time::Duration;

    struct NullResolver;
    #[async_trait]
    impl Resolver for NullResolver {
        async fn lookup_ptr(&self, _ip: IpAddr) -> Result<Option<String>, OpmError> {
            Ok(None)
        }
        async fn lookup_a(&self, _name: &str) -> Result<Option<Ipv4Addr>, OpmError> {
            Ok(None)
        }
        async fn resolve_host(&self, _host: &str) -> Result<Vec<IpAddr>, OpmError> {
            Ok(Vec::new())
        }
    }

    struct Always(Option<&'static str>);
    #[async_trait]
    impl opm_common::Probe for Always {
        async fn run(
            &self,
            _ip: IpAddr,
            _env: &ScanEnvironment,
        ) -> Result<Option<String>, ProbeError> {
            Ok(self.0.map(|s| s.to_string()))
        }
        fn name(&self) -> &str {
            "always"
        }
    }

    fn manager_with(probe: Option<&'static str>) -> ScanManager {
        let mut pools = HashMap::new();
        pools.insert("onepool".to_string(), Arc::new(Pool::new("onepool", 4)));

        let mut set = ProbeSet::new("default", Duration::from_secs(5));
        set.probes.push(PooledProbe::new("onepool", Arc::new(Always(probe))));
        let mut scansets = HashMap::new();
        scansets.insert("default".to_string(), Arc::new(set));

        let env = Arc::new(ScanEnvironment::new(
            Ipv4Addr::new(127, 0, 0, 1),
            6667,
            "http://127.0.0.1:6667/",
            Arc::new(NullResolver),
        ));
        ScanManager::new(pools, scansets, env)
    }

    #[tokio::test]
    async fn unknown_scanset_is_rejected_before_scanning() {
        let manager = manager_with(None);
        let err = manager
            .scan("1.2.3.4".parse().unwrap(), &["nope".to_string()], None)
            .await
            .unwrap_err();
        assert!(matches!(err, OpmError::UnknownSet(name) if name == "nope"));
    }

    #[tokio::test]
    async fn empty_scanset_list_is_a_noop() {
        let manager = manager_with(Some("bad"));
        let result = manager.scan("1.2.3.4".parse().unwrap(), &[], None).await.unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn matching_probe_produces_a_verdict() {
        let manager = manager_with(Some("HTTP CONNECT (80)"));
        let result = manager
            .scan("1.2.3.4".parse().unwrap(), &["default".to_string()], None)
            .await
            .unwrap();
        let (set, reason) = result.expect("expected a verdict");
        assert_eq!(set.name, "default");
        assert_eq!(reason, "HTTP CONNECT (80)");
    }

    #[tokio::test]
    async fn clean_scan_is_removed_from_the_map() {
        let manager = manager_with(None);
        let ip: IpAddr = "1.2.3.4".parse().unwrap();
        let result = manager.scan(ip, &["default".to_string()], None).await.unwrap();
        assert_eq!(result, None);
        // Give the cleanup task a chance to run.
        tokio::task::yield_now().await;
        assert!(!manager.scans.lock().await.contains_key(&ip));
    }
}
