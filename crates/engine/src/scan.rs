//! A scan-in-progress for a single target (§3, GLOSSARY "Scan"). The
//! coalescing, dedup, timeout-arming and first-match-cancels-siblings
//! rules are lifted directly from `original_source/opm/scanner.py`'s
//! `Scan.addCheck`/`Scan.start`, replacing Twisted deferreds with
//! `tokio::sync::oneshot` waiters and a `CancellationToken` per running
//! check.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use opm_common::{CheckKey, OpmError, PooledProbe, ProbeError, ProbeSet, ScanEnvironment, Verdict};
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use crate::pool::Pool;

/// Reports a probe's non-cancellation error (§7); the default handler
/// just logs at `warn`.
pub type ErrorHandler = Arc<dyn Fn(&IpAddr, &anyhow::Error) + Send + Sync>;

fn default_error_handler(ip: &IpAddr, err: &anyhow::Error) {
    tracing::warn!(%ip, error = %err, "probe failed");
}

struct Inner {
    checks: HashSet<CheckKey>,
    running: HashMap<CheckKey, CancellationToken>,
    result: Option<Verdict>,
    started: bool,
    finished: bool,
    waiters: Vec<oneshot::Sender<Verdict>>,
}

/// One in-flight scan for a single IP. Shared by every caller that has
/// asked about this address while it's still running (§4.1 coalescing).
pub struct Scan {
    pub ip: IpAddr,
    inner: Mutex<Inner>,
    errhandlers: Mutex<Vec<ErrorHandler>>,
}

impl Scan {
    pub fn new(ip: IpAddr) -> Arc<Self> {
        Arc::new(Self {
            ip,
            inner: Mutex::new(Inner {
                checks: HashSet::new(),
                running: HashMap::new(),
                result: None,
                started: false,
                finished: false,
                waiters: Vec::new(),
            }),
            errhandlers: Mutex::new(vec![Arc::new(default_error_handler) as ErrorHandler]),
        })
    }

    pub async fn add_errhandler(&self, handler: ErrorHandler) {
        self.errhandlers.lock().await.push(handler);
    }

    /// Block until this scan has a verdict, or return one immediately if
    /// it's already settled (§3 `getResult`).
    pub async fn get_result(self: &Arc<Self>) -> Verdict {
        let rx = {
            let mut inner = self.inner.lock().await;
            if inner.result.is_some() || inner.finished {
                return inner.result.clone();
            }
            let (tx, rx) = oneshot::channel();
            inner.waiters.push(tx);
            rx
        };
        rx.await.unwrap_or(None)
    }

    /// Attach one `(pool, probe)` pair from `set` (§4.1 steps 1-6). A
    /// no-op if the scan already has a verdict or this `(probe, timeout)`
    /// is already attached.
    pub async fn add_check(
        self: &Arc<Self>,
        pool: Arc<Pool>,
        pooled: PooledProbe,
        set: Arc<ProbeSet>,
        env: Arc<ScanEnvironment>,
    ) {
        let key = CheckKey::new(&pooled.probe, set.timeout);
        {
            let mut inner = self.inner.lock().await;
            if inner.finished || inner.checks.contains(&key) {
                return;
            }
            inner.checks.insert(key.clone());
            let token = CancellationToken::new();
            inner.running.insert(key.clone(), token);
        }

        let scan = Arc::clone(self);
        tokio::spawn(async move {
            scan.run_one(key, pool, pooled, set, env).await;
        });
    }

    async fn run_one(
        self: Arc<Self>,
        key: CheckKey,
        pool: Arc<Pool>,
        pooled: PooledProbe,
        set: Arc<ProbeSet>,
        env: Arc<ScanEnvironment>,
    ) {
        let token = {
            let inner = self.inner.lock().await;
            match inner.running.get(&key) {
                Some(t) => t.clone(),
                None => return,
            }
        };
        let ip = self.ip;

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => Err(ProbeError::Cancelled),
            _ = tokio::time::sleep(set.timeout) => Err(ProbeError::Cancelled),
            res = Self::run_probe(&pool, &pooled, ip, &env) => res,
        };

        self.settle_one(key, set, outcome).await;
    }

    async fn run_probe(
        pool: &Pool,
        pooled: &PooledProbe,
        ip: IpAddr,
        env: &ScanEnvironment,
    ) -> Result<Option<String>, ProbeError> {
        let _permit = pool.acquire().await;
        pooled.probe.run(ip, env).await
    }

    async fn settle_one(
        self: Arc<Self>,
        key: CheckKey,
        set: Arc<ProbeSet>,
        outcome: Result<Option<String>, ProbeError>,
    ) {
        let mut inner = self.inner.lock().await;
        inner.running.remove(&key);

        match outcome {
            Ok(Some(reason)) => {
                if inner.result.is_none() {
                    let to_cancel: Vec<CancellationToken> =
                        inner.running.values().cloned().collect();
                    Self::set_result(&mut inner, Some((set, reason)));
                    drop(inner);
                    for token in to_cancel {
                        token.cancel();
                    }
                    return;
                }
            }
            Ok(None) => {}
            Err(ProbeError::Cancelled) => {}
            Err(ProbeError::Other(e)) => {
                drop(inner);
                self.report_error(&e).await;
                inner = self.inner.lock().await;
            }
        }

        if inner.started && inner.running.is_empty() && inner.result.is_none() {
            Self::set_result(&mut inner, None);
        }
    }

    async fn report_error(&self, err: &anyhow::Error) {
        for handler in self.errhandlers.lock().await.iter() {
            handler(&self.ip, err);
        }
    }

    fn set_result(inner: &mut Inner, result: Verdict) {
        inner.result = result.clone();
        inner.finished = true;
        for waiter in inner.waiters.drain(..) {
            let _ = waiter.send(result.clone());
        }
    }

    /// Mark every initial check added; if none were added or they all
    /// already finished synchronously, settle with a clean verdict right
    /// away (§3 `start`).
    pub async fn start(self: &Arc<Self>) {
        let mut inner = self.inner.lock().await;
        inner.started = true;
        if inner.running.is_empty() && !inner.finished {
            Self::set_result(&mut inner, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use opm_common::{Resolver, ScanEnvironment};
    use std::net::Ipv4Addr;

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

    fn env() -> Arc<ScanEnvironment> {
        Arc::new(ScanEnvironment::new(
            Ipv4Addr::new(127, 0, 0, 1),
            6667,
            "http://127.0.0.1:6667/",
            Arc::new(NullResolver),
        ))
    }

    struct Always(Option<&'static str>);
    #[async_trait]
    impl opm_common::Probe for Always {
        async fn run(&self, _ip: IpAddr, _env: &ScanEnvironment) -> Result<Option<String>, ProbeError> {
            Ok(self.0.map(|s| s.to_string()))
        }
        fn name(&self) -> &str {
            "always"
        }
    }

    struct Hangs;
    #[async_trait]
    impl opm_common::Probe for Hangs {
        async fn run(&self, _ip: IpAddr, _env: &ScanEnvironment) -> Result<Option<String>, ProbeError> {
            std::future::pending::<()>().await;
            unreachable!()
        }
        fn name(&self) -> &str {
            "hangs"
        }
    }

    fn probe_set(timeout_secs: u64) -> Arc<ProbeSet> {
        Arc::new(ProbeSet::new("default", Duration::from_secs(timeout_secs)))
    }

    #[tokio::test]
    async fn no_checks_resolves_clean_on_start() {
        let scan = Scan::new("10.0.0.1".parse().unwrap());
        let result_fut = {
            let scan = Arc::clone(&scan);
            tokio::spawn(async move { scan.get_result().await })
        };
        scan.start().await;
        assert_eq!(result_fut.await.unwrap(), None);
    }

    #[tokio::test]
    async fn bad_verdict_wins_and_cancels_siblings() {
        let scan = Scan::new("10.0.0.2".parse().unwrap());
        let pool = Arc::new(Pool::new("onepool", 4));
        let set = probe_set(5);

        scan.add_check(
            Arc::clone(&pool),
            PooledProbe::new("onepool", Arc::new(Always(Some("HTTP CONNECT (80)")))),
            Arc::clone(&set),
            env(),
        )
        .await;
        scan.add_check(
            Arc::clone(&pool),
            PooledProbe::new("onepool", Arc::new(Hangs)),
            Arc::clone(&set),
            env(),
        )
        .await;
        scan.start().await;

        let result = scan.get_result().await;
        let (_, reason) = result.expect("expected a verdict");
        assert_eq!(reason, "HTTP CONNECT (80)");
    }

    #[tokio::test]
    async fn duplicate_check_same_timeout_is_ignored() {
        let scan = Scan::new("10.0.0.3".parse().unwrap());
        let pool = Arc::new(Pool::new("onepool", 4));
        let set = probe_set(5);
        let probe: Arc<dyn opm_common::Probe> = Arc::new(Always(None));

        scan.add_check(
            Arc::clone(&pool),
            PooledProbe { pool: "onepool".to_string(), probe: Arc::clone(&probe) },
            Arc::clone(&set),
            env(),
        )
        .await;
        scan.add_check(
            Arc::clone(&pool),
            PooledProbe { pool: "onepool".to_string(), probe: Arc::clone(&probe) },
            Arc::clone(&set),
            env(),
        )
        .await;

        let inner = scan.inner.lock().await;
        assert_eq!(inner.checks.len(), 1);
    }

    #[tokio::test]
    async fn clean_scan_settles_none() {
        let scan = Scan::new("10.0.0.4".parse().unwrap());
        let pool = Arc::new(Pool::new("onepool", 4));
        let set = probe_set(5);

        scan.add_check(
            Arc::clone(&pool),
            PooledProbe::new("onepool", Arc::new(Always(None))),
            Arc::clone(&set),
            env(),
        )
        .await;
        scan.start().await;

        assert_eq!(scan.get_result().await, None);
    }
}
