//! opm-common — shared types, traits, and error kinds for the open-proxy
//! monitor (GLOSSARY). Kept deliberately small: the engine, the probe
//! library, and the IRC presence all depend on this crate but not on
//! each other.

pub mod error;
pub mod traits;
pub mod types;

pub use error::{OpmError, OpmResult, ProbeError};
pub use traits::{Probe, Resolver};
pub use types::{CheckKey, PooledProbe, ProbeSet, ScanEnvironment, Verdict, random_jitter};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_jitter_in_range() {
        for _ in 0..100 {
            let r = random_jitter();
            assert!((160..=320).contains(&r));
        }
    }

    #[test]
    fn probe_set_defaults_reason_templates() {
        let set = ProbeSet::new("default", std::time::Duration::from_secs(30));
        assert_eq!(set.user_reason, "{REASON}");
        assert_eq!(set.oper_reason, "{REASON}");
        assert!(set.probes.is_empty());
    }
}
