//! Insertion-ordered, TTL-bounded cache (§3 "Cache entries", §4.4).
//!
//! `original_source/opm/cache.py`'s `Cache` is a plain size-bounded
//! `OrderedDict` with no expiry; the IRC presence needs per-entry TTLs for
//! both the verdict cache and the immunity cache, so this adds the expiry
//! half of §4.4 on top of that shape. Per §9's ambiguity note, eviction is
//! strictly oldest-first on both expiry and overflow — the reversed
//! variant mentioned there is not implemented.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    expiry: Instant,
}

/// `ip -> (value, expiry)`, bounded by `max_size` (§3, §4.4).
pub struct Cache<V> {
    max_size: usize,
    order: VecDeque<String>,
    entries: HashMap<String, Entry<V>>,
}

impl<V> Cache<V> {
    pub fn new(max_size: usize) -> Self {
        Self { max_size, order: VecDeque::new(), entries: HashMap::new() }
    }

    /// Insert/replace `key`, pruning expired entries from the oldest end
    /// first and evicting the oldest survivor if still at capacity (§4.4).
    pub fn set(&mut self, key: impl Into<String>, value: V, ttl: Duration) {
        self.prune_expired();
        let key = key.into();
        if self.entries.contains_key(&key) {
            self.order.retain(|k| k != &key);
        } else if self.entries.len() >= self.max_size {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, Entry { value, expiry: Instant::now() + ttl });
    }

    /// True only if `key` is present and its TTL hasn't elapsed (§3).
    pub fn contains(&self, key: &str) -> bool {
        self.entries.get(key).is_some_and(|e| e.expiry > Instant::now())
    }

    /// The stored value regardless of expiry; callers gate freshness with
    /// [`Cache::contains`] (§4.4: "expiry not enforced on read").
    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.get(key).map(|e| &e.value)
    }

    /// Evict one entry by key (`decache <ip>`, §4.3). Returns whether it
    /// was present.
    pub fn remove(&mut self, key: &str) -> bool {
        self.order.retain(|k| k != key);
        self.entries.remove(key).is_some()
    }

    /// Empty the cache (`decache` with no argument, §4.3).
    pub fn clear(&mut self) {
        self.order.clear();
        self.entries.clear();
    }

    fn prune_expired(&mut self) {
        let now = Instant::now();
        while let Some(front) = self.order.front() {
            match self.entries.get(front) {
                Some(e) if e.expiry <= now => {
                    let key = self.order.pop_front().expect("front just peeked");
                    self.entries.remove(&key);
                }
                _ => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_is_false_after_ttl_elapses() {
        let mut cache = Cache::new(10);
        cache.set("1.2.3.4", "v", Duration::from_millis(1));
        assert!(cache.contains("1.2.3.4"));
        std::thread::sleep(Duration::from_millis(5));
        assert!(!cache.contains("1.2.3.4"));
    }

    #[test]
    fn overflow_evicts_oldest_insertion() {
        let mut cache = Cache::new(2);
        cache.set("a", 1, Duration::from_secs(60));
        cache.set("b", 2, Duration::from_secs(60));
        cache.set("c", 3, Duration::from_secs(60));
        assert!(!cache.contains("a"));
        assert!(cache.contains("b"));
        assert!(cache.contains("c"));
    }

    #[test]
    fn re_setting_a_key_moves_it_to_the_newest_end() {
        let mut cache = Cache::new(2);
        cache.set("a", 1, Duration::from_secs(60));
        cache.set("b", 2, Duration::from_secs(60));
        cache.set("a", 10, Duration::from_secs(60));
        cache.set("c", 3, Duration::from_secs(60));
        assert!(!cache.contains("b"));
        assert_eq!(*cache.get("a").unwrap(), 10);
        assert!(cache.contains("c"));
    }

    #[test]
    fn remove_and_clear() {
        let mut cache = Cache::new(10);
        cache.set("a", 1, Duration::from_secs(60));
        assert!(cache.remove("a"));
        assert!(!cache.contains("a"));

        cache.set("b", 2, Duration::from_secs(60));
        cache.set("c", 3, Duration::from_secs(60));
        cache.clear();
        assert!(!cache.contains("b"));
        assert!(!cache.contains("c"));
    }
}
