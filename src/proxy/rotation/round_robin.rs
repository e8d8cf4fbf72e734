//! Round-robin parent proxy selection

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::debug;

use super::ProxySelector;
use crate::error::Result;
use crate::models::ParentProxy;

/// Selects parent proxies in round-robin order
///
/// The proxy list is fixed at construction; only the cursor moves, and it
/// moves with a single atomic update per selection.
pub struct RoundRobinSelector {
    proxies: Vec<Arc<ParentProxy>>,
    index: AtomicUsize,
}

impl RoundRobinSelector {
    pub fn new(proxies: Vec<ParentProxy>) -> Self {
        Self {
            proxies: proxies.into_iter().map(Arc::new).collect(),
            index: AtomicUsize::new(0),
        }
    }

    /// Build a selector from raw `proxy.parent_proxies` entries
    ///
    /// Entries without a scheme are normalized to `http://`.
    pub fn configure<S: AsRef<str>>(urls: &[S]) -> Result<Self> {
        let proxies = urls
            .iter()
            .enumerate()
            .map(|(id, raw)| ParentProxy::parse(id, raw.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        for proxy in &proxies {
            debug!(parent = %proxy, "Configured parent proxy");
        }

        Ok(Self::new(proxies))
    }
}

impl Default for RoundRobinSelector {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl ProxySelector for RoundRobinSelector {
    fn next(&self) -> Option<Arc<ParentProxy>> {
        let len = self.proxies.len();
        if len == 0 {
            return None;
        }

        // Wrap inside the update so the cursor never leaves 0..len
        let idx = self
            .index
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |i| Some((i + 1) % len))
            .unwrap_or_else(|i| i);

        self.proxies.get(idx).cloned()
    }

    fn proxies(&self) -> Vec<Arc<ParentProxy>> {
        self.proxies.clone()
    }

    fn available_count(&self) -> usize {
        self.proxies.len()
    }

    fn strategy_name(&self) -> &'static str {
        "round_robin"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_round_robin_empty() {
        let selector = RoundRobinSelector::configure::<&str>(&[]).unwrap();
        assert!(selector.next().is_none());
        assert_eq!(selector.available_count(), 0);
    }

    #[test]
    fn test_round_robin_order() {
        let selector = RoundRobinSelector::configure(&[
            "127.0.0.1:8081",
            "127.0.0.1:8082",
            "127.0.0.1:8083",
        ])
        .unwrap();

        // Should cycle through 0, 1, 2, 0, 1, 2...
        let ids: Vec<usize> = (0..6).map(|_| selector.next().unwrap().id).collect();
        assert_eq!(ids, vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn test_round_robin_normalizes_entries() {
        let selector = RoundRobinSelector::configure(&["proxy.example.com:8080"]).unwrap();
        assert_eq!(
            selector.next().unwrap().address,
            "http://proxy.example.com:8080"
        );
        assert_eq!(selector.strategy_name(), "round_robin");
    }

    #[test]
    fn test_round_robin_rejects_invalid_entry() {
        assert!(RoundRobinSelector::configure(&["127.0.0.1:8081", "http://"]).is_err());
    }

    #[test]
    fn test_round_robin_concurrent_cycles() {
        let selector = Arc::new(
            RoundRobinSelector::configure(&["10.0.0.1:1", "10.0.0.2:2", "10.0.0.3:3", "10.0.0.4:4"])
                .unwrap(),
        );

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let selector = selector.clone();
                std::thread::spawn(move || {
                    (0..500)
                        .map(|_| selector.next().unwrap().id)
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut counts: HashMap<usize, usize> = HashMap::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                *counts.entry(id).or_default() += 1;
            }
        }

        // 4000 selections over 4 proxies: every entry served exactly 1000 times
        assert_eq!(counts.len(), 4);
        assert!(counts.values().all(|&n| n == 1000));
    }
}
