//! Replay protection for unique capability operations.
//!
//! Request identifiers are remembered per minted identity for the life of
//! the process. The check and the insert happen under one shard lock, so two
//! workers cannot both accept the same identifier.

use dashmap::DashMap;
use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct RequestRegistry {
    seen: DashMap<String, HashSet<String>>,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `request_identifier`; false if it was already recorded
    pub fn check_and_record(&self, minted_identity: &str, request_identifier: &str) -> bool {
        self.seen
            .entry(minted_identity.to_string())
            .or_default()
            .insert(request_identifier.to_string())
    }

    pub fn contains(&self, minted_identity: &str, request_identifier: &str) -> bool {
        self.seen
            .get(minted_identity)
            .map(|ids| ids.contains(request_identifier))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_duplicate_rejected() {
        let registry = RequestRegistry::new();
        assert!(registry.check_and_record("m1", "r1"));
        assert!(!registry.check_and_record("m1", "r1"));
        assert!(registry.contains("m1", "r1"));
    }

    #[test]
    fn test_identities_are_independent() {
        let registry = RequestRegistry::new();
        assert!(registry.check_and_record("m1", "r1"));
        assert!(registry.check_and_record("m2", "r1"));
        assert!(!registry.contains("m3", "r1"));
    }

    #[test]
    fn test_concurrent_single_winner() {
        let registry = Arc::new(RequestRegistry::new());
        let accepted = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                let accepted = accepted.clone();
                std::thread::spawn(move || {
                    if registry.check_and_record("m1", "same-request") {
                        accepted.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(accepted.load(Ordering::SeqCst), 1);
    }
}
