//! Run-scoped warn-once tracking.
//!
//! One [`WarningTracker`] is built per run and shared (via `Arc`) with every
//! component that can warn about unencrypted transport or unpinned tags.
//! Each key is warned about at most once for the tracker's lifetime.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use tracing::warn;

/// Deduplicates warnings by key.
#[derive(Debug, Default)]
pub struct WarningTracker {
    warned: Mutex<HashSet<String>>,
}

impl WarningTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Warns about plaintext transport to `uri`. Returns true if the warning
    /// was emitted by this call.
    pub fn warn_unencrypted(&self, uri: &str) -> bool {
        if !self.first_time(&format!("unencrypted:{uri}")) {
            return false;
        }
        warn!("using unencrypted connection to {uri}; consider using https instead");
        true
    }

    /// Warns that `tag` was used without a pinned digest.
    pub fn warn_unpinned_tag(&self, repository: &str, tag: &str) -> bool {
        if !self.first_time(&format!("unpinned:{repository}:{tag}")) {
            return false;
        }
        warn!(
            "{repository}:{tag} is not pinned to a digest; the resolved content may change between runs"
        );
        true
    }

    /// Number of distinct warnings emitted so far.
    pub fn emitted(&self) -> usize {
        self.warned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn first_time(&self, key: &str) -> bool {
        self.warned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_warns_once_per_uri() {
        let tracker = WarningTracker::new();
        assert!(tracker.warn_unencrypted("http://localhost:5000"));
        assert!(!tracker.warn_unencrypted("http://localhost:5000"));
        assert!(tracker.warn_unencrypted("http://mirror:5000"));
        assert_eq!(tracker.emitted(), 2);
    }

    #[test]
    fn test_concurrent_warnings_deduplicate() {
        let tracker = Arc::new(WarningTracker::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || tracker.warn_unencrypted("http://registry:5000"))
            })
            .collect();

        let emitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&w| w)
            .count();
        assert_eq!(emitted, 1);
    }
}
