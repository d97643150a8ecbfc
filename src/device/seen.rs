//! Seen Device Set
//!
//! Canonical device paths the watcher has already claimed. Lives for the
//! whole process; nothing is ever removed.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Thread-safe set of processed device targets
#[derive(Debug, Clone, Default)]
pub struct SeenSet {
    inner: Arc<Mutex<HashSet<PathBuf>>>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `target`. Returns true only for the first caller.
    ///
    /// Lookup and insert happen under one lock, so two racing events for
    /// the same target cannot both win.
    pub fn mark(&self, target: &Path) -> bool {
        self.inner.lock().insert(target.to_path_buf())
    }

    pub fn contains(&self, target: &Path) -> bool {
        self.inner.lock().contains(target)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_mark_once() {
        let seen = SeenSet::new();
        assert!(seen.mark(Path::new("/dev/sdb")));
        assert!(!seen.mark(Path::new("/dev/sdb")));
        assert!(seen.mark(Path::new("/dev/sdc")));
        assert_eq!(seen.len(), 2);
        assert!(seen.contains(Path::new("/dev/sdb")));
    }

    #[test]
    fn test_concurrent_mark_single_winner() {
        let seen = SeenSet::new();
        let winners = Arc::new(AtomicUsize::new(0));

        let threads: Vec<_> = (0..16)
            .map(|_| {
                let seen = seen.clone();
                let winners = winners.clone();
                std::thread::spawn(move || {
                    if seen.mark(Path::new("/dev/sdd")) {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }
}
