//! Content-hash cache for transpiled modules.
//!
//! The TypeScript profile routes every transpile through this cache so
//! unchanged modules skip the transform on rebuilds. Entries are keyed by
//! a digest of the source text; a stale entry can never be served for
//! changed content.

use std::fs;
use std::path::PathBuf;

use sha2::{Digest, Sha256};

/// Filesystem-backed transform cache.
#[derive(Debug, Clone)]
pub struct TransformCache {
    dir: PathBuf,
}

impl TransformCache {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.js"))
    }

    /// Digest used as the cache key for a module's source text.
    pub fn key(source: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Look up a previously transformed output.
    pub fn get(&self, key: &str) -> Option<String> {
        fs::read_to_string(self.entry_path(key)).ok()
    }

    /// Store a transformed output. Failures are logged and ignored; the
    /// cache is an optimization, not a correctness requirement.
    pub fn put(&self, key: &str, output: &str) {
        if let Err(e) = fs::create_dir_all(&self.dir) {
            tracing::debug!("cache dir unavailable: {}", e);
            return;
        }
        if let Err(e) = fs::write(self.entry_path(key), output) {
            tracing::debug!("cache write failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trips_entries() {
        let temp = tempdir().unwrap();
        let cache = TransformCache::new(temp.path().join("cache"));

        let key = TransformCache::key("const x: number = 1;");
        assert!(cache.get(&key).is_none());

        cache.put(&key, "const x = 1;");
        assert_eq!(cache.get(&key).as_deref(), Some("const x = 1;"));
    }

    #[test]
    fn different_sources_get_different_keys() {
        assert_ne!(TransformCache::key("a"), TransformCache::key("b"));
    }
}
