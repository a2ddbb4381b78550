//! Memoized file content hashing

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// Hash reported for a file that is missing or unreadable.
///
/// Never produced by [`digest`], which always yields 64 hex characters.
pub const MISSING_HASH: &str = "x";

/// Counters describing hashing work in the current run
#[derive(Debug, Default, Clone, Copy)]
pub struct HashStats {
    /// Number of memoized paths
    pub entries: usize,
    /// Lookups answered from the memo
    pub memo_hits: usize,
    /// Time spent reading files
    pub load_time: Duration,
    /// Time spent hashing file contents
    pub hash_time: Duration,
}

/// Run-scoped memo of path -> content hash.
///
/// A path's memo entry must be invalidated after the path is (re)written,
/// since the stored hash can no longer be trusted.
#[derive(Debug, Default)]
pub struct HashStore {
    memo: Mutex<HashMap<PathBuf, String>>,
    stats: Mutex<HashStats>,
}

impl HashStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash one file, reading it only the first time it is asked for
    pub async fn hash_file(&self, path: impl AsRef<Path>) -> String {
        let path = path.as_ref();

        if let Some(hash) = self.memo().get(path).cloned() {
            self.stats_guard().memo_hits += 1;
            return hash;
        }

        let before_load = Instant::now();
        let read = tokio::fs::read(path).await;
        self.stats_guard().load_time += before_load.elapsed();

        let hash = match read {
            Ok(data) => {
                let before_hash = Instant::now();
                let hash = digest(&data);
                self.stats_guard().hash_time += before_hash.elapsed();
                hash
            }
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "failed to hash file because of unexpected error");
                }
                MISSING_HASH.to_string()
            }
        };

        self.memo().insert(path.to_path_buf(), hash.clone());
        hash
    }

    /// Hash several files; output order matches input order
    pub async fn hash_files<P: AsRef<Path>>(&self, paths: &[P]) -> Vec<String> {
        let mut hashes = Vec::with_capacity(paths.len());
        for path in paths {
            hashes.push(self.hash_file(path).await);
        }
        hashes
    }

    /// Forget the memoized hash for a path
    pub fn invalidate(&self, path: impl AsRef<Path>) {
        if self.memo().remove(path.as_ref()).is_some() {
            debug!(path = %path.as_ref().display(), "invalidated memoized hash");
        }
    }

    /// Drop every memoized hash and reset the counters
    pub fn clear(&self) {
        self.memo().clear();
        *self.stats_guard() = HashStats::default();
    }

    pub fn stats(&self) -> HashStats {
        let mut stats = *self.stats_guard();
        stats.entries = self.memo().len();
        stats
    }

    fn memo(&self) -> MutexGuard<'_, HashMap<PathBuf, String>> {
        self.memo.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stats_guard(&self) -> MutexGuard<'_, HashStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Hex-encoded SHA-256 of a byte slice
pub fn digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Whether a file exists and can be opened for reading
pub async fn is_readable(path: impl AsRef<Path>) -> bool {
    tokio::fs::File::open(path).await.is_ok()
}
