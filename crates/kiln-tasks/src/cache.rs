//! Persistent command cache
//!
//! The cache file is a JSON object keyed by command signature. Each value
//! holds the files tracked for that command and their content hashes:
//!
//! ```json
//! { "[\"g++\",\"-c\",\"a.cpp\"]": { "files": ["a.cpp", "a.o"], "hashes": ["<exe>", "<a.cpp>", "<a.o>"] } }
//! ```
//!
//! `hashes` always has one more element than `files`; the leading hash is the
//! resolved executable's. Loading is lenient: entries that do not have this
//! shape (or are not objects at all) are dropped rather than failing the run,
//! so older or newer cache files never block a build.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Default cache file name, relative to the build directory
pub const DEFAULT_CACHE_FILE: &str = "kiln-cache.json";

/// Canonical serialization of a command invocation, used as the cache key
pub fn signature(command: &[String]) -> String {
    serde_json::Value::from(command.to_vec()).to_string()
}

/// Tracked files and hashes for one command signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Tracked input/output files (the executable is implicit)
    pub files: Vec<String>,
    /// Executable hash followed by one hash per tracked file
    pub hashes: Vec<String>,
}

impl CacheEntry {
    /// Whether `hashes` has exactly one leading executable hash plus one per file
    pub fn is_well_formed(&self) -> bool {
        self.hashes.len() == self.files.len() + 1
    }
}

/// Result of loading the cache file
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadStats {
    /// Entries kept
    pub valid: usize,
    /// Malformed entries dropped
    pub discarded: usize,
}

/// Cache statistics
#[derive(Debug, Default, Clone, Copy)]
pub struct CacheStats {
    /// Number of command signatures
    pub entries: usize,
    /// Total tracked files across all entries
    pub tracked_files: usize,
}

/// In-memory command cache backed by a JSON file.
///
/// Entries are inserted and removed whole under a lock, so concurrent
/// readers never observe a half-written entry.
#[derive(Debug)]
pub struct TaskCache {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, CacheEntry>>,
}

impl TaskCache {
    /// Create an empty cache backed by `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Replace the in-memory entries with the contents of the cache file.
    ///
    /// A missing file starts an empty cache; an unreadable or malformed file
    /// is logged and also starts empty.
    pub fn load(&self) -> LoadStats {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) => {
                if e.kind() == io::ErrorKind::NotFound {
                    debug!(path = %self.path.display(), "no cache loaded; starting fresh");
                } else {
                    warn!(path = %self.path.display(), error = %e, "cache loading failed for unexpected reason");
                }
                self.lock().clear();
                return LoadStats::default();
            }
        };

        let (entries, stats) = parse_entries(&text);
        info!(
            path = %self.path.display(),
            valid = stats.valid,
            discarded = stats.discarded,
            "loaded cache"
        );
        *self.lock() = entries;
        stats
    }

    /// Write all entries to the cache file.
    ///
    /// The file is written to a temporary sibling and renamed into place.
    pub fn save(&self) -> Result<(), CacheError> {
        let json = {
            let entries = self.lock();
            debug!(path = %self.path.display(), entries = entries.len(), "writing cache");
            serde_json::to_string(&*entries)?
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn get(&self, signature: &str) -> Option<CacheEntry> {
        self.lock().get(signature).cloned()
    }

    /// Insert or replace the entry for a signature
    pub fn insert(&self, signature: String, entry: CacheEntry) {
        self.lock().insert(signature, entry);
    }

    pub fn remove(&self, signature: &str) -> Option<CacheEntry> {
        self.lock().remove(signature)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let entries = self.lock();
        CacheStats {
            entries: entries.len(),
            tracked_files: entries.values().map(|e| e.files.len()).sum(),
        }
    }

    /// Get the cache file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn parse_entries(text: &str) -> (BTreeMap<String, CacheEntry>, LoadStats) {
    let mut entries = BTreeMap::new();
    let mut stats = LoadStats::default();

    let root: serde_json::Value = match serde_json::from_str(text) {
        Ok(root) => root,
        Err(e) => {
            warn!(error = %e, "cache file is not valid JSON; starting fresh");
            return (entries, stats);
        }
    };

    let Some(object) = root.as_object() else {
        warn!("cache file is not a JSON object; starting fresh");
        return (entries, stats);
    };

    for (signature, value) in object {
        match CacheEntry::deserialize(value) {
            Ok(entry) if entry.is_well_formed() => {
                entries.insert(signature.clone(), entry);
                stats.valid += 1;
            }
            _ => stats.discarded += 1,
        }
    }

    (entries, stats)
}

/// Cache errors
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// IO error
    #[error("Cache IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("Cache serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
