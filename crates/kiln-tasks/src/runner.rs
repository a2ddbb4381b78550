//! Cached external command execution

use std::borrow::Cow;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::debug;

use crate::cache::{signature, CacheEntry, TaskCache};
use crate::error::{BuildError, TaskError};
use crate::hash::HashStore;
use crate::reporter::{TaskEvent, TaskReporter};

/// Files to associate with a command's cache entry.
///
/// Only knowable after the command has run when the wrapped tool reports
/// its own inputs (e.g. discovered includes).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tracked {
    /// Files the command read
    pub read: Vec<String>,
    /// Files the command wrote
    pub written: Vec<String>,
}

impl Tracked {
    pub fn new<R, W>(read: R, written: W) -> Self
    where
        R: IntoIterator,
        R::Item: Into<String>,
        W: IntoIterator,
        W::Item: Into<String>,
    {
        Self {
            read: read.into_iter().map(Into::into).collect(),
            written: written.into_iter().map(Into::into).collect(),
        }
    }
}

/// Counters describing command execution in the current process
#[derive(Debug, Default, Clone, Copy)]
pub struct RunnerStats {
    /// Processes spawned
    pub spawned: usize,
    /// Commands skipped by a matching cache entry
    pub cache_hits: usize,
    /// Wall time spent waiting on processes
    pub run_time: Duration,
}

#[derive(Debug, Default)]
struct Counters {
    spawned: AtomicUsize,
    cache_hits: AtomicUsize,
    run_time_micros: AtomicU64,
}

/// Runs external commands, consulting the hash store and command cache.
///
/// Cheap to clone; every clone shares the same stores and counters.
#[derive(Clone)]
pub struct ProcessRunner {
    hashes: Arc<HashStore>,
    cache: Arc<TaskCache>,
    reporter: Arc<dyn TaskReporter>,
    counters: Arc<Counters>,
}

impl ProcessRunner {
    /// Create a new runner
    pub fn new(
        hashes: Arc<HashStore>,
        cache: Arc<TaskCache>,
        reporter: Arc<dyn TaskReporter>,
    ) -> Self {
        Self {
            hashes,
            cache,
            reporter,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Run a command unless its cache entry still matches.
    ///
    /// `discover` is called only after the process exits successfully and
    /// returns the files to track. Files hashed for the previous entry are
    /// invalidated as soon as the process exits, and written files again
    /// before the new entry's hashes are computed.
    pub async fn run<F, Fut>(
        &self,
        command: &[String],
        label: &str,
        discover: F,
    ) -> Result<(), TaskError>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<Tracked, TaskError>> + Send,
    {
        let signature = signature(command);
        let exe = resolve_executable(command)?;

        let previous = self.cache.get(&signature);
        if let Some(entry) = &previous {
            let current = self.current_hashes(&exe, &entry.files).await;
            if current == entry.hashes {
                self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
                self.reporter.report(&TaskEvent::CacheHit {
                    label: label.to_string(),
                });
                return Ok(());
            }
            self.reporter.report(&TaskEvent::CacheMiss {
                label: label.to_string(),
            });
        }

        self.spawn(&exe, command, label).await?;

        // Hashes taken for the cache check predate the run
        if let Some(entry) = &previous {
            for file in &entry.files {
                self.hashes.invalidate(file);
            }
        }

        let Tracked { read, written } = discover().await?;
        for file in &written {
            self.hashes.invalidate(file);
        }

        let files: Vec<String> = read.into_iter().chain(written).collect();
        let hashes = self.current_hashes(&exe, &files).await;
        debug!(label, files = files.len(), "committing cache entry");
        self.cache.insert(signature, CacheEntry { files, hashes });
        Ok(())
    }

    /// Run a command that is never cached.
    ///
    /// Any existing cache entry for the command is deleted.
    pub async fn run_uncached(&self, command: &[String], label: &str) -> Result<(), TaskError> {
        let signature = signature(command);
        let exe = resolve_executable(command)?;
        self.cache.remove(&signature);
        self.spawn(&exe, command, label).await?;
        Ok(())
    }

    /// Hash store shared with the engine, for rules that hash outside commands
    pub fn hashes(&self) -> &HashStore {
        &self.hashes
    }

    pub fn stats(&self) -> RunnerStats {
        RunnerStats {
            spawned: self.counters.spawned.load(Ordering::Relaxed),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            run_time: Duration::from_micros(self.counters.run_time_micros.load(Ordering::Relaxed)),
        }
    }

    async fn current_hashes(&self, exe: &Path, files: &[String]) -> Vec<String> {
        let mut hashes = Vec::with_capacity(files.len() + 1);
        hashes.push(self.hashes.hash_file(exe).await);
        hashes.extend(self.hashes.hash_files(files).await);
        hashes
    }

    async fn spawn(&self, exe: &Path, command: &[String], label: &str) -> Result<(), BuildError> {
        let pretty = pretty_command(command);
        self.reporter.report(&TaskEvent::CommandStarted {
            label: label.to_string(),
            command: pretty.clone(),
        });

        self.counters.spawned.fetch_add(1, Ordering::Relaxed);
        let before = Instant::now();
        let status = Command::new(exe)
            .args(&command[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await;
        let elapsed = u64::try_from(before.elapsed().as_micros()).unwrap_or(u64::MAX);
        self.counters.run_time_micros.fetch_add(elapsed, Ordering::Relaxed);

        let status = status.map_err(|source| BuildError::Spawn {
            command: pretty.clone(),
            source,
        })?;

        if !status.success() {
            return Err(BuildError::CommandFailed {
                command: pretty,
                status,
            });
        }
        Ok(())
    }
}

/// Find the command's executable via a PATH search
pub fn resolve_executable(command: &[String]) -> Result<PathBuf, BuildError> {
    let program = command.first().ok_or(BuildError::EmptyCommand)?;
    which::which(program).map_err(|_| BuildError::ExecutableNotFound(program.clone()))
}

/// Render a command so it can be pasted into a POSIX shell
pub fn pretty_command(command: &[String]) -> String {
    command
        .iter()
        .map(|token| quote_token(token))
        .collect::<Vec<_>>()
        .join(" ")
}

fn quote_token(token: &str) -> Cow<'_, str> {
    const SPECIAL: &str = " \t\n!\"'$&()*,;<>?[\\]^`{|}~";

    let needs_quotes = token.is_empty()
        || token.starts_with('=')
        || token.starts_with('#')
        || token.chars().any(|c| SPECIAL.contains(c));

    if needs_quotes {
        Cow::Owned(format!("'{}'", token.replace('\'', "'\\''")))
    } else {
        Cow::Borrowed(token)
    }
}
