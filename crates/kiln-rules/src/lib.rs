//! Kiln Rules - build rules registered on a Kiln engine
//!
//! Each rule turns one entry of a build file into a [`Task`](kiln_tasks::Task)
//! and registers it. Rules only use the engine's public API: task
//! registration and [`ProcessRunner`](kiln_tasks::ProcessRunner) for cached
//! command execution.

pub mod build_file;
pub mod command;
pub mod copy;
pub mod cpp;
pub mod depfile;
pub mod link;

use std::path::Path;

use kiln_core::{Os, Toolchain};
use kiln_tasks::BuildError;

pub use build_file::register_build_file;

/// Target platform a rule builds commands for
#[derive(Debug, Clone)]
pub struct Platform {
    pub os: Os,
    pub toolchain: Toolchain,
}

impl Platform {
    pub fn new(os: Os, toolchain: Toolchain) -> Self {
        Self { os, toolchain }
    }
}

/// Normalize a path to posix separators, folding `.` and `..` segments
pub fn normalize_posix(path: &str) -> String {
    let path = path.replace('\\', "/");
    let absolute = path.starts_with('/');

    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ if absolute => {}
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    if absolute {
        format!("/{}", joined)
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

/// Create the parent directory of a file about to be written
pub(crate) async fn ensure_parent(path: &str) -> Result<(), BuildError> {
    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}
