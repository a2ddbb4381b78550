//! Compiler-emitted dependency files
//!
//! GCC and Clang write a make rule (`-MD -MT 'x ' -MF <file>`); MSVC writes
//! JSON (`/sourceDependencies <file>`). Both are reduced to a sorted list of
//! prerequisite paths to track in the command cache.

use std::path::Path;

use kiln_core::Os;
use kiln_tasks::BuildError;
use serde::Deserialize;

use crate::normalize_posix;

/// Read and parse a dependency file written for `os`
pub async fn load(path: &str, os: Os) -> Result<Vec<String>, BuildError> {
    let text = tokio::fs::read_to_string(path).await?;
    if os.is_windows() {
        let cwd = std::env::current_dir()?;
        parse_msvc(&text, &cwd)
    } else {
        parse_make(&text)
    }
}

/// Parse the prerequisites of a make rule.
///
/// Escaped newlines join lines and `\ ` is a literal space. Everything up
/// to and including the `:` token is the rule's target and is dropped.
pub fn parse_make(text: &str) -> Result<Vec<String>, BuildError> {
    let tokens = tokenize(text);

    let Some(colon) = tokens.iter().position(|t| t == ":" || t.ends_with(':')) else {
        return Err(BuildError::Message(
            "dependency file has no 'target :' rule".to_string(),
        ));
    };

    let mut prerequisites: Vec<String> = tokens.into_iter().skip(colon + 1).collect();
    prerequisites.sort();
    prerequisites.dedup();
    Ok(prerequisites)
}

fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.peek() {
                Some('\n') | Some('\r') => {
                    // line continuation
                    while matches!(chars.peek(), Some('\n') | Some('\r')) {
                        chars.next();
                    }
                    flush(&mut tokens, &mut current);
                }
                Some(' ') => {
                    chars.next();
                    current.push(' ');
                }
                _ => current.push('\\'),
            },
            c if c.is_whitespace() => flush(&mut tokens, &mut current),
            c => current.push(c),
        }
    }
    flush(&mut tokens, &mut current);
    tokens
}

fn flush(tokens: &mut Vec<String>, current: &mut String) {
    if !current.is_empty() {
        tokens.push(std::mem::take(current));
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SourceDependencies {
    data: SourceDependencyData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SourceDependencyData {
    source: String,
    #[serde(default)]
    includes: Vec<String>,
}

/// Parse MSVC `/sourceDependencies` JSON.
///
/// Paths under `base` are made relative to it; all paths use `/`.
pub fn parse_msvc(text: &str, base: &Path) -> Result<Vec<String>, BuildError> {
    let parsed: SourceDependencies = serde_json::from_str(text)
        .map_err(|e| BuildError::Message(format!("malformed dependency JSON: {}", e)))?;

    let base = normalize_posix(&base.to_string_lossy());
    let mut paths: Vec<String> = parsed
        .data
        .includes
        .iter()
        .chain(std::iter::once(&parsed.data.source))
        .map(|p| relative_to(&normalize_posix(p), &base))
        .collect();
    paths.sort();
    paths.dedup();
    Ok(paths)
}

/// Strip `base/` from the front of `path`, ignoring ASCII case (drive letters)
fn relative_to(path: &str, base: &str) -> String {
    let prefix_len = base.len() + 1;
    if path.len() > prefix_len
        && path.is_char_boundary(base.len())
        && path[..base.len()].eq_ignore_ascii_case(base)
        && path.as_bytes()[base.len()] == b'/'
    {
        path[prefix_len..].to_string()
    } else {
        path.to_string()
    }
}
