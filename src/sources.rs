//! Component sources
//!
//! A source is either a symbolic name or a file path, optionally containing
//! glob wildcards. This module classifies sources, expands patterns into
//! concrete files and normalizes paths into registry keys.

use crate::identity::is_symbolic_name;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised while expanding a source
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("Invalid glob pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

/// Characters that make a path source a glob pattern
const GLOB_CHARS: &[char] = &['*', '?', '['];

/// Whether a path source contains glob wildcards
pub fn has_glob_pattern(source: &str) -> bool {
    source.contains(GLOB_CHARS)
}

/// Whether `source` is acceptable as a file path
pub fn is_valid_path(source: &str) -> bool {
    !source.trim().is_empty() && !source.contains('\0')
}

/// Absolute, lexically normalized form of `path`.
///
/// Relative paths are joined onto the current directory; `.` and `..` are
/// folded without touching the filesystem, so the file need not exist.
pub fn normalize_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Registry key for a file: the normalized path, case-folded on Windows
pub fn file_key(path: &Path) -> String {
    let key = normalize_path(path).to_string_lossy().into_owned();
    if cfg!(windows) {
        key.to_lowercase()
    } else {
        key
    }
}

/// Resolve a path source against `base`; symbolic names pass through.
pub fn resolve_source(base: &Path, source: &str) -> String {
    let source = source.trim();
    if source.is_empty() || is_symbolic_name(source) {
        return source.to_string();
    }
    let path = Path::new(source);
    if path.is_absolute() {
        source.to_string()
    } else {
        base.join(path).to_string_lossy().into_owned()
    }
}

/// Expand a configured source into concrete sources.
///
/// Symbolic names and plain paths yield themselves (paths resolved against
/// `base`); glob patterns yield every matching file, possibly none.
pub fn expand_source(base: &Path, source: &str) -> Result<Vec<String>, SourceError> {
    let resolved = resolve_source(base, source);
    if is_symbolic_name(&resolved) || !has_glob_pattern(&resolved) {
        return Ok(vec![resolved]);
    }

    let entries = glob::glob(&resolved).map_err(|e| SourceError::InvalidPattern {
        pattern: resolved.clone(),
        message: e.to_string(),
    })?;

    let mut files: Vec<String> = entries
        .filter_map(|entry| match entry {
            Ok(path) if path.is_file() => Some(path.to_string_lossy().into_owned()),
            Ok(_) => None,
            Err(e) => {
                debug!("Skipping unreadable glob entry: {}", e);
                None
            }
        })
        .collect();
    files.sort();

    if files.is_empty() {
        warn!("Pattern [{}] matched no files.", resolved);
    } else {
        debug!("Pattern [{}] matched {} files.", resolved, files.len());
    }

    Ok(files)
}
