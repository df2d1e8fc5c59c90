//! Task discovery
//!
//! Turns the command line into the ordered list of paths a run will process.
//! With no arguments the working directory is scanned (non-recursively) for
//! JPEG files; explicit arguments are taken as given (minus repeats of the same
//! file) and only validated later, per task, by the recompress step.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Extensions treated as JPEG, compared case-insensitively.
pub const JPEG_EXTENSIONS: &[&str] = &["jpg", "jpeg"];

/// Build the task list: explicit `args` if any, otherwise a scan of the
/// current working directory.
pub fn collect_tasks(args: &[PathBuf]) -> Result<Vec<PathBuf>> {
    if !args.is_empty() {
        return Ok(dedup_paths(args));
    }
    let cwd = std::env::current_dir().context("Failed to determine the working directory")?;
    find_jpegs(&cwd)
}

/// Drop paths naming a file already listed, keeping first-occurrence order.
///
/// Paths are compared by their canonical form when it resolves, and literally
/// otherwise, so missing files still reach the recompress step and fail there.
pub fn dedup_paths(args: &[PathBuf]) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    args.iter()
        .filter(|path| {
            let key = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
            let first = seen.insert(key);
            if !first {
                debug!(path = %path.display(), "skipping repeated path");
            }
            first
        })
        .cloned()
        .collect()
}

/// List the JPEG files directly inside `dir`, sorted by file name.
pub fn find_jpegs(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("Failed to read directory {}", dir.display()))?;

    let mut jpegs = Vec::new();
    for entry in entries {
        let entry =
            entry.with_context(|| format!("Failed to read entry in {}", dir.display()))?;

        if entry.file_type().is_ok_and(|ft| ft.is_dir()) {
            continue;
        }

        let path = entry.path();
        if is_jpeg(&path) {
            jpegs.push(path);
        }
    }

    jpegs.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    debug!(dir = %dir.display(), found = jpegs.len(), "scanned directory for JPEGs");
    Ok(jpegs)
}

/// Whether `path` carries a JPEG extension, ignoring case.
pub fn is_jpeg(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| {
            JPEG_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}
