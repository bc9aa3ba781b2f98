//! Translation between filesystem paths and extension identifiers.
//!
//! A path such as `project/cogs/admin/ban.rs` under the root `cogs` maps to
//! the identifier `cogs.admin.ban`: the last `cogs` directory component, every
//! directory after it, then the file stem.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::types::ExtensionId;
use crate::error::{Error, Result};

/// Split a path into normalized components, accepting both separator styles.
fn components(path: &Path) -> Vec<String> {
    let raw = path.to_string_lossy().replace('\\', "/");
    let mut parts: Vec<String> = Vec::new();
    for part in raw.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other.to_string()),
        }
    }
    parts
}

/// Translate a path under the watched root into its extension identifier.
///
/// The root is searched from the end of the path, so a root name repeated
/// earlier (`proj/proj/cogs/x.rs`) resolves to the occurrence nearest the file.
/// Fails with [`Error::InvalidConfiguration`] when `root_name` is not a
/// directory component of `path`, which usually means the configured root
/// uses the wrong separator, or when the file stem contains a dot.
pub fn identifier_from_path(path: impl AsRef<Path>, root_name: &str) -> Result<ExtensionId> {
    let path = path.as_ref();
    let parts = components(path);

    let (file, dirs) = parts.split_last().ok_or_else(|| {
        Error::invalid_configuration(format!("empty extension path: {}", path.display()))
    })?;

    let root_index = dirs.iter().rposition(|c| c == root_name).ok_or_else(|| {
        Error::invalid_configuration(format!(
            "`{root_name}` is not a directory of {}; use forward slashes in the watched root",
            path.display()
        ))
    })?;

    let stem = Path::new(file)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.clone());
    // `a.b.rs` would collide with `a/b.rs`.
    if stem.contains('.') {
        return Err(Error::invalid_configuration(format!(
            "file name `{stem}` contains a dot and cannot form an extension identifier: {}",
            path.display()
        )));
    }

    let mut segments: Vec<&str> = dirs[root_index..].iter().map(String::as_str).collect();
    segments.push(&stem);

    Ok(ExtensionId::new(segments.join(".")))
}

/// Relative path (from the directory containing the root) an identifier was derived from.
///
/// This is the inverse of [`identifier_from_path`] for identifiers whose
/// components contain no dots.
pub fn path_from_identifier(id: &ExtensionId, file_extension: &str) -> PathBuf {
    let mut path: PathBuf = id.as_str().split('.').collect();
    if !file_extension.is_empty() {
        path.set_extension(file_extension);
    }
    path
}

/// Check if a file is an extension source file.
pub fn is_extension_file(path: &Path, file_extension: &str) -> bool {
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(true);

    !hidden
        && path
            .extension()
            .and_then(|e| e.to_str())
            .map(|ext| ext == file_extension)
            .unwrap_or(false)
}

/// Check if a path may name a directory that holds extensions.
///
/// Removed paths can no longer be inspected, so anything without an
/// extension counts.
pub fn may_be_directory(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(true);

    !hidden && (path.is_dir() || path.extension().is_none())
}

/// Discover every extension file under `root_dir`, recursively.
///
/// Hidden files and directories are skipped. Results are sorted by identifier.
pub fn discover(
    root_dir: &Path,
    root_name: &str,
    file_extension: &str,
) -> Result<Vec<(PathBuf, ExtensionId)>> {
    if !root_dir.is_dir() {
        return Err(Error::RootNotFound(root_dir.to_path_buf()));
    }

    let mut discovered = Vec::new();
    let walker = WalkDir::new(root_dir).follow_links(true).into_iter();

    for entry in walker.filter_entry(|e| {
        e.depth() == 0
            || !e
                .file_name()
                .to_str()
                .map(|n| n.starts_with('.'))
                .unwrap_or(false)
    }) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!("Skipping unreadable entry under {:?}: {}", root_dir, e);
                continue;
            }
        };

        if !entry.file_type().is_file() || !is_extension_file(entry.path(), file_extension) {
            continue;
        }

        match identifier_from_path(entry.path(), root_name) {
            Ok(id) => discovered.push((entry.into_path(), id)),
            Err(e) => tracing::error!("Cannot translate {:?}: {}", entry.path(), e),
        }
    }

    discovered.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(discovered)
}
