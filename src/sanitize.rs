//! Request path sanitization and storage-root containment.
//!
//! String-level cleanup alone is not trusted: [`resolve`] always finishes by
//! checking that the joined path, and the real location of whatever already
//! exists along it, stays inside the storage root.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PathError {
    #[error("path is empty after normalization")]
    Empty,
    #[error("path resolves outside the storage root")]
    OutsideRoot,
    #[error("path contains a NUL byte")]
    Nul,
}

/// Normalize an already percent-decoded URL path into a relative path.
///
/// Both `/` and `\` count as separators. `.` and empty segments are dropped,
/// `..` pops the previous segment, and a `..` with nothing left to pop is
/// discarded. Because every `..` is consumed in one pass, the output never
/// contains a parent-directory component.
pub fn sanitize(raw: &str) -> PathBuf {
    let unified = raw.replace('\\', "/");
    let mut segments: Vec<&str> = Vec::new();

    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    segments.iter().collect()
}

/// Sanitize `raw` and join it onto `root`, verifying containment.
pub fn resolve(root: &Path, raw: &str) -> Result<PathBuf, PathError> {
    // No file name can hold one, and the OS rejects it as invalid input
    if raw.contains('\0') {
        return Err(PathError::Nul);
    }

    let relative = sanitize(raw);

    if relative.as_os_str().is_empty() {
        return Err(PathError::Empty);
    }

    // Prefixes and root dirs can only show up on platforms with drive letters
    if !relative
        .components()
        .all(|component| matches!(component, Component::Normal(_)))
    {
        return Err(PathError::OutsideRoot);
    }

    let candidate = root.join(&relative);
    ensure_within(root, &candidate)?;

    Ok(candidate)
}

/// Verify that `candidate` lies under `root`, following symlinks for every
/// part of it that already exists on disk.
pub fn ensure_within(root: &Path, candidate: &Path) -> Result<(), PathError> {
    if !candidate.starts_with(root) {
        return Err(PathError::OutsideRoot);
    }

    // Deepest existing entry at or below the root. symlink_metadata so a
    // dangling link is still inspected instead of skipped.
    let existing = candidate
        .ancestors()
        .take_while(|path| path.starts_with(root))
        .find(|path| path.symlink_metadata().is_ok());

    let Some(existing) = existing else {
        return Ok(());
    };

    let real_root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    match existing.canonicalize() {
        Ok(real) if real.starts_with(&real_root) => Ok(()),
        Ok(real) => {
            tracing::warn!(
                candidate = %candidate.display(),
                real = %real.display(),
                "Path escapes storage root through a link"
            );
            Err(PathError::OutsideRoot)
        }
        Err(_) => Err(PathError::OutsideRoot),
    }
}
