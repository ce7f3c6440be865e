//! Flat-directory image store.
//!
//! The directory listing is the only index: every allow-listed file in the
//! storage root is an image, and there is no other metadata. No locking is
//! done, so concurrent writes to the same name are last-writer-wins.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs;

use crate::constants;
use crate::sanitize::{self, PathError};

/// Store failures. The `Display` text is what the gallery shows the user.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No file selected")]
    MissingFile,
    #[error("File type not allowed")]
    DisallowedType,
    #[error("File too large")]
    TooLarge,
    #[error("Invalid file name")]
    InvalidName,
    #[error("File not found")]
    NotFound,
    #[error("Storage error")]
    Io(#[from] io::Error),
}

impl From<PathError> for StoreError {
    fn from(_: PathError) -> Self {
        StoreError::InvalidName
    }
}

/// A file read back from the store for serving
#[derive(Debug)]
pub struct StoredFile {
    pub path: PathBuf,
    pub contents: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
    max_bytes: usize,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>, max_bytes: usize) -> Self {
        Self {
            root: root.into(),
            max_bytes,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Names of the allow-listed images in the storage root, in directory
    /// order. Any I/O failure yields an empty listing.
    pub async fn list(&self) -> Vec<String> {
        match self.read_names().await {
            Ok(names) => names,
            Err(err) => {
                tracing::warn!(
                    root = %self.root.display(),
                    error = %err,
                    "Failed to list storage directory"
                );
                Vec::new()
            }
        }
    }

    /// Symlinks are followed, so a link to an image inside the root is
    /// listed exactly when `open` would serve it. An entry that can't be
    /// inspected is skipped on its own.
    async fn read_names(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        let mut read_dir = fs::read_dir(&self.root).await?;

        while let Some(entry) = read_dir.next_entry().await? {
            // Names that aren't valid UTF-8 can't be linked from the gallery
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };

            if !is_allowed(&name) {
                continue;
            }

            let path = entry.path();
            match fs::metadata(&path).await {
                Ok(metadata) if metadata.is_file() => {}
                Ok(_) => continue,
                Err(err) => {
                    tracing::debug!(filename = %name, error = %err, "Skipping unreadable entry");
                    continue;
                }
            }

            if sanitize::ensure_within(&self.root, &path).is_err() {
                continue;
            }

            names.push(name);
        }

        Ok(names)
    }

    /// Store an uploaded file under its sanitized name, overwriting any
    /// existing file with that name. Returns the name it was stored as.
    pub async fn write(&self, original_filename: &str, content: &[u8]) -> Result<String, StoreError> {
        if original_filename.trim().is_empty() {
            return Err(StoreError::MissingFile);
        }

        if !is_allowed(original_filename) {
            tracing::warn!(filename = %original_filename, "Rejected upload with disallowed type");
            return Err(StoreError::DisallowedType);
        }

        if content.len() > self.max_bytes {
            tracing::warn!(
                filename = %original_filename,
                size = content.len(),
                limit = self.max_bytes,
                "Rejected oversized upload"
            );
            return Err(StoreError::TooLarge);
        }

        let name = safe_filename(original_filename);
        if !is_allowed(&name) {
            return Err(StoreError::DisallowedType);
        }

        let path = sanitize::resolve(&self.root, &name)?;
        fs::write(&path, content).await?;

        tracing::info!(filename = %name, size = content.len(), "Stored image");
        Ok(name)
    }

    /// Best-effort delete. Returns whether a file was actually removed;
    /// failures are logged and otherwise ignored.
    pub async fn delete(&self, filename: &str) -> bool {
        let filename = filename.trim();

        if filename.is_empty() || filename.contains(['/', '\\']) || !is_allowed(filename) {
            tracing::warn!(filename = %filename, "Ignoring delete of invalid file name");
            return false;
        }

        let path = match sanitize::resolve(&self.root, filename) {
            Ok(path) => path,
            Err(err) => {
                tracing::warn!(filename = %filename, error = %err, "Ignoring delete outside storage root");
                return false;
            }
        };

        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!(filename = %filename, "Deleted image");
                true
            }
            Err(err) => {
                tracing::debug!(filename = %filename, error = %err, "Delete failed");
                false
            }
        }
    }

    /// Read a file under the storage root for serving. `raw_path` is the
    /// decoded request path.
    pub async fn open(&self, raw_path: &str) -> Result<StoredFile, StoreError> {
        let path = sanitize::resolve(&self.root, raw_path).map_err(|err| {
            tracing::debug!(path = %raw_path, error = %err, "Rejected file request");
            StoreError::NotFound
        })?;

        let metadata = match fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Err(StoreError::NotFound),
            Err(err) => return Err(err.into()),
        };

        if !metadata.is_file() {
            return Err(StoreError::NotFound);
        }

        let contents = fs::read(&path).await?;
        Ok(StoredFile { path, contents })
    }
}

/// True iff the name's final extension is on the image allow-list
pub fn is_allowed(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            constants::IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Replace every character outside `[a-zA-Z0-9._-]` with `_`
pub fn safe_filename(original: &str) -> String {
    original
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
