//! Content-addressed storage for student photos.
//!
//! Photos are copied into a single directory under the name
//! `<class>-<roll>-<hash>.<ext>`, where `<hash>` is a prefix of the file's
//! BLAKE3 digest. Storing the same bytes for the same student twice reuses
//! the existing file, so callers must check that no other student refers to
//! a path before removing it.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};

/// Hex characters of the digest kept in file names.
const HASH_PREFIX_LEN: usize = 16;

const DEFAULT_EXTENSION: &str = "jpg";

/// A directory of student photos.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoStore {
    dir: PathBuf,
}

impl PhotoStore {
    /// Use `dir` for photos. The directory is created on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The photo directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copy the photo at `source` into the store for the student with
    /// `roll_number` in class `class_id`.
    ///
    /// Returns the stored path.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read or the store cannot be
    /// written.
    pub fn store(&self, source: &Path, class_id: i64, roll_number: &str) -> Result<PathBuf> {
        let bytes = std::fs::read(source)?;
        let target = self
            .dir
            .join(Self::file_name(class_id, roll_number, source, &bytes));

        if target.exists() {
            debug!("Photo already stored at {}", target.display());
            return Ok(target);
        }

        if !self.dir.exists() {
            std::fs::create_dir_all(&self.dir).map_err(|source| Error::DirectoryCreate {
                path: self.dir.clone(),
                source,
            })?;
        }
        std::fs::write(&target, &bytes)?;
        debug!("Stored photo {} ({} bytes)", target.display(), bytes.len());

        Ok(target)
    }

    /// Delete a stored photo. Paths outside the store are left alone.
    ///
    /// Returns whether a file was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn remove(&self, path: &Path) -> Result<bool> {
        if !path.starts_with(&self.dir) || !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(path)?;
        Ok(true)
    }

    /// Compute the stored name for `bytes` read from `source`.
    #[must_use]
    pub fn file_name(class_id: i64, roll_number: &str, source: &Path, bytes: &[u8]) -> String {
        let hash = blake3::hash(bytes).to_hex();
        let ext = source
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
            .map_or_else(|| DEFAULT_EXTENSION.to_string(), str::to_ascii_lowercase);

        format!(
            "{class_id}-{}-{}.{}",
            sanitize(roll_number),
            &hash.as_str()[..HASH_PREFIX_LEN],
            ext
        )
    }
}

/// Keep roll numbers usable as file name components.
fn sanitize(roll_number: &str) -> String {
    roll_number
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
