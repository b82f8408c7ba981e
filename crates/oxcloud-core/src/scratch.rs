//! Local scratch files for staging ciphertext.
//!
//! Providers transfer whole files, so the vault stages markers, sidecars and
//! file ciphertext in temporary files. Every file handed out is a
//! [`TempPath`], which deletes itself on drop: on success, on error, and when
//! the owning future is cancelled.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::{NamedTempFile, TempDir, TempPath};

/// Where temporary files are created.
#[derive(Debug, Clone)]
pub struct ScratchSpace {
    dir: PathBuf,
    // Keeps an owned directory alive as long as any clone exists.
    _owned: Option<Arc<TempDir>>,
}

impl ScratchSpace {
    /// Use an existing directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        ScratchSpace {
            dir: dir.into(),
            _owned: None,
        }
    }

    /// Use the system temporary directory.
    pub fn system() -> Self {
        Self::new(std::env::temp_dir())
    }

    /// Create a private directory that is removed with the last clone.
    pub fn ephemeral() -> io::Result<Self> {
        let owned = TempDir::with_prefix("oxcloud-scratch-")?;
        Ok(ScratchSpace {
            dir: owned.path().to_path_buf(),
            _owned: Some(Arc::new(owned)),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create a new empty temporary file.
    pub fn temp_file(&self) -> io::Result<TempPath> {
        Ok(NamedTempFile::new_in(&self.dir)?.into_temp_path())
    }

    /// Create a temporary file holding `contents`.
    pub async fn temp_file_with(&self, contents: &[u8]) -> io::Result<TempPath> {
        let path = self.temp_file()?;
        tokio::fs::write(&path, contents).await?;
        Ok(path)
    }
}
