//! Temporary on-disk copies of accepted uploads.
//!
//! A [`StagedUpload`] owns its file for exactly one request. The file is removed when the guard
//! is dropped, so every exit path of the handler (early return, error, panic, or the client
//! going away mid-request) cleans up without extra bookkeeping.

use std::io::Write;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tempfile::TempPath;

use crate::errors::{Error, Result};

const PREFIX: &str = "relay-upload-";

#[derive(Debug)]
pub struct StagedUpload {
    path: TempPath,
}

impl StagedUpload {
    /// Write `data` to a uniquely-named file inside `dir`.
    pub async fn write(dir: PathBuf, data: Bytes) -> Result<Self> {
        let path = tokio::task::spawn_blocking(move || -> std::io::Result<TempPath> {
            let mut file = tempfile::Builder::new().prefix(PREFIX).tempfile_in(&dir)?;
            file.write_all(&data)?;
            file.flush()?;
            Ok(file.into_temp_path())
        })
        .await
        .map_err(|e| Error::Internal {
            operation: format!("join staging task: {e}"),
        })?
        .map_err(|e| Error::Internal {
            operation: format!("stage upload: {e}"),
        })?;

        tracing::debug!(path = %path.display(), "Staged upload");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the staged file now. Failures are logged and otherwise ignored.
    pub fn remove(self) {
        let shown = self.path.display().to_string();
        match self.path.close() {
            Ok(()) => tracing::debug!(path = %shown, "Removed staged upload"),
            Err(e) => tracing::warn!(path = %shown, error = %e, "Failed to remove staged upload"),
        }
    }
}
