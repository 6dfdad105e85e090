//! Generated documents and the handles that point at them.
//!
//! A pipeline owns every document it generates. Each one lives as a file in
//! a private temporary directory and is exposed to observers only as an
//! [`ArtifactRef`]. Releasing an artifact deletes its file; a handle to a
//! released artifact reads back as [`LabelError::ArtifactReleased`] instead
//! of stale bytes. Dropping the store removes the whole directory.

use crate::error::LabelError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempDir};
use tracing::debug;

/// Handle to a generated document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub id: u64,
    /// Generation cycle that produced the document.
    pub cycle: u64,
    /// Location of the document while it is live.
    pub path: PathBuf,
    /// Suggested download name.
    pub file_name: String,
    pub page_count: usize,
    pub byte_len: usize,
}

/// Exclusive owner of generated documents.
#[derive(Debug)]
pub struct ArtifactStore {
    // Files drop before the directory that holds them.
    live: HashMap<u64, NamedTempFile>,
    next_id: u64,
    dir: TempDir,
}

impl ArtifactStore {
    pub fn new() -> Result<Self, LabelError> {
        let dir = tempfile::Builder::new()
            .prefix("qr-labels-")
            .tempdir()
            .map_err(|e| LabelError::Internal(format!("artifact dir: {e}")))?;
        Ok(Self {
            dir,
            next_id: 1,
            live: HashMap::new(),
        })
    }

    /// Persist a document and return its handle.
    pub fn store(
        &mut self,
        cycle: u64,
        file_name: &str,
        page_count: usize,
        bytes: &[u8],
    ) -> Result<ArtifactRef, LabelError> {
        let mut file = tempfile::Builder::new()
            .prefix("labels-")
            .suffix(".pdf")
            .tempfile_in(self.dir.path())
            .map_err(|e| LabelError::Internal(format!("artifact file: {e}")))?;
        file.write_all(bytes)
            .and_then(|_| file.flush())
            .map_err(|e| LabelError::OutputWriteFailed {
                path: file.path().to_path_buf(),
                source: e,
            })?;

        let id = self.next_id;
        self.next_id += 1;
        let artifact = ArtifactRef {
            id,
            cycle,
            path: file.path().to_path_buf(),
            file_name: file_name.to_string(),
            page_count,
            byte_len: bytes.len(),
        };
        self.live.insert(id, file);
        debug!("Stored artifact #{} ({} bytes)", id, bytes.len());
        Ok(artifact)
    }

    /// Delete an artifact. Returns `false` if it was already gone.
    pub fn release(&mut self, id: u64) -> bool {
        let released = self.live.remove(&id).is_some();
        if released {
            debug!("Released artifact #{}", id);
        }
        released
    }

    pub fn release_all(&mut self) {
        self.live.clear();
    }

    pub fn is_live(&self, id: u64) -> bool {
        self.live.contains_key(&id)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Read a live artifact's bytes.
    pub fn read(&self, artifact: &ArtifactRef) -> Result<Vec<u8>, LabelError> {
        let file = self
            .live
            .get(&artifact.id)
            .ok_or(LabelError::ArtifactReleased { id: artifact.id })?;
        std::fs::read(file.path()).map_err(|e| LabelError::Internal(format!("artifact read: {e}")))
    }
}

/// Write `bytes` to `path` via a temp file + rename, so readers never see a
/// half-written document.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), LabelError> {
    let write_err = |e: std::io::Error| LabelError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("pdf.tmp");
    if let Err(e) = tokio::fs::write(&tmp_path, bytes).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_err(e));
    }
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_err(e));
    }
    Ok(())
}

/// Where a document named `file_name` lands when saved to `dest`.
///
/// `dest` names a directory when it already is one or when it ends with a
/// path separator; the file name is appended in both cases.
pub async fn resolve_destination(dest: &Path, file_name: &str) -> PathBuf {
    let trailing_separator = dest
        .as_os_str()
        .to_string_lossy()
        .ends_with(std::path::is_separator);
    let is_dir = tokio::fs::metadata(dest)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false);

    if trailing_separator || is_dir {
        dest.join(file_name)
    } else {
        dest.to_path_buf()
    }
}
