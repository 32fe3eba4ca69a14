//! File staging: uploaded bytes are written to a location the worker can read
//! (a volume shared by the API and worker containers), keyed by job.

use std::io;
use std::path::{Component, PathBuf};

use crate::dispatch::{FileReference, UploadedFile};

#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    #[error("failed to create job directory '{path}': {source}")]
    CreateDir { path: String, source: io::Error },

    #[error("failed to write file to '{path}': {source}")]
    Write { path: String, source: io::Error },

    #[error("failed to read file '{path}': {source}")]
    Read { path: String, source: io::Error },

    #[error("failed to delete '{path}': {source}")]
    Delete { path: String, source: io::Error },

    #[error("path '{0}' is outside the staging area")]
    OutsideStagingArea(String),
}

/// Job-scoped file staging capability.
#[async_trait::async_trait]
pub trait FileStager: Send + Sync {
    /// Persist `file` under the `job_id` scope.
    async fn stage(&self, job_id: &str, file: &UploadedFile)
        -> Result<FileReference, StagingError>;

    /// Read back the bytes a reference points at.
    async fn read(&self, reference: &FileReference) -> Result<Vec<u8>, StagingError>;

    /// Delete a single staged file.
    async fn remove(&self, reference: &FileReference) -> Result<(), StagingError>;

    /// Delete everything staged for `job_id`.
    async fn remove_job(&self, job_id: &str) -> Result<(), StagingError>;
}

// ---------------------------------------------------------------------------
// LocalStager
// ---------------------------------------------------------------------------

/// Stages files on a local (or network-mounted) directory:
/// `<root>/<job_id>/<filename>`.
#[derive(Debug, Clone)]
pub struct LocalStager {
    root: PathBuf,
}

impl LocalStager {
    /// A relative `root` is resolved against the current directory, so staged
    /// paths are always absolute.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: absolute_root(root.into()),
        }
    }

    fn job_dir(&self, job_id: &str) -> Result<PathBuf, StagingError> {
        self.contained(self.root.join(job_id))
    }

    /// Resolve `path` lexically and make sure it stays below the root.
    ///
    /// References come back from another process, so they are never trusted
    /// to point inside the staging area.
    fn contained(&self, path: PathBuf) -> Result<PathBuf, StagingError> {
        let escapes = path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::CurDir));
        if escapes || !path.starts_with(&self.root) || path == self.root {
            return Err(StagingError::OutsideStagingArea(path.display().to_string()));
        }
        Ok(path)
    }
}

fn absolute_root(root: PathBuf) -> PathBuf {
    let root = if root.is_absolute() {
        root
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(root),
            Err(_) => root,
        }
    };
    let mut normalized = PathBuf::new();
    for component in root.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized
}

#[async_trait::async_trait]
impl FileStager for LocalStager {
    async fn stage(
        &self,
        job_id: &str,
        file: &UploadedFile,
    ) -> Result<FileReference, StagingError> {
        let dir = self.job_dir(job_id)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| StagingError::CreateDir {
                path: dir.display().to_string(),
                source,
            })?;

        let path = self.contained(dir.join(&file.filename))?;
        tokio::fs::write(&path, &file.data)
            .await
            .map_err(|source| StagingError::Write {
                path: path.display().to_string(),
                source,
            })?;

        tracing::debug!(
            job_id,
            filename = %file.filename,
            path = %path.display(),
            bytes = file.data.len(),
            "Staged file",
        );

        Ok(FileReference {
            filename: file.filename.clone(),
            content_type: file.content_type.clone(),
            local_path: path.display().to_string(),
        })
    }

    async fn read(&self, reference: &FileReference) -> Result<Vec<u8>, StagingError> {
        let path = self.contained(PathBuf::from(&reference.local_path))?;
        tokio::fs::read(&path)
            .await
            .map_err(|source| StagingError::Read {
                path: reference.local_path.clone(),
                source,
            })
    }

    async fn remove(&self, reference: &FileReference) -> Result<(), StagingError> {
        let path = self.contained(PathBuf::from(&reference.local_path))?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|source| StagingError::Delete {
                path: reference.local_path.clone(),
                source,
            })
    }

    async fn remove_job(&self, job_id: &str) -> Result<(), StagingError> {
        let dir = self.job_dir(job_id)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StagingError::Delete {
                path: dir.display().to_string(),
                source,
            }),
        }
    }
}
