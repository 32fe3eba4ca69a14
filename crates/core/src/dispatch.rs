//! Producer → worker handoff: uploaded files, staged file references and the
//! dispatch payload.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::settings::{validate_theme, SlideSettings};
use crate::types::{is_valid_job_id, JobId};

/// Path on the worker's base URL that accepts dispatched jobs.
pub const WORKER_DISPATCH_PATH: &str = "/tasks/process-slides";

/// Maximum accepted length of an uploaded file name (bytes).
pub const MAX_FILENAME_LENGTH: usize = 255;

/// A file as submitted by the client, bytes included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Where a staged file lives. Never carries the bytes themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileReference {
    pub filename: String,
    #[serde(rename = "type")]
    pub content_type: String,
    pub local_path: String,
}

/// Body of the dispatch call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchPayload {
    #[serde(rename = "jobID")]
    pub job_id: JobId,
    pub theme: String,
    pub files: Vec<FileReference>,
    pub settings: SlideSettings,
}

impl DispatchPayload {
    /// Structural checks a worker applies before touching the job.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !is_valid_job_id(&self.job_id) {
            return Err(CoreError::Validation(format!(
                "Invalid job id '{}'",
                self.job_id
            )));
        }
        validate_theme(&self.theme)?;
        if self.files.is_empty() {
            return Err(CoreError::Validation(
                "At least one file is required".into(),
            ));
        }
        for file in &self.files {
            validate_filename(&file.filename)?;
        }
        Ok(())
    }
}

/// Worker acknowledgement of an accepted dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchAck {
    pub status: String,
    #[serde(rename = "jobID")]
    pub job_id: JobId,
}

impl DispatchAck {
    pub fn accepted(job_id: &str) -> Self {
        Self {
            status: "accepted".to_string(),
            job_id: job_id.to_string(),
        }
    }

    pub fn success(job_id: &str) -> Self {
        Self {
            status: "success".to_string(),
            job_id: job_id.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// A file name must be a single plain path component.
pub fn validate_filename(filename: &str) -> Result<(), CoreError> {
    if filename.trim().is_empty() {
        return Err(CoreError::Validation("File name must not be empty".into()));
    }
    if filename.len() > MAX_FILENAME_LENGTH {
        return Err(CoreError::Validation(format!(
            "File name exceeds maximum length of {MAX_FILENAME_LENGTH} bytes"
        )));
    }
    if filename == "." || filename == ".." || filename.contains(['/', '\\', '\0']) {
        return Err(CoreError::Validation(format!(
            "Invalid file name '{filename}'"
        )));
    }
    Ok(())
}

/// Validate a whole submission: at least one file, every name valid and
/// unique (files share one staging directory).
pub fn validate_files(files: &[UploadedFile]) -> Result<(), CoreError> {
    if files.is_empty() {
        return Err(CoreError::Validation(
            "At least one file is required".into(),
        ));
    }
    let mut seen = std::collections::HashSet::new();
    for file in files {
        validate_filename(&file.filename)?;
        if !seen.insert(file.filename.as_str()) {
            return Err(CoreError::Validation(format!(
                "Duplicate file name '{}'",
                file.filename
            )));
        }
    }
    Ok(())
}
