//! Turning finished uploads into a share session.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::code::ShareCode;
use crate::error::{Error, Result};
use crate::filename;
use crate::registry::{CodeRegistry, FileRef};

/// Content type recorded when the client did not report one.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// One part of an upload request whose bytes are already in the blob store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// URL assigned by the blob store
    pub remote_url: String,
    /// File name as the client's headers were decoded
    pub raw_name: String,
    /// Content type reported by the client
    pub mime_type: String,
}

impl UploadedFile {
    /// Repair the name and build the stored reference.
    pub fn into_file_ref(self) -> FileRef {
        let mime_type = if self.mime_type.trim().is_empty() {
            DEFAULT_MIME_TYPE.to_string()
        } else {
            self.mime_type
        };
        FileRef {
            remote_url: self.remote_url,
            display_name: filename::normalize(&self.raw_name),
            mime_type,
        }
    }
}

/// What the sender gets back after a successful upload.
#[derive(Debug, Clone, Serialize)]
pub struct ShareReceipt {
    /// Code the receiver has to enter
    pub code: String,
    /// The single file's name, or "<n> files"
    pub summary: String,
    /// Number of files in the session
    pub file_count: usize,
    /// Seconds until the code stops working
    pub expires_in: u64,
    /// Wall-clock time at which the code stops working
    pub expires_at: DateTime<Utc>,
}

/// Summary line shown to the sender.
pub fn summarize(files: &[FileRef]) -> String {
    match files {
        [only] => only.display_name.clone(),
        _ => format!("{} files", files.len()),
    }
}

/// Register a session for `uploads` and describe it for the sender.
///
/// # Errors
///
/// Returns [`Error::NoFiles`] without touching the registry when `uploads`
/// is empty, and [`Error::CapacityExhausted`] if no code is free.
pub fn create_session(
    registry: &Arc<CodeRegistry>,
    uploads: Vec<UploadedFile>,
) -> Result<ShareReceipt> {
    if uploads.is_empty() {
        tracing::warn!("Rejected upload without files");
        return Err(Error::NoFiles);
    }

    let files: Vec<FileRef> = uploads.into_iter().map(UploadedFile::into_file_ref).collect();
    let summary = summarize(&files);
    let file_count = files.len();

    let code: ShareCode = registry.create(files)?;
    let expires_at = registry
        .resolve(code.as_str())
        .map(|session| session.expires_at())
        .ok_or_else(|| Error::Internal(format!("share {code} vanished after creation")))?;

    Ok(ShareReceipt {
        code: code.to_string(),
        summary,
        file_count,
        expires_in: registry.config().ttl.as_secs(),
        expires_at,
    })
}
