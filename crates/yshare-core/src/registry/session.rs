//! Share session data.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use uuid::Uuid;

use crate::code::ShareCode;

/// One uploaded file, as needed to fetch it again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRef {
    /// Opaque locator in the remote blob store
    pub remote_url: String,
    /// Repaired file name, used for the download and archive entry
    pub display_name: String,
    /// Content type reported at upload time
    pub mime_type: String,
}

impl FileRef {
    /// Create a new file reference.
    pub fn new(
        remote_url: impl Into<String>,
        display_name: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            remote_url: remote_url.into(),
            display_name: display_name.into(),
            mime_type: mime_type.into(),
        }
    }
}

/// A live sender-to-receiver transfer.
///
/// Sessions are created and owned by the
/// [`CodeRegistry`](super::CodeRegistry); lookups receive a shared snapshot
/// that cannot be modified.
#[derive(Debug)]
pub struct ShareSession {
    pub(crate) id: Uuid,
    code: ShareCode,
    files: Vec<FileRef>,
    created_at: Instant,
    created_at_utc: DateTime<Utc>,
    ttl: Duration,
}

impl ShareSession {
    pub(crate) fn new(code: ShareCode, files: Vec<FileRef>, ttl: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            code,
            files,
            created_at: Instant::now(),
            created_at_utc: Utc::now(),
            ttl,
        }
    }

    /// The code that resolves to this session.
    pub fn code(&self) -> &ShareCode {
        &self.code
    }

    /// Files in upload order. Never empty.
    pub fn files(&self) -> &[FileRef] {
        &self.files
    }

    /// Whether this session delivers a single file rather than an archive.
    pub fn is_single(&self) -> bool {
        self.files.len() == 1
    }

    /// Wall-clock creation time.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at_utc
    }

    /// Time to live from creation.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Wall-clock time at which the code stops resolving.
    pub fn expires_at(&self) -> DateTime<Utc> {
        chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| self.created_at_utc.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Whether the session's lifetime has run out at `now`.
    ///
    /// A deadline past the end of the clock never arrives.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.created_at
            .checked_add(self.ttl)
            .is_some_and(|deadline| now >= deadline)
    }
}
