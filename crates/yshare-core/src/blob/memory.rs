//! In-process blob store.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{stream, StreamExt, TryStreamExt};

use super::{BlobStore, BlobStream, ByteStream};
use crate::error::{Error, Result};

const URL_SCHEME: &str = "memory://";

/// Size of the chunks a stored blob is streamed back in.
const READ_CHUNK_SIZE: usize = 16 * 1024;

#[derive(Debug, Clone)]
struct StoredBlob {
    content_type: String,
    data: Bytes,
}

/// Blob store that keeps everything in memory.
///
/// Blobs live as long as the store, like a remote bucket would; nothing is
/// removed when a share expires.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, StoredBlob>>,
}

impl MemoryBlobStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `data` directly and return its URL.
    pub fn insert(&self, key: &str, content_type: &str, data: impl Into<Bytes>) -> String {
        let blob = StoredBlob {
            content_type: content_type.to_string(),
            data: data.into(),
        };
        self.blobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), blob);
        format!("{URL_SCHEME}{key}")
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether the store holds no blobs.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, url: &str) -> Option<StoredBlob> {
        let key = url.strip_prefix(URL_SCHEME)?;
        self.blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, key: &str, content_type: &str, body: ByteStream) -> Result<String> {
        let data = body
            .try_fold(BytesMut::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await
            .map_err(|e| Error::UpstreamUpload(e.to_string()))?;

        tracing::debug!("Stored {} bytes under {}", data.len(), key);
        Ok(self.insert(key, content_type, data.freeze()))
    }

    async fn open(&self, url: &str) -> Result<BlobStream> {
        let blob = self
            .get(url)
            .ok_or_else(|| Error::upstream_fetch(url, "no such blob"))?;

        let len = blob.data.len();
        let chunks: Vec<Bytes> = (0..len)
            .step_by(READ_CHUNK_SIZE)
            .map(|start| blob.data.slice(start..len.min(start + READ_CHUNK_SIZE)))
            .collect();

        Ok(BlobStream {
            content_type: Some(blob.content_type),
            content_length: Some(len as u64),
            body: stream::iter(chunks).map(Ok).boxed(),
        })
    }
}
