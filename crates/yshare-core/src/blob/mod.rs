//! Remote blob storage boundary.
//!
//! Uploaded bytes never stay in this process. A [`BlobStore`] persists them
//! and hands back an opaque URL; downloads open that URL again and stream the
//! bytes through. Sessions only ever read from the store, and expiry never
//! deletes anything from it.
//!
//! Two stores ship with the crate:
//!
//! | Store | URLs | Use |
//! |-------|------|-----|
//! | [`MemoryBlobStore`] | `memory://<key>` | development, tests |
//! | [`HttpBlobStore`] | `<base_url>/<key>` | any object store speaking plain `PUT`/`GET` |

mod memory;

#[cfg(feature = "http-store")]
mod http;

use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::Result;

pub use memory::MemoryBlobStore;

#[cfg(feature = "http-store")]
pub use http::HttpBlobStore;

/// A boxed stream of byte chunks.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// An opened blob: response metadata plus the body still to be read.
pub struct BlobStream {
    /// Content type reported by the store, if any
    pub content_type: Option<String>,
    /// Length reported by the store, if any
    pub content_length: Option<u64>,
    /// Body chunks, pulled on demand
    pub body: ByteStream,
}

impl std::fmt::Debug for BlobStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStream")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// A remote object store that uploaded files live in.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Store `body` under `key` and return the URL it can be fetched from.
    async fn upload(&self, key: &str, content_type: &str, body: ByteStream) -> Result<String>;

    /// Start a streaming read of the blob at `url`.
    ///
    /// Errors here happen before any byte is read; errors inside the body
    /// stream happen mid-transfer.
    async fn open(&self, url: &str) -> Result<BlobStream>;
}
