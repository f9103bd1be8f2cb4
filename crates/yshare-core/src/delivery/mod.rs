//! Streaming downloads for share codes.
//!
//! [`DeliveryPipeline::deliver`] resolves a code and produces a [`Delivery`]:
//! response metadata plus a lazily pulled body.
//!
//! - **One file**: the upstream body is passed through untouched, with the
//!   upstream content type and the stored file name.
//! - **Several files**: a ZIP archive named `<code>.zip` is encoded on the
//!   fly, one entry per file in upload order.
//!
//! Errors returned by `deliver` happen before any output exists and can be
//! shown to the user. Errors after that point end the body stream with an
//! error, which aborts the connection; they are logged, never rendered.
//! If any file of an archive fails, the whole archive is aborted.

mod archive;
mod disposition;

use std::sync::Arc;

use futures::{StreamExt, TryStreamExt};

use crate::blob::{BlobStore, ByteStream};
use crate::error::{Error, Result};
use crate::registry::{CodeRegistry, FileRef, ShareSession};

pub use archive::ArchiveOptions;
pub use disposition::attachment_disposition;

/// Content type of multi-file downloads.
pub const ARCHIVE_CONTENT_TYPE: &str = "application/zip";

/// A download ready to be sent.
pub struct Delivery {
    /// Suggested file name for the receiver
    pub file_name: String,
    /// Response content type
    pub content_type: String,
    /// Body length, when known up front (single files only)
    pub content_length: Option<u64>,
    /// Whether the body is a generated archive
    pub is_archive: bool,
    /// Body chunks
    pub body: ByteStream,
}

impl Delivery {
    /// `Content-Disposition` value forcing a download under [`Self::file_name`].
    pub fn content_disposition(&self) -> String {
        attachment_disposition(&self.file_name)
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .field("is_archive", &self.is_archive)
            .finish_non_exhaustive()
    }
}

/// Resolves codes and streams their files from the blob store.
#[derive(Clone)]
pub struct DeliveryPipeline {
    registry: Arc<CodeRegistry>,
    store: Arc<dyn BlobStore>,
    options: ArchiveOptions,
}

impl std::fmt::Debug for DeliveryPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryPipeline")
            .field("registry", &self.registry)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl DeliveryPipeline {
    /// Create a pipeline over `registry` and `store`.
    pub fn new(
        registry: Arc<CodeRegistry>,
        store: Arc<dyn BlobStore>,
        options: ArchiveOptions,
    ) -> Self {
        Self {
            registry,
            store,
            options,
        }
    }

    /// Start the download for `code`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CodeNotFound`] for unknown, expired or malformed
    /// codes, and [`Error::UpstreamFetch`] if the (first) file cannot be
    /// opened.
    pub async fn deliver(&self, code: &str) -> Result<Delivery> {
        let session = self
            .registry
            .resolve(code)
            .ok_or_else(|| Error::CodeNotFound(code.trim().to_string()))?;

        if session.is_single() {
            self.single(&session, &session.files()[0]).await
        } else {
            self.archive(&session).await
        }
    }

    async fn single(&self, session: &ShareSession, file: &FileRef) -> Result<Delivery> {
        let blob = self.store.open(&file.remote_url).await?;

        let content_type = blob
            .content_type
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| file.mime_type.clone());

        tracing::info!("Delivering {} from share {}", file.display_name, session.code());

        let code = session.code().to_string();
        let body = blob
            .body
            .inspect_err(move |e| {
                tracing::error!("Download of {} aborted mid-stream: {}", code, e);
            })
            .boxed();

        Ok(Delivery {
            file_name: file.display_name.clone(),
            content_type,
            content_length: blob.content_length,
            is_archive: false,
            body,
        })
    }

    async fn archive(&self, session: &ShareSession) -> Result<Delivery> {
        let files = session.files().to_vec();
        let first = self.store.open(&files[0].remote_url).await?;

        tracing::info!(
            "Delivering {} files from share {} as archive",
            files.len(),
            session.code()
        );

        let body = archive::stream_archive(
            session.code().to_string(),
            Arc::clone(&self.store),
            files,
            first,
            session.created_at(),
            self.options,
        );

        Ok(Delivery {
            file_name: format!("{}.zip", session.code()),
            content_type: ARCHIVE_CONTENT_TYPE.to_string(),
            content_length: None,
            is_archive: true,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::stream;

    use super::*;
    use crate::blob::{BlobStream, MemoryBlobStore};
    use crate::registry::RegistryConfig;

    /// Wraps a memory store and fails selected URLs.
    struct FaultyStore {
        inner: MemoryBlobStore,
        refuse: Option<String>,
        break_midway: Option<String>,
        opened: AtomicUsize,
    }

    impl FaultyStore {
        fn new(inner: MemoryBlobStore) -> Self {
            Self {
                inner,
                refuse: None,
                break_midway: None,
                opened: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl BlobStore for FaultyStore {
        async fn upload(&self, key: &str, content_type: &str, body: ByteStream) -> Result<String> {
            self.inner.upload(key, content_type, body).await
        }

        async fn open(&self, url: &str) -> Result<BlobStream> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            if self.refuse.as_deref() == Some(url) {
                return Err(Error::upstream_fetch(url, "503 Service Unavailable"));
            }
            let mut blob = self.inner.open(url).await?;
            if self.break_midway.as_deref() == Some(url) {
                let head = stream::iter(vec![Ok(Bytes::from_static(b"partial"))]);
                let tail = stream::iter(vec![Err(std::io::Error::other("connection reset"))]);
                blob.body = head.chain(tail).boxed();
            }
            Ok(blob)
        }
    }

    async fn collect(body: ByteStream) -> std::io::Result<Vec<u8>> {
        body.try_fold(Vec::new(), |mut acc, chunk| async move {
            acc.extend_from_slice(&chunk);
            Ok(acc)
        })
        .await
    }

    fn pipeline(store: Arc<dyn BlobStore>) -> (Arc<CodeRegistry>, DeliveryPipeline) {
        let registry = CodeRegistry::new(RegistryConfig::default());
        let pipeline = DeliveryPipeline::new(
            Arc::clone(&registry),
            store,
            ArchiveOptions::default(),
        );
        (registry, pipeline)
    }

    #[tokio::test]
    async fn test_single_file_passthrough() {
        let store = MemoryBlobStore::new();
        let url = store.insert("k1", "application/pdf", &b"%PDF-1.7 body"[..]);
        let (registry, pipeline) = pipeline(Arc::new(store));
        let code = registry
            .create(vec![FileRef::new(url, "résumé.pdf", "application/x-unknown")])
            .unwrap();

        let delivery = pipeline.deliver(code.as_str()).await.unwrap();
        assert!(!delivery.is_archive);
        assert_eq!(delivery.content_type, "application/pdf");
        assert_eq!(delivery.content_length, Some(13));
        assert_eq!(
            delivery.content_disposition(),
            "attachment; filename*=UTF-8''r%C3%A9sum%C3%A9.pdf"
        );
        assert_eq!(collect(delivery.body).await.unwrap(), b"%PDF-1.7 body");
    }

    #[tokio::test]
    async fn test_archive_entries_in_order() {
        let store = MemoryBlobStore::new();
        let report = vec![b'r'; 200_000];
        let photo: Vec<u8> = (0..=255u8).cycle().take(70_000).collect();
        let a = store.insert("a", "application/pdf", report.clone());
        let b = store.insert("b", "image/png", photo.clone());
        let c = store.insert("c", "image/png", photo.clone());
        let files = vec![
            FileRef::new(a, "report.pdf", "application/pdf"),
            FileRef::new(b, "photo.png", "image/png"),
            FileRef::new(c, "photo.png", "image/png"),
        ];
        let (registry, pipeline) = pipeline(Arc::new(store));
        let code = registry.create(files).unwrap();

        let delivery = pipeline.deliver(code.as_str()).await.unwrap();
        assert!(delivery.is_archive);
        assert_eq!(delivery.file_name, format!("{code}.zip"));
        assert_eq!(delivery.content_type, ARCHIVE_CONTENT_TYPE);

        let bytes = collect(delivery.body).await.unwrap();
        assert!(bytes.len() < report.len(), "archive should be compressed");

        let mut zip = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(zip.len(), 3);
        let expected: [(&str, &[u8]); 3] = [
            ("report.pdf", &report),
            ("photo.png", &photo),
            ("photo.png", &photo),
        ];
        for (i, (name, content)) in expected.iter().enumerate() {
            let mut entry = zip.by_index(i).unwrap();
            assert_eq!(entry.name(), *name);
            let mut data = Vec::new();
            entry.read_to_end(&mut data).unwrap();
            assert_eq!(data, *content);
        }
    }

    #[tokio::test]
    async fn test_unknown_and_expired_codes_look_the_same() {
        tokio::time::pause();
        let store = MemoryBlobStore::new();
        let url = store.insert("k", "text/plain", &b"x"[..]);
        let registry = CodeRegistry::new(RegistryConfig {
            ttl: Duration::from_secs(60),
            ..RegistryConfig::default()
        });
        let pipeline = DeliveryPipeline::new(
            Arc::clone(&registry),
            Arc::new(store),
            ArchiveOptions::default(),
        );
        let code = registry
            .create(vec![FileRef::new(url, "x.txt", "text/plain")])
            .unwrap();
        let unused = if code.as_str() == "100000" { "100001" } else { "100000" };

        tokio::time::advance(Duration::from_secs(60)).await;

        let expired = pipeline.deliver(code.as_str()).await.unwrap_err();
        let never = pipeline.deliver(unused).await.unwrap_err();
        assert!(matches!(expired, Error::CodeNotFound(_)));
        assert!(matches!(never, Error::CodeNotFound(_)));
        assert_eq!(expired.code(), never.code());
    }

    #[tokio::test]
    async fn test_single_open_failure_is_reported_up_front() {
        let mem = MemoryBlobStore::new();
        let url = mem.insert("k", "text/plain", &b"x"[..]);
        let store = FaultyStore {
            refuse: Some(url.clone()),
            ..FaultyStore::new(mem)
        };
        let (registry, pipeline) = pipeline(Arc::new(store));
        let code = registry.create(vec![FileRef::new(url, "x.txt", "text/plain")]).unwrap();

        let err = pipeline.deliver(code.as_str()).await.unwrap_err();
        assert!(matches!(err, Error::UpstreamFetch { .. }));
        // The session is still there for a retry.
        assert!(registry.resolve(code.as_str()).is_some());
    }

    #[tokio::test]
    async fn test_single_mid_stream_failure_ends_body_with_error() {
        let mem = MemoryBlobStore::new();
        let url = mem.insert("k", "text/plain", &b"complete body"[..]);
        let store = FaultyStore {
            break_midway: Some(url.clone()),
            ..FaultyStore::new(mem)
        };
        let (registry, pipeline) = pipeline(Arc::new(store));
        let code = registry.create(vec![FileRef::new(url, "x.txt", "text/plain")]).unwrap();

        let delivery = pipeline.deliver(code.as_str()).await.unwrap();
        assert!(collect(delivery.body).await.is_err());
    }

    #[tokio::test]
    async fn test_archive_first_file_failure_is_reported_up_front() {
        let mem = MemoryBlobStore::new();
        let a = mem.insert("a", "text/plain", &b"a"[..]);
        let b = mem.insert("b", "text/plain", &b"b"[..]);
        let store = FaultyStore {
            refuse: Some(a.clone()),
            ..FaultyStore::new(mem)
        };
        let (registry, pipeline) = pipeline(Arc::new(store));
        let code = registry
            .create(vec![
                FileRef::new(a, "a.txt", "text/plain"),
                FileRef::new(b, "b.txt", "text/plain"),
            ])
            .unwrap();

        assert!(matches!(
            pipeline.deliver(code.as_str()).await,
            Err(Error::UpstreamFetch { .. })
        ));
    }

    #[tokio::test]
    async fn test_archive_aborts_on_later_file_failure() {
        let mem = MemoryBlobStore::new();
        let a = mem.insert("a", "text/plain", vec![b'a'; 100_000]);
        let b = mem.insert("b", "text/plain", &b"b"[..]);
        let c = mem.insert("c", "text/plain", &b"c"[..]);
        let store = Arc::new(FaultyStore {
            refuse: Some(b.clone()),
            ..FaultyStore::new(mem)
        });
        let (registry, pipeline) = pipeline(Arc::clone(&store) as Arc<dyn BlobStore>);
        let code = registry
            .create(vec![
                FileRef::new(a, "a.txt", "text/plain"),
                FileRef::new(b, "b.txt", "text/plain"),
                FileRef::new(c, "c.txt", "text/plain"),
            ])
            .unwrap();

        let delivery = pipeline.deliver(code.as_str()).await.unwrap();
        let result = collect(delivery.body).await;
        assert!(result.is_err(), "archive must not end cleanly");
        // The third file is never fetched.
        assert_eq!(store.opened.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_archive_stops_when_receiver_leaves() {
        let mem = MemoryBlobStore::new();
        let noise: Vec<u8> = (0..2_000_000u32)
            .map(|i| (i.wrapping_mul(2_654_435_761) >> 24) as u8)
            .collect();
        let mut files = Vec::new();
        for i in 0..8 {
            let url = mem.insert(&format!("f{i}"), "application/octet-stream", noise.clone());
            files.push(FileRef::new(url, format!("f{i}.bin"), "application/octet-stream"));
        }
        let store = Arc::new(FaultyStore::new(mem));
        let registry = CodeRegistry::new(RegistryConfig::default());
        let pipeline = DeliveryPipeline::new(
            Arc::clone(&registry),
            Arc::clone(&store) as Arc<dyn BlobStore>,
            ArchiveOptions {
                compression_level: 1,
                channel_capacity: 1,
            },
        );
        let code = registry.create(files).unwrap();

        let mut body = pipeline.deliver(code.as_str()).await.unwrap().body;
        assert!(body.next().await.unwrap().is_ok());
        drop(body);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(store.opened.load(Ordering::SeqCst) < 8);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_stalled_receiver_does_not_block_other_archives() {
        let mem = MemoryBlobStore::new();
        let noise: Vec<u8> = (0..1_000_000u32)
            .map(|i| (i.wrapping_mul(2_654_435_761) >> 24) as u8)
            .collect();
        let mut files = Vec::new();
        for i in 0..4 {
            let url = mem.insert(&format!("f{i}"), "application/octet-stream", noise.clone());
            files.push(FileRef::new(url, format!("f{i}.bin"), "application/octet-stream"));
        }
        let store: Arc<dyn BlobStore> = Arc::new(mem);
        let registry = CodeRegistry::new(RegistryConfig::default());
        let pipeline = DeliveryPipeline::new(
            Arc::clone(&registry),
            store,
            ArchiveOptions {
                compression_level: 1,
                channel_capacity: 1,
            },
        );
        let first_code = registry.create(files.clone()).unwrap();
        let second_code = registry.create(files).unwrap();

        // Read one chunk of the first archive, then stop reading it.
        let mut stalled = pipeline.deliver(first_code.as_str()).await.unwrap().body;
        assert!(stalled.next().await.unwrap().is_ok());

        let mut others = Vec::new();
        for _ in 0..8 {
            let delivery = pipeline.deliver(second_code.as_str()).await.unwrap();
            others.push(tokio::spawn(collect(delivery.body)));
        }
        let all = tokio::time::timeout(Duration::from_secs(30), futures::future::join_all(others))
            .await
            .expect("archives stalled behind an unread download");
        for bytes in all {
            let bytes = bytes.unwrap().unwrap();
            assert_eq!(zip::ZipArchive::new(Cursor::new(bytes)).unwrap().len(), 4);
        }
        drop(stalled);
    }
}
