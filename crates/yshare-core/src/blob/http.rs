//! Blob store reached over plain HTTP.
//!
//! Uploads are `PUT <base_url>/<key>`; downloads are `GET <url>`. This covers
//! pre-authorized object-store endpoints, WebDAV shares and simple blob
//! gateways. The bearer token is only sent to URLs under `base_url`.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use reqwest::{Body, Client, RequestBuilder};

use super::{BlobStore, BlobStream, ByteStream};
use crate::error::{Error, Result};

const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Blob store backed by an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpBlobStore {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpBlobStore {
    /// Create a store rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is empty or the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(Error::InvalidConfig {
                key: "storage.base_url".into(),
                reason: "must not be empty for the http backend".into(),
            });
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    /// The URL an object stored under `key` is reachable at.
    pub fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key.trim_start_matches('/'))
    }

    fn is_own(&self, url: &str) -> bool {
        url.strip_prefix(&self.base_url)
            .is_some_and(|rest| rest.starts_with('/'))
    }

    fn authorize(&self, request: RequestBuilder, url: &str) -> RequestBuilder {
        match &self.token {
            Some(token) if self.is_own(url) => {
                request.header(AUTHORIZATION, format!("Bearer {token}"))
            }
            _ => request,
        }
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn upload(&self, key: &str, content_type: &str, body: ByteStream) -> Result<String> {
        let url = self.url_for(key);

        let request = self
            .client
            .put(&url)
            .header(CONTENT_TYPE, content_type)
            .body(Body::wrap_stream(body));

        let response = self
            .authorize(request, &url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| Error::UpstreamUpload(e.to_string()))?;

        // Some gateways rename objects and say where they put them.
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        tracing::debug!("Uploaded {} ({})", key, response.status());
        Ok(location.unwrap_or(url))
    }

    async fn open(&self, url: &str) -> Result<BlobStream> {
        let response = self
            .authorize(self.client.get(url), url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| Error::upstream_fetch(url, e))?;

        let headers = response.headers();
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let content_length = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());

        let body = response.bytes_stream().map_err(io::Error::other).boxed();

        Ok(BlobStream {
            content_type,
            content_length,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_for_joins_cleanly() {
        let store = HttpBlobStore::new("https://blobs.example.com/bucket/", None).unwrap();
        assert_eq!(
            store.url_for("y-share-temp/upload-1"),
            "https://blobs.example.com/bucket/y-share-temp/upload-1"
        );
        assert_eq!(store.url_for("/x"), "https://blobs.example.com/bucket/x");
    }

    #[test]
    fn test_empty_base_url_rejected() {
        assert!(matches!(
            HttpBlobStore::new("", None),
            Err(Error::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_token_only_sent_to_own_host() {
        let store =
            HttpBlobStore::new("https://blobs.example.com", Some("secret".into())).unwrap();

        let url = "https://blobs.example.com/a";
        let own = store.authorize(store.client.get(url), url).build().unwrap();
        assert_eq!(own.headers()[AUTHORIZATION], "Bearer secret");

        for url in ["https://cdn.example.net/a", "https://blobs.example.com.evil/a"] {
            let foreign = store.authorize(store.client.get(url), url).build().unwrap();
            assert!(foreign.headers().get(AUTHORIZATION).is_none());
        }
    }
}
