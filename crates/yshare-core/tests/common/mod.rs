//! Common test utilities for `Y-Share` integration tests.

#![allow(dead_code)]

use std::io::{Cursor, Read};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, Response};
use axum::Router;

use yshare_core::blob::MemoryBlobStore;
use yshare_core::config::Config;
use yshare_core::web::{SharedState, WebServer};

/// Multipart boundary used by [`multipart_request`].
const BOUNDARY: &str = "----yshare-test-boundary";

/// A router over a fresh in-memory store.
pub struct TestApp {
    pub router: Router,
    pub state: SharedState,
    pub store: Arc<MemoryBlobStore>,
}

/// Build an app with default configuration.
pub fn test_app() -> TestApp {
    test_app_with(Config::default())
}

/// Build an app with `config`, always over an in-memory store.
pub fn test_app_with(config: Config) -> TestApp {
    let store = Arc::new(MemoryBlobStore::new());
    let server = WebServer::with_store(config, store.clone());
    TestApp {
        router: server.router(),
        state: Arc::clone(server.state()),
        store,
    }
}

/// Build a `POST /send` request carrying `files` as `(name, content type, data)`.
pub fn multipart_request(files: &[(&str, &str, &[u8])]) -> Request<Body> {
    multipart_request_with_fields(&[], files)
}

/// Like [`multipart_request`], with plain `(name, value)` form fields first.
pub fn multipart_request_with_fields(
    fields: &[(&str, &str)],
    files: &[(&str, &str, &[u8])],
) -> Request<Body> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
        );
        body.extend_from_slice(value.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    for (name, content_type, data) in files {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\n")
                .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::post("/send")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .header(header::CONTENT_LENGTH, body.len())
        .body(Body::from(body))
        .expect("Failed to build upload request")
}

/// Build a `POST /receive` form request for `code`.
pub fn receive_request(code: &str) -> Request<Body> {
    Request::post("/receive")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!("code={code}")))
        .expect("Failed to build receive request")
}

/// Build a `POST /receive` request the way a browser submits the page's form.
pub fn browser_receive_request(code: &str) -> Request<Body> {
    Request::post("/receive")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(
            header::ACCEPT,
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        )
        .body(Body::from(format!("code={code}")))
        .expect("Failed to build receive request")
}

/// Read a whole response body.
pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read response body")
        .to_vec()
}

/// Read a JSON response body.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).expect("Response is not JSON")
}

/// Entries of a ZIP archive, in archive order.
pub fn unzip(data: Vec<u8>) -> Vec<(String, Vec<u8>)> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data)).expect("Not a valid ZIP archive");
    (0..archive.len())
        .map(|i| {
            let mut entry = archive.by_index(i).expect("Failed to read ZIP entry");
            let mut content = Vec::new();
            entry
                .read_to_end(&mut content)
                .expect("Failed to decompress ZIP entry");
            (entry.name().to_string(), content)
        })
        .collect()
}

/// Generate random bytes for testing.
pub fn random_bytes(size: usize) -> Vec<u8> {
    use rand::RngCore;
    let mut bytes = vec![0u8; size];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Turn UTF-8 text into the Latin-1 misreading of its bytes.
pub fn latin1_mangle(s: &str) -> String {
    s.bytes().map(char::from).collect()
}
