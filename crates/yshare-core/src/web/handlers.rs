//! HTTP endpoint handlers for the Y-Share web interface.

#![allow(clippy::missing_errors_doc)]

use std::io;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Form, Json,
};
use axum_extra::extract::Multipart;
use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};

use crate::delivery::Delivery;
use crate::ingest::{self, ShareReceipt, UploadedFile};

use super::assets;
use super::error::{ApiError, ApiResult};
use super::state::SharedState;

/// Multipart field that carries files.
const FILE_FIELD: &str = "file";

/// Body of `POST /receive`.
#[derive(Debug, Deserialize)]
pub struct ReceiveRequest {
    /// The six-digit code typed by the receiver
    pub code: String,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    sessions: usize,
    version: &'static str,
}

/// POST /send - Upload files and create a share.
///
/// Each part of the `file` field is streamed straight into the blob store.
/// Other fields and parts without a file name are skipped. The share is
/// registered only after every part has been stored.
pub async fn create_share(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> ApiResult<Json<ShareReceipt>> {
    let mut uploads: Vec<UploadedFile> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Failed to read multipart field: {e}")))?
    {
        if field.name() != Some(FILE_FIELD) {
            tracing::debug!("Skipping multipart field {:?}", field.name());
            continue;
        }

        // An untouched file input still submits one part with an empty name.
        let raw_name = match field.file_name() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => continue,
        };

        let mime_type = field
            .content_type()
            .filter(|ct| !ct.is_empty())
            .map(String::from)
            .or_else(|| mime_guess::from_path(&raw_name).first_raw().map(String::from))
            .unwrap_or_else(|| ingest::DEFAULT_MIME_TYPE.to_string());

        let key = state.upload_key();
        let body = field.map_err(io::Error::other).boxed();
        let remote_url = state.store.upload(&key, &mime_type, body).await?;

        tracing::info!("Stored upload {} as {}", raw_name, key);
        uploads.push(UploadedFile {
            remote_url,
            raw_name,
            mime_type,
        });
    }

    let receipt = ingest::create_session(&state.registry, uploads)?;
    tracing::info!(
        "Created share {} for {} file(s)",
        receipt.code,
        receipt.file_count
    );
    Ok(Json(receipt))
}

/// POST /receive - Download the files behind a submitted code.
///
/// Browsers posting the page's form get the page back with the message
/// when the code cannot be served; other clients get the JSON error.
pub async fn receive(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Form(request): Form<ReceiveRequest>,
) -> Response {
    let result = match state.pipeline.deliver(&request.code).await {
        Ok(delivery) => delivery_response(delivery),
        Err(e) => Err(ApiError::from(e)),
    };

    match result {
        Ok(response) => response,
        Err(err) if accepts_html(&headers) => {
            assets::page_with_error(err.status_code(), &err.message)
        }
        Err(err) => err.into_response(),
    }
}

/// GET /download/{code} - Same as `POST /receive`, as a link.
pub async fn download(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> ApiResult<Response> {
    let delivery = state.pipeline.deliver(&code).await?;
    delivery_response(delivery)
}

/// GET /health - Liveness and number of live shares.
pub async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        sessions: state.registry.len(),
        version: crate::VERSION,
    })
}

fn accepts_html(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/html"))
}

fn delivery_response(delivery: Delivery) -> ApiResult<Response> {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, delivery.content_type.as_str())
        .header(header::CONTENT_DISPOSITION, delivery.content_disposition())
        .header(header::CACHE_CONTROL, "no-store");

    if let Some(length) = delivery.content_length {
        builder = builder.header(header::CONTENT_LENGTH, length);
    }

    builder
        .body(Body::from_stream(delivery.body))
        .map_err(|e| {
            ApiError::internal("Failed to build download response").with_details(e.to_string())
        })
}
