// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Detect request types and multipart extraction.

use axum::http::StatusCode;
use axum_extra::extract::multipart::MultipartError;
use axum_extra::extract::Multipart;
use bytes::Bytes;
use serde::Deserialize;

use crate::api::errors::ApiError;

/// Query parameters for POST /detect.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetectQuery {
    /// When true the response is an annotated JPEG instead of JSON.
    #[serde(default)]
    pub return_annotated: bool,
}

/// Pull the `file` field out of the multipart body.
///
/// Other fields are skipped rather than rejected, so callers can send extra
/// form data without breaking. A body with no `file` field at all is a
/// `MissingFile` rejection.
pub async fn read_image_field(
    mut multipart: Multipart,
    max_bytes: usize,
) -> Result<Bytes, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| field_error(e, max_bytes))?
    {
        if field.name() == Some("file") {
            return field.bytes().await.map_err(|e| field_error(e, max_bytes));
        }
    }

    Err(ApiError::MissingFile)
}

/// A chunked body with no Content-Length can blow the framework body limit
/// mid-read; that failure keeps its oversized-payload status instead of
/// being lumped in with malformed uploads. The exact byte count is unknown
/// at that point, only that it exceeded the ceiling.
fn field_error(error: MultipartError, max_bytes: usize) -> ApiError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge {
            size: None,
            max: max_bytes,
        }
    } else {
        ApiError::InvalidImage(format!("failed to read upload: {}", error))
    }
}
