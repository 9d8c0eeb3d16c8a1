// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Detect endpoint handler

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderMap, Response},
    response::{IntoResponse, Json},
};
use axum_extra::extract::Multipart;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::request::{read_image_field, DetectQuery};
use super::response::{summary_header, Detection, DetectionResponse};
use crate::api::errors::{ApiError, ApiRejection};
use crate::api::http_server::{AppState, DETECTIONS_HEADER};
use crate::vision::{decode_upload, encode_jpeg, render_detections};

/// POST /detect - locate acne lesions in an uploaded image
///
/// Accepts a multipart body with a `file` field and returns either a JSON
/// detection list (default) or an annotated JPEG when
/// `?return_annotated=true`.
///
/// # Errors
/// - 413: payload over the byte ceiling, or image dimensions over the limit
/// - 400: body that does not decode as an image, or missing `file` field
/// - 500: inference failure
pub async fn detect_handler(
    State(state): State<AppState>,
    Query(query): Query<DetectQuery>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<axum::response::Response, ApiRejection> {
    let request_id = Uuid::new_v4();
    let reject = |error: ApiError| ApiRejection::new(error, request_id);
    let max_bytes = state.config.max_upload_bytes;

    // 1. Content-Length precheck. Catches obviously oversized requests
    //    before the body is read; the post-extraction check below is the
    //    authoritative gate.
    if let Some(declared) = content_length(&headers) {
        if declared > max_bytes {
            warn!(%request_id, declared, "Rejecting oversized upload from Content-Length");
            return Err(reject(ApiError::PayloadTooLarge {
                size: Some(declared),
                max: max_bytes,
            }));
        }
    }

    // 2. Extract the upload.
    let bytes = read_image_field(multipart, max_bytes).await.map_err(|e| {
        warn!(%request_id, "Upload extraction failed: {}", e);
        reject(e)
    })?;
    if bytes.len() > max_bytes {
        warn!(%request_id, size = bytes.len(), "Rejecting oversized upload");
        return Err(reject(ApiError::PayloadTooLarge {
            size: Some(bytes.len()),
            max: max_bytes,
        }));
    }

    // 3. Decode and validate dimensions. Neither failure reaches the
    //    detector.
    let (image, image_info) =
        decode_upload(&bytes, state.config.max_image_dim).map_err(|e| {
            warn!(%request_id, "Image validation failed: {}", e);
            reject(e.into())
        })?;
    debug!(
        %request_id,
        "Decoded image: {}x{}, {} bytes",
        image_info.width, image_info.height, image_info.size_bytes
    );

    let (width, height) = (image_info.width, image_info.height);
    let to_rows = |raw: &[crate::detector::RawDetection]| -> Vec<Detection> {
        raw.iter()
            .map(|detection| Detection::from_raw(detection, width, height))
            .collect()
    };

    if !query.return_annotated {
        // 4. Inference on the worker pool; the handler suspends here.
        let raw = state.pool.detect(image).await.map_err(|e| {
            warn!(%request_id, "Inference failed: {}", e);
            reject(e.into())
        })?;

        let detections = to_rows(&raw);
        info!(%request_id, "Detection complete: {} detections", detections.len());
        return Ok(Json(DetectionResponse::new(detections)).into_response());
    }

    // Annotated path keeps a copy of the pixels for rendering.
    let raw = state.pool.detect(image.clone()).await.map_err(|e| {
        warn!(%request_id, "Inference failed: {}", e);
        reject(e.into())
    })?;
    let detections = to_rows(&raw);

    let annotated = render_detections(&image, &raw);
    let jpeg = encode_jpeg(&annotated).map_err(|e| {
        warn!(%request_id, "Annotation encoding failed: {}", e);
        reject(e.into())
    })?;

    info!(
        %request_id,
        "Detection complete: {} detections, annotated JPEG {} bytes",
        detections.len(),
        jpeg.len()
    );

    let summary = summary_header(&detections, state.config.header_max_detections);
    Response::builder()
        .header(header::CONTENT_TYPE, "image/jpeg")
        .header(DETECTIONS_HEADER, summary)
        .body(Body::from(jpeg))
        .map_err(|e| reject(ApiError::Internal(e.to_string())))
}

fn content_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}
