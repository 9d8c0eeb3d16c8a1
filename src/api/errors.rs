// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! API error taxonomy and wire format.
//!
//! Client-input errors carry their diagnostic to the caller; detector
//! failures keep the internal detail for the logs and surface a generic
//! message instead.

use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::detector::DetectorError;
use crate::vision::ImageError;

/// JSON body returned for every error response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub error_type: String,
    pub message: String,
    pub request_id: Option<String>,
}

#[derive(Debug, Clone)]
pub enum ApiError {
    /// Upload exceeds the configured byte ceiling. Rejected before decoding.
    /// `size` is absent when the body blew the framework limit mid-stream,
    /// before its full length was known.
    PayloadTooLarge { size: Option<usize>, max: usize },
    /// Decoded dimensions exceed the configured maximum per side.
    ImageTooLarge { width: u32, height: u32, max: u32 },
    /// The upload is not a decodable image.
    InvalidImage(String),
    /// The multipart body has no `file` field.
    MissingFile,
    /// Inference failed. The message stays internal; callers get a generic
    /// diagnostic.
    DetectorFailure(String),
    /// Response assembly failed after a successful detection.
    Internal(String),
}

impl ApiError {
    pub fn error_type(&self) -> &'static str {
        match self {
            ApiError::PayloadTooLarge { .. } => "payload_too_large",
            ApiError::ImageTooLarge { .. } => "image_too_large",
            ApiError::InvalidImage(_) => "invalid_image",
            ApiError::MissingFile => "missing_file",
            ApiError::DetectorFailure(_) => "detector_failure",
            ApiError::Internal(_) => "internal_error",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::PayloadTooLarge { .. } | ApiError::ImageTooLarge { .. } => 413,
            ApiError::InvalidImage(_) | ApiError::MissingFile => 400,
            ApiError::DetectorFailure(_) | ApiError::Internal(_) => 500,
        }
    }

    pub fn to_response(&self, request_id: Option<String>) -> ErrorResponse {
        let message = match self {
            ApiError::PayloadTooLarge {
                size: Some(size),
                max,
            } => {
                format!("Upload of {} bytes exceeds the {} byte limit", size, max)
            }
            ApiError::PayloadTooLarge { size: None, max } => {
                format!("Upload exceeds the {} byte limit", max)
            }
            ApiError::ImageTooLarge { width, height, max } => format!(
                "Image dimensions {}x{} exceed the maximum of {} pixels per side",
                width, height, max
            ),
            ApiError::InvalidImage(msg) => format!("Invalid image: {}", msg),
            ApiError::MissingFile => "Multipart field 'file' is required".to_string(),
            // Internal detail is logged at the handler boundary, never leaked.
            ApiError::DetectorFailure(_) => "Detection failed".to_string(),
            ApiError::Internal(_) => "Internal error".to_string(),
        };

        ErrorResponse {
            error_type: self.error_type().to_string(),
            message,
            request_id,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::PayloadTooLarge {
                size: Some(size),
                max,
            } => {
                write!(f, "payload too large: {} bytes (max {})", size, max)
            }
            ApiError::PayloadTooLarge { size: None, max } => {
                write!(f, "payload too large (max {})", max)
            }
            ApiError::ImageTooLarge { width, height, max } => {
                write!(f, "image too large: {}x{} (max {})", width, height, max)
            }
            ApiError::InvalidImage(msg) => write!(f, "invalid image: {}", msg),
            ApiError::MissingFile => write!(f, "multipart field 'file' is missing"),
            ApiError::DetectorFailure(msg) => write!(f, "detector failure: {}", msg),
            ApiError::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<ImageError> for ApiError {
    fn from(err: ImageError) -> Self {
        match err {
            ImageError::DimensionsTooLarge { width, height, max } => {
                ApiError::ImageTooLarge { width, height, max }
            }
            ImageError::EncodeFailed(msg) => ApiError::Internal(msg),
            other => ApiError::InvalidImage(other.to_string()),
        }
    }
}

impl From<DetectorError> for ApiError {
    fn from(err: DetectorError) -> Self {
        ApiError::DetectorFailure(err.to_string())
    }
}

/// An `ApiError` bound to the request it rejected. This is what handlers
/// return; the conversion into a response echoes the request id.
#[derive(Debug)]
pub struct ApiRejection {
    pub error: ApiError,
    pub request_id: Uuid,
}

impl ApiRejection {
    pub fn new(error: ApiError, request_id: Uuid) -> Self {
        Self { error, request_id }
    }
}

impl IntoResponse for ApiRejection {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.error.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = self.error.to_response(Some(self.request_id.to_string()));
        (status, Json(body)).into_response()
    }
}
