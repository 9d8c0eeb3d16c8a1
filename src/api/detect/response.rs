// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Detect response types.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::detector::{labels::class_name, RawDetection};

/// One detection row in the response body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Detection {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
    /// Confidence score (0.0-1.0)
    pub confidence: f32,
    /// Class id as emitted by the model
    #[serde(rename = "class")]
    pub class_id: i64,
    /// Resolved label, `class_<id>` for ids outside the table
    pub class_name: String,
}

impl Detection {
    /// Normalize a raw detector row: round the box to integer pixels,
    /// clamp it inside the image, and resolve the label.
    pub fn from_raw(raw: &RawDetection, width: u32, height: u32) -> Self {
        let clamp_x = |v: f32| v.round().clamp(0.0, width as f32) as u32;
        let clamp_y = |v: f32| v.round().clamp(0.0, height as f32) as u32;

        let x1 = clamp_x(raw.x1.min(raw.x2));
        let x2 = clamp_x(raw.x1.max(raw.x2));
        let y1 = clamp_y(raw.y1.min(raw.y2));
        let y2 = clamp_y(raw.y1.max(raw.y2));

        Self {
            x1,
            y1,
            x2,
            y2,
            confidence: raw.confidence,
            class_id: raw.class_id,
            class_name: class_name(raw.class_id),
        }
    }
}

/// JSON body for the default (non-annotated) response shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionResponse {
    pub num_detections: usize,
    pub detections: Vec<Detection>,
}

impl DetectionResponse {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self {
            num_detections: detections.len(),
            detections,
        }
    }
}

/// Compact JSON summary of at most `cap` detections, carried in the
/// `X-Detections` header of annotated responses.
pub fn summary_header(detections: &[Detection], cap: usize) -> String {
    let head = &detections[..detections.len().min(cap)];
    json!({ "detections": head }).to_string()
}
