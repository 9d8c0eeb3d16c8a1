// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Acne lesion detection
//!
//! This module provides:
//! - The `Detector` contract the request pipeline depends on
//! - The YOLOv8 ONNX implementation of that contract
//! - A bounded worker pool that keeps blocking inference off the request path
//! - The fixed class label table

pub mod labels;
pub mod pool;
pub mod yolo;

pub use labels::{class_name, ACNE_CLASSES};
pub use pool::InferencePool;
pub use yolo::{YoloConfig, YoloDetector};

use image::RgbImage;
use thiserror::Error;

/// Errors from model loading and inference.
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("inference queue is closed")]
    QueueClosed,

    #[error("inference worker dropped the request")]
    WorkerGone,
}

/// One raw result row from the detector, in original-image pixel coordinates.
///
/// Corners satisfy `x1 <= x2` and `y1 <= y2`; `confidence` is in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: i64,
}

/// Detection backend contract.
///
/// `predict` is blocking and CPU-bound. Request handlers must route it
/// through the [`InferencePool`] rather than calling it on a runtime task.
pub trait Detector: Send + Sync {
    fn predict(&self, image: &RgbImage) -> Result<Vec<RawDetection>, DetectorError>;
}
