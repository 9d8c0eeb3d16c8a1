// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Acne lesion detection node
//!
//! A small HTTP service that accepts an uploaded image, runs it through a
//! YOLOv8 ONNX model on a bounded worker pool, and returns bounding boxes
//! with class labels (or an annotated JPEG).

pub mod api;
pub mod config;
pub mod detector;
pub mod vision;

pub use api::{build_router, start_server, AppState};
pub use config::NodeConfig;
pub use detector::{Detector, DetectorError, InferencePool, RawDetection, YoloConfig, YoloDetector};
pub use vision::{ImageError, ImageInfo};
