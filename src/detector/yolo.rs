// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! YOLOv8 acne lesion detector backed by ONNX Runtime
//!
//! This module wraps an ONNX Runtime session around the exported detection
//! model and owns the full tensor pipeline:
//! - Letterbox resize of the input image to the model's square input size
//! - HWC u8 to normalized NCHW f32 conversion
//! - Decoding of the `[1, 4 + classes, anchors]` output layout
//! - Inverse letterbox transform back to original pixel coordinates
//! - Per-class greedy non-maximum suppression
//!
//! The session runs on CPU. `Session::run` needs exclusive access, so the
//! session sits behind a `Mutex`; preprocessing and postprocessing run
//! outside the lock.

use std::cmp::Ordering;
use std::path::Path;
use std::sync::Mutex;

use image::{imageops, Rgb, RgbImage};
use ndarray::{Array4, ArrayViewD};
use ort::execution_providers::CPUExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use tracing::info;

use super::{Detector, DetectorError, RawDetection};

/// Gray value used for letterbox padding, matching the training pipeline.
const PAD_COLOR: Rgb<u8> = Rgb([114, 114, 114]);

/// Inference tuning knobs. Defaults match the exported model.
#[derive(Debug, Clone)]
pub struct YoloConfig {
    /// Square input size the model was exported with.
    pub input_size: u32,
    /// Minimum class score for a candidate box to survive decoding.
    pub confidence_threshold: f32,
    /// IoU above which two same-class boxes are considered duplicates.
    pub iou_threshold: f32,
    /// ONNX Runtime intra-op thread count.
    pub intra_threads: usize,
}

impl Default for YoloConfig {
    fn default() -> Self {
        Self {
            input_size: 640,
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            intra_threads: 4,
        }
    }
}

/// Parameters of one letterbox transform, kept to invert it after inference.
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

/// ONNX-backed YOLOv8 detector. Loaded once at startup and shared read-only
/// across all inference workers.
pub struct YoloDetector {
    session: Mutex<Session>,
    input_name: String,
    config: YoloConfig,
}

impl std::fmt::Debug for YoloDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YoloDetector")
            .field("input_name", &self.input_name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl YoloDetector {
    /// Load the detection model from an ONNX file.
    ///
    /// # Errors
    /// Returns `DetectorError::ModelLoad` if the file is missing or ONNX
    /// Runtime rejects it. Callers treat this as fatal at startup.
    pub fn load<P: AsRef<Path>>(path: P, config: YoloConfig) -> Result<Self, DetectorError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(DetectorError::ModelLoad(format!(
                "model file not found: {}",
                path.display()
            )));
        }

        let session = Session::builder()
            .map_err(|e| DetectorError::ModelLoad(format!("failed to create session builder: {e}")))?
            .with_execution_providers([CPUExecutionProvider::default().build()])
            .map_err(|e| DetectorError::ModelLoad(format!("failed to set execution provider: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| DetectorError::ModelLoad(format!("failed to set optimization level: {e}")))?
            .with_intra_threads(config.intra_threads)
            .map_err(|e| DetectorError::ModelLoad(format!("failed to set intra threads: {e}")))?
            .commit_from_file(path)
            .map_err(|e| {
                DetectorError::ModelLoad(format!("failed to load {}: {e}", path.display()))
            })?;

        // Input name differs between exports; ask the model, fall back to the
        // ultralytics default.
        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "images".to_string());

        info!(
            "Loaded detection model from {} (input '{}', {}x{})",
            path.display(),
            input_name,
            config.input_size,
            config.input_size
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            config,
        })
    }
}

impl Detector for YoloDetector {
    fn predict(&self, image: &RgbImage) -> Result<Vec<RawDetection>, DetectorError> {
        let (tensor, letterbox) = preprocess(image, self.config.input_size);

        let input = Value::from_array(tensor)
            .map_err(|e| DetectorError::Inference(format!("failed to build input tensor: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| DetectorError::Inference("model session lock poisoned".to_string()))?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input])
            .map_err(|e| DetectorError::Inference(e.to_string()))?;

        let output = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| DetectorError::Inference(format!("failed to extract output tensor: {e}")))?;

        let candidates = decode_output(&output, &letterbox, image.dimensions(), &self.config)?;
        Ok(non_max_suppression(candidates, self.config.iou_threshold))
    }
}

/// Letterbox `image` into a `size`x`size` canvas and convert it to a
/// normalized NCHW tensor.
fn preprocess(image: &RgbImage, size: u32) -> (Array4<f32>, Letterbox) {
    let orig_w = image.width().max(1);
    let orig_h = image.height().max(1);

    let scale = (size as f32 / orig_w as f32).min(size as f32 / orig_h as f32);
    let new_w = ((orig_w as f32 * scale).round() as u32).clamp(1, size);
    let new_h = ((orig_h as f32 * scale).round() as u32).clamp(1, size);
    // Integer pads keep the inverse transform exact.
    let pad_x = (size - new_w) / 2;
    let pad_y = (size - new_h) / 2;

    let resized = imageops::resize(image, new_w, new_h, imageops::FilterType::Triangle);
    let mut canvas = RgbImage::from_pixel(size, size, PAD_COLOR);
    imageops::replace(&mut canvas, &resized, pad_x as i64, pad_y as i64);

    let mut tensor = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
    for (x, y, pixel) in canvas.enumerate_pixels() {
        tensor[[0, 0, y as usize, x as usize]] = pixel[0] as f32 / 255.0;
        tensor[[0, 1, y as usize, x as usize]] = pixel[1] as f32 / 255.0;
        tensor[[0, 2, y as usize, x as usize]] = pixel[2] as f32 / 255.0;
    }

    (
        tensor,
        Letterbox {
            scale,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
        },
    )
}

/// Decode the raw `[1, 4 + classes, anchors]` output into candidate boxes in
/// original-image pixel coordinates.
fn decode_output(
    output: &ArrayViewD<'_, f32>,
    letterbox: &Letterbox,
    original_dims: (u32, u32),
    config: &YoloConfig,
) -> Result<Vec<RawDetection>, DetectorError> {
    let shape = output.shape();
    if shape.len() != 3 || shape[0] != 1 || shape[1] <= 4 {
        return Err(DetectorError::Inference(format!(
            "unexpected output shape {:?} (expected [1, 4 + classes, anchors])",
            shape
        )));
    }

    let num_classes = shape[1] - 4;
    let num_anchors = shape[2];
    let (orig_w, orig_h) = (original_dims.0 as f32, original_dims.1 as f32);

    let mut detections = Vec::new();
    for anchor in 0..num_anchors {
        let mut best_score = 0.0f32;
        let mut best_class = 0usize;
        for class in 0..num_classes {
            let score = output[[0, 4 + class, anchor]];
            if score > best_score {
                best_score = score;
                best_class = class;
            }
        }
        if best_score < config.confidence_threshold {
            continue;
        }

        // Rows 0..4 are cx, cy, w, h in letterbox pixels.
        let cx = output[[0, 0, anchor]];
        let cy = output[[0, 1, anchor]];
        let w = output[[0, 2, anchor]];
        let h = output[[0, 3, anchor]];
        if w <= 0.0 || h <= 0.0 {
            continue;
        }

        let x1 = ((cx - w / 2.0 - letterbox.pad_x) / letterbox.scale).clamp(0.0, orig_w);
        let y1 = ((cy - h / 2.0 - letterbox.pad_y) / letterbox.scale).clamp(0.0, orig_h);
        let x2 = ((cx + w / 2.0 - letterbox.pad_x) / letterbox.scale).clamp(0.0, orig_w);
        let y2 = ((cy + h / 2.0 - letterbox.pad_y) / letterbox.scale).clamp(0.0, orig_h);
        if x2 <= x1 || y2 <= y1 {
            continue;
        }

        detections.push(RawDetection {
            x1,
            y1,
            x2,
            y2,
            confidence: best_score,
            class_id: best_class as i64,
        });
    }

    Ok(detections)
}

/// Greedy per-class NMS. The survivors come back ordered by descending
/// confidence, which fixes the response ordering for identical inputs.
fn non_max_suppression(mut detections: Vec<RawDetection>, iou_threshold: f32) -> Vec<RawDetection> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });

    let mut keep: Vec<RawDetection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        let duplicate = keep
            .iter()
            .any(|kept| kept.class_id == candidate.class_id && iou(kept, &candidate) > iou_threshold);
        if !duplicate {
            keep.push(candidate);
        }
    }
    keep
}

fn iou(a: &RawDetection, b: &RawDetection) -> f32 {
    let ix1 = a.x1.max(b.x1);
    let iy1 = a.y1.max(b.y1);
    let ix2 = a.x2.min(b.x2);
    let iy2 = a.y2.min(b.y2);

    let intersection = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
    let area_a = (a.x2 - a.x1) * (a.y2 - a.y1);
    let area_b = (b.x2 - b.x1) * (b.y2 - b.y1);
    let union = area_a + area_b - intersection;

    if union <= 0.0 {
        return 0.0;
    }
    intersection / union
}
