// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image handling for the detection pipeline
//!
//! This module provides:
//! - Upload decoding with format detection and dimension guards
//! - Detection overlay rendering and JPEG encoding for annotated responses

pub mod annotate;
pub mod image_utils;

pub use annotate::{encode_jpeg, render_detections};
pub use image_utils::{decode_upload, detect_format, ImageError, ImageInfo};
