// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Detection overlay rendering and JPEG encoding for annotated responses.

use std::io::Cursor;

use image::{codecs::jpeg::JpegEncoder, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use super::ImageError;
use crate::detector::RawDetection;

/// JPEG quality for annotated output.
const JPEG_QUALITY: u8 = 90;

/// Box outline thickness in pixels.
const OUTLINE_PX: u32 = 2;

/// Outline colors, keyed by class id modulo the palette length.
const PALETTE: [Rgb<u8>; 8] = [
    Rgb([255, 56, 56]),
    Rgb([255, 157, 151]),
    Rgb([255, 112, 31]),
    Rgb([255, 178, 29]),
    Rgb([72, 249, 10]),
    Rgb([26, 147, 52]),
    Rgb([61, 219, 134]),
    Rgb([0, 194, 255]),
];

fn class_color(class_id: i64) -> Rgb<u8> {
    let index = class_id.rem_euclid(PALETTE.len() as i64) as usize;
    PALETTE[index]
}

/// Render detection outlines onto a copy of the image.
///
/// Each box is drawn as a hollow rectangle `OUTLINE_PX` pixels thick, in a
/// color keyed by its class id. Boxes are clamped to the image bounds;
/// degenerate boxes collapse to a single-pixel outline rather than being
/// dropped.
pub fn render_detections(image: &RgbImage, detections: &[RawDetection]) -> RgbImage {
    let mut canvas = image.clone();
    let (width, height) = canvas.dimensions();

    for detection in detections {
        let x1 = detection.x1.round().clamp(0.0, (width - 1) as f32) as i32;
        let y1 = detection.y1.round().clamp(0.0, (height - 1) as f32) as i32;
        let x2 = detection.x2.round().clamp(0.0, (width - 1) as f32) as i32;
        let y2 = detection.y2.round().clamp(0.0, (height - 1) as f32) as i32;
        let box_w = ((x2 - x1).max(1)) as u32;
        let box_h = ((y2 - y1).max(1)) as u32;

        let color = class_color(detection.class_id);
        for inset in 0..OUTLINE_PX {
            if box_w <= 2 * inset || box_h <= 2 * inset {
                break;
            }
            let rect = Rect::at(x1 + inset as i32, y1 + inset as i32)
                .of_size(box_w - 2 * inset, box_h - 2 * inset);
            draw_hollow_rect_mut(&mut canvas, rect, color);
        }
    }

    canvas
}

/// Encode an RGB image as an in-memory JPEG.
pub fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>, ImageError> {
    let mut bytes = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY)
        .encode_image(image)
        .map_err(|e| ImageError::EncodeFailed(e.to_string()))?;
    Ok(bytes.into_inner())
}
