// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Router-level tests for POST /detect
//!
//! These tests drive the full request pipeline through the router with stub
//! detectors behind the worker pool, verifying:
//! - The JSON and annotated response shapes
//! - Every rejected-input path, and that rejections never reach the detector
//! - Independent results under concurrent load

use std::io::Cursor;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use image::{ImageFormat, RgbImage};
use tower::ServiceExt;

use acne_detect_node::{
    api::{build_router, AppState, DETECTIONS_HEADER},
    config::NodeConfig,
    detector::{Detector, DetectorError, InferencePool, RawDetection},
};

const BOUNDARY: &str = "x-test-boundary";

/// Stub that returns a fixed detection list, counting invocations so tests
/// can assert that rejected inputs never reach it.
struct FixedDetector {
    detections: Vec<RawDetection>,
    calls: Arc<AtomicUsize>,
}

impl FixedDetector {
    fn new(detections: Vec<RawDetection>) -> (Arc<Self>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let detector = Arc::new(Self {
            detections,
            calls: Arc::clone(&calls),
        });
        (detector, calls)
    }
}

impl Detector for FixedDetector {
    fn predict(&self, _image: &RgbImage) -> Result<Vec<RawDetection>, DetectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.detections.clone())
    }
}

/// Stub whose single detection reports the width of the image it saw.
struct EchoWidthDetector;

impl Detector for EchoWidthDetector {
    fn predict(&self, image: &RgbImage) -> Result<Vec<RawDetection>, DetectorError> {
        Ok(vec![RawDetection {
            x1: 0.0,
            y1: 0.0,
            x2: image.width() as f32,
            y2: image.height() as f32,
            confidence: 1.0,
            class_id: 0,
        }])
    }
}

struct FailingDetector;

impl Detector for FailingDetector {
    fn predict(&self, _image: &RgbImage) -> Result<Vec<RawDetection>, DetectorError> {
        Err(DetectorError::Inference("tensor shape mismatch".to_string()))
    }
}

fn test_config() -> NodeConfig {
    NodeConfig {
        model_path: PathBuf::from("unused.onnx"),
        bind_addr: "127.0.0.1:0".parse::<SocketAddr>().unwrap(),
        upload_dir: PathBuf::from("./uploads"),
        predict_dir: PathBuf::from("./predictions"),
        allowed_origins: vec!["http://localhost:3000".to_string()],
        max_upload_bytes: 10 * 1024 * 1024,
        max_image_dim: 256,
        infer_size: 64,
        confidence_threshold: 0.25,
        iou_threshold: 0.45,
        infer_workers: 2,
        warmup: false,
        header_max_detections: 8,
    }
}

fn test_router(detector: Arc<dyn Detector>, config: NodeConfig) -> axum::Router {
    let state = AppState {
        pool: Arc::new(InferencePool::start(detector, config.infer_workers)),
        config: Arc::new(config),
    };
    build_router(state)
}

fn raw(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32, class_id: i64) -> RawDetection {
    RawDetection {
        x1,
        y1,
        x2,
        y2,
        confidence,
        class_id,
    }
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::new(width, height);
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, ImageFormat::Png).unwrap();
    bytes.into_inner()
}

fn multipart_body(field: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; \
             filename=\"upload.png\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn detect_request(uri: &str, body: Vec<u8>, with_length: bool) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    if with_length {
        builder = builder.header(header::CONTENT_LENGTH, body.len());
    }
    builder.body(Body::from(body)).unwrap()
}

async fn response_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_detect_returns_empty_set_for_clean_image() {
    let (detector, _) = FixedDetector::new(vec![]);
    let router = test_router(detector, test_config());

    let body = multipart_body("file", &png_bytes(32, 32));
    let response = router
        .oneshot(detect_request("/detect", body, true))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], br#"{"num_detections":0,"detections":[]}"#);
}

#[tokio::test]
async fn test_detect_maps_classes_and_fallback_labels() {
    let (detector, _) = FixedDetector::new(vec![
        raw(1.0, 2.0, 10.0, 12.0, 0.9, 1),
        raw(5.0, 5.0, 20.0, 20.0, 0.6, 42),
    ]);
    let router = test_router(detector, test_config());

    let body = multipart_body("file", &png_bytes(32, 32));
    let response = router
        .oneshot(detect_request("/detect", body, true))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = response_json(response).await;
    assert_eq!(json["num_detections"], 2);
    let detections = json["detections"].as_array().unwrap();
    assert_eq!(detections[0]["class"], 1);
    assert_eq!(detections[0]["class_name"], "Blackheads");
    assert_eq!(detections[0]["x1"], 1);
    assert_eq!(detections[0]["y2"], 12);
    assert_eq!(detections[1]["class"], 42);
    assert_eq!(detections[1]["class_name"], "class_42");
}

#[tokio::test]
async fn test_detect_is_idempotent_for_identical_uploads() {
    let (detector, _) = FixedDetector::new(vec![raw(1.0, 1.0, 9.0, 9.0, 0.8, 0)]);
    let router = test_router(detector, test_config());
    let image = png_bytes(32, 32);

    let first = router
        .clone()
        .oneshot(detect_request("/detect", multipart_body("file", &image), true))
        .await
        .unwrap();
    let second = router
        .oneshot(detect_request("/detect", multipart_body("file", &image), true))
        .await
        .unwrap();

    let first = response_json(first).await;
    let second = response_json(second).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_oversized_payload_rejected_before_detector() {
    let (detector, calls) = FixedDetector::new(vec![]);
    let mut config = test_config();
    config.max_upload_bytes = 64;
    let router = test_router(detector, config);

    let body = multipart_body("file", &[0u8; 256]);
    let response = router
        .oneshot(detect_request("/detect", body, true))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let json = response_json(response).await;
    assert_eq!(json["error_type"], "payload_too_large");
    assert!(json["request_id"].is_string());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_oversized_payload_rejected_without_content_length() {
    // Same ceiling, but no Content-Length header: the post-extraction byte
    // count is the authoritative gate.
    let (detector, calls) = FixedDetector::new(vec![]);
    let mut config = test_config();
    config.max_upload_bytes = 64;
    let router = test_router(detector, config);

    let body = multipart_body("file", &[0u8; 256]);
    let response = router
        .oneshot(detect_request("/detect", body, false))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_body_over_framework_limit_without_content_length_is_413() {
    // No Content-Length and a body past the framework's own cap (ceiling
    // plus one MiB): the multipart read fails mid-stream and must still
    // surface as payload_too_large, not as a malformed upload.
    let (detector, calls) = FixedDetector::new(vec![]);
    let mut config = test_config();
    config.max_upload_bytes = 64;
    let router = test_router(detector, config);

    let body = multipart_body("file", &vec![0u8; 2 * 1024 * 1024]);
    let response = router
        .oneshot(detect_request("/detect", body, false))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let json = response_json(response).await;
    assert_eq!(json["error_type"], "payload_too_large");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_undecodable_upload_rejected_before_detector() {
    let (detector, calls) = FixedDetector::new(vec![]);
    let router = test_router(detector, test_config());

    let body = multipart_body("file", b"definitely not an image");
    let response = router
        .oneshot(detect_request("/detect", body, true))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = response_json(response).await;
    assert_eq!(json["error_type"], "invalid_image");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_empty_upload_rejected() {
    let (detector, calls) = FixedDetector::new(vec![]);
    let router = test_router(detector, test_config());

    let body = multipart_body("file", &[]);
    let response = router
        .oneshot(detect_request("/detect", body, true))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = response_json(response).await;
    assert_eq!(json["error_type"], "invalid_image");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_file_field_rejected() {
    let (detector, _) = FixedDetector::new(vec![]);
    let router = test_router(detector, test_config());

    let body = multipart_body("attachment", &png_bytes(8, 8));
    let response = router
        .oneshot(detect_request("/detect", body, true))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = response_json(response).await;
    assert_eq!(json["error_type"], "missing_file");
}

#[tokio::test]
async fn test_image_at_dimension_limit_accepted_above_rejected() {
    let (detector, calls) = FixedDetector::new(vec![]);
    let mut config = test_config();
    config.max_image_dim = 32;
    let router = test_router(detector, config);

    let at_limit = multipart_body("file", &png_bytes(32, 32));
    let response = router
        .clone()
        .oneshot(detect_request("/detect", at_limit, true))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let over_limit = multipart_body("file", &png_bytes(33, 33));
    let response = router
        .oneshot(detect_request("/detect", over_limit, true))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let json = response_json(response).await;
    assert_eq!(json["error_type"], "image_too_large");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_detector_failure_returns_generic_server_error() {
    let router = test_router(Arc::new(FailingDetector), test_config());

    let body = multipart_body("file", &png_bytes(16, 16));
    let response = router
        .oneshot(detect_request("/detect", body, true))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = response_json(response).await;
    assert_eq!(json["error_type"], "detector_failure");
    assert_eq!(json["message"], "Detection failed");
    // Internal detail must not leak.
    assert!(!json["message"].as_str().unwrap().contains("tensor"));
}

#[tokio::test]
async fn test_annotated_response_is_jpeg_with_summary_header() {
    let detections: Vec<RawDetection> = (0..10)
        .map(|i| raw(i as f32, 0.0, i as f32 + 4.0, 4.0, 0.9, i % 3))
        .collect();
    let (detector, _) = FixedDetector::new(detections);
    let router = test_router(detector, test_config());

    let body = multipart_body("file", &png_bytes(64, 64));
    let response = router
        .oneshot(detect_request("/detect?return_annotated=true", body, true))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "image/jpeg"
    );

    let summary = response
        .headers()
        .get(DETECTIONS_HEADER)
        .expect("annotated response must carry the summary header")
        .to_str()
        .unwrap()
        .to_string();
    let summary: serde_json::Value = serde_json::from_str(&summary).unwrap();
    let rows = summary["detections"].as_array().unwrap();
    assert_eq!(rows.len(), 8);
    assert!(rows[0]["class_name"].is_string());

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..3], &[0xFF, 0xD8, 0xFF]);
}

#[tokio::test]
async fn test_annotated_false_still_returns_json() {
    let (detector, _) = FixedDetector::new(vec![]);
    let router = test_router(detector, test_config());

    let body = multipart_body("file", &png_bytes(16, 16));
    let response = router
        .oneshot(detect_request("/detect?return_annotated=false", body, true))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = response_json(response).await;
    assert_eq!(json["num_detections"], 0);
}

#[tokio::test]
async fn test_concurrent_requests_get_their_own_results() {
    let router = test_router(Arc::new(EchoWidthDetector), test_config());

    let widths: Vec<u32> = (1..=8).map(|i| i * 8).collect();
    let futures = widths.iter().map(|&width| {
        let router = router.clone();
        async move {
            let body = multipart_body("file", &png_bytes(width, 16));
            let response = router
                .oneshot(detect_request("/detect", body, true))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            (width, response_json(response).await)
        }
    });

    for (width, json) in futures_util::future::join_all(futures).await {
        assert_eq!(json["num_detections"], 1);
        assert_eq!(json["detections"][0]["x2"], width);
    }
}
