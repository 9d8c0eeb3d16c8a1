// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Process configuration, read once from the environment at startup.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};

/// Default CORS allowlist for local frontend development.
const DEFAULT_ORIGINS: &str = "http://localhost:3000,http://127.0.0.1:3000,http://localhost:5173";

/// All runtime knobs for the node. Built from environment variables once in
/// `main` and never re-read per request.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Path to the exported ONNX detection model. Required.
    pub model_path: PathBuf,
    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// Directory for uploaded files. Created at startup; the steady-state
    /// detect path keeps everything in memory and never writes here.
    pub upload_dir: PathBuf,
    /// Directory for annotated outputs, same caveat as `upload_dir`.
    pub predict_dir: PathBuf,
    /// CORS origin allowlist. A single `*` entry selects permissive mode.
    pub allowed_origins: Vec<String>,
    /// Upload size ceiling in bytes. Larger payloads are rejected before
    /// any decoding happens.
    pub max_upload_bytes: usize,
    /// Maximum accepted width or height of a decoded image.
    pub max_image_dim: u32,
    /// Square input size the model was exported with.
    pub infer_size: u32,
    /// Minimum confidence for a detection to be reported.
    pub confidence_threshold: f32,
    /// IoU threshold for non-maximum suppression.
    pub iou_threshold: f32,
    /// Number of inference worker threads.
    pub infer_workers: usize,
    /// Run one dummy inference at startup to absorb first-request latency.
    pub warmup: bool,
    /// Cap on detection summaries carried in the `X-Detections` header.
    pub header_max_detections: usize,
}

impl NodeConfig {
    /// Read configuration from the environment.
    ///
    /// # Errors
    /// Fails if `MODEL_PATH` is unset or `BIND_ADDR` does not parse; both
    /// are fatal at startup.
    pub fn from_env() -> Result<Self> {
        let model_path = env::var("MODEL_PATH")
            .map(PathBuf::from)
            .map_err(|_| anyhow!("MODEL_PATH is not set; refusing to start without a model"))?;

        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse::<SocketAddr>()
            .context("BIND_ADDR is not a valid socket address")?;

        let upload_dir = env::var("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./uploads"));
        let predict_dir = env::var("PREDICT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./predictions"));

        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| DEFAULT_ORIGINS.to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        Ok(Self {
            model_path,
            bind_addr,
            upload_dir,
            predict_dir,
            allowed_origins,
            max_upload_bytes: env_parse("MAX_UPLOAD_BYTES", 10 * 1024 * 1024),
            max_image_dim: env_parse("MAX_IMAGE_DIM", 4096),
            infer_size: env_parse("INFER_SIZE", 640),
            confidence_threshold: env_parse("CONF_THRESHOLD", 0.25),
            iou_threshold: env_parse("IOU_THRESHOLD", 0.45),
            infer_workers: env_parse("INFER_WORKERS", 4),
            warmup: env_flag("WARMUP", true),
            header_max_detections: env_parse("HEADER_MAX_DETECTIONS", 8),
        })
    }

    pub fn permissive_cors(&self) -> bool {
        self.allowed_origins.iter().any(|origin| origin == "*")
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|value| {
            let value = value.to_lowercase();
            value == "true" || value == "1" || value == "yes"
        })
        .unwrap_or(default)
}
