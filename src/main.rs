// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use std::{env, fs, sync::Arc};

use anyhow::{Context, Result};
use image::RgbImage;
use tracing::{info, warn};

use acne_detect_node::{
    api::{start_server, AppState},
    config::NodeConfig,
    detector::{InferencePool, YoloConfig, YoloDetector},
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Initialize tracing subscriber for logging
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    info!(
        "Starting acne detection node v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = NodeConfig::from_env()?;

    // Upload/output directories exist for operators that point tooling at
    // them; the detect path itself stays in memory.
    fs::create_dir_all(&config.upload_dir)
        .with_context(|| format!("failed to create {}", config.upload_dir.display()))?;
    fs::create_dir_all(&config.predict_dir)
        .with_context(|| format!("failed to create {}", config.predict_dir.display()))?;

    // Model load is fatal: serving without a model is worse than not serving.
    let detector = YoloDetector::load(
        &config.model_path,
        YoloConfig {
            input_size: config.infer_size,
            confidence_threshold: config.confidence_threshold,
            iou_threshold: config.iou_threshold,
            ..YoloConfig::default()
        },
    )
    .context("failed to load detection model")?;

    let pool = Arc::new(InferencePool::start(Arc::new(detector), config.infer_workers));

    if config.warmup {
        // One dummy inference absorbs the first-request latency spike.
        let blank = RgbImage::new(config.infer_size, config.infer_size);
        match pool.detect(blank).await {
            Ok(_) => info!("Warmup inference complete"),
            Err(e) => warn!("Warmup inference failed: {}", e),
        }
    }

    info!("Endpoints: GET /healthz, POST /detect");

    let state = AppState {
        pool,
        config: Arc::new(config),
    };
    start_server(state).await
}
