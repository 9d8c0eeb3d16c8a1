// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Bounded inference worker pool
//!
//! `Session::run` is blocking and CPU-bound, so it must never execute on a
//! runtime task. The pool owns a fixed set of OS threads that pull jobs off
//! an MPMC queue; request handlers submit a decoded image and await a oneshot
//! for the result. That await is the only suspension point on the request
//! path, so the async executor stays responsive no matter how many uploads
//! are in flight.

use std::sync::Arc;

use image::RgbImage;
use tokio::sync::oneshot;
use tracing::{debug, error, info};

use super::{Detector, DetectorError, RawDetection};

struct Job {
    image: RgbImage,
    respond: oneshot::Sender<Result<Vec<RawDetection>, DetectorError>>,
}

/// Handle to the shared worker pool. Cloneable and cheap; all clones feed
/// the same queue.
#[derive(Clone)]
pub struct InferencePool {
    sender: flume::Sender<Job>,
    workers: usize,
}

impl InferencePool {
    /// Spawn `workers` threads that serve inference jobs against the shared
    /// detector. The detector is read-only after load, so the workers need
    /// no coordination beyond the queue itself.
    pub fn start(detector: Arc<dyn Detector>, workers: usize) -> Self {
        let workers = workers.max(1);
        let (sender, receiver) = flume::unbounded::<Job>();

        for id in 0..workers {
            let receiver = receiver.clone();
            let detector = Arc::clone(&detector);
            let spawned = std::thread::Builder::new()
                .name(format!("infer-{}", id))
                .spawn(move || {
                    debug!("Inference worker {} started", id);
                    while let Ok(job) = receiver.recv() {
                        let result = detector.predict(&job.image);
                        // The caller may have disconnected; the result is
                        // simply discarded in that case.
                        let _ = job.respond.send(result);
                    }
                    debug!("Inference worker {} stopped", id);
                });
            if let Err(e) = spawned {
                error!("Failed to spawn inference worker {}: {}", id, e);
            }
        }
        // Workers hold their own clones; dropping the original receiver lets
        // `detect` observe a fully-dead pool as a send failure.
        drop(receiver);

        info!("Inference pool started with {} workers", workers);
        Self { sender, workers }
    }

    /// Submit an image for detection and await the result.
    ///
    /// The returned future suspends until a worker finishes the job. If the
    /// queue is closed (all workers gone) the submit fails with
    /// `QueueClosed`; if the worker dies mid-job the await resolves to
    /// `WorkerGone`. Dropping the future does not cancel the job; the
    /// worker runs it to completion and discards the result.
    pub async fn detect(&self, image: RgbImage) -> Result<Vec<RawDetection>, DetectorError> {
        let (respond, receive) = oneshot::channel();
        self.sender
            .send(Job { image, respond })
            .map_err(|_| DetectorError::QueueClosed)?;
        receive.await.map_err(|_| DetectorError::WorkerGone)?
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}
