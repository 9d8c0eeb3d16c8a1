// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Detect endpoint module
//!
//! POST /detect - run acne lesion detection on an uploaded image

pub mod handler;
pub mod request;
pub mod response;

pub use handler::detect_handler;
pub use request::DetectQuery;
pub use response::{Detection, DetectionResponse};
